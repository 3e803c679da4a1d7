// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

#[cfg(feature = "ffmpeg")] pub(crate) mod ffmpeg;
#[cfg(all(feature = "avfoundation", any(target_os = "macos", target_os = "ios")))] pub(crate) mod avfoundation;
pub(crate) mod pattern;

use crate::*;
use crate::types::PlayerError;

use std::collections::HashMap;

#[derive(Default, Debug, Clone)]
pub struct PlayerOptions {
    pub custom_options: HashMap<String, String>,
}

impl PlayerOptions {
    pub fn decode_threads(&self) -> usize {
        select_custom_option(&self.custom_options, &["threads", "decode_threads"])
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3)
    }
    pub fn pool_capacity(&self) -> usize {
        select_custom_option(&self.custom_options, &["pool_capacity", "buffers"])
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3)
    }
    pub fn muted(&self) -> bool {
        select_custom_option(&self.custom_options, &["muted", "mute"])
            .and_then(parse_bool_option)
            .unwrap_or(false)
    }
}

/// One playback session over some media engine.
///
/// Transport calls return immediately; the engine applies them asynchronously where it has
/// its own threads. Read accessors query the engine each time.
#[enum_dispatch::enum_dispatch(PlayerBackend)]
pub trait PlayerInterface {
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self) -> Result<(), PlayerError>;
    fn seek(&mut self, seconds: f64) -> Result<(), PlayerError>;
    fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError>;
    fn set_looping(&mut self, looping: bool);

    fn current_seconds(&self) -> f64;
    fn volume(&self) -> f32;
    fn duration(&self) -> Option<f64>;
    fn is_playing(&self) -> bool;
    fn video_size(&self) -> Option<(u32, u32)>;
    fn video_info(&self) -> Option<VideoInfo>;

    /// Newest decoded frame not handed out before, if any.
    fn acquire_frame(&mut self) -> Result<Option<VideoFrame>, PlayerError>;
}

pub struct Player {
    inner: PlayerBackend,
}

impl Player {
    /// A player with no session. Everything is a no-op and every read returns its sentinel.
    pub fn null() -> Self {
        Self { inner: PlayerBackend::Unknown(NullPlayer) }
    }

    pub fn open(source: &str, options: PlayerOptions) -> Result<Self, PlayerError> {
        let source = MediaSource::parse(source)?;

        if let MediaSource::Pattern(spec) = &source {
            return Ok(Self {
                inner: PlayerBackend::PatternPlayer(pattern::PatternPlayer::new(spec.clone(), &options)),
            });
        }

        if let MediaSource::File(path) = &source {
            if !path.exists() {
                return Err(PlayerError::SourceNotFound(path.display().to_string()));
            }
        }

        #[cfg(all(feature = "avfoundation", any(target_os = "macos", target_os = "ios")))]
        {
            return Ok(Self {
                inner: PlayerBackend::AvFoundationPlayer(avfoundation::AvFoundationPlayer::new(&source, &options)?),
            });
        }
        #[cfg(feature = "ffmpeg")]
        {
            return Ok(Self {
                inner: PlayerBackend::FfmpegPlayer(ffmpeg::FfmpegPlayer::new(&source, options)?),
            });
        }

        Err(PlayerError::UnsupportedSource(format!("no playback backend available for {}", source.location())))
    }

    pub fn is_null(&self) -> bool {
        matches!(self.inner, PlayerBackend::Unknown(_))
    }

    pub fn play(&mut self) -> Result<(), PlayerError> { self.inner.play() }
    pub fn pause(&mut self) -> Result<(), PlayerError> { self.inner.pause() }
    pub fn seek(&mut self, seconds: f64) -> Result<(), PlayerError> { self.inner.seek(seconds) }
    pub fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError> { self.inner.set_rate(rate) }
    pub fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> { self.inner.set_volume(volume) }
    pub fn set_looping(&mut self, looping: bool) { self.inner.set_looping(looping) }
    pub fn current_seconds(&self) -> f64 { self.inner.current_seconds() }
    pub fn volume(&self) -> f32 { self.inner.volume() }
    pub fn duration(&self) -> Option<f64> { self.inner.duration() }
    pub fn is_playing(&self) -> bool { self.inner.is_playing() }
    pub fn video_size(&self) -> Option<(u32, u32)> { self.inner.video_size() }
    pub fn video_info(&self) -> Option<VideoInfo> { self.inner.video_info() }
    pub fn acquire_frame(&mut self) -> Result<Option<VideoFrame>, PlayerError> { self.inner.acquire_frame() }
}

#[enum_dispatch::enum_dispatch]
pub enum PlayerBackend {
    Unknown(NullPlayer),
    PatternPlayer(pattern::PatternPlayer),
    #[cfg(feature = "ffmpeg")]
    FfmpegPlayer(ffmpeg::FfmpegPlayer),
    #[cfg(all(feature = "avfoundation", any(target_os = "macos", target_os = "ios")))]
    AvFoundationPlayer(avfoundation::AvFoundationPlayer),
}

pub struct NullPlayer;

impl PlayerInterface for NullPlayer {
    fn play(&mut self) -> Result<(), PlayerError> { Ok(()) }
    fn pause(&mut self) -> Result<(), PlayerError> { Ok(()) }
    fn seek(&mut self, _seconds: f64) -> Result<(), PlayerError> { Ok(()) }
    fn set_rate(&mut self, _rate: f32) -> Result<(), PlayerError> { Ok(()) }
    fn set_volume(&mut self, _volume: f32) -> Result<(), PlayerError> { Ok(()) }
    fn set_looping(&mut self, _looping: bool) { }
    fn current_seconds(&self) -> f64 { 0.0 }
    fn volume(&self) -> f32 { 0.0 }
    fn duration(&self) -> Option<f64> { None }
    fn is_playing(&self) -> bool { false }
    fn video_size(&self) -> Option<(u32, u32)> { None }
    fn video_info(&self) -> Option<VideoInfo> { None }
    fn acquire_frame(&mut self) -> Result<Option<VideoFrame>, PlayerError> { Ok(None) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults_and_overrides() {
        let mut options = PlayerOptions::default();
        assert_eq!(options.decode_threads(), 3);
        assert_eq!(options.pool_capacity(), 3);
        assert!(!options.muted());

        options.custom_options.insert("threads".into(), "8".into());
        options.custom_options.insert("buffers".into(), "0".into());
        options.custom_options.insert("mute".into(), "yes".into());
        assert_eq!(options.decode_threads(), 8);
        assert_eq!(options.pool_capacity(), 3);
        assert!(options.muted());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Player::open("/definitely/not/here.mp4", PlayerOptions::default()).err();
        assert!(matches!(err, Some(PlayerError::SourceNotFound(_))));
    }

    #[test]
    fn null_player_returns_sentinels() {
        let mut player = Player::null();
        assert!(player.is_null());
        assert_eq!(player.current_seconds(), 0.0);
        assert_eq!(player.duration(), None);
        assert!(!player.is_playing());
        assert!(player.acquire_frame().unwrap().is_none());
    }
}
