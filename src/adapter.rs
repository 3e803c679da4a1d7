// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::*;

pub(crate) type SizeChangeHandler = Box<dyn FnMut(SizeChange)>;

/// Owns one playback session and copies its frames into a host-provided texture.
///
/// Meant to be driven from the host's render loop: transport calls whenever, and
/// [`update_frame`](Self::update_frame) once per tick.
pub struct PlaybackTextureAdapter {
    index: usize,
    device: GraphicsDevice,
    session: Player,
    output: Option<OutputTexture>,
    size_handler: Option<SizeChangeHandler>,
    // Bumped on every handler registration, so a handler replaced from inside its own call is not restored.
    handler_generation: u64,

    loop_play: bool,
    rate: f32,
    volume: f32,

    last_reported_size: Option<(u32, u32)>,
    // Newest frame, kept so a texture set while paused still gets a picture.
    current_frame: Option<VideoFrame>,
    frame_written: bool,
}

impl PlaybackTextureAdapter {
    pub fn new(index: usize, device: GraphicsDevice) -> Self {
        log::debug!("Adapter {index} created on {device:?}");
        Self {
            index,
            device,
            session: Player::null(),
            output: None,
            size_handler: None,
            handler_generation: 0,
            loop_play: false,
            rate: 1.0,
            volume: 1.0,
            last_reported_size: None,
            current_frame: None,
            frame_written: false,
        }
    }

    /// Constructs from a raw host device handle; a null handle is rejected.
    ///
    /// # Safety
    /// See [`GraphicsDevice::from_raw`].
    pub unsafe fn from_raw_device(index: usize, device: *mut std::ffi::c_void) -> Result<Self, PlayerError> {
        let device = unsafe { GraphicsDevice::from_raw(device)? };
        Ok(Self::new(index, device))
    }

    pub fn index(&self) -> usize { self.index }

    pub fn output_texture(&self) -> Option<&OutputTexture> {
        self.output.as_ref()
    }

    /// Sets the texture frames are written into. The newest frame is written to it on the
    /// next update even when playback is paused.
    pub fn set_output_texture(&mut self, texture: Option<OutputTexture>) {
        self.output = texture;
        self.frame_written = false;
    }

    /// Allocates a texture of the current video size on this adapter's device and sets it
    /// as the output.
    pub fn create_output_texture(&mut self) -> Result<Option<OutputTexture>, PlayerError> {
        let Some((width, height)) = self.session.video_size().or(self.last_reported_size) else {
            return Ok(None);
        };
        let texture = self.device.create_texture(width, height)?;
        self.set_output_texture(Some(texture.clone()));
        Ok(Some(texture))
    }

    pub fn is_loop_play(&self) -> bool { self.loop_play }

    pub fn set_loop_play(&mut self, loop_play: bool) {
        self.loop_play = loop_play;
        self.session.set_looping(loop_play);
    }

    pub fn has_session(&self) -> bool {
        !self.session.is_null()
    }

    pub fn set_source(&mut self, path: &str) -> Result<(), PlayerError> {
        self.set_source_with_options(path, PlayerOptions::default())
    }

    /// Replaces the current session with a new, paused one.
    ///
    /// The previous session is released first, so on error the adapter has no session.
    pub fn set_source_with_options(&mut self, path: &str, options: PlayerOptions) -> Result<(), PlayerError> {
        self.release_session();

        let mut session = Player::open(path, options)?;
        session.set_looping(self.loop_play);
        if self.rate != 1.0 {
            session.set_rate(self.rate)?;
        }
        if self.volume != 1.0 {
            session.set_volume(self.volume)?;
        }
        self.session = session;
        log::info!("Adapter {}: source set to {path}", self.index);
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), PlayerError> {
        self.session.play()
    }

    pub fn pause(&mut self) -> Result<(), PlayerError> {
        self.session.pause()
    }

    pub fn seek(&mut self, seconds: f32) -> Result<(), PlayerError> {
        self.session.seek(seconds as f64)
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        self.rate = rate;
        self.session.set_rate(rate)
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        self.volume = volume;
        self.session.set_volume(volume)
    }

    pub fn rate(&self) -> f32 { self.rate }

    /// The session's volume, or the stored level to apply to the next one.
    pub fn volume(&self) -> f32 {
        if self.has_session() { self.session.volume() } else { self.volume }
    }

    /// Releases the session and the output texture. The adapter can be reused with a new source.
    pub fn shutdown(&mut self) {
        self.release_session();
        self.output = None;
        self.last_reported_size = None;
        log::info!("Adapter {}: closed", self.index);
    }

    fn release_session(&mut self) {
        self.current_frame = None;
        self.frame_written = false;
        self.session = Player::null();
    }

    pub fn current_seconds(&self) -> f32 { self.session.current_seconds() as f32 }
    pub fn duration(&self) -> f32 { self.session.duration().unwrap_or(0.0) as f32 }
    pub fn is_playing(&self) -> bool { self.session.is_playing() }
    pub fn width(&self) -> u32 { self.session.video_size().map_or(0, |s| s.0) }
    pub fn height(&self) -> u32 { self.session.video_size().map_or(0, |s| s.1) }
    pub fn video_info(&self) -> Option<VideoInfo> { self.session.video_info() }

    /// Registers the single size-change handler, replacing any previous one.
    pub fn set_size_change_handler<F: FnMut(SizeChange) + 'static>(&mut self, handler: F) {
        self.size_handler = Some(Box::new(handler));
        self.handler_generation += 1;
    }

    pub fn clear_size_change_handler(&mut self) {
        self.size_handler = None;
        self.handler_generation += 1;
    }

    /// Pulls the newest decoded frame and writes it into the output texture.
    ///
    /// Returns `Ok(true)` when the texture was written. Without a session, a frame or a
    /// texture, this does nothing and the texture keeps its contents.
    pub fn update_frame(&mut self) -> Result<bool, PlayerError> {
        if let Some(change) = self.poll_frame()? {
            if let Some((mut handler, generation)) = self.take_size_change_handler() {
                handler(change);
                self.restore_size_change_handler(handler, generation);
            }
        }
        self.write_output()
    }

    /// Stores the newest decoded frame, returning the new dimensions when they differ from
    /// the last reported ones.
    ///
    /// The frame is stored before anyone is notified, so a handler that releases the
    /// session also drops the frame.
    pub(crate) fn poll_frame(&mut self) -> Result<Option<SizeChange>, PlayerError> {
        let Some(frame) = self.session.acquire_frame()? else {
            return Ok(None);
        };
        let size = frame.size();
        self.current_frame = Some(frame);
        self.frame_written = false;

        if self.last_reported_size == Some(size) {
            return Ok(None);
        }
        self.last_reported_size = Some(size);
        log::debug!("Adapter {}: video size is now {}x{}", self.index, size.0, size.1);
        Ok(Some(SizeChange { index: self.index, width: size.0, height: size.1 }))
    }

    /// Writes the stored frame into the output texture if it has not been written there yet.
    pub(crate) fn write_output(&mut self) -> Result<bool, PlayerError> {
        if self.frame_written {
            return Ok(false);
        }
        let (Some(output), Some(frame)) = (self.output.as_mut(), self.current_frame.as_ref()) else {
            return Ok(false);
        };
        // A texture that does not fit is reported once per frame, not once per tick.
        self.frame_written = true;
        output.write_frame(frame)?;
        Ok(true)
    }

    /// Moves the handler out for the duration of a call, so the call may re-enter the adapter.
    pub(crate) fn take_size_change_handler(&mut self) -> Option<(SizeChangeHandler, u64)> {
        self.size_handler.take().map(|h| (h, self.handler_generation))
    }

    /// Puts a taken handler back unless it was replaced or cleared meanwhile.
    pub(crate) fn restore_size_change_handler(&mut self, handler: SizeChangeHandler, generation: u64) {
        if self.handler_generation == generation {
            self.size_handler = Some(handler);
        }
    }
}

impl Drop for PlaybackTextureAdapter {
    fn drop(&mut self) {
        log::debug!("Adapter {} dropped", self.index);
    }
}
