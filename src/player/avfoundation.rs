// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

//! AVPlayer backend. Playback, buffering, audio and looping transitions are AVFoundation's;
//! frames are pulled from an `AVPlayerItemVideoOutput` configured for Metal-compatible BGRA.

use super::*;

use objc2::rc::Retained;
use objc2::runtime::{ AnyObject, ProtocolObject };
use objc2::{ AllocAnyThread, MainThreadMarker };
use objc2_av_foundation::{ AVMediaTypeVideo, AVPlayer, AVPlayerItem, AVPlayerItemStatus, AVPlayerItemVideoOutput };
use objc2_core_media::{ CMTime, CMTimeFlags };
use objc2_core_video::{
    kCVPixelBufferMetalCompatibilityKey, kCVPixelBufferPixelFormatTypeKey, kCVPixelFormatType_32BGRA,
    CVPixelBuffer, CVPixelBufferGetBaseAddress, CVPixelBufferGetBytesPerRow, CVPixelBufferGetHeight,
    CVPixelBufferGetWidth, CVPixelBufferLockBaseAddress, CVPixelBufferLockFlags, CVPixelBufferUnlockBaseAddress,
};
use objc2_foundation::{ NSCopying, NSDictionary, NSMutableDictionary, NSNumber, NSString, NSURL };

pub struct AvFoundationPlayer {
    player: Retained<AVPlayer>,
    item: Retained<AVPlayerItem>,
    output: Retained<AVPlayerItemVideoOutput>,
    pool: CpuBufferPool,
    rate: f32,
    wants_play: bool,
    looping: bool,
    failure_reported: bool,
}

impl AvFoundationPlayer {
    /// Must be called on the main thread, AVPlayer requires it.
    pub fn new(source: &MediaSource, options: &PlayerOptions) -> Result<Self, PlayerError> {
        let mtm = MainThreadMarker::new().ok_or(PlayerError::MainThreadRequired)?;

        let url: Retained<NSURL> = match source {
            MediaSource::Url(u) => NSURL::URLWithString(&NSString::from_str(u))
                .ok_or_else(|| PlayerError::UnsupportedSource(u.to_string()))?,
            _ => NSURL::fileURLWithPath(&NSString::from_str(&source.location())),
        };

        let item = unsafe { AVPlayerItem::playerItemWithURL(&url, mtm) };

        let settings = Self::output_settings();
        let settings_ptr = Retained::as_ptr(&settings) as *const NSDictionary<NSString, AnyObject>;
        let output = unsafe {
            AVPlayerItemVideoOutput::initWithPixelBufferAttributes(AVPlayerItemVideoOutput::alloc(), Some(&*settings_ptr))
        };
        unsafe { item.addOutput(&output) };

        let player = unsafe { AVPlayer::playerWithPlayerItem(Some(&item), mtm) };
        unsafe { player.setMuted(options.muted()) };

        log::info!("AVPlayer created for {} (paused)", source.location());

        Ok(Self {
            player,
            item,
            output,
            pool: CpuBufferPool::with_capacity(options.pool_capacity()),
            rate: 1.0,
            wants_play: false,
            looping: false,
            failure_reported: false,
        })
    }

    fn output_settings() -> Retained<NSMutableDictionary<NSString, AnyObject>> {
        unsafe {
            let dict: Retained<NSMutableDictionary<NSString, AnyObject>> = NSMutableDictionary::new();

            let format_key: &NSString = &*(kCVPixelBufferPixelFormatTypeKey as *const _ as *const NSString);
            let format_value = NSNumber::numberWithUnsignedInt(kCVPixelFormatType_32BGRA);
            dict.setObject_forKey(
                &*(Retained::as_ptr(&format_value) as *const AnyObject),
                ProtocolObject::<dyn NSCopying>::from_ref(format_key),
            );

            let metal_key: &NSString = &*(kCVPixelBufferMetalCompatibilityKey as *const _ as *const NSString);
            let metal_value = NSNumber::numberWithBool(true);
            dict.setObject_forKey(
                &*(Retained::as_ptr(&metal_value) as *const AnyObject),
                ProtocolObject::<dyn NSCopying>::from_ref(metal_key),
            );

            dict
        }
    }

    fn is_ready(&self) -> bool {
        unsafe { self.item.status() } == AVPlayerItemStatus::ReadyToPlay
    }

    fn reached_end(&self) -> bool {
        match self.duration() {
            Some(d) => self.current_seconds() + 1e-3 >= d,
            None => false,
        }
    }

    fn copy_pixel_buffer(&self, pixel_buffer: &CVPixelBuffer, timestamp_us: Option<i64>) -> Result<VideoFrame, PlayerError> {
        let width = CVPixelBufferGetWidth(pixel_buffer);
        let height = CVPixelBufferGetHeight(pixel_buffer);

        let lock_result = unsafe { CVPixelBufferLockBaseAddress(pixel_buffer, CVPixelBufferLockFlags::ReadOnly) };
        if lock_result != 0 {
            return Err(PlayerError::PixelBufferLock(lock_result));
        }

        let bytes_per_row = CVPixelBufferGetBytesPerRow(pixel_buffer);
        let base_address = CVPixelBufferGetBaseAddress(pixel_buffer);
        let mut frame = VideoFrame::allocate(&self.pool, width as u32, height as u32, PixelFormat::BGRA8, timestamp_us);
        if !base_address.is_null() {
            // Valid while the base address is locked.
            let src = unsafe { std::slice::from_raw_parts(base_address as *const u8, bytes_per_row * height) };
            frame.copy_from_strided(src, bytes_per_row);
        }

        unsafe { CVPixelBufferUnlockBaseAddress(pixel_buffer, CVPixelBufferLockFlags::ReadOnly) };
        Ok(frame)
    }
}

impl Drop for AvFoundationPlayer {
    fn drop(&mut self) {
        unsafe {
            self.player.pause();
            self.item.removeOutput(&self.output);
        }
        log::debug!("AVPlayer released");
    }
}

impl PlayerInterface for AvFoundationPlayer {
    fn play(&mut self) -> Result<(), PlayerError> {
        self.wants_play = true;
        unsafe {
            self.player.play();
            if self.rate != 1.0 {
                self.player.setRate(self.rate);
            }
        }
        log::debug!("AVPlayer: play");
        Ok(())
    }
    fn pause(&mut self) -> Result<(), PlayerError> {
        self.wants_play = false;
        unsafe { self.player.pause() };
        log::debug!("AVPlayer: pause");
        Ok(())
    }
    fn seek(&mut self, seconds: f64) -> Result<(), PlayerError> {
        let seconds = match self.duration() {
            Some(d) => seconds.clamp(0.0, d),
            None => seconds.max(0.0),
        };
        unsafe { self.player.seekToTime(seconds_to_cmtime(seconds)) };
        log::debug!("AVPlayer: seek to {seconds:.3}");
        Ok(())
    }
    fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        self.rate = rate;
        if self.wants_play {
            unsafe { self.player.setRate(rate) };
        }
        Ok(())
    }
    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        unsafe { self.player.setVolume(volume) };
        Ok(())
    }
    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn current_seconds(&self) -> f64 {
        cmtime_to_seconds(unsafe { self.player.currentTime() })
    }
    fn volume(&self) -> f32 {
        unsafe { self.player.volume() }
    }
    fn duration(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        let seconds = cmtime_to_seconds(unsafe { self.item.duration() });
        (seconds > 0.0).then_some(seconds)
    }
    fn is_playing(&self) -> bool {
        unsafe { self.player.rate() } != 0.0
    }
    fn video_size(&self) -> Option<(u32, u32)> {
        let size = unsafe { self.item.presentationSize() };
        let (w, h) = (size.width as u32, size.height as u32);
        (w > 0 && h > 0).then_some((w, h))
    }
    fn video_info(&self) -> Option<VideoInfo> {
        let (width, height) = self.video_size()?;
        let duration = self.duration().unwrap_or(0.0);

        let mut fps = 0.0;
        if let Some(media_type) = unsafe { AVMediaTypeVideo } {
            let asset = unsafe { self.item.asset() };
            #[allow(deprecated)]
            let tracks = unsafe { asset.tracksWithMediaType(media_type) };
            if !tracks.is_empty() {
                fps = unsafe { tracks.objectAtIndex(0).nominalFrameRate() } as f64;
            }
        }

        Some(VideoInfo {
            duration_ms: duration * 1000.0,
            frame_count: (duration * fps) as usize,
            fps,
            width,
            height,
            bitrate: 0.0,
        })
    }

    fn acquire_frame(&mut self) -> Result<Option<VideoFrame>, PlayerError> {
        if unsafe { self.item.status() } == AVPlayerItemStatus::Failed {
            if std::mem::replace(&mut self.failure_reported, true) {
                return Ok(None);
            }
            let message = unsafe { self.item.error() }
                .map(|e| e.localizedDescription().to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            log::error!("AVPlayer item failed: {message}");
            return Err(PlayerError::PlayerItemFailed(message));
        }

        // AVPlayer pauses itself at the end of the item.
        if self.looping && self.wants_play && !self.is_playing() && self.reached_end() {
            log::debug!("AVPlayer: looping to start");
            unsafe { self.player.seekToTime(seconds_to_cmtime(0.0)) };
            self.play()?;
        }

        let item_time = unsafe { self.player.currentTime() };
        if !unsafe { self.output.hasNewPixelBufferForItemTime(item_time) } {
            return Ok(None);
        }

        let mut display_time = item_time;
        let pixel_buffer = unsafe {
            self.output.copyPixelBufferForItemTime_itemTimeForDisplay(item_time, &mut display_time as *mut CMTime)
        };
        let Some(pixel_buffer) = pixel_buffer else {
            return Ok(None);
        };

        let timestamp_us = (display_time.timescale > 0).then(|| (cmtime_to_seconds(display_time) * 1_000_000.0).round() as i64);
        self.copy_pixel_buffer(&pixel_buffer, timestamp_us).map(Some)
    }
}

fn cmtime_to_seconds(time: CMTime) -> f64 {
    if time.timescale <= 0 {
        return 0.0;
    }
    (time.value as f64 / time.timescale as f64).max(0.0)
}

fn seconds_to_cmtime(seconds: f64) -> CMTime {
    let timescale: i32 = 600;
    CMTime {
        value: (seconds * timescale as f64) as i64,
        timescale,
        flags: CMTimeFlags::Valid,
        epoch: 0,
    }
}
