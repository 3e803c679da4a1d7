// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use super::*;
use crate::clock::PlaybackClock;

// BGRA
const BARS: [[u8; 4]; 8] = [
    [0xff, 0xff, 0xff, 0xff], // white
    [0x00, 0xff, 0xff, 0xff], // yellow
    [0xff, 0xff, 0x00, 0xff], // cyan
    [0x00, 0xff, 0x00, 0xff], // green
    [0xff, 0x00, 0xff, 0xff], // magenta
    [0x00, 0x00, 0xff, 0xff], // red
    [0xff, 0x00, 0x00, 0xff], // blue
    [0x00, 0x00, 0x00, 0xff], // black
];

/// Colour bars with a marker column that moves one pixel per frame.
pub struct PatternPlayer {
    spec: PatternSpec,
    clock: PlaybackClock,
    pool: CpuBufferPool,
    last_frame_index: Option<u64>,
    volume: f32,
}

impl PatternPlayer {
    pub fn new(spec: PatternSpec, options: &PlayerOptions) -> Self {
        let mut clock = PlaybackClock::new();
        clock.set_duration(Some(spec.duration));
        log::info!("Opened test pattern {}x{} @ {} fps, {} s", spec.width, spec.height, spec.fps, spec.duration);
        Self {
            pool: CpuBufferPool::with_capacity(options.pool_capacity()),
            volume: if options.muted() { 0.0 } else { 1.0 },
            last_frame_index: None,
            clock,
            spec,
        }
    }

    fn frame_count(&self) -> u64 {
        ((self.spec.duration * self.spec.fps).ceil() as u64).max(1)
    }

    fn frame_index_at(&self, seconds: f64) -> u64 {
        ((seconds * self.spec.fps).floor() as u64).min(self.frame_count() - 1)
    }

    fn render(&self, index: u64) -> VideoFrame {
        let (width, height) = (self.spec.width, self.spec.height);
        let timestamp_us = (index as f64 * 1_000_000.0 / self.spec.fps).round() as i64;
        let mut frame = VideoFrame::allocate(&self.pool, width, height, PixelFormat::BGRA8, Some(timestamp_us));
        let stride = frame.stride();
        let marker = (index % width as u64) as usize;
        for row in frame.data_mut().chunks_exact_mut(stride) {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let color = if x == marker {
                    [0x80, 0x80, 0x80, 0xff]
                } else {
                    BARS[x * BARS.len() / width as usize]
                };
                px.copy_from_slice(&color);
            }
        }
        frame
    }
}

impl PlayerInterface for PatternPlayer {
    fn play(&mut self) -> Result<(), PlayerError> {
        self.clock.play();
        log::debug!("testsrc: play at {:.3}", self.clock.position());
        Ok(())
    }
    fn pause(&mut self) -> Result<(), PlayerError> {
        self.clock.pause();
        log::debug!("testsrc: pause at {:.3}", self.clock.position());
        Ok(())
    }
    fn seek(&mut self, seconds: f64) -> Result<(), PlayerError> {
        let target = self.clock.seek(seconds);
        // Force the frame at the new position out even if it has the same index.
        self.last_frame_index = None;
        log::debug!("testsrc: seek to {target:.3}");
        Ok(())
    }
    fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        self.clock.set_rate(rate as f64);
        Ok(())
    }
    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        self.volume = volume;
        Ok(())
    }
    fn set_looping(&mut self, looping: bool) {
        self.clock.set_looping(looping);
    }

    fn current_seconds(&self) -> f64 { self.clock.position() }
    fn volume(&self) -> f32 { self.volume }
    fn duration(&self) -> Option<f64> { Some(self.spec.duration) }
    fn is_playing(&self) -> bool { self.clock.is_playing() }
    fn video_size(&self) -> Option<(u32, u32)> { Some((self.spec.width, self.spec.height)) }

    fn video_info(&self) -> Option<VideoInfo> {
        Some(VideoInfo {
            duration_ms: self.spec.duration * 1000.0,
            frame_count: self.frame_count() as usize,
            fps: self.spec.fps,
            width: self.spec.width,
            height: self.spec.height,
            bitrate: 0.0,
        })
    }

    fn acquire_frame(&mut self) -> Result<Option<VideoFrame>, PlayerError> {
        let index = self.frame_index_at(self.clock.position());
        if self.last_frame_index == Some(index) {
            return Ok(None);
        }
        self.last_frame_index = Some(index);
        Ok(Some(self.render(index)))
    }
}
