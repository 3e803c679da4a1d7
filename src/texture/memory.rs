// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::ffi::c_void;
use std::sync::Arc;
use parking_lot::Mutex;

use super::*;

struct Pixels {
    data: Vec<u8>,
    writes: u64,
    last_timestamp_us: Option<i64>,
}

/// System-memory texture. Clones share the same pixels, so a host can keep one handle
/// and give another to the adapter.
#[derive(Clone)]
pub struct MemoryTexture {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Arc<Mutex<Pixels>>,
}

impl MemoryTexture {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            pixels: Arc::new(Mutex::new(Pixels { data: vec![0u8; len], writes: 0, last_timestamp_us: None })),
        }
    }

    pub fn format(&self) -> PixelFormat { self.format }
    pub fn stride(&self) -> usize { self.width as usize * self.format.bytes_per_pixel() }

    /// Copy of the current contents, tightly packed.
    pub fn pixels(&self) -> Vec<u8> {
        self.pixels.lock().data.clone()
    }

    /// Number of frames written so far.
    pub fn write_count(&self) -> u64 {
        self.pixels.lock().writes
    }

    pub fn last_timestamp_us(&self) -> Option<i64> {
        self.pixels.lock().last_timestamp_us
    }
}

impl FrameSink for MemoryTexture {
    fn width(&self) -> u32 { self.width }
    fn height(&self) -> u32 { self.height }

    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), PlayerError> {
        check_size(self, frame)?;
        let stride = self.stride();
        let mut pixels = self.pixels.lock();
        for (y, dst) in pixels.data.chunks_exact_mut(stride).enumerate() {
            convert_row(frame.row(y as u32), frame.format(), dst, self.format);
        }
        pixels.writes += 1;
        pixels.last_timestamp_us = frame.timestamp_us();
        Ok(())
    }

    fn native_handle(&self) -> *mut c_void {
        std::ptr::null_mut()
    }
}

impl std::fmt::Debug for MemoryTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuBufferPool;

    fn frame(pool: &CpuBufferPool, width: u32, height: u32) -> VideoFrame {
        let mut frame = VideoFrame::allocate(pool, width, height, PixelFormat::BGRA8, Some(1000));
        for px in frame.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&[10, 20, 30, 255]);
        }
        frame
    }

    #[test]
    fn writes_are_visible_through_clones() {
        let pool = CpuBufferPool::with_capacity(1);
        let host = MemoryTexture::new(4, 2, PixelFormat::BGRA8);
        let mut sink = host.clone();
        sink.write_frame(&frame(&pool, 4, 2)).unwrap();
        assert_eq!(host.write_count(), 1);
        assert_eq!(host.last_timestamp_us(), Some(1000));
        assert_eq!(&host.pixels()[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn converts_to_rgba() {
        let pool = CpuBufferPool::with_capacity(1);
        let mut sink = MemoryTexture::new(1, 1, PixelFormat::RGBA8);
        sink.write_frame(&frame(&pool, 1, 1)).unwrap();
        assert_eq!(sink.pixels(), vec![30, 20, 10, 255]);
    }

    #[test]
    fn size_mismatch_leaves_contents() {
        let pool = CpuBufferPool::with_capacity(1);
        let mut sink = MemoryTexture::new(2, 2, PixelFormat::BGRA8);
        let err = sink.write_frame(&frame(&pool, 4, 2)).unwrap_err();
        assert!(matches!(err, PlayerError::TextureSizeMismatch { texture: (2, 2), frame: (4, 2) }));
        assert_eq!(sink.write_count(), 0);
        assert!(sink.pixels().iter().all(|b| *b == 0));
    }
}
