// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

mod slot; pub use slot::*;

use crate::buffer_pool::{ CpuBufferPool, CpuPooledBuffer };
use crate::types::*;

/// A decoded picture in system memory, ready to be uploaded to a texture.
pub struct VideoFrame {
    buffer: CpuPooledBuffer,
    timestamp_us: Option<i64>,
}

impl VideoFrame {
    /// Takes a tightly packed buffer for `width`x`height` pixels from `pool`.
    pub fn allocate(pool: &CpuBufferPool, width: u32, height: u32, format: PixelFormat, timestamp_us: Option<i64>) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            buffer: pool.get(width, height, stride, format),
            timestamp_us,
        }
    }

    pub fn width(&self)  -> u32 { self.buffer.buffer().width }
    pub fn height(&self) -> u32 { self.buffer.buffer().height }
    pub fn stride(&self) -> usize { self.buffer.buffer().stride }
    pub fn format(&self) -> PixelFormat { self.buffer.buffer().format }
    pub fn timestamp_us(&self) -> Option<i64> { self.timestamp_us }
    pub fn size(&self) -> (u32, u32) { (self.width(), self.height()) }

    pub fn data(&self) -> &[u8] {
        &self.buffer.buffer().inner
    }
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.buffer_mut().inner
    }

    /// Pixel bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride();
        let len = self.width() as usize * self.format().bytes_per_pixel();
        &self.data()[start..start + len]
    }

    /// Copies rows from a foreign buffer with its own stride.
    pub fn copy_from_strided(&mut self, src: &[u8], src_stride: usize) {
        let row_bytes = self.width() as usize * self.format().bytes_per_pixel();
        let dst_stride = self.stride();
        let height = self.height() as usize;
        let dst = self.data_mut();
        for (y, dst_row) in dst.chunks_exact_mut(dst_stride).take(height).enumerate() {
            let start = y * src_stride;
            let Some(src_row) = src.get(start..start + row_bytes) else { break; };
            dst_row[..row_bytes].copy_from_slice(src_row);
        }
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .field("timestamp_us", &self.timestamp_us)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strided_copy_drops_padding() {
        let pool = CpuBufferPool::with_capacity(1);
        let mut frame = VideoFrame::allocate(&pool, 2, 2, PixelFormat::BGRA8, Some(40_000));
        let src: Vec<u8> = (0..24u8).collect(); // 2 rows of 12 bytes, 4 bytes padding each
        frame.copy_from_strided(&src, 12);
        assert_eq!(frame.row(0), &src[0..8]);
        assert_eq!(frame.row(1), &src[12..20]);
        assert_eq!(frame.timestamp_us(), Some(40_000));
    }
}
