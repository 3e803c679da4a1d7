// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::Arc,
};
use parking_lot::Mutex;

use crate::types::PixelFormat;

pub trait BufferFactory<T, P> {
    fn create(&mut self, width: u32, height: u32, stride: usize, format: &P) -> FrameBuffer<T, P>;
    fn free(&mut self, buffer: FrameBuffer<T, P>);
}

#[derive(Clone)]
pub struct FrameBuffer<T, P> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: P,
    pub inner: T,
}

impl<T, P: fmt::Debug> fmt::Debug for FrameBuffer<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Key identifying a bucket of compatible frame buffers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BufKey<P> {
    width: u32,
    height: u32,
    stride: usize,
    format: P,
}

struct PoolInner<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    capacity_per_key: usize,
    factory: Mutex<F>,
    buckets: Mutex<HashMap<BufKey<P>, Vec<FrameBuffer<T, P>>>>,
}

impl<T, P, F> PoolInner<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    fn give_back(&self, key: BufKey<P>, buf: FrameBuffer<T, P>) {
        let mut buckets = self.buckets.lock();
        let entry = buckets.entry(key).or_default();
        if entry.len() < self.capacity_per_key {
            entry.push(buf);
        } else {
            drop(buckets);
            self.factory.lock().free(buf);
        }
    }
}

impl<T, P, F> Drop for PoolInner<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    fn drop(&mut self) {
        let mut factory = self.factory.lock();
        for (_key, vec) in self.buckets.lock().drain() {
            for buf in vec {
                factory.free(buf);
            }
        }
    }
}

/// Shared pool of frame buffers, bucketed by (width, height, stride, format).
///
/// The decode side takes a buffer, fills it and hands it to the render side inside a
/// [`VideoFrame`](crate::VideoFrame). Once the frame is dropped the buffer comes back here,
/// so a steady-state player cycles through a handful of allocations.
#[derive(Clone)]
pub struct BufferPool<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    inner: Arc<PoolInner<T, P, F>>,
}

impl<T, P, F> BufferPool<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    /// `capacity_per_key` is the maximum number of **idle** buffers retained per shape.
    /// When a returned buffer would exceed this, it is handed to the factory to be freed.
    pub fn new(capacity_per_key: usize, factory: F) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity_per_key,
                factory: Mutex::new(factory),
                buckets: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Reuses an idle buffer of the same shape if there is one, otherwise asks the factory.
    pub fn get(&self, width: u32, height: u32, stride: usize, format: P) -> PooledBuffer<T, P, F> {
        let key = BufKey { width, height, stride, format };

        let reused = self.inner.buckets.lock().get_mut(&key).and_then(|vec| vec.pop());
        let buf = match reused {
            Some(buf) => buf,
            None => self.inner.factory.lock().create(width, height, stride, &key.format),
        };

        PooledBuffer {
            pool: Some(self.inner.clone()),
            key,
            buf: Some(buf),
        }
    }

    pub fn idle_count(&self, width: u32, height: u32, stride: usize, format: P) -> usize {
        let key = BufKey { width, height, stride, format };
        self.inner.buckets.lock().get(&key).map_or(0, Vec::len)
    }
}

/// A buffer on loan from a [`BufferPool`]; it goes back to the pool on drop.
pub struct PooledBuffer<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    pool: Option<Arc<PoolInner<T, P, F>>>,
    key: BufKey<P>,
    buf: Option<FrameBuffer<T, P>>,
}

impl<T, P, F> fmt::Debug for PooledBuffer<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    F: BufferFactory<T, P>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T, P, F> PooledBuffer<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    pub fn buffer(&self) -> &FrameBuffer<T, P> {
        self.buf.as_ref().expect("buffer already taken")
    }

    pub fn buffer_mut(&mut self) -> &mut FrameBuffer<T, P> {
        self.buf.as_mut().expect("buffer already taken")
    }

    /// Detaches the buffer from the pool; it will not be returned on drop.
    pub fn into_inner(mut self) -> FrameBuffer<T, P> {
        self.pool = None;
        self.buf.take().expect("buffer already taken")
    }
}

impl<T, P, F> Drop for PooledBuffer<T, P, F>
where
    P: Eq + Hash + Clone + Send + Sync + 'static,
    F: BufferFactory<T, P>,
{
    fn drop(&mut self) {
        if let (Some(pool), Some(buf)) = (self.pool.take(), self.buf.take()) {
            pool.give_back(self.key.clone(), buf);
        }
    }
}

/// Allocates zeroed system-memory buffers.
#[derive(Default)]
pub struct CpuBufferFactory {
    pub allocated: usize,
}

impl BufferFactory<Vec<u8>, PixelFormat> for CpuBufferFactory {
    fn create(&mut self, width: u32, height: u32, stride: usize, format: &PixelFormat) -> FrameBuffer<Vec<u8>, PixelFormat> {
        self.allocated += 1;
        log::trace!("Allocating {width}x{height} {format:?} frame buffer (#{})", self.allocated);
        FrameBuffer {
            width,
            height,
            stride,
            format: *format,
            inner: vec![0u8; stride * height as usize],
        }
    }
    fn free(&mut self, buffer: FrameBuffer<Vec<u8>, PixelFormat>) {
        log::trace!("Freeing {}x{} frame buffer", buffer.width, buffer.height);
    }
}

pub type CpuBufferPool = BufferPool<Vec<u8>, PixelFormat, CpuBufferFactory>;
pub type CpuPooledBuffer = PooledBuffer<Vec<u8>, PixelFormat, CpuBufferFactory>;

impl CpuBufferPool {
    pub fn with_capacity(capacity_per_key: usize) -> Self {
        Self::new(capacity_per_key, CpuBufferFactory::default())
    }

    pub fn allocated(&self) -> usize {
        self.inner.factory.lock().allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_buffer_of_same_shape() {
        let pool = CpuBufferPool::with_capacity(2);
        let buf = pool.get(16, 8, 64, PixelFormat::BGRA8);
        assert_eq!(buf.buffer().inner.len(), 64 * 8);
        drop(buf);
        assert_eq!(pool.idle_count(16, 8, 64, PixelFormat::BGRA8), 1);

        let _again = pool.get(16, 8, 64, PixelFormat::BGRA8);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.idle_count(16, 8, 64, PixelFormat::BGRA8), 0);
    }

    #[test]
    fn different_shapes_do_not_share() {
        let pool = CpuBufferPool::with_capacity(2);
        drop(pool.get(16, 8, 64, PixelFormat::BGRA8));
        let _other = pool.get(8, 8, 32, PixelFormat::BGRA8);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.idle_count(16, 8, 64, PixelFormat::BGRA8), 1);
    }

    #[test]
    fn idle_buffers_capped_per_key() {
        let pool = CpuBufferPool::with_capacity(1);
        let a = pool.get(4, 4, 16, PixelFormat::RGBA8);
        let b = pool.get(4, 4, 16, PixelFormat::RGBA8);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(4, 4, 16, PixelFormat::RGBA8), 1);
    }

    #[test]
    fn detached_buffer_is_not_returned() {
        let pool = CpuBufferPool::with_capacity(2);
        let buf = pool.get(4, 4, 16, PixelFormat::BGRA8).into_inner();
        assert_eq!(buf.width, 4);
        assert_eq!(pool.idle_count(4, 4, 16, PixelFormat::BGRA8), 0);
    }
}
