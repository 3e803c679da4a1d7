// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::sync::atomic::{ AtomicU64, Ordering };
use parking_lot::Mutex;

use super::VideoFrame;

/// Latest-frame mailbox between one decoding thread and one rendering thread.
///
/// The producer overwrites whatever is waiting; the consumer always takes the newest
/// frame. Frames that were never displayed are dropped, which returns their buffer to
/// the pool. Together with a pool capacity of three this gives triple buffering
/// without the consumer ever waiting on the producer.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<VideoFrame>>,
    published: AtomicU64,
    skipped: AtomicU64,
}

impl FrameSlot {
    pub fn publish(&self, frame: VideoFrame) {
        let previous = self.latest.lock().replace(frame);
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn take(&self) -> Option<VideoFrame> {
        self.latest.lock().take()
    }

    pub fn clear(&self) {
        self.latest.lock().take();
    }

    pub fn published(&self) -> u64 { self.published.load(Ordering::Relaxed) }
    /// Frames overwritten before the consumer picked them up.
    pub fn skipped(&self) -> u64 { self.skipped.load(Ordering::Relaxed) }
}
