// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

mod types;
mod buffer_pool;
mod frame;
mod clock;
mod source;
mod player;
mod texture;
mod adapter;
pub mod ffi;

pub use types::*;
pub use buffer_pool::*;
pub use frame::*;
pub use clock::PlaybackClock;
pub use source::*;
pub use player::*;
pub use texture::*;
pub use adapter::*;
