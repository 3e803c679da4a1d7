// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use thiserror::Error;

/// Pixel layouts a frame sink can receive. Every backend converts to one of these
/// before a frame leaves the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    BGRA8,
    RGBA8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::BGRA8 | PixelFormat::RGBA8 => 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoInfo {
    pub duration_ms: f64,
    pub frame_count: usize,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub bitrate: f64, // in Mbps
}

/// Payload of a size-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChange {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Invalid graphics device handle")]
    InvalidDevice,
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("Invalid test pattern description: {0}")]
    InvalidPatternSpec(String),
    #[error("Video stream was not found")]
    VideoStreamNotFound,
    #[error("Decoder thread stopped unexpectedly")]
    DecoderThreadDied,
    #[error("Texture is {}x{} but the frame is {}x{}", texture.0, texture.1, frame.0, frame.1)]
    TextureSizeMismatch { texture: (u32, u32), frame: (u32, u32) },
    #[error("Texture pixel format {0} is not supported")]
    UnsupportedTextureFormat(String),
    #[error("Unable to lock pixel buffer: {0}")]
    PixelBufferLock(i32),
    #[error("Player must be created on the main thread")]
    MainThreadRequired,
    #[error("Player item failed: {0}")]
    PlayerItemFailed(String),
    #[cfg(feature = "ffmpeg")]
    #[error("ffmpeg error: {0:?}")]
    InternalError(#[from] ffmpeg_next::Error),
}

pub fn select_custom_option<'a>(options: &'a std::collections::HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| options.get(*key).map(|value| value.as_str()))
}

/// Parses a boolean custom option, accepting `1/0`, `true/false`, `yes/no`.
pub fn parse_bool_option(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
