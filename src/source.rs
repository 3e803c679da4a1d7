// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::borrow::Cow;
use std::path::PathBuf;

use crate::types::PlayerError;

/// Parameters of the built-in colour-bar generator.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self { width: 320, height: 240, fps: 30.0, duration: 10.0 }
    }
}

/// What `set_source` was pointed at.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource<'a> {
    File(PathBuf),
    Url(Cow<'a, str>),
    /// `testsrc=size=640x360:rate=25:duration=4`, every key optional.
    Pattern(PatternSpec),
}

impl<'a> MediaSource<'a> {
    pub fn parse(source: &'a str) -> Result<Self, PlayerError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(PlayerError::SourceNotFound(source.to_string()));
        }
        if trimmed == "testsrc" {
            return Ok(MediaSource::Pattern(PatternSpec::default()));
        }
        if let Some(args) = trimmed.strip_prefix("testsrc=") {
            return parse_pattern(args).map(MediaSource::Pattern);
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Ok(MediaSource::File(PathBuf::from(path)));
        }
        if trimmed.contains("://") {
            return Ok(MediaSource::Url(Cow::Borrowed(trimmed)));
        }
        Ok(MediaSource::File(PathBuf::from(trimmed)))
    }

    /// Location as a string that native frameworks accept.
    pub fn location(&self) -> Cow<'_, str> {
        match self {
            MediaSource::File(p) => p.to_string_lossy(),
            MediaSource::Url(u) => Cow::Borrowed(u.as_ref()),
            MediaSource::Pattern(p) => Cow::Owned(format!("testsrc=size={}x{}:rate={}:duration={}", p.width, p.height, p.fps, p.duration)),
        }
    }
}

fn parse_pattern(args: &str) -> Result<PatternSpec, PlayerError> {
    let invalid = || PlayerError::InvalidPatternSpec(args.to_string());
    let mut spec = PatternSpec::default();
    for part in args.split(':').filter(|s| !s.is_empty()) {
        let (key, value) = part.split_once('=').ok_or_else(invalid)?;
        match key {
            "size" | "s" => {
                let (w, h) = value.split_once('x').ok_or_else(invalid)?;
                spec.width = w.parse().map_err(|_| invalid())?;
                spec.height = h.parse().map_err(|_| invalid())?;
            }
            "rate" | "r" => spec.fps = value.parse().map_err(|_| invalid())?,
            "duration" | "d" => spec.duration = value.parse().map_err(|_| invalid())?,
            _ => { log::warn!("testsrc: ignoring unknown key '{key}'"); }
        }
    }
    if spec.width == 0 || spec.height == 0 || !(spec.fps > 0.0) || !(spec.duration > 0.0) {
        return Err(invalid());
    }
    Ok(spec)
}
