// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use player_texture::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{ Duration, Instant };

const SMALL: &str = "testsrc=size=16x8:rate=10:duration=2";

fn adapter() -> PlaybackTextureAdapter {
    PlaybackTextureAdapter::new(7, GraphicsDevice::Headless)
}

fn sink(width: u32, height: u32) -> (MemoryTexture, OutputTexture) {
    let texture = MemoryTexture::new(width, height, PixelFormat::BGRA8);
    let output = texture.clone().into();
    (texture, output)
}

#[test]
fn update_without_source_leaves_sink_untouched() {
    let mut a = adapter();
    let (texture, output) = sink(16, 8);
    a.set_output_texture(Some(output));

    assert!(!a.update_frame().unwrap());
    assert_eq!(texture.write_count(), 0);
    assert!(texture.pixels().iter().all(|b| *b == 0));

    assert_eq!(a.current_seconds(), 0.0);
    assert_eq!(a.duration(), 0.0);
    assert!(!a.is_playing());
    assert_eq!((a.width(), a.height()), (0, 0));
}

#[test]
fn play_and_pause_are_idempotent() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    assert!(!a.is_playing());

    a.play().unwrap();
    a.play().unwrap();
    assert!(a.is_playing());

    a.pause().unwrap();
    a.pause().unwrap();
    assert!(!a.is_playing());
}

#[test]
fn source_reports_duration_and_size() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    assert!(a.has_session());
    assert_eq!(a.duration(), 2.0);
    assert_eq!((a.width(), a.height()), (16, 8));

    let info = a.video_info().unwrap();
    assert_eq!(info.fps, 10.0);
    assert_eq!(info.frame_count, 20);
}

#[test]
fn size_handler_fires_once_per_new_size() {
    let mut a = adapter();
    let changes = Rc::new(RefCell::new(Vec::new()));
    let changes2 = changes.clone();
    a.set_size_change_handler(move |change| changes2.borrow_mut().push(change));

    a.set_source(SMALL).unwrap();
    a.update_frame().unwrap();
    a.seek(1.0).unwrap();
    a.update_frame().unwrap();
    assert_eq!(*changes.borrow(), vec![SizeChange { index: 7, width: 16, height: 8 }]);

    // Same dimensions, nothing new to report.
    a.set_source("testsrc=size=16x8:rate=25").unwrap();
    a.update_frame().unwrap();
    assert_eq!(changes.borrow().len(), 1);

    a.set_source("testsrc=size=32x4").unwrap();
    a.update_frame().unwrap();
    a.update_frame().unwrap();
    assert_eq!(changes.borrow().len(), 2);
    assert_eq!(changes.borrow()[1], SizeChange { index: 7, width: 32, height: 4 });
}

#[test]
fn shutdown_resets_session() {
    let mut a = adapter();
    let (_texture, output) = sink(16, 8);
    a.set_output_texture(Some(output));
    a.set_source(SMALL).unwrap();
    a.seek(1.5).unwrap();
    a.play().unwrap();

    a.shutdown();
    assert!(!a.has_session());
    assert_eq!(a.current_seconds(), 0.0);
    assert!(!a.is_playing());
    assert!(a.output_texture().is_none());

    // Usable again, and the size is reported anew.
    let count = Rc::new(RefCell::new(0));
    let count2 = count.clone();
    a.set_size_change_handler(move |_| *count2.borrow_mut() += 1);
    a.set_source(SMALL).unwrap();
    a.update_frame().unwrap();
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn seek_is_clamped() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    a.seek(-3.0).unwrap();
    assert_eq!(a.current_seconds(), 0.0);
    a.seek(42.0).unwrap();
    assert_eq!(a.current_seconds(), 2.0);
    a.seek(0.5).unwrap();
    assert_eq!(a.current_seconds(), 0.5);
}

#[test]
fn replaced_sink_gets_latest_frame() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    a.seek(0.5).unwrap();

    // Frame arrives before any texture is set.
    assert!(!a.update_frame().unwrap());

    let (first, output) = sink(16, 8);
    a.set_output_texture(Some(output));
    assert!(a.update_frame().unwrap());
    assert_eq!(first.write_count(), 1);
    assert_eq!(first.last_timestamp_us(), Some(500_000));

    // Paused, so no new frame, yet the new texture is filled.
    let (second, output) = sink(16, 8);
    a.set_output_texture(Some(output));
    assert!(a.update_frame().unwrap());
    assert!(!a.update_frame().unwrap());
    assert_eq!(second.write_count(), 1);
    assert_eq!(first.write_count(), 1);
    assert_eq!(first.pixels(), second.pixels());
}

#[test]
fn created_texture_matches_video() {
    let mut a = adapter();
    assert!(a.create_output_texture().unwrap().is_none());

    a.set_source(SMALL).unwrap();
    let texture = a.create_output_texture().unwrap().unwrap();
    assert_eq!((texture.width(), texture.height()), (16, 8));
    assert!(a.update_frame().unwrap());
}

#[test]
fn mismatched_sink_is_rejected() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    let (texture, output) = sink(4, 4);
    a.set_output_texture(Some(output));

    let err = a.update_frame().unwrap_err();
    assert!(matches!(err, PlayerError::TextureSizeMismatch { texture: (4, 4), frame: (16, 8) }));
    assert_eq!(texture.write_count(), 0);
    assert!(texture.pixels().iter().all(|b| *b == 0));

    // Reported once for this frame.
    assert!(!a.update_frame().unwrap());
}

#[test]
fn settings_carry_over_to_new_session() {
    let mut a = adapter();
    a.set_rate(2.0).unwrap();
    a.set_volume(0.25).unwrap();
    a.set_loop_play(true);
    assert_eq!(a.rate(), 2.0);
    assert_eq!(a.volume(), 0.25);
    assert!(a.is_loop_play());

    a.set_source(SMALL).unwrap();
    // Read back from the session.
    assert_eq!(a.volume(), 0.25);
    assert!(!a.is_playing());
}

#[test]
fn stored_rate_drives_new_session() {
    let mut a = adapter();
    a.set_rate(2.0).unwrap();
    a.set_source("testsrc=size=16x8:rate=10:duration=60").unwrap();

    let start = Instant::now();
    a.play().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    let elapsed = start.elapsed().as_secs_f64();
    let position = a.current_seconds() as f64;

    // Twice real time, with slack for a slow scheduler on the upper end only.
    assert!(position >= elapsed * 2.0 * 0.9 - 0.01, "position {position} after {elapsed}");
    assert!(position > elapsed * 1.5);
}

#[test]
fn stored_loop_flag_wraps_new_session() {
    let mut a = adapter();
    a.set_loop_play(true);
    a.set_source(SMALL).unwrap();
    a.seek(1.9).unwrap();
    a.play().unwrap();
    std::thread::sleep(Duration::from_millis(300));

    assert!(a.is_playing());
    assert!(a.current_seconds() < 1.5, "position {} did not wrap", a.current_seconds());
}

#[test]
fn loop_flag_applies_to_current_session() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    a.seek(1.9).unwrap();
    a.play().unwrap();
    a.set_loop_play(true);
    std::thread::sleep(Duration::from_millis(300));
    assert!(a.is_playing());
    assert!(a.current_seconds() < 1.5);

    // Without looping the session stops at the end.
    a.set_loop_play(false);
    a.seek(1.95).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(!a.is_playing());
    assert_eq!(a.current_seconds(), 2.0);
}

#[test]
fn muted_option_reaches_session() {
    let mut a = adapter();
    let mut options = PlayerOptions::default();
    options.custom_options.insert("muted".into(), "true".into());
    a.set_source_with_options(SMALL, options).unwrap();
    assert_eq!(a.volume(), 0.0);

    a.shutdown();
    assert_eq!(a.volume(), 1.0);
}

#[test]
fn missing_file_leaves_no_session() {
    let mut a = adapter();
    a.set_source(SMALL).unwrap();
    let err = a.set_source("/no/such/dir/clip.mov").unwrap_err();
    assert!(matches!(err, PlayerError::SourceNotFound(_)));
    assert!(!a.has_session());
    assert_eq!(a.duration(), 0.0);
}

#[test]
fn invalid_pattern_is_reported() {
    let mut a = adapter();
    let err = a.set_source("testsrc=size=big").unwrap_err();
    assert!(matches!(err, PlayerError::InvalidPatternSpec(_)));
}
