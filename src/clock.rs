// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::time::Instant;

/// Transport clock for backends that decode themselves.
///
/// Position is `anchor_position + elapsed * rate`, re-anchored on every transport change.
/// With a known duration the position is clamped to `[0, duration]`, or wrapped when looping.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    anchor_position: f64,
    anchor_time: Option<Instant>,
    rate: f64,
    duration: Option<f64>,
    looping: bool,
}

impl Default for PlaybackClock {
    fn default() -> Self { Self::new() }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            anchor_position: 0.0,
            anchor_time: None,
            rate: 1.0,
            duration: None,
            looping: false,
        }
    }

    fn raw_position_at(&self, now: Instant) -> f64 {
        match self.anchor_time {
            Some(t) => self.anchor_position + now.saturating_duration_since(t).as_secs_f64() * self.rate,
            None => self.anchor_position,
        }
    }

    fn known_duration(&self) -> Option<f64> {
        self.duration.filter(|d| *d > 0.0)
    }

    fn reached_end_at(&self, now: Instant) -> bool {
        if self.looping { return false; }
        match self.known_duration() {
            Some(d) => {
                let raw = self.raw_position_at(now);
                (self.rate > 0.0 && raw >= d) || (self.rate < 0.0 && raw <= 0.0)
            }
            None => self.rate < 0.0 && self.raw_position_at(now) <= 0.0,
        }
    }

    fn rebase(&mut self, now: Instant) {
        self.anchor_position = self.position_at(now);
        if self.anchor_time.is_some() {
            self.anchor_time = Some(now);
        }
    }

    pub fn position_at(&self, now: Instant) -> f64 {
        let raw = self.raw_position_at(now);
        match self.known_duration() {
            Some(d) if self.looping => raw.rem_euclid(d),
            Some(d) => raw.clamp(0.0, d),
            None => raw.max(0.0),
        }
    }

    /// Running, not at the end and moving. A zero rate counts as stopped, like `AVPlayer`.
    pub fn is_playing_at(&self, now: Instant) -> bool {
        self.anchor_time.is_some() && self.rate != 0.0 && !self.reached_end_at(now)
    }

    /// Starts the clock. Playing from the end of a finished, non-looping session restarts it.
    pub fn play_at(&mut self, now: Instant) {
        if self.anchor_time.is_some() && !self.reached_end_at(now) {
            return;
        }
        if self.reached_end_at(now) {
            self.anchor_position = if self.rate < 0.0 { self.known_duration().unwrap_or(0.0) } else { 0.0 };
        } else {
            self.anchor_position = self.position_at(now);
        }
        self.anchor_time = Some(now);
    }

    pub fn pause_at(&mut self, now: Instant) {
        if self.anchor_time.is_some() {
            self.anchor_position = self.position_at(now);
            self.anchor_time = None;
        }
    }

    /// Moves to `seconds`, clamped to `[0, duration]`. Returns the clamped target.
    pub fn seek_at(&mut self, seconds: f64, now: Instant) -> f64 {
        let seconds = if seconds.is_finite() { seconds } else { 0.0 };
        let target = match self.known_duration() {
            Some(d) => seconds.clamp(0.0, d),
            None => seconds.max(0.0),
        };
        self.anchor_position = target;
        if self.anchor_time.is_some() {
            self.anchor_time = Some(now);
        }
        target
    }

    pub fn set_rate_at(&mut self, rate: f64, now: Instant) {
        self.rebase(now);
        self.rate = rate;
    }

    pub fn set_looping_at(&mut self, looping: bool, now: Instant) {
        self.rebase(now);
        self.looping = looping;
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration;
    }

    /// Takes `end` as the duration when the stream did not report one, so playback of a
    /// non-looping session can finish.
    pub fn mark_end_of_stream(&mut self, end: f64) {
        if self.known_duration().is_none() && end > 0.0 {
            self.duration = Some(end);
        }
    }

    pub fn duration(&self) -> Option<f64> { self.duration }
    pub fn rate(&self) -> f64 { self.rate }
    pub fn is_looping(&self) -> bool { self.looping }

    pub fn position(&self) -> f64 { self.position_at(Instant::now()) }
    pub fn is_playing(&self) -> bool { self.is_playing_at(Instant::now()) }
    pub fn play(&mut self) { self.play_at(Instant::now()) }
    pub fn pause(&mut self) { self.pause_at(Instant::now()) }
    pub fn seek(&mut self, seconds: f64) -> f64 { self.seek_at(seconds, Instant::now()) }
    pub fn set_rate(&mut self, rate: f64) { self.set_rate_at(rate, Instant::now()) }
    pub fn set_looping(&mut self, looping: bool) { self.set_looping_at(looping, Instant::now()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn clock(duration: f64) -> (PlaybackClock, Instant) {
        let mut clock = PlaybackClock::new();
        clock.set_duration(Some(duration));
        (clock, Instant::now())
    }

    #[test]
    fn paused_clock_does_not_advance() {
        let (clock, t0) = clock(10.0);
        assert_eq!(clock.position_at(t0 + Duration::from_secs(3)), 0.0);
        assert!(!clock.is_playing_at(t0));
    }

    #[test]
    fn play_and_pause_are_idempotent() {
        let (mut clock, t0) = clock(10.0);
        clock.play_at(t0);
        clock.play_at(t0 + Duration::from_secs(1));
        assert!(clock.is_playing_at(t0 + Duration::from_secs(2)));
        assert!((clock.position_at(t0 + Duration::from_secs(2)) - 2.0).abs() < 1e-9);

        clock.pause_at(t0 + Duration::from_secs(2));
        clock.pause_at(t0 + Duration::from_secs(3));
        assert!(!clock.is_playing_at(t0 + Duration::from_secs(4)));
        assert!((clock.position_at(t0 + Duration::from_secs(4)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rate_scales_elapsed_time() {
        let (mut clock, t0) = clock(10.0);
        clock.play_at(t0);
        clock.set_rate_at(2.0, t0 + Duration::from_secs(1));
        assert!((clock.position_at(t0 + Duration::from_secs(2)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn seek_is_clamped() {
        let (mut clock, t0) = clock(10.0);
        assert_eq!(clock.seek_at(-5.0, t0), 0.0);
        assert_eq!(clock.seek_at(42.0, t0), 10.0);
        assert_eq!(clock.seek_at(f64::NAN, t0), 0.0);

        let mut unknown = PlaybackClock::new();
        assert_eq!(unknown.seek_at(42.0, t0), 42.0);
        assert_eq!(unknown.seek_at(-1.0, t0), 0.0);
    }

    #[test]
    fn stops_at_end_without_loop() {
        let (mut clock, t0) = clock(2.0);
        clock.play_at(t0);
        let later = t0 + Duration::from_secs(5);
        assert_eq!(clock.position_at(later), 2.0);
        assert!(!clock.is_playing_at(later));

        // Playing again starts over.
        clock.play_at(later);
        assert!(clock.is_playing_at(later));
        assert_eq!(clock.position_at(later), 0.0);
    }

    #[test]
    fn zero_rate_is_not_playing() {
        let (mut clock, t0) = clock(10.0);
        clock.play_at(t0);
        clock.set_rate_at(0.0, t0 + Duration::from_secs(1));
        assert!(!clock.is_playing_at(t0 + Duration::from_secs(2)));
        assert!((clock.position_at(t0 + Duration::from_secs(3)) - 1.0).abs() < 1e-9);

        clock.set_rate_at(1.0, t0 + Duration::from_secs(3));
        assert!(clock.is_playing_at(t0 + Duration::from_secs(4)));
    }

    #[test]
    fn end_of_unknown_length_stream_stops_playback() {
        let mut clock = PlaybackClock::new();
        let t0 = Instant::now();
        clock.play_at(t0);
        let later = t0 + Duration::from_secs(4);
        assert!(clock.is_playing_at(later));

        clock.mark_end_of_stream(3.5);
        assert_eq!(clock.duration(), Some(3.5));
        assert!(!clock.is_playing_at(later));
        assert_eq!(clock.position_at(later), 3.5);

        // A reported duration is kept.
        clock.mark_end_of_stream(1.0);
        assert_eq!(clock.duration(), Some(3.5));
    }

    #[test]
    fn wraps_when_looping() {
        let (mut clock, t0) = clock(2.0);
        clock.set_looping_at(true, t0);
        clock.play_at(t0);
        let later = t0 + Duration::from_millis(5500);
        assert!((clock.position_at(later) - 1.5).abs() < 1e-9);
        assert!(clock.is_playing_at(later));
    }
}
