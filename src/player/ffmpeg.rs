// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use super::*;
use crate::clock::PlaybackClock;
use crate::frame::FrameSlot;

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread::JoinHandle;
use std::time::Duration;
use parking_lot::Mutex;

use ffmpeg_next::{ codec, format, frame, media, Dictionary, rescale, rescale::Rescale };
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

const IDLE_WAIT: Duration = Duration::from_millis(4);
const MAX_READ_ERRORS: usize = 32;
// Keys consumed here, not forwarded to libavformat.
const OWN_OPTIONS: &[&str] = &["threads", "decode_threads", "pool_capacity", "buffers", "muted", "mute"];

/// State shared between the render thread and the decode thread.
struct Shared {
    clock: Mutex<PlaybackClock>,
    slot: FrameSlot,
    seek_request: Mutex<Option<f64>>,
    size: Mutex<Option<(u32, u32)>>,
    failure: Mutex<Option<String>>,
    stop: AtomicBool,
}

pub struct FfmpegPlayer {
    shared: Arc<Shared>,
    info: VideoInfo,
    volume: f32,
    thread: Option<JoinHandle<()>>,
}

impl FfmpegPlayer {
    /// Opens `source` on a dedicated decode thread and waits until its metadata is known.
    pub fn new(source: &MediaSource, options: PlayerOptions) -> Result<Self, PlayerError> {
        ffmpeg_next::init()?;

        let location = source.location().into_owned();
        let volume = if options.muted() { 0.0 } else { 1.0 };
        let shared = Arc::new(Shared {
            clock: Mutex::new(PlaybackClock::new()),
            slot: FrameSlot::default(),
            seek_request: Mutex::new(None),
            size: Mutex::new(None),
            failure: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        let (tx, rx) = crossbeam_channel::bounded::<Result<VideoInfo, PlayerError>>(1);
        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("ffmpeg-player".into())
            .spawn(move || {
                let mut worker = match DecodeWorker::open(&location, &options, thread_shared.clone()) {
                    Ok(worker) => {
                        let _ = tx.send(Ok(worker.info.clone()));
                        worker
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = worker.run() {
                    log::error!("Decoding {location} failed: {e:?}");
                    *thread_shared.failure.lock() = Some(e.to_string());
                }
            })
            .map_err(|e| {
                log::error!("Unable to spawn decode thread: {e:?}");
                PlayerError::DecoderThreadDied
            })?;

        let info = rx.recv().map_err(|_| PlayerError::DecoderThreadDied)??;
        log::info!("Opened {} ({}x{}, {:.2} fps, {:.3} s)", source.location(), info.width, info.height, info.fps, info.duration_ms / 1000.0);

        Ok(Self {
            shared,
            info,
            volume,
            thread: Some(thread),
        })
    }
}

impl Drop for FfmpegPlayer {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Decode thread panicked");
            }
        }
        log::debug!("Decoded {} frames, {} replaced before display", self.shared.slot.published(), self.shared.slot.skipped());
    }
}

impl PlayerInterface for FfmpegPlayer {
    fn play(&mut self) -> Result<(), PlayerError> {
        self.shared.clock.lock().play();
        Ok(())
    }
    fn pause(&mut self) -> Result<(), PlayerError> {
        self.shared.clock.lock().pause();
        Ok(())
    }
    fn seek(&mut self, seconds: f64) -> Result<(), PlayerError> {
        let target = self.shared.clock.lock().seek(seconds);
        *self.shared.seek_request.lock() = Some(target);
        log::debug!("Seek requested to {target:.3}");
        Ok(())
    }
    fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        self.shared.clock.lock().set_rate(rate as f64);
        Ok(())
    }
    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        // Video-only backend; the level is kept so it can be read back.
        self.volume = volume;
        Ok(())
    }
    fn set_looping(&mut self, looping: bool) {
        self.shared.clock.lock().set_looping(looping);
    }

    fn current_seconds(&self) -> f64 { self.shared.clock.lock().position() }
    fn volume(&self) -> f32 { self.volume }
    fn duration(&self) -> Option<f64> { self.shared.clock.lock().duration() }
    fn is_playing(&self) -> bool { self.shared.clock.lock().is_playing() }

    fn video_size(&self) -> Option<(u32, u32)> {
        let size = *self.shared.size.lock();
        size.or_else(|| (self.info.width > 0 && self.info.height > 0).then_some((self.info.width, self.info.height)))
    }

    fn video_info(&self) -> Option<VideoInfo> {
        let mut info = self.info.clone();
        if let Some((w, h)) = self.video_size() {
            info.width = w;
            info.height = h;
        }
        Some(info)
    }

    fn acquire_frame(&mut self) -> Result<Option<VideoFrame>, PlayerError> {
        if let Some(message) = self.shared.failure.lock().take() {
            return Err(PlayerError::PlayerItemFailed(message));
        }
        Ok(self.shared.slot.take())
    }
}

enum Pace {
    Show,
    Interrupted,
    Restart,
}

/// Owns every libav object; lives entirely on the decode thread.
struct DecodeWorker {
    input: format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    stream_index: usize,
    time_base: f64,
    frame_duration: f64,
    scaler: Option<(scaling::Context, Pixel, u32, u32)>,
    pool: CpuBufferPool,
    shared: Arc<Shared>,
    info: VideoInfo,

    eof_sent: bool,
    preview_pending: bool,
    skip_until: Option<f64>,
    last_pts: f64,
}

impl DecodeWorker {
    fn open(location: &str, options: &PlayerOptions, shared: Arc<Shared>) -> Result<Self, PlayerError> {
        let mut options_avdict = Dictionary::new();
        for (k, v) in &options.custom_options {
            if !OWN_OPTIONS.contains(&k.as_str()) {
                options_avdict.set(k, v);
            }
        }
        let input = format::input_with_dictionary(&location, options_avdict).map_err(|e| {
            log::error!("Unable to open {location}: {e:?}");
            PlayerError::UnsupportedSource(format!("{location}: {e}"))
        })?;

        let (stream_index, time_base, decoder, info) = {
            let stream = input.streams().best(media::Type::Video).ok_or(PlayerError::VideoStreamNotFound)?;
            let time_base = f64::from(stream.time_base());

            let mut ctx = codec::context::Context::from_parameters(stream.parameters())?;
            ctx.set_threading(ffmpeg_next::threading::Config { kind: ffmpeg_next::threading::Type::Frame, count: options.decode_threads() });
            let decoder = ctx.decoder().video()?;

            let mut bitrate = decoder.bit_rate();
            if bitrate == 0 { bitrate = input.bit_rate() as usize; }

            let mut duration = stream.duration() as f64 * time_base;
            if duration <= 0.0 && input.duration() > 0 {
                duration = input.duration().rescale(rescale::TIME_BASE, (1, 1000)) as f64 / 1000.0;
            }
            let fps = f64::from(stream.rate());

            let mut frames = stream.frames() as usize;
            if frames == 0 { frames = (duration * fps).max(0.0) as usize; }

            let info = VideoInfo {
                duration_ms: duration.max(0.0) * 1000.0,
                frame_count: frames,
                fps,
                width: decoder.width(),
                height: decoder.height(),
                bitrate: bitrate as f64 / 1024.0 / 1024.0,
            };
            (stream.index(), time_base, decoder, info)
        };

        shared.clock.lock().set_duration((info.duration_ms > 0.0).then_some(info.duration_ms / 1000.0));
        log::debug!("Selected video stream {stream_index}, time base {time_base}, {:?} threads", options.decode_threads());

        Ok(Self {
            input,
            decoder,
            stream_index,
            time_base,
            frame_duration: if info.fps > 0.0 { 1.0 / info.fps } else { 1.0 / 30.0 },
            scaler: None,
            pool: CpuBufferPool::with_capacity(options.pool_capacity()),
            shared,
            info,
            eof_sent: false,
            preview_pending: true,
            skip_until: None,
            last_pts: 0.0,
        })
    }

    fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    fn run(&mut self) -> Result<(), PlayerError> {
        while !self.stopped() {
            let seek = self.shared.seek_request.lock().take();
            if let Some(target) = seek {
                self.restart_at(target, true);
            }

            match self.decode_next()? {
                Some(decoded) => {
                    let pts = decoded.timestamp()
                        .or(decoded.pts())
                        .map(|t| t as f64 * self.time_base)
                        .unwrap_or(self.last_pts + self.frame_duration);

                    if let Some(target) = self.skip_until {
                        if pts + self.frame_duration * 0.5 < target {
                            continue;
                        }
                        self.skip_until = None;
                    }

                    match self.wait_for(pts) {
                        Pace::Show => self.publish(&decoded, pts)?,
                        Pace::Interrupted => continue,
                        Pace::Restart => self.restart_at(0.0, false),
                    }
                }
                None => self.wait_at_end(),
            }
        }
        log::debug!("Decode thread finished");
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Option<frame::Video>, PlayerError> {
        let mut decoded = frame::Video::empty();
        let mut read_errors = 0;
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }
            if self.eof_sent {
                return Ok(None);
            }
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        if let Err(e) = self.decoder.send_packet(&packet) {
                            log::error!("Decode error: {:?}", e);
                        }
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(e) => {
                    read_errors += 1;
                    log::warn!("Skipping unreadable packet: {e:?}");
                    if read_errors >= MAX_READ_ERRORS {
                        return Err(e.into());
                    }
                }
            }
        }
    }

    /// Blocks until the clock reaches `pts`, or something more urgent happens.
    fn wait_for(&mut self, pts: f64) -> Pace {
        if std::mem::take(&mut self.preview_pending) {
            return Pace::Show;
        }
        loop {
            if self.stopped() || self.shared.seek_request.lock().is_some() {
                return Pace::Interrupted;
            }
            let (position, looping) = {
                let clock = self.shared.clock.lock();
                (clock.position(), clock.is_looping())
            };
            if looping && position + 0.5 < self.last_pts && pts > position + 0.5 {
                return Pace::Restart;
            }
            if position + 1e-3 >= pts {
                return Pace::Show;
            }
            std::thread::sleep(IDLE_WAIT.min(Duration::from_secs_f64((pts - position).max(0.0))));
        }
    }

    fn wait_at_end(&mut self) {
        let restart = {
            let mut clock = self.shared.clock.lock();
            clock.mark_end_of_stream(self.last_pts + self.frame_duration);
            clock.is_looping() && clock.position() + 1e-3 < self.last_pts
        };
        if restart {
            self.restart_at(0.0, false);
        } else {
            std::thread::sleep(IDLE_WAIT);
        }
    }

    fn restart_at(&mut self, target: f64, show_immediately: bool) {
        let position = ((target * 1_000_000.0) as i64).rescale((1, 1000000), rescale::TIME_BASE);
        if let Err(e) = self.input.seek(position, ..position) {
            log::error!("Failed to seek {:?}", e);
        }
        self.decoder.flush();
        self.eof_sent = false;
        self.skip_until = (target > 0.0).then_some(target);
        self.last_pts = target;
        if show_immediately {
            self.preview_pending = true;
            self.shared.slot.clear();
        }
        log::debug!("Decoder restarted at {target:.3}");
    }

    fn publish(&mut self, decoded: &frame::Video, pts: f64) -> Result<(), PlayerError> {
        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
        let reuse = matches!(&self.scaler, Some((_, f, w, h)) if (*f, *w, *h) == (format, width, height));
        if !reuse {
            let ctx = scaling::Context::get(format, width, height, Pixel::BGRA, width, height, scaling::Flags::BILINEAR)?;
            self.scaler = Some((ctx, format, width, height));
            *self.shared.size.lock() = Some((width, height));
            log::info!("Decoding {width}x{height} {format:?} frames");
        }
        let Some((scaler, ..)) = self.scaler.as_mut() else { return Ok(()); };

        let mut bgra = frame::Video::empty();
        scaler.run(decoded, &mut bgra)?;

        let mut out = VideoFrame::allocate(&self.pool, width, height, PixelFormat::BGRA8, Some((pts * 1_000_000.0).round() as i64));
        out.copy_from_strided(bgra.data(0), bgra.stride(0));
        self.shared.slot.publish(out);
        self.last_pts = pts;
        Ok(())
    }
}
