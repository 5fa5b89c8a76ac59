//! Deterministic headless host.
//!
//! [`ScriptedMedia`] plays a synthetic video on a [`PlaybackClock`] driven
//! entirely by the timestamps passed to `advance_to`, and
//! [`MemoryRecorder`] encodes pushed frames into an in-memory byte stream.
//! Together they run the full export pipeline without ffmpeg or wall time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use capburn_common::clock::{PlaybackClock, SessionClock};
use capburn_common::error::{CapburnError, CapburnResult};

use crate::element::{
    AudioOrigin, AudioSourceInfo, MediaElement, MediaElementId, MediaEvent, VideoFrame,
};
use crate::stream::{
    RecordableStream, RecorderEvent, RecorderFactory, RecorderOptions, RecorderState,
    StreamRecorder,
};

/// Script for a synthetic video.
#[derive(Debug, Clone)]
pub struct ScriptedMediaConfig {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    /// Source frame rate; frames change colour once per source frame.
    pub frame_rate: u32,
    pub has_audio: bool,
    /// Monotonic delay before metadata becomes available.
    pub metadata_delay_ms: u64,
    pub time_update_interval_ms: u64,
    /// Playback freezes at this position and never ends.
    pub stall_at_secs: Option<f64>,
    /// `play()` is refused, as under an autoplay policy.
    pub block_play: bool,
}

impl Default for ScriptedMediaConfig {
    fn default() -> Self {
        Self {
            label: "scripted".to_string(),
            width: 64,
            height: 36,
            duration_secs: 3.0,
            frame_rate: 30,
            has_audio: true,
            metadata_delay_ms: 0,
            time_update_interval_ms: 250,
            stall_at_secs: None,
            block_play: false,
        }
    }
}

/// A synthetic media element.
pub struct ScriptedMedia {
    id: MediaElementId,
    config: ScriptedMediaConfig,
    clock: PlaybackClock,
    now_ns: u64,
    metadata_loaded: bool,
    ended: bool,
    muted: bool,
    events: Vec<MediaEvent>,
    last_time_update_ns: u64,
    frame: Option<(u64, VideoFrame)>,
}

impl ScriptedMedia {
    pub fn new(config: ScriptedMediaConfig) -> Self {
        Self {
            id: MediaElementId::next(),
            config,
            clock: PlaybackClock::new(),
            now_ns: 0,
            metadata_loaded: false,
            ended: false,
            muted: false,
            events: Vec::new(),
            last_time_update_ns: 0,
            frame: None,
        }
    }

    pub fn config(&self) -> &ScriptedMediaConfig {
        &self.config
    }

    /// Colour of source frame `index`, so tests can tell frames apart.
    pub fn frame_color(index: u64) -> [u8; 4] {
        [
            (index.wrapping_mul(7) % 256) as u8,
            (index.wrapping_mul(13) % 256) as u8,
            (index.wrapping_mul(29) % 256) as u8,
            255,
        ]
    }

    fn position(&self) -> f64 {
        self.clock.position(self.now_ns)
    }

    fn refresh_frame(&mut self) {
        if !self.metadata_loaded {
            return;
        }
        let fps = self.config.frame_rate.max(1) as f64;
        let last_index = ((self.config.duration_secs * fps).ceil() as u64).saturating_sub(1);
        let index = ((self.position() * fps).floor() as u64).min(last_index);
        if self.frame.as_ref().map(|(i, _)| *i) != Some(index) {
            let frame = VideoFrame::solid(
                self.config.width,
                self.config.height,
                Self::frame_color(index),
            );
            self.frame = Some((index, frame));
        }
    }

    fn time_update_due(&self) -> bool {
        let interval = self.config.time_update_interval_ms.saturating_mul(1_000_000);
        self.now_ns.saturating_sub(self.last_time_update_ns) >= interval
    }

    fn emit_time_update(&mut self) {
        self.last_time_update_ns = self.now_ns;
        let time_secs = self.position();
        self.events.push(MediaEvent::TimeUpdate { time_secs });
    }
}

impl MediaElement for ScriptedMedia {
    fn element_id(&self) -> MediaElementId {
        self.id
    }

    fn source_label(&self) -> String {
        self.config.label.clone()
    }

    fn duration(&self) -> Option<f64> {
        self.metadata_loaded.then_some(self.config.duration_secs)
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        self.metadata_loaded
            .then_some((self.config.width, self.config.height))
    }

    fn current_time(&self) -> f64 {
        self.position()
    }

    fn seek(&mut self, time_secs: f64) -> CapburnResult<()> {
        if !time_secs.is_finite() {
            return Err(CapburnError::media(format!("invalid seek target {time_secs}")));
        }
        let target = time_secs.clamp(0.0, self.config.duration_secs);
        self.clock.seek(target, self.now_ns);
        if target < self.config.duration_secs {
            self.ended = false;
        }
        self.refresh_frame();
        self.emit_time_update();
        Ok(())
    }

    fn is_paused(&self) -> bool {
        !self.clock.is_running()
    }

    fn is_ended(&self) -> bool {
        self.ended
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.clock.set_rate(rate, self.now_ns);
    }

    fn playback_rate(&self) -> f64 {
        self.clock.rate()
    }

    fn play(&mut self) -> CapburnResult<()> {
        if self.config.block_play {
            return Err(CapburnError::media("playback was not allowed by the host"));
        }
        if self.clock.is_running() {
            return Ok(());
        }
        if self.ended {
            self.clock.seek(0.0, self.now_ns);
            self.ended = false;
        }
        self.clock.play(self.now_ns);
        self.last_time_update_ns = self.now_ns;
        self.events.push(MediaEvent::Play);
        Ok(())
    }

    fn pause(&mut self) {
        if self.clock.is_running() {
            self.clock.pause(self.now_ns);
            self.events.push(MediaEvent::Pause);
        }
    }

    fn advance_to(&mut self, now_ns: u64) {
        self.now_ns = self.now_ns.max(now_ns);

        if !self.metadata_loaded && self.now_ns >= self.config.metadata_delay_ms * 1_000_000 {
            self.metadata_loaded = true;
            self.events.push(MediaEvent::LoadedMetadata {
                width: self.config.width,
                height: self.config.height,
                duration_secs: Some(self.config.duration_secs),
            });
        }

        if self.clock.is_running() {
            if let Some(stall) = self.config.stall_at_secs {
                if self.position() >= stall {
                    self.clock.seek(stall, self.now_ns);
                }
            }

            if self.position() >= self.config.duration_secs {
                self.clock.seek(self.config.duration_secs, self.now_ns);
                self.clock.pause(self.now_ns);
                self.ended = true;
                self.emit_time_update();
                self.events.push(MediaEvent::Pause);
                self.events.push(MediaEvent::Ended);
                tracing::debug!(
                    element = %self.id,
                    at_secs = SessionClock::ns_to_secs(self.now_ns),
                    "Scripted media ended"
                );
            } else if self.time_update_due() {
                self.emit_time_update();
            }
        }

        self.refresh_frame();
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.frame.as_ref().map(|(_, frame)| frame.clone())
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }

    fn audio_source(&self) -> Option<AudioSourceInfo> {
        self.config.has_audio.then(|| AudioSourceInfo {
            origin: AudioOrigin::Synthetic {
                label: self.config.label.clone(),
            },
            sample_rate: 48_000,
            channels: 2,
        })
    }
}

/// What memory recorders created by one factory have seen.
#[derive(Debug, Default, Clone)]
pub struct RecorderLog {
    pub recorders_created: usize,
    pub frames_received: u64,
    pub with_audio: usize,
    pub stops_requested: usize,
}

/// Factory for [`MemoryRecorder`]s.
#[derive(Debug, Clone)]
pub struct MemoryRecorderFactory {
    log: Arc<Mutex<RecorderLog>>,
    chunk_every_frames: Option<u64>,
    available: bool,
    fail_on_start: bool,
    hang_on_stop: bool,
    drop_every_frames: Option<u64>,
}

impl Default for MemoryRecorderFactory {
    fn default() -> Self {
        Self {
            log: Arc::new(Mutex::new(RecorderLog::default())),
            chunk_every_frames: Some(15),
            available: true,
            fail_on_start: false,
            hang_on_stop: false,
            drop_every_frames: None,
        }
    }
}

impl MemoryRecorderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a chunk every `n` frames instead of only at stop.
    pub fn with_chunk_every(mut self, frames: Option<u64>) -> Self {
        self.chunk_every_frames = frames.filter(|n| *n > 0);
        self
    }

    /// A host without any recording support.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Recorders are created but refuse to start.
    pub fn failing_on_start() -> Self {
        Self {
            fail_on_start: true,
            ..Self::default()
        }
    }

    /// Recorders accept a stop request but never report `Stopped`.
    pub fn hanging_on_stop() -> Self {
        Self {
            hang_on_stop: true,
            ..Self::default()
        }
    }

    /// Lose every `n`th pushed frame, as an encoder that cannot keep up.
    pub fn dropping_every(mut self, frames: Option<u64>) -> Self {
        self.drop_every_frames = frames.filter(|n| *n > 0);
        self
    }

    pub fn log(&self) -> RecorderLog {
        lock(&self.log).clone()
    }
}

impl RecorderFactory for MemoryRecorderFactory {
    fn create(
        &self,
        stream: RecordableStream,
        options: &RecorderOptions,
    ) -> CapburnResult<Box<dyn StreamRecorder>> {
        if !self.available {
            return Err(CapburnError::unsupported(
                "this host cannot record media streams",
            ));
        }
        {
            let mut log = lock(&self.log);
            log.recorders_created += 1;
            if stream.audio.is_some() {
                log.with_audio += 1;
            }
        }
        Ok(Box::new(MemoryRecorder {
            stream,
            mime_type: options.mime_type.clone(),
            state: RecorderState::Inactive,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            frames: 0,
            pushed: 0,
            dropped: 0,
            chunk_every_frames: self.chunk_every_frames,
            fail_on_start: self.fail_on_start,
            hang_on_stop: self.hang_on_stop,
            drop_every_frames: self.drop_every_frames,
            log: Arc::clone(&self.log),
        }))
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Header written at the start of every memory recording.
pub const MEMORY_RECORDING_MAGIC: &[u8; 8] = b"CAPBURN\0";

/// Bytes appended per recorded frame: frame number (u64 LE) and a pixel
/// checksum (u32 LE).
pub const MEMORY_FRAME_RECORD_LEN: usize = 12;

/// In-memory recorder. Stop is asynchronous: the final chunk is delivered
/// on the next poll and `Stopped` on the poll after that.
pub struct MemoryRecorder {
    stream: RecordableStream,
    mime_type: String,
    state: RecorderState,
    buffer: Vec<u8>,
    pending: VecDeque<RecorderEvent>,
    frames: u64,
    pushed: u64,
    dropped: u64,
    chunk_every_frames: Option<u64>,
    fail_on_start: bool,
    hang_on_stop: bool,
    drop_every_frames: Option<u64>,
    log: Arc<Mutex<RecorderLog>>,
}

impl MemoryRecorder {
    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let chunk = std::mem::take(&mut self.buffer);
            self.pending.push_back(RecorderEvent::DataAvailable(chunk));
        }
    }
}

impl StreamRecorder for MemoryRecorder {
    fn start(&mut self) -> CapburnResult<()> {
        if self.fail_on_start {
            return Err(CapburnError::recorder("memory recorder refused to start"));
        }
        if self.state != RecorderState::Inactive {
            return Err(CapburnError::invalid_state("recorder already started"));
        }
        self.buffer.extend_from_slice(MEMORY_RECORDING_MAGIC);
        self.state = RecorderState::Recording;
        tracing::debug!(
            video_track = self.stream.video.id(),
            audio = self.stream.audio.is_some(),
            "Memory recorder started"
        );
        Ok(())
    }

    fn push_video_frame(&mut self, frame: &VideoFrame) -> CapburnResult<()> {
        if self.state != RecorderState::Recording {
            return Err(CapburnError::invalid_state("recorder is not recording"));
        }
        if !self.stream.video.is_live() {
            return Err(CapburnError::recorder("video track has been stopped"));
        }
        self.pushed += 1;
        if self
            .drop_every_frames
            .is_some_and(|every| self.pushed % every == 0)
        {
            self.dropped += 1;
            return Ok(());
        }
        let checksum = frame
            .pixels
            .iter()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
        self.buffer.extend_from_slice(&self.frames.to_le_bytes());
        self.buffer.extend_from_slice(&checksum.to_le_bytes());
        self.frames += 1;
        lock(&self.log).frames_received += 1;

        if let Some(every) = self.chunk_every_frames {
            if self.frames % every == 0 {
                self.flush();
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> CapburnResult<()> {
        if self.state != RecorderState::Recording {
            return Ok(());
        }
        self.flush();
        self.state = RecorderState::Stopping;
        lock(&self.log).stops_requested += 1;
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn poll_events(&mut self) -> Vec<RecorderEvent> {
        let events: Vec<RecorderEvent> = self.pending.drain(..).collect();
        if self.state == RecorderState::Stopping && events.is_empty() && !self.hang_on_stop {
            self.state = RecorderState::Stopped;
            return vec![RecorderEvent::Stopped];
        }
        events
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

fn lock(log: &Mutex<RecorderLog>) -> MutexGuard<'_, RecorderLog> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::VideoTrack;

    const MS: u64 = 1_000_000;

    fn media(config: ScriptedMediaConfig) -> ScriptedMedia {
        let mut media = ScriptedMedia::new(config);
        media.advance_to(0);
        media
    }

    #[test]
    fn test_metadata_is_delayed() {
        let mut media = ScriptedMedia::new(ScriptedMediaConfig {
            metadata_delay_ms: 100,
            ..Default::default()
        });
        media.advance_to(50 * MS);
        assert!(media.video_size().is_none());
        assert!(media.current_frame().is_none());

        media.advance_to(100 * MS);
        assert_eq!(media.video_size(), Some((64, 36)));
        assert!(matches!(
            media.poll_events().as_slice(),
            [MediaEvent::LoadedMetadata { width: 64, .. }]
        ));
        assert!(media.current_frame().is_some());
    }

    #[test]
    fn test_plays_to_end_and_emits_ended() {
        let mut media = media(ScriptedMediaConfig {
            duration_secs: 1.0,
            ..Default::default()
        });
        media.poll_events();
        media.play().unwrap();
        media.advance_to(500 * MS);
        assert!((media.current_time() - 0.5).abs() < 1e-9);
        media.advance_to(1_200 * MS);

        assert!(media.is_ended());
        assert!(media.is_paused());
        assert_eq!(media.current_time(), 1.0);
        let events = media.poll_events();
        assert_eq!(events.first(), Some(&MediaEvent::Play));
        assert_eq!(events.last(), Some(&MediaEvent::Ended));
    }

    #[test]
    fn test_time_updates_follow_interval() {
        let mut media = media(ScriptedMediaConfig::default());
        media.poll_events();
        media.play().unwrap();
        for ms in (0..=1000).step_by(10) {
            media.advance_to(ms * MS);
        }
        let updates = media
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, MediaEvent::TimeUpdate { .. }))
            .count();
        assert_eq!(updates, 4);
    }

    #[test]
    fn test_stall_never_ends() {
        let mut media = media(ScriptedMediaConfig {
            duration_secs: 2.0,
            stall_at_secs: Some(1.0),
            ..Default::default()
        });
        media.play().unwrap();
        media.advance_to(10_000 * MS);
        assert!(!media.is_ended());
        assert!((media.current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_blocked_play_is_an_error() {
        let mut media = media(ScriptedMediaConfig {
            block_play: true,
            ..Default::default()
        });
        assert!(media.play().is_err());
        assert!(media.is_paused());
    }

    #[test]
    fn test_frames_change_with_position() {
        let mut media = media(ScriptedMediaConfig::default());
        let first = media.current_frame().unwrap();
        media.seek(1.0).unwrap();
        let later = media.current_frame().unwrap();
        assert_eq!(first.pixel(0, 0), Some(ScriptedMedia::frame_color(0)));
        assert_eq!(later.pixel(0, 0), Some(ScriptedMedia::frame_color(30)));
    }

    #[test]
    fn test_memory_recorder_stop_is_asynchronous_and_ordered() {
        let factory = MemoryRecorderFactory::new().with_chunk_every(Some(2));
        let stream = RecordableStream {
            video: VideoTrack::new("canvas", 2, 2, 30),
            audio: None,
        };
        let options = RecorderOptions {
            mime_type: "video/webm".to_string(),
            video_bitrate_bps: 1,
        };
        let mut recorder = factory.create(stream, &options).unwrap();
        recorder.start().unwrap();
        let frame = VideoFrame::solid(2, 2, [0, 0, 0, 255]);
        for _ in 0..3 {
            recorder.push_video_frame(&frame).unwrap();
        }
        recorder.stop().unwrap();
        assert_eq!(recorder.state(), RecorderState::Stopping);

        let first = recorder.poll_events();
        assert_eq!(first.len(), 2);
        assert!(first
            .iter()
            .all(|e| matches!(e, RecorderEvent::DataAvailable(_))));
        assert_eq!(recorder.poll_events(), vec![RecorderEvent::Stopped]);
        assert_eq!(recorder.state(), RecorderState::Stopped);

        let bytes: usize = first
            .iter()
            .map(|e| match e {
                RecorderEvent::DataAvailable(chunk) => chunk.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(bytes, MEMORY_RECORDING_MAGIC.len() + 3 * MEMORY_FRAME_RECORD_LEN);
        assert_eq!(factory.log().frames_received, 3);
    }

    #[test]
    fn test_dropping_recorder_counts_lost_frames() {
        let factory = MemoryRecorderFactory::new()
            .with_chunk_every(None)
            .dropping_every(Some(3));
        let stream = RecordableStream {
            video: VideoTrack::new("canvas", 2, 2, 30),
            audio: None,
        };
        let options = RecorderOptions {
            mime_type: "video/webm".to_string(),
            video_bitrate_bps: 1,
        };
        let mut recorder = factory.create(stream, &options).unwrap();
        recorder.start().unwrap();
        let frame = VideoFrame::solid(2, 2, [0, 0, 0, 255]);
        for _ in 0..9 {
            recorder.push_video_frame(&frame).unwrap();
        }
        assert_eq!(recorder.dropped_frames(), 3);
        assert_eq!(factory.log().frames_received, 6);
    }

    #[test]
    fn test_hanging_recorder_never_stops() {
        let factory = MemoryRecorderFactory::hanging_on_stop();
        let stream = RecordableStream {
            video: VideoTrack::new("canvas", 2, 2, 30),
            audio: None,
        };
        let options = RecorderOptions {
            mime_type: "video/webm".to_string(),
            video_bitrate_bps: 1,
        };
        let mut recorder = factory.create(stream, &options).unwrap();
        recorder.start().unwrap();
        recorder.stop().unwrap();
        for _ in 0..5 {
            assert!(!recorder.poll_events().contains(&RecorderEvent::Stopped));
        }
        assert_eq!(recorder.state(), RecorderState::Stopping);
    }

    #[test]
    fn test_unavailable_factory_refuses() {
        let factory = MemoryRecorderFactory::unavailable();
        let stream = RecordableStream {
            video: VideoTrack::new("canvas", 2, 2, 30),
            audio: None,
        };
        let options = RecorderOptions {
            mime_type: "video/webm".to_string(),
            video_bitrate_bps: 1,
        };
        let err = factory.create(stream, &options).err().unwrap();
        assert!(!err.is_recoverable());
    }
}
