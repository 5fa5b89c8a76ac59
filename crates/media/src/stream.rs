//! Capturable tracks and stream recorders.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use capburn_common::error::CapburnResult;

use crate::element::{AudioOrigin, VideoFrame};

fn next_track_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Liveness shared by every clone of a track.
#[derive(Debug, Clone)]
struct TrackState {
    id: u64,
    live: Arc<AtomicBool>,
}

impl TrackState {
    fn new() -> Self {
        Self {
            id: next_track_id(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// A live video track fed by frames pushed into a recorder.
///
/// Clones refer to the same track: stopping one stops all.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    state: TrackState,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoTrack {
    pub fn new(label: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            state: TrackState::new(),
            label: label.into(),
            width,
            height,
            fps,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        if self.state.live.swap(false, Ordering::SeqCst) {
            tracing::debug!(track = self.state.id, label = %self.label, "Video track stopped");
        }
    }
}

/// A live audio track produced by an audio routing destination.
///
/// Clones refer to the same track.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    state: TrackState,
    pub origin: AudioOrigin,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioTrack {
    pub fn new(origin: AudioOrigin, sample_rate: u32, channels: u16) -> Self {
        Self {
            state: TrackState::new(),
            origin,
            sample_rate,
            channels,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        if self.state.live.swap(false, Ordering::SeqCst) {
            tracing::debug!(track = self.state.id, "Audio track stopped");
        }
    }
}

/// One video track plus at most one audio track, ready to record.
#[derive(Debug, Clone)]
pub struct RecordableStream {
    pub video: VideoTrack,
    pub audio: Option<AudioTrack>,
}

/// Recorder encoding parameters.
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub mime_type: String,
    pub video_bitrate_bps: u64,
}

/// Lifecycle of a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
    Stopping,
    Stopped,
}

/// Events raised by a recorder, delivered in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// A chunk of encoded output. Chunks concatenate into the artifact.
    DataAvailable(Vec<u8>),
    /// The recorder finished; no more chunks follow.
    Stopped,
    /// The recorder failed; it may still raise `Stopped`.
    Error(String),
}

/// Encodes a [`RecordableStream`] into chunks of a container format.
///
/// `stop` only requests a stop. Remaining chunks and the final
/// [`RecorderEvent::Stopped`] arrive later through `poll_events`.
pub trait StreamRecorder: Send {
    fn start(&mut self) -> CapburnResult<()>;

    /// Append one frame to the video track.
    fn push_video_frame(&mut self, frame: &VideoFrame) -> CapburnResult<()>;

    fn stop(&mut self) -> CapburnResult<()>;

    fn state(&self) -> RecorderState;

    fn poll_events(&mut self) -> Vec<RecorderEvent>;

    fn mime_type(&self) -> &str;

    /// Frames accepted by `push_video_frame` that never reached the output.
    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// Creates recorders. A host without recording support reports itself
/// unavailable and refuses to create recorders.
pub trait RecorderFactory: Send {
    fn create(
        &self,
        stream: RecordableStream,
        options: &RecorderOptions,
    ) -> CapburnResult<Box<dyn StreamRecorder>>;

    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}
