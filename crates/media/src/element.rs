//! Playable media elements.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use capburn_common::error::CapburnResult;
use serde::{Deserialize, Serialize};

/// Process-unique identity of a media element.
///
/// The audio routing graph binds to one element id; a different id means a
/// different element that needs its own graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaElementId(u64);

impl MediaElementId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MediaElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media-{}", self.0)
    }
}

/// A decoded RGBA8 video frame (straight alpha, row-major, no padding).
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, pixels)
    }

    /// Expected byte length for the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == Self::byte_len(self.width, self.height)
    }

    /// RGBA of the pixel at (x, y), if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Where an element's audio comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioOrigin {
    /// An audio stream inside a media file.
    File { path: PathBuf, stream_index: usize },
    /// Generated audio from a scripted host.
    Synthetic { label: String },
}

/// Description of an element's audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSourceInfo {
    pub origin: AudioOrigin,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Events raised by a media host.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Native video size (and duration, when known) became available.
    LoadedMetadata {
        width: u32,
        height: u32,
        duration_secs: Option<f64>,
    },
    /// Periodic playback position report while playing.
    TimeUpdate { time_secs: f64 },
    Play,
    Pause,
    /// Playback reached the natural end of the media.
    Ended,
    /// Playback failed; the element is paused.
    Error { message: String },
}

/// A playable video with a clock, decoded frames, and host events.
pub trait MediaElement: Send {
    fn element_id(&self) -> MediaElementId;

    /// Human-readable source description (path or script name).
    fn source_label(&self) -> String;

    /// Total duration, once metadata is loaded.
    fn duration(&self) -> Option<f64>;

    /// Native video size, once metadata is loaded.
    fn video_size(&self) -> Option<(u32, u32)>;

    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    fn seek(&mut self, time_secs: f64) -> CapburnResult<()>;

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn is_muted(&self) -> bool;

    fn set_playback_rate(&mut self, rate: f64);

    fn playback_rate(&self) -> f64;

    /// Start or resume playback. Hosts may refuse (e.g. autoplay policy).
    fn play(&mut self) -> CapburnResult<()>;

    fn pause(&mut self);

    /// Pump the host up to the monotonic time `now_ns`: advance the clock,
    /// decode frames, and queue events.
    fn advance_to(&mut self, now_ns: u64);

    /// The frame for the current position, if one has been decoded.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Drain queued events in the order they were raised.
    fn poll_events(&mut self) -> Vec<MediaEvent>;

    /// The element's audio track, if it has one.
    fn audio_source(&self) -> Option<AudioSourceInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_ids_are_unique() {
        let a = MediaElementId::next();
        let b = MediaElementId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_solid_frame_pixels() {
        let frame = VideoFrame::solid(4, 2, [1, 2, 3, 255]);
        assert!(frame.is_well_formed());
        assert_eq!(frame.pixel(3, 1), Some([1, 2, 3, 255]));
        assert_eq!(frame.pixel(4, 0), None);
    }
}
