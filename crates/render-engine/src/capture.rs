//! Fixed-rate capture of the drawing surface into a video track.

use capburn_common::clock::FrameCadence;
use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::{StreamRecorder, VideoFrame, VideoTrack};

use crate::surface::DrawingSurface;

/// Samples a surface at a constant frame rate.
///
/// When the caller is late (a throttled background view), the owed frames
/// are filled by repeating the current snapshot, so the recorded stream
/// keeps real-time length. A surface resized mid-run is scaled back to the
/// track size.
#[derive(Debug)]
pub struct CanvasCapture {
    track: VideoTrack,
    cadence: FrameCadence,
    frames_pushed: u64,
    frames_repeated: u64,
}

impl CanvasCapture {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            track: VideoTrack::new("caption-surface", width, height, fps),
            cadence: FrameCadence::new(fps),
            frames_pushed: 0,
            frames_repeated: 0,
        }
    }

    pub fn track(&self) -> &VideoTrack {
        &self.track
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    pub fn frames_repeated(&self) -> u64 {
        self.frames_repeated
    }

    /// Frame interval of the capture cadence.
    pub fn interval_ns(&self) -> u64 {
        self.cadence.interval_ns()
    }

    /// Push whatever frames are due at `now_ns`. Returns how many.
    pub fn capture(
        &mut self,
        now_ns: u64,
        surface: &dyn DrawingSurface,
        recorder: &mut dyn StreamRecorder,
    ) -> CapburnResult<u64> {
        if !self.track.is_live() {
            return Ok(0);
        }
        let due = self.cadence.frames_due(now_ns);
        if due == 0 {
            return Ok(0);
        }

        let mut frame = surface.snapshot();
        if !frame.is_well_formed() {
            return Err(CapburnError::render(format!(
                "surface snapshot of {}x{} has {} bytes",
                frame.width,
                frame.height,
                frame.pixels.len()
            )));
        }
        if (frame.width, frame.height) != (self.track.width, self.track.height) {
            tracing::trace!(
                from_width = frame.width,
                from_height = frame.height,
                to_width = self.track.width,
                to_height = self.track.height,
                "Scaling snapshot to capture track"
            );
            frame = scale_nearest(&frame, self.track.width, self.track.height);
        }
        for _ in 0..due {
            recorder.push_video_frame(&frame)?;
        }
        self.frames_pushed += due;
        if due > 1 {
            self.frames_repeated += due - 1;
            tracing::trace!(repeated = due - 1, "Capture caught up on owed frames");
        }
        Ok(due)
    }

    /// Stop the video track. The recorder sees no further frames.
    pub fn stop(&self) {
        self.track.stop();
    }
}

/// Nearest-neighbour resample. An empty source yields transparent pixels.
fn scale_nearest(frame: &VideoFrame, width: u32, height: u32) -> VideoFrame {
    let mut pixels = Vec::with_capacity(VideoFrame::byte_len(width, height));
    for y in 0..height {
        let sy = (y as u64 * frame.height as u64 / height as u64) as u32;
        for x in 0..width {
            let sx = (x as u64 * frame.width as u64 / width as u64) as u32;
            pixels.extend_from_slice(&frame.pixel(sx, sy).unwrap_or([0, 0, 0, 0]));
        }
    }
    VideoFrame::new(width, height, pixels)
}
