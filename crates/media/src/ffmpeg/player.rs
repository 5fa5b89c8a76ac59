//! Media element decoding through an ffmpeg subprocess.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use capburn_common::clock::PlaybackClock;
use capburn_common::error::{CapburnError, CapburnResult};

use super::{probe_media, MediaInfo};
use crate::element::{
    AudioOrigin, AudioSourceInfo, MediaElement, MediaElementId, MediaEvent, VideoFrame,
};

/// Frames buffered ahead of playback before the decoder blocks.
const DECODE_AHEAD_FRAMES: usize = 8;

struct DecodedFrame {
    index: u64,
    frame: VideoFrame,
}

/// A running `ffmpeg ... -f rawvideo pipe:1` decoder.
struct Decoder {
    child: Child,
    frames: Receiver<DecodedFrame>,
    start_secs: f64,
    fps: u32,
    next: Option<DecodedFrame>,
    finished: bool,
    last_timestamp: Option<f64>,
}

impl Decoder {
    fn spawn(path: &Path, start_secs: f64, fps: u32, width: u32, height: u32) -> CapburnResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-ss"])
            .arg(format!("{start_secs:.3}"))
            .arg("-i")
            .arg(path)
            .args(["-an", "-vf"])
            .arg(format!("fps={fps}"))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CapburnError::media(format!("Failed to start ffmpeg decoder: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CapburnError::media("Failed to capture decoder stdout"))?;

        let (tx, rx) = mpsc::sync_channel(DECODE_AHEAD_FRAMES);
        let frame_len = VideoFrame::byte_len(width, height);
        std::thread::spawn(move || {
            let mut index = 0u64;
            loop {
                let mut buf = vec![0u8; frame_len];
                if stdout.read_exact(&mut buf).is_err() {
                    break;
                }
                let decoded = DecodedFrame {
                    index,
                    frame: VideoFrame::new(width, height, buf),
                };
                if tx.send(decoded).is_err() {
                    break;
                }
                index += 1;
            }
        });

        tracing::debug!(pid = child.id(), start_secs, fps, "Decoder started");
        Ok(Self {
            child,
            frames: rx,
            start_secs,
            fps,
            next: None,
            finished: false,
            last_timestamp: None,
        })
    }

    fn timestamp(&self, index: u64) -> f64 {
        self.start_secs + index as f64 / self.fps as f64
    }

    /// Latest decoded frame at or before `position`.
    fn frame_at(&mut self, position: f64) -> Option<VideoFrame> {
        let half_frame = 0.5 / self.fps as f64;
        let mut latest = None;
        loop {
            if self.next.is_none() {
                match self.frames.try_recv() {
                    Ok(decoded) => self.next = Some(decoded),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.finished = true;
                        break;
                    }
                }
            }
            let Some(candidate) = self.next.as_ref() else {
                break;
            };
            let ts = self.timestamp(candidate.index);
            if ts > position + half_frame {
                break;
            }
            self.last_timestamp = Some(ts);
            latest = self.next.take().map(|d| d.frame);
        }
        latest
    }

    /// The decoder ran out of frames and `position` is past the last one.
    fn exhausted_at(&self, position: f64) -> bool {
        if !self.finished || self.next.is_some() {
            return false;
        }
        match self.last_timestamp {
            Some(ts) => position >= ts + 1.0 / self.fps as f64,
            None => true,
        }
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A media file played through ffmpeg.
///
/// Frames are decoded at a fixed rate and picked by playback position.
/// The element does not produce audible output; its audio is exposed as a
/// file stream for the routing graph.
pub struct FfmpegMediaElement {
    id: MediaElementId,
    path: PathBuf,
    info: MediaInfo,
    decode_fps: u32,
    clock: PlaybackClock,
    now_ns: u64,
    muted: bool,
    ended: bool,
    metadata_announced: bool,
    events: Vec<MediaEvent>,
    time_update_interval_ns: u64,
    last_time_update_ns: u64,
    decoder: Option<Decoder>,
    frame: Option<VideoFrame>,
}

impl FfmpegMediaElement {
    /// Probe `path` and prepare it for playback at `decode_fps`.
    pub fn open(path: &Path, decode_fps: u32, time_update_interval_ms: u64) -> CapburnResult<Self> {
        let info = probe_media(path)?;
        tracing::info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration = ?info.duration_secs,
            audio = info.audio.is_some(),
            "Opened media"
        );
        Ok(Self {
            id: MediaElementId::next(),
            path: path.to_path_buf(),
            info,
            decode_fps: decode_fps.max(1),
            clock: PlaybackClock::new(),
            now_ns: 0,
            muted: false,
            ended: false,
            metadata_announced: false,
            events: Vec::new(),
            time_update_interval_ns: time_update_interval_ms.saturating_mul(1_000_000),
            last_time_update_ns: 0,
            decoder: None,
            frame: None,
        })
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn position(&self) -> f64 {
        let position = self.clock.position(self.now_ns);
        match self.info.duration_secs {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn restart_decoder(&mut self, start_secs: f64) -> CapburnResult<()> {
        self.decoder = None;
        self.decoder = Some(Decoder::spawn(
            &self.path,
            start_secs,
            self.decode_fps,
            self.info.width,
            self.info.height,
        )?);
        Ok(())
    }

    fn pull_frame(&mut self) {
        let position = self.position();
        if let Some(decoder) = self.decoder.as_mut() {
            if let Some(frame) = decoder.frame_at(position) {
                self.frame = Some(frame);
            }
        }
    }

    fn reached_end(&self) -> bool {
        let position = self.position();
        if let Some(duration) = self.info.duration_secs {
            if position >= duration {
                return true;
            }
        }
        self.decoder
            .as_ref()
            .map(|d| d.exhausted_at(position))
            .unwrap_or(false)
    }

    fn finish(&mut self) {
        let end = self.position();
        self.clock.seek(end, self.now_ns);
        self.clock.pause(self.now_ns);
        self.ended = true;
        self.last_time_update_ns = self.now_ns;
        self.events.push(MediaEvent::TimeUpdate { time_secs: end });
        self.events.push(MediaEvent::Pause);
        self.events.push(MediaEvent::Ended);
        tracing::info!(element = %self.id, end_secs = end, "Playback ended");
    }
}

impl MediaElement for FfmpegMediaElement {
    fn element_id(&self) -> MediaElementId {
        self.id
    }

    fn source_label(&self) -> String {
        self.path.display().to_string()
    }

    fn duration(&self) -> Option<f64> {
        self.info.duration_secs
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        Some((self.info.width, self.info.height))
    }

    fn current_time(&self) -> f64 {
        self.position()
    }

    fn seek(&mut self, time_secs: f64) -> CapburnResult<()> {
        if !time_secs.is_finite() {
            return Err(CapburnError::media(format!("invalid seek target {time_secs}")));
        }
        let mut target = time_secs.max(0.0);
        if let Some(duration) = self.info.duration_secs {
            target = target.min(duration);
        }
        self.clock.seek(target, self.now_ns);
        self.ended = false;
        self.frame = None;
        self.restart_decoder(target)?;
        self.events.push(MediaEvent::TimeUpdate { time_secs: target });
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
        if self.clock.is_running() {
            return Ok(());
        }
        if self.ended {
            self.seek(0.0)?;
        }
        if self.decoder.is_none() {
            self.restart_decoder(self.position())?;
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

        if !self.metadata_announced {
            self.metadata_announced = true;
            self.events.push(MediaEvent::LoadedMetadata {
                width: self.info.width,
                height: self.info.height,
                duration_secs: self.info.duration_secs,
            });
            if self.decoder.is_none() {
                if let Err(e) = self.restart_decoder(0.0) {
                    self.events.push(MediaEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }

        self.pull_frame();

        if self.clock.is_running() {
            if self.reached_end() {
                self.finish();
            } else if self.now_ns.saturating_sub(self.last_time_update_ns)
                >= self.time_update_interval_ns
            {
                self.last_time_update_ns = self.now_ns;
                let time_secs = self.position();
                self.events.push(MediaEvent::TimeUpdate { time_secs });
            }
        }
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.frame.clone()
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }

    fn audio_source(&self) -> Option<AudioSourceInfo> {
        self.info.audio.map(|audio| AudioSourceInfo {
            origin: AudioOrigin::File {
                path: self.path.clone(),
                stream_index: 0,
            },
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        })
    }
}
