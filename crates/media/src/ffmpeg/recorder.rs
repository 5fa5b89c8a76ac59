//! Stream recording through an ffmpeg subprocess.
//!
//! Raw RGBA frames are written to ffmpeg's stdin by a writer thread; the
//! encoded container is read from stdout in fixed-size chunks by a reader
//! thread and delivered as [`RecorderEvent::DataAvailable`] in read order.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use capburn_common::error::{CapburnError, CapburnResult};

use super::{command_exists, drain_to_string};
use crate::element::{AudioOrigin, VideoFrame};
use crate::stream::{
    RecordableStream, RecorderEvent, RecorderFactory, RecorderOptions, RecorderState,
    StreamRecorder,
};

const OUTPUT_CHUNK_BYTES: usize = 64 * 1024;

/// How long a frame push waits for the encoder before the run fails.
const FRAME_QUEUE_TIMEOUT: Duration = Duration::from_secs(5);
const FRAME_QUEUE_RETRY: Duration = Duration::from_millis(2);

/// Creates [`FfmpegRecorder`]s.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRecorderFactory;

impl FfmpegRecorderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl RecorderFactory for FfmpegRecorderFactory {
    fn create(
        &self,
        stream: RecordableStream,
        options: &RecorderOptions,
    ) -> CapburnResult<Box<dyn StreamRecorder>> {
        if !self.is_available() {
            return Err(CapburnError::unsupported(
                "No stream recorder available (expected ffmpeg in PATH)",
            ));
        }
        Ok(Box::new(FfmpegRecorder::new(stream, options.clone())?))
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg")
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// A recorder encoding to WebM through ffmpeg.
pub struct FfmpegRecorder {
    stream: RecordableStream,
    options: RecorderOptions,
    codec_args: Vec<String>,
    state: RecorderState,
    frames: Option<SyncSender<Arc<Vec<u8>>>>,
    events: Receiver<RecorderEvent>,
    events_tx: Option<Sender<RecorderEvent>>,
    waited: Duration,
}

impl FfmpegRecorder {
    pub fn new(stream: RecordableStream, options: RecorderOptions) -> CapburnResult<Self> {
        let codec_args = codec_args_for_mime(&options.mime_type, options.video_bitrate_bps)?;
        let (events_tx, events) = mpsc::channel();
        Ok(Self {
            stream,
            options,
            codec_args,
            state: RecorderState::Inactive,
            frames: None,
            events,
            events_tx: Some(events_tx),
            waited: Duration::ZERO,
        })
    }

    fn build_args(&self) -> Vec<String> {
        let video = &self.stream.video;
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{}x{}", video.width, video.height));
        args.push("-r".to_string());
        args.push(video.fps.max(1).to_string());
        args.push("-i".to_string());
        args.push("pipe:0".to_string());

        let audio_input = match self.stream.audio.as_ref().map(|a| &a.origin) {
            Some(AudioOrigin::File { path, stream_index }) => Some((path.clone(), *stream_index)),
            Some(AudioOrigin::Synthetic { label }) => {
                tracing::warn!(
                    source = %label,
                    "ffmpeg recorder cannot capture synthetic audio; recording video only"
                );
                None
            }
            None => None,
        };

        if let Some((path, _)) = &audio_input {
            args.push("-i".to_string());
            args.push(path.display().to_string());
        }

        args.push("-map".to_string());
        args.push("0:v:0".to_string());
        if let Some((_, stream_index)) = &audio_input {
            args.push("-map".to_string());
            args.push(format!("1:a:{stream_index}?"));
        }

        args.extend(self.codec_args.iter().cloned());
        if audio_input.is_none() {
            args.push("-an".to_string());
        }
        args.extend(
            ["-shortest", "-f", "webm", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }
}

impl StreamRecorder for FfmpegRecorder {
    fn start(&mut self) -> CapburnResult<()> {
        if self.state != RecorderState::Inactive {
            return Err(CapburnError::invalid_state("recorder already started"));
        }
        let events_tx = self
            .events_tx
            .take()
            .ok_or_else(|| CapburnError::invalid_state("recorder already used"))?;

        let args = self.build_args();
        tracing::debug!(args = ?args, "Running ffmpeg recorder");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CapburnError::recorder(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CapburnError::recorder("Failed to capture ffmpeg stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CapburnError::recorder("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CapburnError::recorder("Failed to capture ffmpeg stderr"))?;

        tracing::info!(
            pid = child.id(),
            width = self.stream.video.width,
            height = self.stream.video.height,
            fps = self.stream.video.fps,
            audio = self.stream.audio.is_some(),
            mime = %self.options.mime_type,
            "ffmpeg recorder started"
        );

        let (frames_tx, frames_rx) = mpsc::sync_channel(self.stream.video.fps.max(1) as usize);
        std::thread::spawn(move || write_frames(stdin, frames_rx));
        let stderr_task = std::thread::spawn(move || drain_to_string(stderr));
        std::thread::spawn(move || read_output(child, stdout, stderr_task, events_tx));

        self.frames = Some(frames_tx);
        self.state = RecorderState::Recording;
        Ok(())
    }

    fn push_video_frame(&mut self, frame: &VideoFrame) -> CapburnResult<()> {
        if self.state != RecorderState::Recording {
            return Err(CapburnError::invalid_state("recorder is not recording"));
        }
        let video = &self.stream.video;
        if frame.width != video.width || frame.height != video.height {
            return Err(CapburnError::recorder(format!(
                "frame size {}x{} does not match track size {}x{}",
                frame.width, frame.height, video.width, video.height
            )));
        }
        let Some(frames) = self.frames.as_ref() else {
            return Err(CapburnError::invalid_state("recorder input is closed"));
        };
        let waited = queue_frame(frames, Arc::clone(&frame.pixels), FRAME_QUEUE_TIMEOUT)?;
        if !waited.is_zero() {
            self.waited += waited;
            tracing::trace!(waited_ms = waited.as_millis() as u64, "Encoder behind; frame push waited");
        }
        Ok(())
    }

    fn stop(&mut self) -> CapburnResult<()> {
        if self.state != RecorderState::Recording {
            return Ok(());
        }
        // Closing the frame channel closes ffmpeg's stdin, which finalizes the file.
        self.frames = None;
        self.state = RecorderState::Stopping;
        tracing::info!(
            encoder_wait_ms = self.waited.as_millis() as u64,
            "ffmpeg recorder stopping"
        );
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn poll_events(&mut self) -> Vec<RecorderEvent> {
        let events: Vec<RecorderEvent> = self.events.try_iter().collect();
        if events.iter().any(|e| matches!(e, RecorderEvent::Stopped)) {
            self.state = RecorderState::Stopped;
        }
        events
    }

    fn mime_type(&self) -> &str {
        &self.options.mime_type
    }
}

/// Hand a frame to the writer thread, waiting while its queue is full.
/// Frames are never dropped; an encoder that stays full past `timeout`
/// fails the recording. Returns how long the push waited.
fn queue_frame(
    frames: &SyncSender<Arc<Vec<u8>>>,
    pixels: Arc<Vec<u8>>,
    timeout: Duration,
) -> CapburnResult<Duration> {
    let started = Instant::now();
    let mut pending = pixels;
    loop {
        match frames.try_send(pending) {
            Ok(()) => return Ok(started.elapsed()),
            Err(TrySendError::Full(back)) => {
                if started.elapsed() >= timeout {
                    return Err(CapburnError::recorder(format!(
                        "ffmpeg encoder accepted no frames for {:.1}s",
                        timeout.as_secs_f64()
                    )));
                }
                pending = back;
                std::thread::sleep(FRAME_QUEUE_RETRY);
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(CapburnError::recorder(
                    "ffmpeg recorder input closed unexpectedly",
                ))
            }
        }
    }
}

fn write_frames(mut stdin: ChildStdin, frames: Receiver<Arc<Vec<u8>>>) {
    for pixels in frames {
        if let Err(e) = stdin.write_all(&pixels) {
            tracing::warn!(error = %e, "ffmpeg recorder stdin closed");
            break;
        }
    }
}

fn read_output(
    mut child: Child,
    mut stdout: ChildStdout,
    stderr_task: std::thread::JoinHandle<String>,
    events: Sender<RecorderEvent>,
) {
    let mut buf = vec![0u8; OUTPUT_CHUNK_BYTES];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(RecorderEvent::DataAvailable(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = events.send(RecorderEvent::Error(format!(
                    "Failed reading ffmpeg output: {e}"
                )));
                break;
            }
        }
    }

    let status = child.wait();
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            let _ = events.send(RecorderEvent::Error(format!(
                "ffmpeg recorder failed (status {status}): {}",
                stderr_output.trim()
            )));
        }
        Err(e) => {
            let _ = events.send(RecorderEvent::Error(format!(
                "Failed to wait on ffmpeg: {e}"
            )));
        }
    }
    let _ = events.send(RecorderEvent::Stopped);
}

/// Encoder arguments for the requested container/codec string.
fn codec_args_for_mime(mime_type: &str, video_bitrate_bps: u64) -> CapburnResult<Vec<String>> {
    let mime = mime_type.to_ascii_lowercase();
    if !mime.starts_with("video/webm") {
        return Err(CapburnError::unsupported(format!(
            "unsupported output format {mime_type}; only video/webm is produced"
        )));
    }

    let video_codec = if mime.contains("vp8") {
        "libvpx"
    } else {
        "libvpx-vp9"
    };
    let mut args = vec![
        "-c:v".to_string(),
        video_codec.to_string(),
        "-b:v".to_string(),
        video_bitrate_bps.to_string(),
        "-deadline".to_string(),
        "realtime".to_string(),
        "-cpu-used".to_string(),
        "8".to_string(),
    ];
    if video_codec == "libvpx-vp9" {
        args.extend(["-row-mt".to_string(), "1".to_string()]);
    }
    args.extend([
        "-c:a".to_string(),
        "libopus".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
    ]);
    Ok(args)
}
