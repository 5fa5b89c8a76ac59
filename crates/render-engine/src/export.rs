//! Export control: plays the media once from the start while the
//! composited surface and the routed audio are recorded, then assembles
//! the recorder's chunks into a downloadable artifact.
//!
//! The controller is driven cooperatively. The owner calls
//! [`ExportController::tick`] with a monotonic timestamp after rendering
//! each frame, and forwards end-of-media through
//! [`ExportController::on_media_ended`].

use std::fmt;
use std::path::{Path, PathBuf};

use capburn_audio::AudioRoutingGraph;
use capburn_common::clock::{DriftMeasurement, RateController, SessionClock};
use capburn_common::config::ExportDefaults;
use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::{
    AudioTrack, MediaElement, RecordableStream, RecorderEvent, RecorderFactory, RecorderOptions,
    StreamRecorder,
};

use crate::capture::CanvasCapture;
use crate::surface::DrawingSurface;

/// Progress callback for export runs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Percentage [0, 100]. Never decreases within a run.
    pub percent: f64,

    /// Frames pushed to the recorder so far.
    pub frames_captured: u64,

    /// Media position when the report was taken.
    pub media_time_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Recording,
    /// End of media reached; waiting for trailing data.
    Settling,
    Finalizing,
    Complete,
    Failed,
}

/// Controller state, as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Exporting,
    Completed,
    Failed,
}

/// Non-fatal problems found while preparing or finishing an export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportWarning {
    /// The media has no audio; the artifact is silent.
    NoAudioTrack,
    /// Audio routing could not be built; the artifact is silent.
    AudioUnavailable { message: String },
    /// The audio context stayed suspended; audio may be silent.
    AudioSuspended,
    /// The recorder lost frames; the video runs shorter than the audio.
    FramesDropped { count: u64 },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAudioTrack => f.write_str("the video has no audio track; the export will be silent"),
            Self::AudioUnavailable { message } => {
                write!(f, "audio could not be routed ({message}); the export will be silent")
            }
            Self::AudioSuspended => {
                f.write_str("audio playback is suspended; the export may be silent")
            }
            Self::FramesDropped { count } => {
                write!(f, "the recorder dropped {count} frames; video may drift from audio")
            }
        }
    }
}

/// How a run ended, returned by [`ExportController::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed,
    Failed { message: String },
}

/// The finished recording.
#[derive(Clone)]
pub struct ExportArtifact {
    /// Recorder chunks concatenated in arrival order.
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub frames: u64,
    pub duration_secs: f64,
    pub has_audio: bool,
}

impl fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .field("frames", &self.frames)
            .field("duration_secs", &self.duration_secs)
            .field("has_audio", &self.has_audio)
            .finish()
    }
}

impl ExportArtifact {
    /// Write the artifact. A directory target receives `file_name`.
    pub fn save_to(&self, target: &Path) -> CapburnResult<PathBuf> {
        let path = if target.is_dir() {
            target.join(&self.file_name)
        } else {
            target.to_path_buf()
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &self.data)?;
        tracing::info!(path = %path.display(), bytes = self.data.len(), "Export saved");
        Ok(path)
    }
}

/// Export parameters.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub fps: u32,
    pub video_bitrate_bps: u64,
    pub mime_type: String,
    pub file_name: String,
    pub settle_delay_ms: u64,
    pub progress_interval_ms: u64,
    pub watchdog_grace_secs: Option<f64>,
}

impl From<&ExportDefaults> for ExportSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            fps: defaults.fps.max(1),
            video_bitrate_bps: defaults.video_bitrate_bps,
            mime_type: defaults.mime_type.clone(),
            file_name: defaults.file_name.clone(),
            settle_delay_ms: defaults.settle_delay_ms,
            progress_interval_ms: defaults.progress_interval_ms,
            watchdog_grace_secs: defaults.watchdog_grace_secs,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RunPhase {
    Playing,
    Settling { until_ns: u64 },
    Stopping,
}

struct ExportRun {
    recorder: Box<dyn StreamRecorder>,
    capture: CanvasCapture,
    phase: RunPhase,
    chunks: Vec<Vec<u8>>,
    progress_rate: RateController,
    started_ns: u64,
    deadline_ns: Option<u64>,
    duration_secs: f64,
    audio: Option<AudioTrack>,
}

/// The export state machine: idle, exporting, then completed or failed.
///
/// At most one run exists at a time. The audio routing graph is used but
/// never torn down here; only the capture's video track is stopped when a
/// run ends.
pub struct ExportController {
    settings: ExportSettings,
    state: ExportState,
    run: Option<ExportRun>,
    progress: f64,
    artifact: Option<ExportArtifact>,
    warnings: Vec<ExportWarning>,
    last_error: Option<String>,
    progress_callback: Option<ProgressCallback>,
}

impl ExportController {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            settings,
            state: ExportState::Idle,
            run: None,
            progress: 0.0,
            artifact: None,
            warnings: Vec::new(),
            last_error: None,
            progress_callback: None,
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn set_progress_callback(&mut self, callback: Option<ProgressCallback>) {
        self.progress_callback = callback;
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn is_exporting(&self) -> bool {
        self.state == ExportState::Exporting
    }

    /// Last reported percentage.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn warnings(&self) -> &[ExportWarning] {
        &self.warnings
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        self.artifact.as_ref()
    }

    pub fn take_artifact(&mut self) -> Option<ExportArtifact> {
        self.artifact.take()
    }

    /// Start a run.
    ///
    /// Preconditions (loaded metadata, a sized surface, no run in
    /// progress) are checked before anything changes. Failures after that
    /// point leave the controller in [`ExportState::Failed`].
    pub fn start(
        &mut self,
        media: &mut dyn MediaElement,
        surface: &dyn DrawingSurface,
        audio: &mut AudioRoutingGraph,
        recorders: &dyn RecorderFactory,
        now_ns: u64,
    ) -> CapburnResult<()> {
        if self.state == ExportState::Exporting {
            return Err(CapburnError::ExportInProgress);
        }
        let duration_secs = media
            .duration()
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| CapburnError::export("media metadata is not loaded yet"))?;
        let (width, height) = (surface.width(), surface.height());
        if width == 0 || height == 0 {
            return Err(CapburnError::export("nothing has been rendered to export yet"));
        }

        self.artifact = None;
        self.warnings.clear();
        self.last_error = None;
        self.progress = 0.0;
        self.emit(ExportStage::Preparing, 0, 0.0);

        if !recorders.is_available() {
            return Err(self.fail(CapburnError::unsupported(format!(
                "the {} host cannot record media streams",
                recorders.name()
            ))));
        }

        let audio_track = self.prepare_audio(media, audio);

        let capture = CanvasCapture::new(width, height, self.settings.fps);
        let stream = RecordableStream {
            video: capture.track().clone(),
            audio: audio_track.clone(),
        };
        let options = RecorderOptions {
            mime_type: self.settings.mime_type.clone(),
            video_bitrate_bps: self.settings.video_bitrate_bps,
        };
        let mut recorder = match recorders.create(stream, &options) {
            Ok(recorder) => recorder,
            Err(e) => {
                capture.stop();
                return Err(self.fail(e));
            }
        };
        if let Err(e) = recorder.start() {
            capture.stop();
            return Err(self.fail(e));
        }

        if let Err(e) = restart_playback(media) {
            if let Err(stop_err) = recorder.stop() {
                tracing::warn!(error = %stop_err, "Failed to stop recorder after playback error");
            }
            capture.stop();
            return Err(self.fail(e));
        }

        let deadline_ns = self
            .settings
            .watchdog_grace_secs
            .map(|grace| now_ns + SessionClock::secs_to_ns(duration_secs + grace.max(0.0)));

        tracing::info!(
            recorder = recorders.name(),
            width,
            height,
            fps = self.settings.fps,
            duration_secs,
            audio = audio_track.is_some(),
            "Starting export"
        );

        self.run = Some(ExportRun {
            recorder,
            capture,
            phase: RunPhase::Playing,
            chunks: Vec::new(),
            progress_rate: RateController::every_ms(self.settings.progress_interval_ms),
            started_ns: now_ns,
            deadline_ns,
            duration_secs,
            audio: audio_track,
        });
        self.state = ExportState::Exporting;
        self.emit(ExportStage::Recording, 0, 0.0);
        Ok(())
    }

    fn prepare_audio(
        &mut self,
        media: &dyn MediaElement,
        audio: &mut AudioRoutingGraph,
    ) -> Option<AudioTrack> {
        match audio.ensure_routing(media) {
            Ok(capturable) => {
                if capturable.track.is_none() {
                    self.warn(ExportWarning::NoAudioTrack);
                } else if !capturable.is_audible() {
                    self.warn(ExportWarning::AudioSuspended);
                }
                capturable.track
            }
            Err(e) => {
                self.warn(ExportWarning::AudioUnavailable {
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn warn(&mut self, warning: ExportWarning) {
        tracing::warn!(%warning, "Export warning");
        self.warnings.push(warning);
    }

    /// End of media reached: hold the recorder open for the settle delay.
    pub fn on_media_ended(&mut self, now_ns: u64) {
        if let Some(mut run) = self.run.take() {
            self.begin_settle(&mut run, now_ns);
            self.run = Some(run);
        }
    }

    fn begin_settle(&mut self, run: &mut ExportRun, now_ns: u64) {
        if run.phase != RunPhase::Playing {
            return;
        }
        let until_ns = now_ns + self.settings.settle_delay_ms * 1_000_000;
        run.phase = RunPhase::Settling { until_ns };
        self.rearm_watchdog(run, until_ns);
        tracing::debug!(
            settle_ms = self.settings.settle_delay_ms,
            frames = run.capture.frames_pushed(),
            "Media ended; settling before stop"
        );
        self.progress = 100.0;
        self.emit(ExportStage::Settling, run.capture.frames_pushed(), run.duration_secs);
    }

    /// Push the watchdog deadline to at least `from_ns` plus the grace.
    fn rearm_watchdog(&self, run: &mut ExportRun, from_ns: u64) {
        if let Some(grace) = self.settings.watchdog_grace_secs {
            let deadline = from_ns + SessionClock::secs_to_ns(grace.max(0.0));
            run.deadline_ns = Some(run.deadline_ns.map_or(deadline, |d| d.max(deadline)));
        }
    }

    /// Advance the run. Call after the surface was rendered for `now_ns`.
    pub fn tick(
        &mut self,
        media: &mut dyn MediaElement,
        surface: &dyn DrawingSurface,
        now_ns: u64,
    ) -> Option<ExportOutcome> {
        if self.state != ExportState::Exporting {
            return None;
        }
        let mut run = self.run.take()?;

        match self.step(&mut run, media, surface, now_ns) {
            Ok(false) => {
                self.run = Some(run);
                None
            }
            Ok(true) => match self.finish(run, media) {
                Ok(()) => Some(ExportOutcome::Completed),
                Err(e) => Some(ExportOutcome::Failed {
                    message: e.to_string(),
                }),
            },
            Err(e) => {
                abandon(run, media);
                let message = self.fail(e).to_string();
                Some(ExportOutcome::Failed { message })
            }
        }
    }

    /// One cooperative step. Returns whether the recorder has stopped.
    fn step(
        &mut self,
        run: &mut ExportRun,
        media: &dyn MediaElement,
        surface: &dyn DrawingSurface,
        now_ns: u64,
    ) -> CapburnResult<bool> {
        if run.phase == RunPhase::Playing && media.is_ended() {
            self.begin_settle(run, now_ns);
        }

        if run.phase != RunPhase::Stopping {
            run.capture
                .capture(now_ns, surface, run.recorder.as_mut())?;
        }

        if run.phase == RunPhase::Playing && run.progress_rate.should_tick(now_ns) {
            let time = media.current_time();
            let percent = (time / run.duration_secs * 100.0).clamp(0.0, 100.0);
            self.progress = self.progress.max(percent);
            self.emit(ExportStage::Recording, run.capture.frames_pushed(), time);
        }

        if let RunPhase::Settling { until_ns } = run.phase {
            if now_ns >= until_ns {
                run.recorder.stop()?;
                run.phase = RunPhase::Stopping;
                self.rearm_watchdog(run, now_ns);
                self.emit(
                    ExportStage::Finalizing,
                    run.capture.frames_pushed(),
                    run.duration_secs,
                );
            }
        }

        if let Some(deadline) = run.deadline_ns {
            if now_ns >= deadline {
                tracing::warn!(phase = ?run.phase, "Export watchdog expired");
                return Err(CapburnError::ExportStalled {
                    waited_secs: SessionClock::ns_to_secs(now_ns - run.started_ns),
                });
            }
        }

        let mut stopped = false;
        for event in run.recorder.poll_events() {
            match event {
                RecorderEvent::DataAvailable(chunk) => {
                    if !chunk.is_empty() {
                        run.chunks.push(chunk);
                    }
                }
                RecorderEvent::Error(message) => return Err(CapburnError::recorder(message)),
                RecorderEvent::Stopped => {
                    if run.phase != RunPhase::Stopping {
                        return Err(CapburnError::recorder(
                            "recorder stopped before the media ended",
                        ));
                    }
                    stopped = true;
                }
            }
        }
        Ok(stopped)
    }

    fn finish(&mut self, run: ExportRun, media: &mut dyn MediaElement) -> CapburnResult<()> {
        run.capture.stop();
        let dropped = run.recorder.dropped_frames();
        let frames = run.capture.frames_pushed().saturating_sub(dropped);
        if dropped > 0 {
            self.warn(ExportWarning::FramesDropped { count: dropped });
        }
        let data = run.chunks.concat();
        if data.is_empty() {
            return Err(self.fail(CapburnError::recorder("recorder produced no data")));
        }

        if let Err(e) = media.seek(0.0) {
            tracing::warn!(error = %e, "Failed to rewind media after export");
        }
        media.set_playback_rate(1.0);

        let recorded = DriftMeasurement {
            reference_ns: SessionClock::secs_to_ns(run.duration_secs)
                + self.settings.settle_delay_ms * 1_000_000,
            measured_ns: frames * run.capture.interval_ns(),
        };
        if recorded.exceeds_threshold_ms(250.0) {
            tracing::warn!(
                drift_ms = recorded.drift_ms(),
                frames,
                "Recorded length differs from the media length"
            );
        }

        tracing::info!(
            bytes = data.len(),
            chunks = run.chunks.len(),
            frames,
            repeated_frames = run.capture.frames_repeated(),
            "Export complete"
        );

        self.artifact = Some(ExportArtifact {
            data,
            mime_type: run.recorder.mime_type().to_string(),
            file_name: self.settings.file_name.clone(),
            frames,
            duration_secs: run.duration_secs,
            has_audio: run.audio.is_some(),
        });
        self.progress = 100.0;
        self.state = ExportState::Completed;
        self.emit(ExportStage::Complete, frames, run.duration_secs);
        Ok(())
    }

    /// Abort a running export without producing an artifact.
    pub fn cancel(&mut self, media: &mut dyn MediaElement) {
        if let Some(run) = self.run.take() {
            abandon(run, media);
            tracing::info!("Export cancelled");
        }
        self.state = ExportState::Idle;
        self.progress = 0.0;
    }

    /// Return a finished or failed controller to idle, dropping any
    /// artifact that was not taken.
    pub fn dismiss(&mut self) {
        if self.state != ExportState::Exporting {
            self.state = ExportState::Idle;
            self.artifact = None;
            self.progress = 0.0;
        }
    }

    fn fail(&mut self, err: CapburnError) -> CapburnError {
        tracing::error!(error = %err, "Export failed");
        self.state = ExportState::Failed;
        self.last_error = Some(err.to_string());
        self.emit(ExportStage::Failed, 0, 0.0);
        err
    }

    fn emit(&self, stage: ExportStage, frames_captured: u64, media_time_secs: f64) {
        if let Some(callback) = &self.progress_callback {
            callback(ExportProgress {
                percent: self.progress,
                frames_captured,
                media_time_secs,
                stage,
            });
        }
    }
}

fn restart_playback(media: &mut dyn MediaElement) -> CapburnResult<()> {
    media.seek(0.0)?;
    media.set_playback_rate(1.0);
    media.set_muted(false);
    media.play()
}

/// Stop a run's recorder and capture track, discarding its output.
fn abandon(mut run: ExportRun, media: &mut dyn MediaElement) {
    if let Err(e) = run.recorder.stop() {
        tracing::warn!(error = %e, "Failed to stop recorder");
    }
    run.capture.stop();
    media.pause();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use crate::surface::RecordingSurface;
    use capburn_audio::SyntheticAudioPlatform;
    use capburn_caption_model::{CaptionStore, CaptionStyle, TimedText};
    use capburn_media::headless::{
        MemoryRecorderFactory, ScriptedMedia, ScriptedMediaConfig, MEMORY_FRAME_RECORD_LEN,
        MEMORY_RECORDING_MAGIC,
    };
    use capburn_media::MediaEvent;
    use std::sync::{Arc, Mutex};

    const MS: u64 = 1_000_000;

    struct Rig {
        media: ScriptedMedia,
        surface: RecordingSurface,
        audio: AudioRoutingGraph,
        recorders: MemoryRecorderFactory,
        compositor: Compositor,
        captions: CaptionStore,
        controller: ExportController,
        now_ns: u64,
    }

    impl Rig {
        fn new(config: ScriptedMediaConfig) -> Self {
            Self::with(config, SyntheticAudioPlatform::new(), MemoryRecorderFactory::new())
        }

        fn with(
            config: ScriptedMediaConfig,
            platform: SyntheticAudioPlatform,
            recorders: MemoryRecorderFactory,
        ) -> Self {
            let mut rig = Self {
                media: ScriptedMedia::new(config),
                surface: RecordingSurface::new(),
                audio: AudioRoutingGraph::new(Box::new(platform)),
                recorders,
                compositor: Compositor::default(),
                captions: CaptionStore::from_segments([TimedText::new(0.0, 0.5, "hi")]).unwrap(),
                controller: ExportController::new(ExportSettings {
                    watchdog_grace_secs: Some(2.0),
                    ..ExportSettings::default()
                }),
                now_ns: 0,
            };
            rig.media.advance_to(0);
            rig.render();
            rig
        }

        fn render(&mut self) {
            self.compositor
                .render_frame(
                    &self.media,
                    &mut self.surface,
                    &self.captions,
                    &CaptionStyle::default(),
                )
                .unwrap();
        }

        fn start(&mut self) -> CapburnResult<()> {
            self.controller.start(
                &mut self.media,
                &self.surface,
                &mut self.audio,
                &self.recorders,
                self.now_ns,
            )
        }

        /// Advance in 10ms steps until the run ends or `limit_ms` passes.
        fn run(&mut self, limit_ms: u64) -> Option<ExportOutcome> {
            let end = self.now_ns + limit_ms * MS;
            while self.now_ns < end {
                self.now_ns += 10 * MS;
                self.media.advance_to(self.now_ns);
                for event in self.media.poll_events() {
                    if event == MediaEvent::Ended {
                        self.controller.on_media_ended(self.now_ns);
                    }
                }
                self.render();
                if let Some(outcome) = self.controller.tick(&mut self.media, &self.surface, self.now_ns) {
                    return Some(outcome);
                }
            }
            None
        }
    }

    fn one_second() -> ScriptedMediaConfig {
        ScriptedMediaConfig {
            duration_secs: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_export_completes_with_ordered_chunks() {
        let mut rig = Rig::new(one_second());
        rig.start().unwrap();
        assert_eq!(rig.controller.state(), ExportState::Exporting);

        assert_eq!(rig.run(5_000), Some(ExportOutcome::Completed));
        let artifact = rig.controller.artifact().unwrap();
        assert!(artifact.data.starts_with(MEMORY_RECORDING_MAGIC));
        assert!(artifact.has_audio);
        assert_eq!(artifact.file_name, "captioned_capburn.webm");

        // 1s of media plus the 800ms settle at 30fps.
        assert!((50..=60).contains(&artifact.frames), "frames={}", artifact.frames);
        let records = &artifact.data[MEMORY_RECORDING_MAGIC.len()..];
        assert_eq!(records.len(), artifact.frames as usize * MEMORY_FRAME_RECORD_LEN);
        for (i, record) in records.chunks_exact(MEMORY_FRAME_RECORD_LEN).enumerate() {
            let mut index = [0u8; 8];
            index.copy_from_slice(&record[..8]);
            assert_eq!(u64::from_le_bytes(index), i as u64);
        }
    }

    #[test]
    fn test_completion_resets_media_and_keeps_audio_graph() {
        let mut rig = Rig::new(one_second());
        rig.start().unwrap();
        rig.run(5_000);
        assert_eq!(rig.controller.state(), ExportState::Completed);
        assert_eq!(rig.media.current_time(), 0.0);
        assert_eq!(rig.media.playback_rate(), 1.0);
        assert!(rig.audio.is_built());
        assert_eq!(rig.audio.build_count(), 1);
    }

    #[test]
    fn test_second_export_reuses_audio_graph() {
        let mut rig = Rig::new(one_second());
        rig.start().unwrap();
        rig.run(5_000);
        rig.start().unwrap();
        assert_eq!(rig.run(5_000), Some(ExportOutcome::Completed));
        assert_eq!(rig.audio.build_count(), 1);
        assert_eq!(rig.recorders.log().recorders_created, 2);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut rig = Rig::new(one_second());
        let sink = Arc::clone(&seen);
        rig.controller.set_progress_callback(Some(Box::new(move |p: ExportProgress| {
            sink.lock().unwrap().push((p.percent, p.stage));
        })));
        rig.start().unwrap();
        rig.run(5_000);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(seen.iter().any(|(p, s)| *s == ExportStage::Recording && *p > 0.0 && *p < 100.0));
        assert_eq!(seen.last(), Some(&(100.0, ExportStage::Complete)));
    }

    #[test]
    fn test_reentry_is_rejected() {
        let mut rig = Rig::new(one_second());
        rig.start().unwrap();
        assert!(matches!(rig.start(), Err(CapburnError::ExportInProgress)));
        assert_eq!(rig.run(5_000), Some(ExportOutcome::Completed));
        assert_eq!(rig.recorders.log().recorders_created, 1);
    }

    #[test]
    fn test_unavailable_recorder_fails_without_playing() {
        let mut rig = Rig::with(
            one_second(),
            SyntheticAudioPlatform::new(),
            MemoryRecorderFactory::unavailable(),
        );
        let err = rig.start().unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(rig.controller.state(), ExportState::Failed);
        assert!(rig.media.is_paused());
    }

    #[test]
    fn test_recorder_start_failure_is_reported() {
        let mut rig = Rig::with(
            one_second(),
            SyntheticAudioPlatform::new(),
            MemoryRecorderFactory::failing_on_start(),
        );
        assert!(rig.start().is_err());
        assert_eq!(rig.controller.state(), ExportState::Failed);
        assert!(rig.controller.last_error().is_some());
    }

    #[test]
    fn test_export_before_metadata_is_refused() {
        let mut rig = Rig::new(ScriptedMediaConfig {
            metadata_delay_ms: 1_000,
            ..one_second()
        });
        assert!(rig.start().is_err());
        assert_eq!(rig.controller.state(), ExportState::Idle);
    }

    #[test]
    fn test_audio_problems_are_warnings() {
        let mut rig = Rig::with(
            one_second(),
            SyntheticAudioPlatform::blocking_resume(),
            MemoryRecorderFactory::new(),
        );
        rig.start().unwrap();
        assert_eq!(rig.controller.warnings(), &[ExportWarning::AudioSuspended]);
        assert_eq!(rig.run(5_000), Some(ExportOutcome::Completed));

        let mut rig = Rig::with(
            one_second(),
            SyntheticAudioPlatform::unavailable(),
            MemoryRecorderFactory::new(),
        );
        rig.start().unwrap();
        assert!(matches!(
            rig.controller.warnings(),
            [ExportWarning::AudioUnavailable { .. }]
        ));
        assert_eq!(rig.run(5_000), Some(ExportOutcome::Completed));
        assert!(!rig.controller.artifact().unwrap().has_audio);
    }

    #[test]
    fn test_silent_media_warns_no_audio() {
        let mut rig = Rig::new(ScriptedMediaConfig {
            has_audio: false,
            ..one_second()
        });
        rig.start().unwrap();
        assert_eq!(rig.controller.warnings(), &[ExportWarning::NoAudioTrack]);
        assert_eq!(rig.recorders.log().with_audio, 0);
    }

    #[test]
    fn test_stalled_media_trips_watchdog() {
        let mut rig = Rig::new(ScriptedMediaConfig {
            stall_at_secs: Some(0.5),
            ..one_second()
        });
        rig.start().unwrap();
        let outcome = rig.run(10_000);
        assert!(matches!(outcome, Some(ExportOutcome::Failed { .. })));
        assert_eq!(rig.controller.state(), ExportState::Failed);
        assert!(rig.controller.artifact().is_none());
        assert!(rig.media.is_paused());
    }

    #[test]
    fn test_recorder_that_never_stops_trips_watchdog() {
        let mut rig = Rig::with(
            one_second(),
            SyntheticAudioPlatform::new(),
            MemoryRecorderFactory::hanging_on_stop(),
        );
        rig.start().unwrap();
        let outcome = rig.run(10_000);
        assert!(matches!(outcome, Some(ExportOutcome::Failed { .. })));
        assert_eq!(rig.controller.state(), ExportState::Failed);
        assert!(rig.controller.last_error().unwrap().contains("stalled"));
        assert!(rig.controller.artifact().is_none());
        assert_eq!(rig.recorders.log().stops_requested, 1);
        // Media end plus settle plus grace, well short of the limit.
        assert!(rig.now_ns <= 4_000 * MS, "now={}", rig.now_ns);
    }

    #[test]
    fn test_dropped_frames_are_reported() {
        let mut rig = Rig::with(
            one_second(),
            SyntheticAudioPlatform::new(),
            MemoryRecorderFactory::new().dropping_every(Some(2)),
        );
        rig.start().unwrap();
        assert_eq!(rig.run(5_000), Some(ExportOutcome::Completed));

        let received = rig.recorders.log().frames_received;
        let artifact = rig.controller.artifact().unwrap();
        assert_eq!(artifact.frames, received);
        let records = &artifact.data[MEMORY_RECORDING_MAGIC.len()..];
        assert_eq!(records.len(), received as usize * MEMORY_FRAME_RECORD_LEN);
        assert!(matches!(
            rig.controller.warnings(),
            [ExportWarning::FramesDropped { count }] if *count > 0
        ));
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut rig = Rig::new(one_second());
        rig.start().unwrap();
        rig.run(200);
        rig.controller.cancel(&mut rig.media);
        assert_eq!(rig.controller.state(), ExportState::Idle);
        assert!(rig.media.is_paused());
        assert_eq!(rig.run(3_000), None);
    }

    #[test]
    fn test_artifact_saves_into_directory() {
        let mut rig = Rig::new(one_second());
        rig.start().unwrap();
        rig.run(5_000);
        let dir = tempfile::tempdir().unwrap();
        let artifact = rig.controller.take_artifact().unwrap();
        let path = artifact.save_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("captioned_capburn.webm"));
        assert_eq!(std::fs::read(path).unwrap(), artifact.data);
    }
}
