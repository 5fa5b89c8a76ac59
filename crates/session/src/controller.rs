//! The session controller.
//!
//! Everything that mutates captions, style, or media goes through here.
//! The controller is driven by [`SessionController::tick`] with a
//! monotonic timestamp; each tick pumps the media host, routes its events
//! to the render scheduler and the export controller, renders when a
//! redraw source fires, and advances any export run.

use capburn_audio::{AudioPlatform, AudioRoutingGraph, CredentialStore, SyntheticAudioPlatform};
use capburn_audio::transcription::{Transcriber, TranscriptionRequest};
use capburn_caption_model::{
    import_whisper_log, Caption, CaptionEdit, CaptionId, CaptionStore, CaptionStyle, StyleField,
    TimedText,
};
use capburn_common::config::AppConfig;
use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::headless::MemoryRecorderFactory;
use capburn_media::{MediaElement, MediaEvent, RecorderFactory};
use capburn_render_engine::{
    Compositor, DrawingSurface, ExportArtifact, ExportController, ExportOutcome, ExportSettings,
    ExportState, ExportWarning, FrameComposition, LayoutParams, LoopToken, ProgressCallback,
    RecordingSurface, RenderScheduler, Visibility,
};

use crate::status::AppStatus;

/// Text of the caption manual mode starts with.
pub const FIRST_CAPTION_TEXT: &str = "Your first caption";

/// Duration of a caption added from the editor.
pub const NEW_CAPTION_SECS: f64 = 3.0;

/// Platform pieces a session runs on.
pub struct SessionHost {
    pub audio: Box<dyn AudioPlatform>,
    pub recorders: Box<dyn RecorderFactory>,
    pub surface: Box<dyn DrawingSurface>,
}

impl SessionHost {
    /// Synthetic audio, in-memory recorder, display-list surface.
    pub fn headless() -> Self {
        Self {
            audio: Box::new(SyntheticAudioPlatform::new()),
            recorders: Box::new(MemoryRecorderFactory::new()),
            surface: Box::new(RecordingSurface::new()),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub media_events: usize,
    pub rendered: bool,
    pub export: Option<ExportOutcome>,
}

pub struct SessionController {
    config: AppConfig,
    status: AppStatus,
    captions: CaptionStore,
    style: CaptionStyle,
    media: Option<Box<dyn MediaElement>>,
    surface: Box<dyn DrawingSurface>,
    compositor: Compositor,
    scheduler: RenderScheduler,
    loop_token: Option<LoopToken>,
    audio: AudioRoutingGraph,
    recorders: Box<dyn RecorderFactory>,
    export: ExportController,
    pasted_log: String,
    last_error: Option<String>,
    last_frame: Option<FrameComposition>,
    now_ns: u64,
}

impl SessionController {
    pub fn new(config: AppConfig, host: SessionHost) -> Self {
        let export = ExportController::new(ExportSettings::from(&config.export));
        let compositor = Compositor::new(LayoutParams::from(&config.render));
        Self {
            config,
            status: AppStatus::Idle,
            captions: CaptionStore::new(),
            style: CaptionStyle::default(),
            media: None,
            surface: host.surface,
            compositor,
            scheduler: RenderScheduler::new(),
            loop_token: None,
            audio: AudioRoutingGraph::new(host.audio),
            recorders: host.recorders,
            export,
            pasted_log: String::new(),
            last_error: None,
            last_frame: None,
            now_ns: 0,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status(&self) -> AppStatus {
        self.status
    }

    pub fn captions(&self) -> &CaptionStore {
        &self.captions
    }

    /// Captions for the editor list, ordered by start time.
    pub fn captions_by_start(&self) -> Vec<&Caption> {
        self.captions.by_start()
    }

    pub fn style(&self) -> &CaptionStyle {
        &self.style
    }

    pub fn media(&self) -> Option<&dyn MediaElement> {
        self.media.as_deref()
    }

    pub fn surface(&self) -> &dyn DrawingSurface {
        self.surface.as_ref()
    }

    pub fn audio_graph(&self) -> &AudioRoutingGraph {
        &self.audio
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn current_time(&self) -> f64 {
        self.media.as_ref().map_or(0.0, |m| m.current_time())
    }

    pub fn duration(&self) -> Option<f64> {
        self.media.as_ref().and_then(|m| m.duration())
    }

    /// Latest timestamp seen by the controller.
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Most recent error shown to the user, cleared on the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Log text kept after a failed import so it can be corrected.
    pub fn pasted_log(&self) -> &str {
        &self.pasted_log
    }

    pub fn last_frame(&self) -> Option<&FrameComposition> {
        self.last_frame.as_ref()
    }

    pub fn export_state(&self) -> ExportState {
        self.export.state()
    }

    pub fn export_progress(&self) -> f64 {
        self.export.progress()
    }

    pub fn export_warnings(&self) -> &[ExportWarning] {
        self.export.warnings()
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        self.export.artifact()
    }

    pub fn take_artifact(&mut self) -> Option<ExportArtifact> {
        self.export.take_artifact()
    }

    pub fn set_progress_callback(&mut self, callback: Option<ProgressCallback>) {
        self.export.set_progress_callback(callback);
    }

    fn transition(&mut self, next: AppStatus) -> CapburnResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CapburnError::invalid_state(format!(
                "cannot go from {} to {next}",
                self.status
            )));
        }
        tracing::info!(from = %self.status, to = %next, "Session status changed");
        self.status = next;
        Ok(())
    }

    fn require(&self, allowed: &[AppStatus], action: &str) -> CapburnResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CapburnError::invalid_state(format!(
                "cannot {action} while {}",
                self.status
            )))
        }
    }

    fn require_editing(&self, action: &str) -> CapburnResult<()> {
        if self.status.allows_editing() {
            Ok(())
        } else {
            Err(CapburnError::invalid_state(format!(
                "cannot {action} while {}",
                self.status
            )))
        }
    }

    fn media_mut(&mut self) -> CapburnResult<&mut dyn MediaElement> {
        match self.media.as_mut() {
            Some(media) => Ok(media.as_mut()),
            None => Err(CapburnError::invalid_state("no media is loaded")),
        }
    }

    /// Retire the current render loop and start a new one.
    fn restart_loop(&mut self) {
        if self.media.is_some() {
            self.loop_token = Some(self.scheduler.invalidate());
        }
    }

    /// Load a new media element, replacing any previous one.
    ///
    /// The audio graph is bound to the old element, so it is torn down and
    /// rebuilt lazily for the new one.
    pub fn load_media(&mut self, media: Box<dyn MediaElement>) -> CapburnResult<()> {
        if self.export.is_exporting() {
            return Err(CapburnError::ExportInProgress);
        }
        self.audio.teardown();
        self.export.dismiss();
        tracing::info!(
            element = %media.element_id(),
            source = %media.source_label(),
            "Media loaded"
        );
        self.media = Some(media);
        self.last_frame = None;
        self.last_error = None;
        self.pasted_log.clear();
        self.restart_loop();
        if self.status != AppStatus::Choosing {
            self.transition(AppStatus::Choosing)?;
        }
        Ok(())
    }

    /// Start editing from a single placeholder caption.
    pub fn start_manual(&mut self) -> CapburnResult<()> {
        self.require(&[AppStatus::Choosing], "start manual entry")?;
        self.captions
            .replace_all([TimedText::new(0.0, NEW_CAPTION_SECS, FIRST_CAPTION_TEXT)])?;
        self.restart_loop();
        self.transition(AppStatus::Editing)
    }

    /// Open the log paste view.
    pub fn begin_paste(&mut self) -> CapburnResult<()> {
        self.require(&[AppStatus::Choosing, AppStatus::Editing], "paste a log")?;
        self.transition(AppStatus::Pasting)
    }

    /// Import a pasted log. On failure the text is kept and the session
    /// stays in the paste view.
    pub fn submit_log(&mut self, text: &str) -> CapburnResult<usize> {
        self.require(&[AppStatus::Pasting], "import a log")?;
        let imported = import_whisper_log(text).and_then(|segments| {
            let count = segments.len();
            self.captions
                .replace_all(segments)
                .map_err(|e| CapburnError::parse(e.to_string()))?;
            Ok(count)
        });
        let count = match imported {
            Ok(count) => count,
            Err(e) => {
                self.pasted_log = text.to_string();
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.pasted_log.clear();
        self.last_error = None;
        self.restart_loop();
        self.transition(AppStatus::Editing)?;
        Ok(count)
    }

    /// Replace the captions with previously saved segments and start editing.
    pub fn import_captions(&mut self, segments: Vec<TimedText>) -> CapburnResult<usize> {
        self.require(
            &[AppStatus::Choosing, AppStatus::Pasting, AppStatus::Editing],
            "import captions",
        )?;
        let count = segments.len();
        self.captions.replace_all(segments)?;
        self.restart_loop();
        if self.status != AppStatus::Editing {
            self.transition(AppStatus::Editing)?;
        }
        Ok(count)
    }

    /// Leave the paste view or the finished-export view.
    pub fn back(&mut self) -> CapburnResult<()> {
        match self.status {
            AppStatus::Pasting => self.transition(AppStatus::Choosing),
            AppStatus::Completed => self.dismiss_export(),
            other => Err(CapburnError::invalid_state(format!("nothing to go back to from {other}"))),
        }
    }

    /// Check the credential and enter the transcribing state. Returns the
    /// API key. A missing credential leaves the status unchanged.
    pub fn begin_transcription(&mut self, credentials: &CredentialStore) -> CapburnResult<String> {
        self.require(&[AppStatus::Choosing], "transcribe")?;
        let key = match credentials.require(&self.config.transcription.credential_name) {
            Ok(key) => key,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.transition(AppStatus::Transcribing)?;
        Ok(key)
    }

    /// Apply a transcription result. Failures return to the choice view.
    pub fn finish_transcription(
        &mut self,
        result: CapburnResult<Vec<TimedText>>,
    ) -> CapburnResult<usize> {
        self.require(&[AppStatus::Transcribing], "finish transcription")?;
        let applied = result.and_then(|segments| {
            let count = segments.len();
            self.captions.replace_all(segments)?;
            Ok(count)
        });
        match applied {
            Ok(count) => {
                tracing::info!(captions = count, "Transcription applied");
                self.last_error = None;
                self.restart_loop();
                self.transition(AppStatus::Editing)?;
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transcription failed; back to caption choice");
                self.last_error = Some(e.to_string());
                self.transition(AppStatus::Choosing)?;
                Err(e)
            }
        }
    }

    /// Run the transcription collaborator end to end.
    pub async fn transcribe(
        &mut self,
        transcriber: &dyn Transcriber,
        request: TranscriptionRequest,
        credentials: &CredentialStore,
    ) -> CapburnResult<usize> {
        let key = self.begin_transcription(credentials)?;
        let result = transcriber.transcribe(request, &key).await;
        self.finish_transcription(result)
    }

    /// Add an empty caption at the playback position.
    pub fn add_caption(&mut self) -> CapburnResult<CaptionId> {
        self.require_editing("add a caption")?;
        let start = self.current_time();
        let id = self
            .captions
            .add(TimedText::new(start, start + NEW_CAPTION_SECS, ""))?;
        self.restart_loop();
        Ok(id)
    }

    pub fn update_caption(&mut self, id: &CaptionId, edit: CaptionEdit) -> CapburnResult<()> {
        self.require_editing("edit captions")?;
        self.captions.update(id, edit)?;
        self.restart_loop();
        Ok(())
    }

    pub fn delete_caption(&mut self, id: &CaptionId) -> CapburnResult<Caption> {
        self.require_editing("delete captions")?;
        let removed = self.captions.remove(id)?;
        self.restart_loop();
        Ok(removed)
    }

    pub fn set_style(&mut self, style: CaptionStyle) -> CapburnResult<()> {
        if self.export.is_exporting() {
            return Err(CapburnError::ExportInProgress);
        }
        self.style = style;
        self.restart_loop();
        Ok(())
    }

    /// Set one style field from its text form.
    pub fn set_style_field(&mut self, field: StyleField, raw: &str) -> CapburnResult<()> {
        let mut style = self.style.clone();
        style.set_field(field, raw)?;
        self.set_style(style)
    }

    pub fn seek(&mut self, time_secs: f64) -> CapburnResult<()> {
        if self.export.is_exporting() {
            return Err(CapburnError::ExportInProgress);
        }
        self.media_mut()?.seek(time_secs)
    }

    /// Jump playback to a caption's start.
    pub fn seek_to_caption(&mut self, id: &CaptionId) -> CapburnResult<()> {
        let start = self
            .captions
            .get(id)
            .map(|c| c.start)
            .ok_or_else(|| CapburnError::invalid_state(format!("caption not found: {id}")))?;
        self.seek(start)
    }

    /// Start preview playback. The first play is the user gesture that
    /// lets the audio graph come up; routing problems are only logged
    /// here and surface again as export warnings.
    pub fn play(&mut self) -> CapburnResult<()> {
        if self.export.is_exporting() {
            return Err(CapburnError::ExportInProgress);
        }
        let Some(media) = self.media.as_mut() else {
            return Err(CapburnError::invalid_state("no media is loaded"));
        };
        if let Err(e) = self.audio.ensure_routing(&**media) {
            tracing::warn!(error = %e, "Audio routing unavailable for preview");
        }
        media.play()
    }

    pub fn pause(&mut self) -> CapburnResult<()> {
        if self.export.is_exporting() {
            return Err(CapburnError::ExportInProgress);
        }
        self.media_mut()?.pause();
        Ok(())
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.scheduler.set_visibility(visibility);
    }

    /// Begin exporting. Re-entry while a run is active is rejected and a
    /// failed start leaves the session in its previous state.
    pub fn start_export(&mut self, now_ns: u64) -> CapburnResult<()> {
        if self.export.is_exporting() || self.status == AppStatus::Exporting {
            return Err(CapburnError::ExportInProgress);
        }
        self.require(&[AppStatus::Editing, AppStatus::Completed], "export")?;
        self.now_ns = self.now_ns.max(now_ns);

        if self.surface.width() == 0 || self.surface.height() == 0 {
            self.render_now();
        }

        let Some(media) = self.media.as_mut() else {
            return Err(CapburnError::invalid_state("no media is loaded"));
        };
        let started = self.export.start(
            media.as_mut(),
            self.surface.as_ref(),
            &mut self.audio,
            self.recorders.as_ref(),
            self.now_ns,
        );
        match started {
            Ok(()) => {
                self.last_error = None;
                self.transition(AppStatus::Exporting)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Abort a running export and return to editing.
    pub fn cancel_export(&mut self) -> CapburnResult<()> {
        if !self.export.is_exporting() {
            return Ok(());
        }
        if let Some(media) = self.media.as_mut() {
            self.export.cancel(media.as_mut());
        }
        self.transition(AppStatus::Editing)
    }

    /// Close the finished-export view.
    pub fn dismiss_export(&mut self) -> CapburnResult<()> {
        self.require(&[AppStatus::Completed], "dismiss the export")?;
        self.export.dismiss();
        self.transition(AppStatus::Editing)
    }

    /// Advance the session to `now_ns`.
    pub fn tick(&mut self, now_ns: u64) -> TickReport {
        self.now_ns = self.now_ns.max(now_ns);
        let now = self.now_ns;
        let mut report = TickReport::default();

        let events = match self.media.as_mut() {
            Some(media) => {
                media.advance_to(now);
                media.poll_events()
            }
            None => return report,
        };
        report.media_events = events.len();

        let mut render = false;
        for event in events {
            match event {
                MediaEvent::LoadedMetadata {
                    width,
                    height,
                    duration_secs,
                } => {
                    tracing::info!(width, height, ?duration_secs, "Media metadata loaded");
                    self.restart_loop();
                    render = true;
                }
                MediaEvent::TimeUpdate { .. } => {
                    if let Some(token) = self.loop_token {
                        render |= self.scheduler.on_time_update(token);
                    }
                }
                MediaEvent::Ended => self.export.on_media_ended(now),
                MediaEvent::Error { message } => {
                    tracing::warn!(%message, "Media playback error");
                    self.last_error = Some(message);
                }
                MediaEvent::Play | MediaEvent::Pause => {}
            }
        }

        if let Some(token) = self.loop_token {
            render |= self.scheduler.on_animation_frame(token, now);
        }
        if render {
            report.rendered = self.render_now();
        }

        let outcome = match self.media.as_mut() {
            Some(media) => self.export.tick(media.as_mut(), self.surface.as_ref(), now),
            None => None,
        };
        match &outcome {
            Some(ExportOutcome::Completed) => {
                if let Err(e) = self.transition(AppStatus::Completed) {
                    tracing::warn!(error = %e, "Export finished outside the exporting state");
                }
            }
            Some(ExportOutcome::Failed { message }) => {
                self.last_error = Some(message.clone());
                if let Err(e) = self.transition(AppStatus::Editing) {
                    tracing::warn!(error = %e, "Export failed outside the exporting state");
                }
            }
            None => {}
        }
        report.export = outcome;
        report
    }

    /// Composite one frame now. Returns whether anything was drawn.
    pub fn render_now(&mut self) -> bool {
        let Some(media) = self.media.as_deref() else {
            return false;
        };
        match self
            .compositor
            .render_frame(media, self.surface.as_mut(), &self.captions, &self.style)
        {
            Ok(frame) => {
                let drew = frame.width > 0 && frame.height > 0;
                self.last_frame = Some(frame);
                drew
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame render failed");
                false
            }
        }
    }

    /// Back to idle: drop media, captions, export state, and the audio graph.
    pub fn reset(&mut self) -> CapburnResult<()> {
        if self.status == AppStatus::Idle {
            return Ok(());
        }
        self.cancel_export()?;
        self.release();
        self.captions.clear();
        self.pasted_log.clear();
        self.last_error = None;
        self.export.dismiss();
        self.transition(AppStatus::Idle)
    }

    /// Release the render loop, any export run, the audio graph, and media.
    pub fn teardown(&mut self) {
        if let Some(media) = self.media.as_mut() {
            if self.export.is_exporting() {
                self.export.cancel(media.as_mut());
            }
        }
        self.release();
    }

    fn release(&mut self) {
        self.scheduler.cancel();
        self.loop_token = None;
        self.audio.teardown();
        self.media = None;
        self.last_frame = None;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capburn_media::headless::{ScriptedMedia, ScriptedMediaConfig};

    const MS: u64 = 1_000_000;

    fn session_with_media() -> SessionController {
        let mut session = SessionController::new(AppConfig::default(), SessionHost::headless());
        session
            .load_media(Box::new(ScriptedMedia::new(ScriptedMediaConfig::default())))
            .unwrap();
        session.tick(0);
        session
    }

    #[test]
    fn test_load_media_moves_to_choosing() {
        let session = session_with_media();
        assert_eq!(session.status(), AppStatus::Choosing);
        assert_eq!(session.duration(), Some(3.0));
        assert_eq!(session.surface().width(), 64);
    }

    #[test]
    fn test_manual_mode_starts_with_placeholder() {
        let mut session = session_with_media();
        session.start_manual().unwrap();
        assert_eq!(session.status(), AppStatus::Editing);
        let captions = session.captions().as_slice();
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].text, FIRST_CAPTION_TEXT);
        assert_eq!((captions[0].start, captions[0].end), (0.0, 3.0));
    }

    #[test]
    fn test_add_caption_uses_playback_position() {
        let mut session = session_with_media();
        session.start_manual().unwrap();
        session.seek(1.25).unwrap();
        let id = session.add_caption().unwrap();
        let caption = session.captions().get(&id).unwrap();
        assert_eq!(caption.start, 1.25);
        assert_eq!(caption.end, 4.25);
        assert!(caption.text.is_empty());
    }

    #[test]
    fn test_failed_log_import_keeps_text() {
        let mut session = session_with_media();
        session.begin_paste().unwrap();
        let err = session.submit_log("no timestamps here").unwrap_err();
        assert!(matches!(err, CapburnError::Parse { .. }));
        assert_eq!(session.status(), AppStatus::Pasting);
        assert_eq!(session.pasted_log(), "no timestamps here");

        let count = session
            .submit_log("[00:00.000 --> 00:01.000]  Hi\n[00:01.000 --> 00:02.500]  there")
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(session.status(), AppStatus::Editing);
        assert!(session.pasted_log().is_empty());
    }

    #[test]
    fn test_inverted_log_line_is_dropped_from_import() {
        let mut session = session_with_media();
        session.begin_paste().unwrap();
        let count = session
            .submit_log("[00:00.000 --> 00:01.000]  Good\n[00:05.000 --> 00:03.000]  Inverted")
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(session.captions().as_slice()[0].text, "Good");

        let mut session = session_with_media();
        session.begin_paste().unwrap();
        let err = session.submit_log("[00:05.000 --> 00:03.000]  Inverted").unwrap_err();
        assert!(matches!(err, CapburnError::Parse { .. }));
        assert_eq!(session.status(), AppStatus::Pasting);
        assert_eq!(session.pasted_log(), "[00:05.000 --> 00:03.000]  Inverted");
        assert!(session.last_error().is_some());
    }

    #[test]
    fn test_editing_is_refused_outside_editor() {
        let mut session = session_with_media();
        assert!(session.add_caption().is_err());
        assert!(session.start_export(0).is_err());
    }

    #[test]
    fn test_caption_edit_restarts_render_loop() {
        let mut session = session_with_media();
        session.start_manual().unwrap();
        let before = session.scheduler().is_running();
        let id = session.captions().as_slice()[0].id.clone();
        session
            .update_caption(&id, CaptionEdit::Text("Edited".to_string()))
            .unwrap();
        assert!(before && session.scheduler().is_running());
        session.tick(20 * MS);
        assert!(session.last_frame().unwrap().caption.is_some());
    }

    #[test]
    fn test_reset_releases_everything() {
        let mut session = session_with_media();
        session.start_manual().unwrap();
        session.play().unwrap();
        assert!(session.audio_graph().is_built());

        session.reset().unwrap();
        assert_eq!(session.status(), AppStatus::Idle);
        assert!(session.captions().is_empty());
        assert!(session.media().is_none());
        assert!(!session.audio_graph().is_built());
        assert!(!session.scheduler().is_running());
        assert_eq!(session.tick(100 * MS), TickReport::default());
    }

    #[test]
    fn test_new_media_tears_down_audio_graph() {
        let mut session = session_with_media();
        session.start_manual().unwrap();
        session.play().unwrap();
        let first = session.audio_graph().bound_element();
        assert!(first.is_some());

        session
            .load_media(Box::new(ScriptedMedia::new(ScriptedMediaConfig::default())))
            .unwrap();
        assert!(!session.audio_graph().is_built());
        assert_eq!(session.status(), AppStatus::Choosing);
    }
}
