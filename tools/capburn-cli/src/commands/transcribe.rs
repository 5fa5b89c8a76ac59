//! Transcribe a video through the configured command transcriber.

use std::path::PathBuf;

use anyhow::Context;
use capburn_audio::transcription::{CommandTranscriber, TranscriptionRequest};
use capburn_audio::{CredentialStore, FileAudioPlatform};
use capburn_caption_model::save_captions;
use capburn_common::config::AppConfig;
use capburn_media::ffmpeg::{extract_audio_wav, FfmpegMediaElement, FfmpegRecorderFactory};
use capburn_render_engine::RecordingSurface;
use capburn_session::{SessionController, SessionHost};

pub async fn run(
    config: AppConfig,
    video: PathBuf,
    output: PathBuf,
    command: Option<String>,
) -> anyhow::Result<()> {
    let command = command
        .or_else(|| config.transcription.command.clone())
        .context("No transcriber configured: pass --command or set transcription.command")?;
    let credentials = CredentialStore::open_default();

    let media = FfmpegMediaElement::open(
        &video,
        config.export.fps,
        config.playback.time_update_interval_ms,
    )
    .with_context(|| format!("Failed to open {}", video.display()))?;
    let host = SessionHost {
        audio: Box::new(FileAudioPlatform::new()),
        recorders: Box::new(FfmpegRecorderFactory::new()),
        surface: Box::new(RecordingSurface::new()),
    };
    let mut session = SessionController::new(config, host);
    session.load_media(Box::new(media))?;

    println!("Extracting audio from {}", video.display());
    let source = video.clone();
    let wav = tokio::task::spawn_blocking(move || extract_audio_wav(&source)).await??;
    let request = TranscriptionRequest::from_wav(&wav);

    let transcriber = CommandTranscriber::new(command);
    let count = session.transcribe(&transcriber, request, &credentials).await?;
    save_captions(session.captions(), &output)?;
    println!("Transcribed {count} captions into {}", output.display());
    Ok(())
}
