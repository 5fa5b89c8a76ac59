//! Burn captions into a video through the ffmpeg host.

use std::path::PathBuf;

use anyhow::Context;
use capburn_audio::FileAudioPlatform;
use capburn_common::config::AppConfig;
use capburn_media::ffmpeg::{FfmpegMediaElement, FfmpegRecorderFactory};
use capburn_render_engine::raster::load_font;
use capburn_render_engine::{PixmapSurface, Visibility};
use capburn_session::{drive_export_until, DriverOptions, SessionController, SessionHost};

use super::{print_artifact, print_warnings, progress_printer, read_captions, read_style};

pub async fn run(
    config: AppConfig,
    video: PathBuf,
    captions: PathBuf,
    style: Option<PathBuf>,
    output: Option<PathBuf>,
    font: Option<PathBuf>,
    hidden: bool,
) -> anyhow::Result<()> {
    println!("Exporting: {}", video.display());

    let segments = read_captions(&captions)?;
    let style = read_style(style.as_deref())?;
    let surface = match &font {
        Some(path) => PixmapSurface::new(load_font(Some(path.as_path()))?),
        None => PixmapSurface::from_config(&config.render)?,
    };
    if !surface.has_font() {
        println!("  [WARN] No caption font found; captions will render without text");
    }

    let media = FfmpegMediaElement::open(
        &video,
        config.export.fps,
        config.playback.time_update_interval_ms,
    )
    .with_context(|| format!("Failed to open {}", video.display()))?;

    let host = SessionHost {
        audio: Box::new(FileAudioPlatform::new()),
        recorders: Box::new(FfmpegRecorderFactory::new()),
        surface: Box::new(surface),
    };
    let mut session = SessionController::new(config, host);
    session.load_media(Box::new(media))?;
    session.tick(0);
    if session.duration().is_none() {
        anyhow::bail!("{} has no known duration", video.display());
    }
    let count = session.import_captions(segments)?;
    session.set_style(style)?;
    session.render_now();
    if hidden {
        session.set_visibility(Visibility::Hidden);
    }

    println!(
        "  Captions: {count}, duration {:.2}s",
        session.duration().unwrap_or_default()
    );
    session.set_progress_callback(Some(progress_printer()));

    let interrupted = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("Interrupted; cancelling export"),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C; export runs to completion");
                std::future::pending::<()>().await;
            }
        }
    };
    let result = drive_export_until(&mut session, DriverOptions::default(), interrupted).await;
    eprintln!();

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            print_warnings(session.export_warnings());
            anyhow::bail!("Export failed: {e}");
        }
    };
    let target = output.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    let saved = artifact.save_to(&target)?;
    tracing::info!(
        path = %saved.display(),
        bytes = artifact.data.len(),
        frames = artifact.frames,
        "Export saved"
    );

    println!("Export complete");
    print_warnings(session.export_warnings());
    print_artifact(&artifact, Some(&saved));
    Ok(())
}
