//! Run a complete export on the headless host.
//!
//! Time is synthetic: the session is ticked in fixed steps as fast as the
//! machine allows, so a long media duration finishes in moments.

use std::path::PathBuf;

use capburn_common::clock::SessionClock;
use capburn_common::config::AppConfig;
use capburn_media::headless::{ScriptedMedia, ScriptedMediaConfig};
use capburn_render_engine::{ExportOutcome, Visibility};
use capburn_session::{SessionController, SessionHost};

use super::{print_artifact, print_warnings, progress_printer, read_captions, read_style};

const STEP_NS: u64 = 10_000_000;

pub async fn run(
    config: AppConfig,
    captions: PathBuf,
    duration: f64,
    width: u32,
    height: u32,
    hidden: bool,
    style: Option<PathBuf>,
) -> anyhow::Result<()> {
    if !(duration.is_finite() && duration > 0.0) {
        anyhow::bail!("Duration must be a positive number of seconds");
    }
    let segments = read_captions(&captions)?;
    let style = read_style(style.as_deref())?;

    let media = ScriptedMedia::new(ScriptedMediaConfig {
        label: "simulated".to_string(),
        width,
        height,
        duration_secs: duration,
        frame_rate: config.export.fps,
        time_update_interval_ms: config.playback.time_update_interval_ms,
        ..Default::default()
    });
    let limit_secs = duration
        + config.export.settle_delay_ms as f64 / 1000.0
        + config.export.watchdog_grace_secs.unwrap_or(30.0)
        + 1.0;

    let mut session = SessionController::new(config, SessionHost::headless());
    session.load_media(Box::new(media))?;
    session.tick(0);
    let count = session.import_captions(segments)?;
    session.set_style(style)?;
    // Start from a visible frame so the surface has its size.
    session.tick(STEP_NS);
    if hidden {
        session.set_visibility(Visibility::Hidden);
    }

    println!("Simulating export: {width}x{height}, {duration:.2}s, {count} captions");
    session.set_progress_callback(Some(progress_printer()));

    let mut now = session.now_ns();
    session.start_export(now)?;
    let deadline = now + SessionClock::secs_to_ns(limit_secs);
    let outcome = loop {
        now += STEP_NS;
        if let Some(outcome) = session.tick(now).export {
            break outcome;
        }
        if now > deadline {
            session.cancel_export()?;
            anyhow::bail!("Simulation did not finish within {limit_secs:.1}s of media time");
        }
        // Yield so the runtime stays responsive on long simulations.
        if now % (100 * STEP_NS) == 0 {
            tokio::task::yield_now().await;
        }
    };
    eprintln!();

    match outcome {
        ExportOutcome::Completed => {
            println!("Export completed");
            print_warnings(session.export_warnings());
            if let Some(artifact) = session.artifact() {
                print_artifact(artifact, None);
            }
            println!(
                "  Renders:  {} on refresh, {} on time updates",
                session.scheduler().animation_renders(),
                session.scheduler().time_update_renders()
            );
            Ok(())
        }
        ExportOutcome::Failed { message } => {
            print_warnings(session.export_warnings());
            anyhow::bail!("Export failed: {message}")
        }
    }
}
