//! Async drivers that tick a session on a tokio interval.
//!
//! Timestamps handed to the session are the session's last timestamp plus
//! the tokio clock's elapsed time, so drivers behave the same under
//! `tokio::time::pause`.

use std::future::Future;
use std::time::Duration;

use capburn_common::error::{CapburnError, CapburnResult};
use capburn_render_engine::{ExportArtifact, ExportOutcome};
use tokio::time::{Instant, MissedTickBehavior};

use crate::controller::SessionController;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub tick_interval: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
        }
    }
}

struct DriverClock {
    base_ns: u64,
    started: Instant,
}

impl DriverClock {
    fn new(session: &SessionController) -> Self {
        Self {
            base_ns: session.now_ns(),
            started: Instant::now(),
        }
    }

    fn now_ns(&self) -> u64 {
        self.base_ns + self.started.elapsed().as_nanos() as u64
    }
}

fn ticker(options: &DriverOptions) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(options.tick_interval.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Start an export and tick until it finishes.
pub async fn drive_export(
    session: &mut SessionController,
    options: DriverOptions,
) -> CapburnResult<ExportArtifact> {
    drive_export_until(session, options, std::future::pending::<()>()).await
}

/// Like [`drive_export`], but cancels the run when `stop` resolves first.
pub async fn drive_export_until<F>(
    session: &mut SessionController,
    options: DriverOptions,
    stop: F,
) -> CapburnResult<ExportArtifact>
where
    F: Future<Output = ()>,
{
    let clock = DriverClock::new(session);
    session.start_export(clock.now_ns())?;

    let mut interval = ticker(&options);
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut stop => {
                tracing::info!("Export cancelled");
                session.cancel_export()?;
                return Err(CapburnError::export("export cancelled"));
            }
        }

        match session.tick(clock.now_ns()).export {
            Some(ExportOutcome::Completed) => {
                return session
                    .take_artifact()
                    .ok_or_else(|| CapburnError::export("export finished without an artifact"));
            }
            Some(ExportOutcome::Failed { message }) => return Err(CapburnError::export(message)),
            None => {}
        }
    }
}

/// Play the loaded media for up to `duration`, stopping early at the end.
/// Returns how many frames were rendered.
pub async fn drive_playback(
    session: &mut SessionController,
    duration: Duration,
    options: DriverOptions,
) -> CapburnResult<u64> {
    let clock = DriverClock::new(session);
    session.tick(clock.now_ns());
    session.play()?;

    let mut interval = ticker(&options);
    let mut rendered = 0;
    while clock.started.elapsed() < duration {
        interval.tick().await;
        if session.tick(clock.now_ns()).rendered {
            rendered += 1;
        }
        if session.media().is_some_and(|m| m.is_ended()) {
            break;
        }
    }
    if session.media().is_some_and(|m| !m.is_paused()) {
        session.pause()?;
    }
    Ok(rendered)
}
