//! Redraw scheduling.
//!
//! While the view is visible, frames are drawn from the display refresh
//! callback. Hidden views get no refresh callbacks, so rendering falls
//! back to the media element's time-update events, which keeps the
//! capture stream advancing during a background export.
//!
//! Every (re)start of the loop issues a new [`LoopToken`]. A token from
//! an earlier start no longer renders, so a loop that was replaced after
//! a caption, style, or source change can never draw stale state.

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Handle to one generation of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopToken {
    generation: u64,
}

impl LoopToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Refresh rate assumed for the host display.
pub const DEFAULT_REFRESH_HZ: u32 = 60;

#[derive(Debug)]
pub struct RenderScheduler {
    generation: u64,
    running: bool,
    visibility: Visibility,
    refresh_interval_ns: u64,
    next_refresh_ns: Option<u64>,
    animation_renders: u64,
    time_update_renders: u64,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::with_refresh_rate(DEFAULT_REFRESH_HZ)
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresh_rate(hz: u32) -> Self {
        Self {
            generation: 0,
            running: false,
            visibility: Visibility::Visible,
            refresh_interval_ns: 1_000_000_000 / hz.max(1) as u64,
            next_refresh_ns: None,
            animation_renders: 0,
            time_update_renders: 0,
        }
    }

    /// Start a fresh loop generation, retiring any previous token.
    pub fn start(&mut self) -> LoopToken {
        self.generation += 1;
        self.running = true;
        self.next_refresh_ns = None;
        tracing::trace!(generation = self.generation, "Render loop started");
        LoopToken {
            generation: self.generation,
        }
    }

    /// Restart after an input change. Alias of [`start`](Self::start).
    pub fn invalidate(&mut self) -> LoopToken {
        self.start()
    }

    /// Stop the loop. Outstanding tokens become inert.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.running = false;
        self.next_refresh_ns = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_current(&self, token: LoopToken) -> bool {
        self.running && token.generation == self.generation
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        if self.visibility != visibility {
            tracing::debug!(?visibility, "Visibility changed");
            self.visibility = visibility;
            self.next_refresh_ns = None;
        }
    }

    /// Display refresh callback. Returns whether to render now.
    pub fn on_animation_frame(&mut self, token: LoopToken, now_ns: u64) -> bool {
        if !self.is_current(token) || self.visibility == Visibility::Hidden {
            return false;
        }
        match self.next_refresh_ns {
            Some(next) if now_ns < next => false,
            _ => {
                self.next_refresh_ns = Some(now_ns + self.refresh_interval_ns);
                self.animation_renders += 1;
                true
            }
        }
    }

    /// Media time-update callback. Renders only while hidden.
    pub fn on_time_update(&mut self, token: LoopToken) -> bool {
        if !self.is_current(token) || self.visibility == Visibility::Visible {
            return false;
        }
        self.time_update_renders += 1;
        true
    }

    pub fn animation_renders(&self) -> u64 {
        self.animation_renders
    }

    pub fn time_update_renders(&self) -> u64 {
        self.time_update_renders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    #[test]
    fn test_refresh_is_throttled_to_display_rate() {
        let mut scheduler = RenderScheduler::with_refresh_rate(50);
        let token = scheduler.start();
        assert!(scheduler.on_animation_frame(token, 0));
        assert!(!scheduler.on_animation_frame(token, 10 * MS));
        assert!(scheduler.on_animation_frame(token, 20 * MS));
    }

    #[test]
    fn test_stale_token_is_inert() {
        let mut scheduler = RenderScheduler::new();
        let old = scheduler.start();
        let new = scheduler.invalidate();
        assert!(!scheduler.on_animation_frame(old, 0));
        assert!(scheduler.on_animation_frame(new, 0));
    }

    #[test]
    fn test_cancel_stops_every_token() {
        let mut scheduler = RenderScheduler::new();
        let token = scheduler.start();
        scheduler.cancel();
        assert!(!scheduler.on_animation_frame(token, 0));
        scheduler.set_visibility(Visibility::Hidden);
        assert!(!scheduler.on_time_update(token));
    }

    #[test]
    fn test_hidden_view_renders_on_time_updates_only() {
        let mut scheduler = RenderScheduler::new();
        let token = scheduler.start();
        assert!(!scheduler.on_time_update(token));

        scheduler.set_visibility(Visibility::Hidden);
        assert!(!scheduler.on_animation_frame(token, 0));
        assert!(scheduler.on_time_update(token));

        scheduler.set_visibility(Visibility::Visible);
        assert!(scheduler.on_animation_frame(token, 5 * MS));
        assert_eq!(scheduler.animation_renders(), 1);
        assert_eq!(scheduler.time_update_renders(), 1);
    }
}
