//! Clock and timing utilities for stream synchronization.
//!
//! Every timed component in Capburn is driven by a monotonic "now" expressed
//! in nanoseconds since the session started. This module provides:
//! - Session time conversions
//! - A playback clock mapping monotonic time to media time
//! - A fixed-rate frame cadence that never drops owed frames
//! - A rate controller for polling loops
//! - Drift measurement between two streams

/// Conversions between session time in nanoseconds and seconds.
///
/// The monotonic "now" itself is owned by whoever drives the session; see
/// the session driver for the wall-clock source.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock;

impl SessionClock {
    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs.max(0.0) * 1_000_000_000.0) as u64
    }
}

/// Maps monotonic session time to a media position.
///
/// While running, position advances at `rate` media seconds per
/// monotonic second from the last anchor.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    position_secs: f64,
    rate: f64,
    anchor_ns: Option<u64>,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            position_secs: 0.0,
            rate: 1.0,
            anchor_ns: None,
        }
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media position at `now_ns`.
    pub fn position(&self, now_ns: u64) -> f64 {
        match self.anchor_ns {
            None => self.position_secs,
            Some(anchor) => {
                let elapsed = SessionClock::ns_to_secs(now_ns.saturating_sub(anchor));
                self.position_secs + elapsed * self.rate
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.anchor_ns.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn play(&mut self, now_ns: u64) {
        if self.anchor_ns.is_none() {
            self.anchor_ns = Some(now_ns);
        }
    }

    pub fn pause(&mut self, now_ns: u64) {
        self.position_secs = self.position(now_ns);
        self.anchor_ns = None;
    }

    pub fn seek(&mut self, position_secs: f64, now_ns: u64) {
        self.position_secs = position_secs.max(0.0);
        if self.anchor_ns.is_some() {
            self.anchor_ns = Some(now_ns);
        }
    }

    pub fn set_rate(&mut self, rate: f64, now_ns: u64) {
        self.position_secs = self.position(now_ns);
        if self.anchor_ns.is_some() {
            self.anchor_ns = Some(now_ns);
        }
        self.rate = rate.max(0.0);
    }
}

/// Fixed-rate frame cadence for stream capture.
///
/// Unlike [`RateController`], a late caller is told how many frames it
/// owes, so a capture stream keeps a constant frame count per second of
/// wall time even when the caller was throttled.
#[derive(Debug, Clone)]
pub struct FrameCadence {
    interval_ns: u64,
    origin_ns: Option<u64>,
    emitted: u64,
}

impl FrameCadence {
    /// Create a cadence at `fps` frames per second.
    pub fn new(fps: u32) -> Self {
        Self {
            interval_ns: 1_000_000_000 / fps.max(1) as u64,
            origin_ns: None,
            emitted: 0,
        }
    }

    /// Number of frames that should be emitted now to stay on cadence.
    /// The first call anchors the cadence and owes exactly one frame.
    pub fn frames_due(&mut self, now_ns: u64) -> u64 {
        let origin = *self.origin_ns.get_or_insert(now_ns);
        let target = now_ns.saturating_sub(origin) / self.interval_ns + 1;
        let due = target.saturating_sub(self.emitted);
        self.emitted = self.emitted.max(target);
        due
    }

    /// Frames emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Frame interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Rate controller for polling loops.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller firing every `interval_ms` milliseconds.
    pub fn every_ms(interval_ms: u64) -> Self {
        Self {
            target_interval_ns: interval_ms.max(1) * 1_000_000,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }
}
