//! Dead-man's switch between the real and the simulated scanner feed.
//!
//! The channel starts on the real feed. Any simulated datagram arriving after
//! a silence longer than the window takes the channel over; once the
//! simulator has been quiet for longer than the window, a tick hands the
//! channel back. Real traffic never drives a transition.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Silence window used by the reference deployment.
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Feed whose real-source frames are currently forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveSource {
    Real,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ToSimulated,
    ToReal,
}

/// Source of monotonic time for the channel loop.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Two-state failover machine for one channel.
///
/// `last_sim_activity` is `None` until the first simulated datagram, which
/// reads as "infinitely long ago" so that datagram switches immediately.
///
/// # Examples
/// ```
/// use std::time::{Duration, Instant};
/// use hokuyo_relay_core::{ActiveSource, FailoverArbiter};
///
/// let mut arbiter = FailoverArbiter::new(Duration::from_secs(10));
/// let start = Instant::now();
/// arbiter.sim_packet_arrived(start);
/// assert_eq!(arbiter.active(), ActiveSource::Simulated);
/// arbiter.tick(start + Duration::from_secs(11));
/// assert_eq!(arbiter.active(), ActiveSource::Real);
/// ```
#[derive(Debug, Clone)]
pub struct FailoverArbiter {
    active: ActiveSource,
    last_sim_activity: Option<Instant>,
    silence_timeout: Duration,
}

impl FailoverArbiter {
    pub fn new(silence_timeout: Duration) -> Self {
        Self {
            active: ActiveSource::Real,
            last_sim_activity: None,
            silence_timeout,
        }
    }

    pub fn active(&self) -> ActiveSource {
        self.active
    }

    pub fn last_sim_activity(&self) -> Option<Instant> {
        self.last_sim_activity
    }

    pub fn silence_timeout(&self) -> Duration {
        self.silence_timeout
    }

    pub fn sim_packet_arrived(&mut self, now: Instant) -> Option<Transition> {
        let transition = if self.active == ActiveSource::Real && self.sim_silent_at(now) {
            self.active = ActiveSource::Simulated;
            Some(Transition::ToSimulated)
        } else {
            None
        };
        self.last_sim_activity = Some(now);
        transition
    }

    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        if self.active == ActiveSource::Simulated && self.sim_silent_at(now) {
            self.active = ActiveSource::Real;
            return Some(Transition::ToReal);
        }
        None
    }

    fn sim_silent_at(&self, now: Instant) -> bool {
        match self.last_sim_activity {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.silence_timeout,
        }
    }
}

impl Default for FailoverArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{ActiveSource, FailoverArbiter, Transition};

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn starts_on_real_source() {
        let arbiter = FailoverArbiter::default();
        assert_eq!(arbiter.active(), ActiveSource::Real);
        assert!(arbiter.last_sim_activity().is_none());
    }

    #[test]
    fn first_sim_packet_switches_immediately() {
        let mut arbiter = FailoverArbiter::new(secs(10));
        let t0 = Instant::now();
        assert_eq!(arbiter.sim_packet_arrived(t0), Some(Transition::ToSimulated));
        assert_eq!(arbiter.active(), ActiveSource::Simulated);
        assert_eq!(arbiter.last_sim_activity(), Some(t0));
    }

    #[test]
    fn reverts_after_silence() {
        let mut arbiter = FailoverArbiter::new(secs(10));
        let t0 = Instant::now();
        arbiter.sim_packet_arrived(t0);
        assert_eq!(arbiter.tick(t0 + secs(5)), None);
        assert_eq!(arbiter.tick(t0 + secs(10)), None);
        assert_eq!(
            arbiter.tick(t0 + secs(10) + Duration::from_millis(1)),
            Some(Transition::ToReal)
        );
        assert_eq!(arbiter.active(), ActiveSource::Real);
    }

    #[test]
    fn steady_sim_traffic_holds_simulated() {
        let mut arbiter = FailoverArbiter::new(secs(10));
        let t0 = Instant::now();
        for step in 0..20 {
            let now = t0 + secs(9 * step);
            let transition = arbiter.sim_packet_arrived(now);
            if step == 0 {
                assert_eq!(transition, Some(Transition::ToSimulated));
            } else {
                assert_eq!(transition, None);
            }
            assert_eq!(arbiter.tick(now + secs(8)), None);
            assert_eq!(arbiter.active(), ActiveSource::Simulated);
        }
    }

    #[test]
    fn sim_after_revert_switches_again() {
        let mut arbiter = FailoverArbiter::new(secs(10));
        let t0 = Instant::now();
        arbiter.sim_packet_arrived(t0);
        assert_eq!(arbiter.tick(t0 + secs(12)), Some(Transition::ToReal));
        assert_eq!(
            arbiter.sim_packet_arrived(t0 + secs(12)),
            Some(Transition::ToSimulated)
        );
    }

    #[test]
    fn tick_on_real_is_a_no_op() {
        let mut arbiter = FailoverArbiter::new(secs(10));
        assert_eq!(arbiter.tick(Instant::now() + secs(100)), None);
        assert_eq!(arbiter.active(), ActiveSource::Real);
    }
}
