//! Fixed-interval polling with an optional bound and cancellation
//!
//! Both the GC quiescing wait and the maintenance-mode drain wait are
//! "probe, sleep, probe again" loops. `Poller` owns that loop so the bound
//! arithmetic and cancellation check live in one place.

use crate::clock::Clock;
use crate::errors::{cancelled, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation shared between the interrupt handler and a run
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe reported ready on this attempt
    Ready { attempts: u32 },
    /// The bound ran out before the probe reported ready
    Exhausted { attempts: u32 },
}

/// Probe at a fixed interval, up to an optional bound
pub struct Poller<'a> {
    op: &'static str,
    interval: Duration,
    bound: Option<Duration>,
    clock: &'a dyn Clock,
    cancel: &'a CancellationFlag,
}

impl<'a> Poller<'a> {
    /// `bound = None` polls until the probe succeeds or the run is cancelled
    pub fn new(
        op: &'static str,
        interval: Duration,
        bound: Option<Duration>,
        clock: &'a dyn Clock,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            op,
            interval,
            bound,
            clock,
            cancel,
        }
    }

    /// Number of probes the bound allows, `None` when unbounded
    ///
    /// A 60s bound at a 1s interval allows 60 probes.
    pub fn max_attempts(&self) -> Option<u32> {
        self.bound.map(|bound| {
            let interval_ms = self.interval.as_millis();
            if interval_ms == 0 {
                return 1;
            }
            let attempts = bound.as_millis().div_ceil(interval_ms);
            u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
        })
    }

    /// Run `probe` until it returns `true`, the bound runs out, or the run
    /// is cancelled
    ///
    /// `probe` receives the 1-based attempt number. Errors from the probe
    /// end the loop immediately.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Cancelled` when the cancellation flag is set
    /// before a probe, or the probe's own error.
    pub fn poll<F>(&self, mut probe: F) -> Result<PollOutcome>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let max = self.max_attempts();
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(cancelled(self.op));
            }
            attempt += 1;
            if probe(attempt)? {
                return Ok(PollOutcome::Ready { attempts: attempt });
            }
            if max.is_some_and(|m| attempt >= m) {
                return Ok(PollOutcome::Exhausted { attempts: attempt });
            }
            tracing::debug!(op = self.op, attempts = attempt, "not ready; waiting");
            self.clock.sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::ExErrorKind;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_max_attempts_from_bound() {
        let clock = clock();
        let cancel = CancellationFlag::new();
        let poller = Poller::new(
            "t",
            Duration::from_secs(1),
            Some(Duration::from_secs(60)),
            &clock,
            &cancel,
        );
        assert_eq!(poller.max_attempts(), Some(60));

        let unbounded = Poller::new("t", Duration::from_secs(5), None, &clock, &cancel);
        assert_eq!(unbounded.max_attempts(), None);
    }

    #[test]
    fn test_ready_on_third_attempt_sleeps_twice() {
        let clock = clock();
        let cancel = CancellationFlag::new();
        let poller = Poller::new("t", Duration::from_secs(5), None, &clock, &cancel);

        let outcome = poller.poll(|attempt| Ok(attempt == 3)).unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempts: 3 });
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn test_exhausted_after_bound() {
        let clock = clock();
        let cancel = CancellationFlag::new();
        let poller = Poller::new(
            "t",
            Duration::from_secs(1),
            Some(Duration::from_secs(3)),
            &clock,
            &cancel,
        );

        let mut probes = 0;
        let outcome = poller
            .poll(|_| {
                probes += 1;
                Ok(false)
            })
            .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 3 });
        assert_eq!(probes, 3);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn test_cancellation_stops_polling() {
        let clock = clock();
        let cancel = CancellationFlag::new();
        let poller = Poller::new("drain", Duration::from_secs(1), None, &clock, &cancel);

        let err = poller
            .poll(|attempt| {
                if attempt == 2 {
                    cancel.cancel();
                }
                Ok(false)
            })
            .unwrap_err();

        assert_eq!(err.kind(), ExErrorKind::Cancelled);
        assert_eq!(err.op(), Some("drain"));
    }
}
