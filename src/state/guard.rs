//! Single-flight guard for jobs that must never run concurrently.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lock-free guard ensuring at most one run of a job is in flight.
///
/// Acquisition never waits: a second caller is told to skip, matching the
/// overlap rule for the sync and materialization jobs. The permit releases
/// the guard when dropped, so early returns and errors cannot leave it held.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    /// Guard with no run in flight.
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Try to claim the guard, returning `None` when a run is already in
    /// flight.
    pub fn try_acquire(&self) -> Option<FlightPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit { guard: self })
    }

    /// Whether a run currently holds the guard.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of an exclusive run, releasing the guard on drop.
#[derive(Debug)]
pub struct FlightPermit<'a> {
    guard: &'a SingleFlight,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_while_held() {
        let flight = SingleFlight::new();
        let permit = flight.try_acquire();
        assert!(permit.is_some());
        assert!(flight.is_busy());
        assert!(flight.try_acquire().is_none());
        drop(permit);
        assert!(!flight.is_busy());
        assert!(flight.try_acquire().is_some());
    }

    #[test]
    fn permit_releases_on_early_exit() {
        let flight = SingleFlight::new();
        {
            let _permit = flight.try_acquire().unwrap();
        }
        assert!(!flight.is_busy());
    }
}
