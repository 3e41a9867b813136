//! Request-weight budget over a rolling minute
//!
//! The tracker never sleeps or looks at a clock: the caller passes `now` and
//! decides what to do with a denial. That keeps it deterministic under test
//! with fabricated instants and keeps blocking policy out of this layer.

use std::time::{Duration, Instant};

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The weight was charged to the current window.
    Granted,
    /// Granting would exceed the ceiling; retry after the hint elapses.
    Denied { retry_after: Duration },
}

/// Weight consumed against a provider ceiling within a rolling window.
#[derive(Debug)]
pub struct RateBudget {
    weight_limit: u32,
    window: Duration,
    window_start: Option<Instant>,
    weight_used: u32,
}

impl RateBudget {
    /// Standard one-minute window.
    pub fn new(weight_limit: u32) -> Self {
        Self::with_window(weight_limit, Duration::from_secs(60))
    }

    pub fn with_window(weight_limit: u32, window: Duration) -> Self {
        Self {
            weight_limit,
            window,
            window_start: None,
            weight_used: 0,
        }
    }

    /// Try to charge `weight` against the window containing `now`.
    ///
    /// A request heavier than the entire ceiling is granted into a fresh
    /// window rather than denied forever; the window absorbs the overrun.
    pub fn reserve(&mut self, weight: u32, now: Instant) -> Reservation {
        let window_elapsed = self
            .window_start
            .map(|start| now.saturating_duration_since(start));
        let stale = match window_elapsed {
            Some(elapsed) => elapsed >= self.window,
            None => true,
        };
        if stale {
            self.window_start = Some(now);
            self.weight_used = 0;
        }

        let would_use = self.weight_used.saturating_add(weight);
        if would_use <= self.weight_limit || self.weight_used == 0 {
            self.weight_used = would_use;
            return Reservation::Granted;
        }

        let elapsed = window_elapsed.unwrap_or(Duration::ZERO);
        Reservation::Denied {
            retry_after: self.window.saturating_sub(elapsed),
        }
    }

    /// Weight charged to the current window.
    pub fn weight_used(&self) -> u32 {
        self.weight_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_until_the_ceiling() {
        let mut budget = RateBudget::new(10);
        let t0 = Instant::now();
        assert_eq!(budget.reserve(4, t0), Reservation::Granted);
        assert_eq!(budget.reserve(6, t0), Reservation::Granted);
        assert_eq!(budget.weight_used(), 10);

        match budget.reserve(1, t0) {
            Reservation::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            Reservation::Granted => panic!("eleventh weight unit must be denied"),
        }
    }

    #[test]
    fn wait_hint_shrinks_as_the_window_ages() {
        let mut budget = RateBudget::new(5);
        let t0 = Instant::now();
        assert_eq!(budget.reserve(5, t0), Reservation::Granted);

        let t1 = t0 + Duration::from_secs(45);
        match budget.reserve(1, t1) {
            Reservation::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(15));
            }
            Reservation::Granted => panic!("budget is exhausted"),
        }
    }

    #[test]
    fn window_rolls_over() {
        let mut budget = RateBudget::new(5);
        let t0 = Instant::now();
        assert_eq!(budget.reserve(5, t0), Reservation::Granted);

        let t1 = t0 + Duration::from_secs(60);
        assert_eq!(budget.reserve(5, t1), Reservation::Granted);
        assert_eq!(budget.weight_used(), 5);
    }

    #[test]
    fn oversized_request_passes_on_a_fresh_window() {
        let mut budget = RateBudget::new(10);
        let t0 = Instant::now();
        assert_eq!(budget.reserve(25, t0), Reservation::Granted);
        // But the overrun blocks everything else until the window rolls.
        assert!(matches!(
            budget.reserve(1, t0),
            Reservation::Denied { .. }
        ));
    }

    #[test]
    fn deterministic_with_fabricated_instants() {
        let mut budget = RateBudget::with_window(100, Duration::from_secs(10));
        let t0 = Instant::now();
        for step in 0..50u64 {
            let now = t0 + Duration::from_millis(step * 400);
            assert_eq!(budget.reserve(2, now), Reservation::Granted);
        }
    }
}
