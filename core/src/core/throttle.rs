//! AIMD rate controller for the generator loop.
//!
//! Holds the throttle state and the two adjustment rules. Recovery is additive
//! (a fixed step toward the desired rate, never past it); throttling is
//! multiplicative (the current rate is scaled down by a factor below one), so
//! load is shed faster than it is added back.
//!
//! The controller is owned by the control loop and only ever touched from that
//! task, so it is a plain struct with `&mut self` methods.

use std::time::Duration;

use log::debug;

use crate::error::{GeneratorError, Result};

pub const DEFAULT_RECOVERY_FRACTION: f64 = 0.05;
pub const DEFAULT_THROTTLE_FACTOR: f64 = 0.95;

const MILLIS_PER_SECOND: u32 = 1000;

#[derive(Debug, Clone)]
pub struct RateController {
    batches_per_second: u32,
    desired_rate: u32,
    current_rate: u32,
    batch_size: u32,
    max_outstanding: usize,
    recovery_step: u32,
    throttle_factor: f64,
}

impl RateController {
    /// Builds a controller with the default recovery fraction and throttle factor.
    pub fn new(batches_per_second: u32, desired_rate: u32, max_outstanding: usize) -> Result<Self> {
        Self::with_tuning(
            batches_per_second,
            desired_rate,
            max_outstanding,
            DEFAULT_RECOVERY_FRACTION,
            DEFAULT_THROTTLE_FACTOR,
        )
    }

    /// Builds a controller starting at `desired_rate`.
    ///
    /// `recovery_fraction` is the share of `desired_rate` added back per
    /// recovery step and `throttle_factor` the multiplier applied on overload;
    /// both must lie in `(0, 1]`.
    pub fn with_tuning(
        batches_per_second: u32,
        desired_rate: u32,
        max_outstanding: usize,
        recovery_fraction: f64,
        throttle_factor: f64,
    ) -> Result<Self> {
        if batches_per_second == 0 {
            return Err(GeneratorError::invalid("batches per second must be positive"));
        }
        if desired_rate == 0 {
            return Err(GeneratorError::invalid("desired rate must be positive"));
        }
        if max_outstanding == 0 {
            return Err(GeneratorError::invalid("max outstanding requests must be positive"));
        }
        if !in_unit_interval(recovery_fraction) {
            return Err(GeneratorError::invalid(format!(
                "recovery fraction must be in (0, 1], got {}",
                recovery_fraction
            )));
        }
        if !in_unit_interval(throttle_factor) {
            return Err(GeneratorError::invalid(format!(
                "throttle factor must be in (0, 1], got {}",
                throttle_factor
            )));
        }

        // Truncated share of the desired rate, clamped to at least 1. Below
        // 1 / fraction (20 req/s at 5%) the bare truncation is 0 and a deep
        // throttle would pin the rate at zero.
        let recovery_step = ((f64::from(desired_rate) * recovery_fraction) as u32).max(1);

        let mut controller = Self {
            batches_per_second,
            desired_rate,
            current_rate: desired_rate,
            batch_size: 0,
            max_outstanding,
            recovery_step,
            throttle_factor,
        };
        controller.update_batch_size();
        Ok(controller)
    }

    /// Adds one recovery step when below the desired rate and under the ceiling.
    /// Returns true if the rate changed.
    pub fn recover_if_stable(&mut self, active: usize) -> bool {
        if self.current_rate >= self.desired_rate || active > self.max_outstanding {
            return false;
        }

        let previous = self.current_rate;
        self.current_rate = self
            .current_rate
            .saturating_add(self.recovery_step)
            .min(self.desired_rate);
        self.update_batch_size();

        debug!(
            "Recovered rate {} -> {} req/s (active: {}, batch: {})",
            previous, self.current_rate, active, self.batch_size
        );
        true
    }

    /// Scales the rate down when the next batch would exceed the ceiling.
    /// Returns true if the throttle fired.
    pub fn throttle_if_overloaded(&mut self, active: usize) -> bool {
        if active.saturating_add(self.batch_size as usize) <= self.max_outstanding {
            return false;
        }

        let previous = self.current_rate;
        self.current_rate = (f64::from(self.current_rate) * self.throttle_factor) as u32;
        self.update_batch_size();

        debug!(
            "Throttled rate {} -> {} req/s (active: {}, ceiling: {})",
            previous, self.current_rate, active, self.max_outstanding
        );
        true
    }

    /// Pause between cycles derived from the current rate and batch size.
    ///
    /// Uses whole milliseconds per request times the batch size,
    /// `(1000 / rate) * batch`. Where that formula yields zero (batch of zero,
    /// or more than 1000 req/s) this deliberately departs from it and returns
    /// the cycle cadence `1000 / batches_per_second` (at least 1 ms) instead of
    /// a zero-length sleep.
    pub fn wait_interval(&self) -> Duration {
        let millis = if self.current_rate == 0 {
            0
        } else {
            (MILLIS_PER_SECOND / self.current_rate) * self.batch_size
        };

        if millis == 0 {
            let cadence = (MILLIS_PER_SECOND / self.batches_per_second).max(1);
            Duration::from_millis(u64::from(cadence))
        } else {
            Duration::from_millis(u64::from(millis))
        }
    }

    pub fn batches_per_second(&self) -> u32 {
        self.batches_per_second
    }

    pub fn desired_rate(&self) -> u32 {
        self.desired_rate
    }

    pub fn current_rate(&self) -> u32 {
        self.current_rate
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn recovery_step(&self) -> u32 {
        self.recovery_step
    }

    pub fn throttle_factor(&self) -> f64 {
        self.throttle_factor
    }

    fn update_batch_size(&mut self) {
        self.batch_size = self.current_rate / self.batches_per_second;
    }
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_batch_consistent(controller: &RateController) {
        assert_eq!(
            controller.batch_size(),
            controller.current_rate() / controller.batches_per_second()
        );
    }

    #[test]
    fn test_initial_batch_size() {
        let controller = RateController::new(20, 200, 1000).unwrap();
        assert_eq!(controller.current_rate(), 200);
        assert_eq!(controller.batch_size(), 10);
    }

    #[test]
    fn test_batch_size_floors_to_zero() {
        let controller = RateController::new(20, 10, 1000).unwrap();
        assert_eq!(controller.batch_size(), 0);
    }

    #[test]
    fn test_rejects_zero_cadence() {
        let err = RateController::new(0, 200, 1000).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rejects_zero_rate_and_ceiling() {
        assert!(RateController::new(20, 0, 1000).is_err());
        assert!(RateController::new(20, 200, 0).is_err());
    }

    #[test]
    fn test_rejects_tuning_outside_unit_interval() {
        assert!(RateController::with_tuning(20, 200, 1000, 0.0, 0.9).is_err());
        assert!(RateController::with_tuning(20, 200, 1000, 0.1, 1.5).is_err());
        assert!(RateController::with_tuning(20, 200, 1000, f64::NAN, 0.9).is_err());
        assert!(RateController::with_tuning(20, 200, 1000, 1.0, 1.0).is_ok());
    }

    #[test]
    fn test_recovery_step_is_fraction_of_desired() {
        let controller = RateController::with_tuning(20, 200, 1000, 0.1, 0.9).unwrap();
        assert_eq!(controller.recovery_step(), 20);

        let controller = RateController::new(20, 200, 1000).unwrap();
        assert_eq!(controller.recovery_step(), 10);
    }

    #[test]
    fn test_recovery_step_never_truncates_to_zero() {
        // 10 * 0.05 truncates to 0
        let controller = RateController::new(20, 10, 1000).unwrap();
        assert_eq!(controller.recovery_step(), 1);

        let controller = RateController::with_tuning(20, 19, 1000, 0.05, 0.9).unwrap();
        assert_eq!(controller.recovery_step(), 1);

        // 20 * 0.05 is exactly 1, no clamp involved
        let controller = RateController::new(20, 20, 1000).unwrap();
        assert_eq!(controller.recovery_step(), 1);
        let controller = RateController::new(20, 40, 1000).unwrap();
        assert_eq!(controller.recovery_step(), 2);
    }

    #[test]
    fn test_throttle_scales_rate() {
        let mut controller = RateController::with_tuning(500, 1000, 2000, 0.1, 0.9).unwrap();
        assert!(controller.throttle_if_overloaded(2000));
        assert_eq!(controller.current_rate(), 900);
        assert_batch_consistent(&controller);
    }

    #[test]
    fn test_throttle_truncates() {
        let mut controller = RateController::with_tuning(10, 20, 30, 0.1, 0.1).unwrap();
        assert!(controller.throttle_if_overloaded(30));
        assert_eq!(controller.current_rate(), 2);
        assert_eq!(controller.batch_size(), 0);
    }

    #[test]
    fn test_throttle_fires_when_next_batch_exceeds_ceiling() {
        let mut controller = RateController::new(20, 200, 100).unwrap();
        assert_eq!(controller.batch_size(), 10);

        assert!(controller.throttle_if_overloaded(98));
        assert_eq!(controller.current_rate(), 190);
        assert_batch_consistent(&controller);
    }

    #[test]
    fn test_throttle_holds_at_ceiling_boundary() {
        let mut controller = RateController::new(20, 200, 100).unwrap();
        assert!(!controller.throttle_if_overloaded(90));
        assert_eq!(controller.current_rate(), 200);
    }

    #[test]
    fn test_recovery_clamps_at_desired_rate() {
        let mut controller = RateController::with_tuning(20, 200, 100, 0.1, 0.95).unwrap();
        controller.throttle_if_overloaded(100);
        assert_eq!(controller.current_rate(), 190);

        assert!(controller.recover_if_stable(0));
        assert_eq!(controller.current_rate(), 200);
        assert_batch_consistent(&controller);
    }

    #[test]
    fn test_recovery_noop_at_desired_rate() {
        let mut controller = RateController::with_tuning(20, 50, 1000, 0.1, 0.9).unwrap();
        assert!(!controller.recover_if_stable(0));
        assert_eq!(controller.current_rate(), 50);
        assert_eq!(controller.batch_size(), 2);
    }

    #[test]
    fn test_recovery_waits_while_over_ceiling() {
        let mut controller = RateController::with_tuning(20, 200, 100, 0.1, 0.5).unwrap();
        controller.throttle_if_overloaded(100);
        assert_eq!(controller.current_rate(), 100);

        assert!(!controller.recover_if_stable(101));
        assert_eq!(controller.current_rate(), 100);

        assert!(controller.recover_if_stable(100));
        assert_eq!(controller.current_rate(), 120);
        assert_batch_consistent(&controller);
    }

    #[test]
    fn test_recovers_from_zero() {
        let mut controller = RateController::with_tuning(20, 10, 5, 0.05, 0.01).unwrap();
        controller.throttle_if_overloaded(10);
        assert_eq!(controller.current_rate(), 0);

        assert!(controller.recover_if_stable(0));
        assert_eq!(controller.current_rate(), 1);
    }

    #[test]
    fn test_wait_interval_from_rate_and_batch() {
        let controller = RateController::new(20, 200, 1000).unwrap();
        assert_eq!(controller.wait_interval(), Duration::from_millis(50));

        let controller = RateController::new(20, 50, 1000).unwrap();
        assert_eq!(controller.wait_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_wait_interval_falls_back_to_cadence() {
        // batch of zero
        let controller = RateController::new(20, 10, 1000).unwrap();
        assert_eq!(controller.wait_interval(), Duration::from_millis(50));

        // more than one request per millisecond
        let controller = RateController::new(10, 5000, 10_000).unwrap();
        assert_eq!(controller.wait_interval(), Duration::from_millis(100));

        // cadence itself below one millisecond
        let controller = RateController::new(2000, 4000, 10_000).unwrap();
        assert_eq!(controller.wait_interval(), Duration::from_millis(1));
    }
}
