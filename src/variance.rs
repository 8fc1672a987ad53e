//! Online variance estimators over a scalar stream.
//!
//! All three estimators report population variance and are zero before the first
//! `push` and after `clear`. The fixed-window variant drives the adaptive measurement
//! noise of the estimator; the other two trade responsiveness for smoothness.

use fixed_deque::Deque;

use crate::constants::DEFAULT_EWMV_ALPHA;
use crate::error::ConfigError;

pub trait VarianceEstimator {
    fn push(&mut self, x: f64);
    fn mean(&self) -> f64;
    fn variance(&self) -> f64;
    /// Number of samples pushed since construction or the last `clear`.
    fn count(&self) -> usize;
    fn clear(&mut self);

    fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Population variance over the last `capacity` pushed values.
///
/// The capacity is fixed for the life of the window. Resizing means building a new
/// window, which starts empty.
pub struct WindowVariance {
    samples: Deque<f64>,
    capacity: usize,
    pushed: usize,
    mean: f64,
    variance: f64,
}

impl WindowVariance {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        WindowVariance {
            samples: Deque::new(capacity),
            capacity,
            pushed: 0,
            mean: 0.0,
            variance: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently held, at most `capacity`.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.len() == 0
    }

    fn recompute(&mut self) {
        let n = self.samples.len();
        if n == 0 {
            self.mean = 0.0;
            self.variance = 0.0;
            return;
        }
        let mean = self.samples.iter().sum::<f64>() / n as f64;
        self.mean = mean;
        self.variance = if n < 2 {
            0.0
        } else {
            let sum_sq = self
                .samples
                .iter()
                .map(|x| (x - mean) * (x - mean))
                .sum::<f64>();
            (sum_sq / n as f64).max(0.0)
        };
    }
}

impl VarianceEstimator for WindowVariance {
    fn push(&mut self, x: f64) {
        // Deque evicts the oldest sample once full.
        self.samples.push_back(x);
        self.pushed += 1;
        self.recompute();
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn variance(&self) -> f64 {
        self.variance
    }

    fn count(&self) -> usize {
        self.pushed
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.pushed = 0;
        self.mean = 0.0;
        self.variance = 0.0;
    }
}

/// Exact variance over an unbounded stream (Welford).
#[derive(Debug, Clone, Default)]
pub struct RunningVariance {
    n: usize,
    mean: f64,
    m2: f64, // sum of (x - mean_old)(x - mean_new)
}

impl RunningVariance {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VarianceEstimator for RunningVariance {
    fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn variance(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            (self.m2 / self.n as f64).max(0.0)
        }
    }

    fn count(&self) -> usize {
        self.n
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Exponentially-weighted moving variance.
///
/// `alpha` is the weight on new data: higher reacts faster, lower is smoother.
#[derive(Debug, Clone)]
pub struct ExponentialWeightedVariance {
    alpha: f64,
    mean: f64,
    variance: f64,
    count: usize,
}

impl ExponentialWeightedVariance {
    pub fn new(alpha: f64) -> Result<Self, ConfigError> {
        check_alpha(alpha)?;
        Ok(ExponentialWeightedVariance {
            alpha,
            mean: 0.0,
            variance: 0.0,
            count: 0,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Takes effect from the next `push`; accumulated statistics are kept.
    pub fn set_alpha(&mut self, alpha: f64) -> Result<(), ConfigError> {
        check_alpha(alpha)?;
        self.alpha = alpha;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.count > 0
    }
}

impl Default for ExponentialWeightedVariance {
    fn default() -> Self {
        ExponentialWeightedVariance {
            alpha: DEFAULT_EWMV_ALPHA,
            mean: 0.0,
            variance: 0.0,
            count: 0,
        }
    }
}

fn check_alpha(alpha: f64) -> Result<(), ConfigError> {
    if alpha > 0.0 && alpha <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Alpha(alpha))
    }
}

impl VarianceEstimator for ExponentialWeightedVariance {
    fn push(&mut self, x: f64) {
        let diff = x - self.mean;
        let incr = self.alpha * diff;
        self.mean += incr;
        self.variance = ((1.0 - self.alpha) * (self.variance + diff * incr)).max(0.0);
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn variance(&self) -> f64 {
        self.variance
    }

    fn count(&self) -> usize {
        self.count
    }

    fn clear(&mut self) {
        self.mean = 0.0;
        self.variance = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn population_variance(data: &[f64]) -> f64 {
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64
    }

    #[test]
    fn empty_estimators_report_zero() {
        let window = WindowVariance::new(5);
        let running = RunningVariance::new();
        let ewmv = ExponentialWeightedVariance::default();
        assert_eq!(window.variance(), 0.0);
        assert_eq!(running.variance(), 0.0);
        assert_eq!(ewmv.variance(), 0.0);
        assert_eq!(window.standard_deviation(), 0.0);
    }

    #[test]
    fn single_sample_has_zero_variance() {
        let mut window = WindowVariance::new(5);
        window.push(42.0);
        assert_eq!(window.mean(), 42.0);
        assert_eq!(window.variance(), 0.0);

        let mut running = RunningVariance::new();
        running.push(42.0);
        assert_eq!(running.variance(), 0.0);
    }

    #[test]
    fn window_matches_population_variance() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0];
        let mut window = WindowVariance::new(data.len());
        for x in data {
            window.push(x);
        }
        assert_relative_eq!(window.mean(), 3.8, epsilon = 1e-12);
        assert_abs_diff_eq!(window.variance(), population_variance(&data), epsilon = 1e-9);
    }

    #[test]
    fn window_evicts_oldest_sample() {
        let mut window = WindowVariance::new(3);
        for x in [100.0, 1.0, 2.0, 3.0] {
            window.push(x);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.count(), 4);
        assert_relative_eq!(window.mean(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(window.variance(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut window = WindowVariance::new(0);
        assert_eq!(window.capacity(), 1);
        window.push(1.0);
        window.push(9.0);
        assert_eq!(window.mean(), 9.0);
        assert_eq!(window.variance(), 0.0);
    }

    #[test]
    fn running_matches_hand_calc() {
        let mut running = RunningVariance::new();
        for x in [1.0, 2.0, 3.0, 4.0] {
            running.push(x);
        }
        assert_relative_eq!(running.mean(), 2.5, epsilon = 1e-12);
        assert_relative_eq!(running.variance(), 1.25, epsilon = 1e-12);
    }

    #[test]
    fn running_is_stable_with_large_offset() {
        let mut running = RunningVariance::new();
        let data: Vec<f64> = (0..1000).map(|i| 1e9 + (i % 10) as f64).collect();
        for &x in &data {
            running.push(x);
        }
        assert_relative_eq!(running.variance(), 8.25, epsilon = 1e-6);
    }

    #[test]
    fn ewmv_follows_update_rule() {
        let mut ewmv = ExponentialWeightedVariance::new(0.5).unwrap();
        ewmv.push(2.0);
        // diff = 2, incr = 1, mean = 1, var = 0.5 * (0 + 2 * 1)
        assert_relative_eq!(ewmv.mean(), 1.0);
        assert_relative_eq!(ewmv.variance(), 1.0);
        ewmv.push(1.0);
        // diff = 0, mean unchanged, var = 0.5 * 1
        assert_relative_eq!(ewmv.mean(), 1.0);
        assert_relative_eq!(ewmv.variance(), 0.5);
        assert_eq!(ewmv.count(), 2);
        assert!(ewmv.is_initialized());
    }

    #[test]
    fn ewmv_rejects_alpha_outside_unit_interval() {
        assert!(ExponentialWeightedVariance::new(0.0).is_err());
        assert!(ExponentialWeightedVariance::new(1.5).is_err());
        assert!(ExponentialWeightedVariance::new(f64::NAN).is_err());

        let mut ewmv = ExponentialWeightedVariance::new(1.0).unwrap();
        assert!(ewmv.set_alpha(-0.1).is_err());
        assert_eq!(ewmv.alpha(), 1.0);
        ewmv.set_alpha(0.25).unwrap();
        assert_eq!(ewmv.alpha(), 0.25);
    }

    #[test]
    fn clear_resets_every_variant() {
        let mut estimators: Vec<Box<dyn VarianceEstimator>> = vec![
            Box::new(WindowVariance::new(4)),
            Box::new(RunningVariance::new()),
            Box::new(ExponentialWeightedVariance::default()),
        ];
        for estimator in estimators.iter_mut() {
            for x in [3.0, -1.0, 8.0, 0.5] {
                estimator.push(x);
            }
            assert!(estimator.variance() > 0.0);
            estimator.clear();
            assert_eq!(estimator.variance(), 0.0);
            assert_eq!(estimator.mean(), 0.0);
            assert_eq!(estimator.count(), 0);
        }
    }
}
