//! Vertical flight-state estimator for a balloon.
//!
//! A linear Kalman filter over `[altitude, velocity, acceleration]` with a white-jerk
//! process model, driven by barometric altitude at irregular intervals. The altitude
//! measurement variance is set from outside every tick. A burner-gain coefficient is
//! tracked beside the kinematic state by a scalar recursive estimate; it never feeds
//! back into the triad, so missing audio data leaves pure barometric tracking.
//!
//! Elapsed times above `max_gap_s` re-anchor the filter at the new observation with
//! zero velocity and acceleration instead of integrating across the gap.

use nalgebra::{Matrix3, RowVector3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    DEFAULT_ACCEL_EPSILON, DEFAULT_BURNER_GAIN_MEASUREMENT_NOISE,
    DEFAULT_BURNER_GAIN_PROCESS_NOISE, DEFAULT_MAX_GAP_SECONDS, DEFAULT_PRIME_DT_SECONDS,
    DEFAULT_PROCESS_NOISE, INITIAL_ACCELERATION_VARIANCE, INITIAL_ALTITUDE_VARIANCE,
    INITIAL_BURNER_GAIN_VARIANCE, INITIAL_VELOCITY_VARIANCE, MIN_MEASUREMENT_VARIANCE,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorTuning {
    /// White-jerk spectral density, m^2/s^5.
    pub process_noise: f64,
    /// Floor for the altitude measurement variance, m^2.
    pub min_measurement_variance: f64,
    /// Gaps longer than this re-anchor the filter, seconds.
    pub max_gap_s: f64,
    /// Tick length of the synthetic priming samples, seconds.
    pub prime_dt_s: f64,
    pub burner_gain_process_noise: f64,
    pub burner_gain_measurement_noise: f64,
    /// Accelerations at or below this magnitude never report deceleration, m/s^2.
    pub accel_epsilon: f64,
}

impl Default for EstimatorTuning {
    fn default() -> Self {
        EstimatorTuning {
            process_noise: DEFAULT_PROCESS_NOISE,
            min_measurement_variance: MIN_MEASUREMENT_VARIANCE,
            max_gap_s: DEFAULT_MAX_GAP_SECONDS,
            prime_dt_s: DEFAULT_PRIME_DT_SECONDS,
            burner_gain_process_noise: DEFAULT_BURNER_GAIN_PROCESS_NOISE,
            burner_gain_measurement_noise: DEFAULT_BURNER_GAIN_MEASUREMENT_NOISE,
            accel_epsilon: DEFAULT_ACCEL_EPSILON,
        }
    }
}

/// Burner activity reported alongside an altitude observation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BurnerSignal {
    pub loudness: f64,
    /// Seconds of burner noise since the previous observation.
    pub duration: f64,
}

impl BurnerSignal {
    pub const NONE: BurnerSignal = BurnerSignal {
        loudness: 0.0,
        duration: 0.0,
    };

    pub fn new(loudness: f64, duration: f64) -> Self {
        BurnerSignal { loudness, duration }
    }

    /// Negative or non-finite components count as no activity.
    pub fn sanitized(self) -> Self {
        let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        BurnerSignal {
            loudness: clean(self.loudness),
            duration: clean(self.duration),
        }
    }

    pub fn is_active(&self) -> bool {
        self.loudness > 0.0 && self.duration > 0.0
    }

    pub fn intensity(&self) -> f64 {
        self.loudness * self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NonPositiveDt,
    NonFiniteInput,
    /// The step produced a non-finite state and was rolled back.
    Diverged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Updated,
    /// First observation or a gap above `max_gap_s`: state reset to the observation.
    Reanchored,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicState {
    pub altitude: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deceleration {
    pub is_decelerating: bool,
    /// Seconds until zero vertical speed; `0.0` when not decelerating.
    pub time_to_zero_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroSpeedAltitude {
    /// Current altitude when the projection is not valid.
    pub altitude: f64,
    pub valid: bool,
}

impl KinematicState {
    /// Velocity and acceleration of opposite sign, with |acceleration| above
    /// `accel_epsilon`. Assumes the acceleration holds until zero speed.
    pub fn deceleration(&self, accel_epsilon: f64) -> Deceleration {
        if self.velocity * self.acceleration < 0.0 && self.acceleration.abs() > accel_epsilon {
            Deceleration {
                is_decelerating: true,
                time_to_zero_speed: -self.velocity / self.acceleration,
            }
        } else {
            Deceleration {
                is_decelerating: false,
                time_to_zero_speed: 0.0,
            }
        }
    }

    pub fn zero_speed_altitude(&self, accel_epsilon: f64) -> ZeroSpeedAltitude {
        let deceleration = self.deceleration(accel_epsilon);
        if !deceleration.is_decelerating {
            return ZeroSpeedAltitude {
                altitude: self.altitude,
                valid: false,
            };
        }
        let t = deceleration.time_to_zero_speed;
        ZeroSpeedAltitude {
            altitude: self.altitude + self.velocity * t + 0.5 * self.acceleration * t * t,
            valid: true,
        }
    }
}

pub struct BalloonEstimator {
    x: Vector3<f64>, // altitude, velocity, acceleration
    p: Matrix3<f64>,
    measurement_variance: f64,
    burner_gain: f64,
    burner_gain_variance: f64,
    anchored: bool,
    tuning: EstimatorTuning,
}

impl BalloonEstimator {
    pub fn new(tuning: EstimatorTuning) -> Self {
        BalloonEstimator {
            x: Vector3::zeros(),
            p: initial_covariance(),
            measurement_variance: 0.0,
            burner_gain: 0.0,
            burner_gain_variance: INITIAL_BURNER_GAIN_VARIANCE,
            anchored: false,
            tuning,
        }
    }

    pub fn tuning(&self) -> &EstimatorTuning {
        &self.tuning
    }

    /// Takes effect on the next update; the state is untouched.
    pub fn set_tuning(&mut self, tuning: EstimatorTuning) {
        self.tuning = tuning;
    }

    /// Negative or non-finite values are ignored.
    pub fn set_measurement_variance(&mut self, variance: f64) {
        if variance.is_finite() && variance >= 0.0 {
            self.measurement_variance = variance;
        } else {
            debug!(variance, "ignoring invalid measurement variance");
        }
    }

    pub fn measurement_variance(&self) -> f64 {
        self.measurement_variance
    }

    pub fn update(&mut self, dt: f64, altitude: f64) -> UpdateStatus {
        self.update_with_burner(dt, altitude, BurnerSignal::NONE)
    }

    pub fn update_with_burner(
        &mut self,
        dt: f64,
        altitude: f64,
        burner: BurnerSignal,
    ) -> UpdateStatus {
        if !dt.is_finite() || !altitude.is_finite() {
            return UpdateStatus::Skipped(SkipReason::NonFiniteInput);
        }
        if dt <= 0.0 {
            return UpdateStatus::Skipped(SkipReason::NonPositiveDt);
        }
        if !self.anchored || dt > self.tuning.max_gap_s {
            self.reanchor(altitude);
            return UpdateStatus::Reanchored;
        }

        let (x_prior, p_prior) = (self.x, self.p);
        let acceleration_before = self.x[2];
        self.predict(dt);
        self.correct(altitude);
        if !self.is_finite() {
            self.x = x_prior;
            self.p = p_prior;
            debug!(dt, altitude, "rolled back non-finite filter step");
            return UpdateStatus::Skipped(SkipReason::Diverged);
        }

        let burner = burner.sanitized();
        if burner.is_active() {
            self.update_burner_gain(burner.intensity(), self.x[2] - acceleration_before);
        }
        UpdateStatus::Updated
    }

    /// Resets the kinematic state to `altitude` at rest. The burner gain is kept.
    pub fn reanchor(&mut self, altitude: f64) {
        if !altitude.is_finite() {
            return;
        }
        self.x = Vector3::new(altitude, 0.0, 0.0);
        self.p = initial_covariance();
        self.anchored = true;
    }

    /// Re-anchors at `altitude` and runs `ticks` synthetic observations of it, so a new
    /// session shows a settled state before live data arrives.
    pub fn prime(&mut self, altitude: f64, ticks: usize) {
        if !altitude.is_finite() {
            return;
        }
        self.reanchor(altitude);
        for _ in 0..ticks {
            self.update(self.tuning.prime_dt_s, altitude);
        }
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn altitude(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    pub fn acceleration(&self) -> f64 {
        self.x[2]
    }

    pub fn burner_gain(&self) -> f64 {
        self.burner_gain
    }

    pub fn state(&self) -> KinematicState {
        KinematicState {
            altitude: self.x[0],
            velocity: self.x[1],
            acceleration: self.x[2],
        }
    }

    #[cfg(test)]
    fn std_devs(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.p[(i, i)].max(0.0).sqrt())
    }

    pub fn is_decelerating(&self) -> Deceleration {
        self.state().deceleration(self.tuning.accel_epsilon)
    }

    pub fn zero_speed_altitude(&self) -> ZeroSpeedAltitude {
        self.state().zero_speed_altitude(self.tuning.accel_epsilon)
    }

    fn predict(&mut self, dt: f64) {
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        let dt5 = dt4 * dt;

        let f = Matrix3::new(
            1.0, dt, 0.5 * dt2, //
            0.0, 1.0, dt, //
            0.0, 0.0, 1.0,
        );
        let q = Matrix3::new(
            dt5 / 20.0, dt4 / 8.0, dt3 / 6.0, //
            dt4 / 8.0, dt3 / 3.0, dt2 / 2.0, //
            dt3 / 6.0, dt2 / 2.0, dt,
        ) * self.tuning.process_noise;

        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + q;
    }

    fn correct(&mut self, altitude: f64) {
        let r = self
            .measurement_variance
            .max(self.tuning.min_measurement_variance);
        let h = RowVector3::new(1.0, 0.0, 0.0);

        let innovation = altitude - self.x[0];
        let s = self.p[(0, 0)] + r;
        let k: Vector3<f64> = self.p.column(0).into_owned() / s;

        self.x += k * innovation;

        // Joseph form keeps P positive semi-definite.
        let i_kh = Matrix3::identity() - k * h;
        self.p = i_kh * self.p * i_kh.transpose() + k * k.transpose() * r;
        self.p = 0.5 * (self.p + self.p.transpose());
    }

    fn update_burner_gain(&mut self, intensity: f64, acceleration_change: f64) {
        let gain_before = (self.burner_gain, self.burner_gain_variance);
        self.burner_gain_variance += self.tuning.burner_gain_process_noise;
        let s = intensity * intensity * self.burner_gain_variance
            + self.tuning.burner_gain_measurement_noise;
        let k = self.burner_gain_variance * intensity / s;
        self.burner_gain += k * (acceleration_change - self.burner_gain * intensity);
        self.burner_gain_variance *= 1.0 - k * intensity;

        if !self.burner_gain.is_finite() || !self.burner_gain_variance.is_finite() {
            (self.burner_gain, self.burner_gain_variance) = gain_before;
        }
    }

    fn is_finite(&self) -> bool {
        self.x.iter().all(|v| v.is_finite()) && self.p.iter().all(|v| v.is_finite())
    }
}

impl Default for BalloonEstimator {
    fn default() -> Self {
        BalloonEstimator::new(EstimatorTuning::default())
    }
}

fn initial_covariance() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(
        INITIAL_ALTITUDE_VARIANCE,
        INITIAL_VELOCITY_VARIANCE,
        INITIAL_ACCELERATION_VARIANCE,
    ))
}
