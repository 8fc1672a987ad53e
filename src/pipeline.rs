//! Drives the estimator from raw pressure samples and publishes decimated state.

use tracing::{debug, info, warn};

use crate::altitude::{
    ReferencedAltitude, altitude_by_pressure, isa_to_qnh_altitude, reference_altitude,
};
use crate::config::{PipelineConfig, check_decimation, check_qnh, check_tuning, check_window};
use crate::constants::{CI95_Z, ISA_REFERENCE_PRESSURE_HPA};
use crate::error::ConfigError;
use crate::estimator::{BalloonEstimator, BurnerSignal, EstimatorTuning, UpdateStatus};
use crate::rate::SampleRate;
use crate::variance::{VarianceEstimator, WindowVariance};

/// One barometer reading, optionally with burner activity from the audio detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSample {
    pub pressure_hpa: f64,
    /// Seconds since the epoch.
    pub timestamp: f64,
    pub burner: BurnerSignal,
}

impl PressureSample {
    pub fn new(pressure_hpa: f64, timestamp: f64) -> Self {
        PressureSample {
            pressure_hpa,
            timestamp,
            burner: BurnerSignal::NONE,
        }
    }

    pub fn with_burner(mut self, loudness: f64, duration: f64) -> Self {
        self.burner = BurnerSignal::new(loudness, duration);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    /// Two-sided 95% interval around `estimate`.
    pub fn ci95(estimate: f64, std_dev: f64) -> Self {
        Interval {
            lower: estimate - CI95_Z * std_dev,
            upper: estimate + CI95_Z * std_dev,
        }
    }
}

/// Snapshot handed to consumers at the decimated rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishedState {
    pub timestamp: f64,
    /// Filtered ISA altitude.
    pub altitude_m: f64,
    pub altitude_qnh_m: f64,
    pub display_altitude: ReferencedAltitude,
    /// Unfiltered ISA altitude of the latest accepted sample.
    pub raw_altitude_m: f64,
    /// Altitude window variance currently trusted by the filter.
    pub measurement_variance: f64,
    pub vertical_speed_mps: f64,
    pub vertical_accel_mps2: f64,
    pub burner_gain: f64,
    pub is_decelerating: bool,
    pub time_to_zero_speed_s: f64,
    pub zero_speed_altitude_m: f64,
    pub zero_speed_valid: bool,
    pub vspeed_std_dev: f64,
    pub vaccel_std_dev: f64,
    pub vspeed_ci95: Interval,
    pub vaccel_ci95: Interval,
    pub sample_rate_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidPressure,
    InvalidTimestamp,
    /// Timestamp at or before the previous accepted sample.
    NonMonotonicTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Rejected(RejectReason),
    /// First sample of the session: reference time recorded, filter untouched.
    Anchored,
    /// Filter advanced; nothing published this tick.
    Filtered,
    Published(PublishedState),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub samples: u64,
    pub filtered: u64,
    pub published: u64,
    pub rejected_invalid_pressure: u64,
    pub rejected_invalid_timestamp: u64,
    pub rejected_non_monotonic: u64,
    pub reanchored: u64,
    pub estimator_skips: u64,
}

impl SessionStats {
    pub fn rejected(&self) -> u64 {
        self.rejected_invalid_pressure
            + self.rejected_invalid_timestamp
            + self.rejected_non_monotonic
    }
}

/// Per-session state: one estimator, its three variance windows, the reference
/// timestamp and the decimation counter. Sessions share nothing.
pub struct SamplePipeline {
    config: PipelineConfig,
    estimator: BalloonEstimator,
    altitude_window: WindowVariance,
    vspeed_window: WindowVariance,
    vaccel_window: WindowVariance,
    previous_timestamp: Option<f64>,
    raw_altitude: Option<f64>,
    decimation_counter: usize,
    rate: SampleRate,
    latest: Option<PublishedState>,
    stats: SessionStats,
}

impl SamplePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(SamplePipeline {
            estimator: BalloonEstimator::new(config.estimator),
            altitude_window: WindowVariance::new(config.altitude_window),
            vspeed_window: WindowVariance::new(config.vspeed_window),
            vaccel_window: WindowVariance::new(config.vaccel_window),
            config,
            previous_timestamp: None,
            raw_altitude: None,
            decimation_counter: 0,
            rate: SampleRate::new(),
            latest: None,
            stats: SessionStats::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &BalloonEstimator {
        &self.estimator
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Latest published state, if anything has been published yet.
    pub fn latest(&self) -> Option<&PublishedState> {
        self.latest.as_ref()
    }

    pub fn previous_timestamp(&self) -> Option<f64> {
        self.previous_timestamp
    }

    pub fn vspeed_std_dev(&self) -> f64 {
        self.vspeed_window.standard_deviation()
    }

    pub fn vaccel_std_dev(&self) -> f64 {
        self.vaccel_window.standard_deviation()
    }

    pub fn process_sample(&mut self, sample: &PressureSample) -> SampleOutcome {
        self.stats.samples += 1;

        let Some(altitude) =
            altitude_by_pressure(sample.pressure_hpa, Some(ISA_REFERENCE_PRESSURE_HPA))
        else {
            self.stats.rejected_invalid_pressure += 1;
            debug!(pressure = sample.pressure_hpa, "dropping sample with invalid pressure");
            return SampleOutcome::Rejected(RejectReason::InvalidPressure);
        };
        if !sample.timestamp.is_finite() {
            self.stats.rejected_invalid_timestamp += 1;
            debug!(timestamp = sample.timestamp, "dropping sample with invalid timestamp");
            return SampleOutcome::Rejected(RejectReason::InvalidTimestamp);
        }

        let Some(previous) = self.previous_timestamp else {
            self.previous_timestamp = Some(sample.timestamp);
            self.raw_altitude = Some(altitude);
            self.rate.push(sample.timestamp);
            info!(altitude, timestamp = sample.timestamp, "session anchored on first sample");
            return SampleOutcome::Anchored;
        };

        let dt = sample.timestamp - previous;
        if dt <= 0.0 {
            self.stats.rejected_non_monotonic += 1;
            debug!(dt, timestamp = sample.timestamp, "dropping out-of-order sample");
            return SampleOutcome::Rejected(RejectReason::NonMonotonicTimestamp);
        }

        self.raw_altitude = Some(altitude);
        self.rate.push(sample.timestamp);
        match self.ingest(dt, altitude, sample.burner) {
            UpdateStatus::Updated => {}
            UpdateStatus::Reanchored => {
                self.stats.reanchored += 1;
                info!(dt, altitude, "estimator re-anchored");
            }
            UpdateStatus::Skipped(reason) => {
                self.stats.estimator_skips += 1;
                warn!(?reason, dt, altitude, "estimator skipped sample");
            }
        }
        self.previous_timestamp = Some(sample.timestamp);
        self.stats.filtered += 1;

        self.decimation_counter += 1;
        if self.decimation_counter >= self.config.decimation {
            self.decimation_counter = 0;
            SampleOutcome::Published(self.publish(sample.timestamp))
        } else {
            SampleOutcome::Filtered
        }
    }

    /// Settles the filter at `altitude` with one synthetic tick per altitude-window
    /// sample, then publishes.
    pub fn prime(&mut self, altitude: f64) -> Option<PublishedState> {
        if !altitude.is_finite() {
            warn!(altitude, "refusing to prime with non-finite altitude");
            return None;
        }
        self.estimator.reanchor(altitude);
        let dt = self.estimator.tuning().prime_dt_s;
        for _ in 0..self.config.altitude_window {
            self.ingest(dt, altitude, BurnerSignal::NONE);
        }
        self.raw_altitude = Some(altitude);
        info!(altitude, ticks = self.config.altitude_window, "estimator primed");
        let timestamp = self.previous_timestamp.unwrap_or(0.0);
        Some(self.publish(timestamp))
    }

    /// Resizes all three windows at once.
    pub fn set_window_size(&mut self, samples: usize) -> Result<(), ConfigError> {
        check_window("altitude", samples)?;
        self.set_altitude_window(samples)?;
        self.set_vspeed_window(samples)?;
        self.set_vaccel_window(samples)
    }

    pub fn set_altitude_window(&mut self, samples: usize) -> Result<(), ConfigError> {
        check_window("altitude", samples).inspect_err(|e| warn!(%e, "rejected configuration"))?;
        self.config.altitude_window = samples;
        self.altitude_window = WindowVariance::new(samples);
        info!(samples, "altitude window rebuilt");
        Ok(())
    }

    pub fn set_vspeed_window(&mut self, samples: usize) -> Result<(), ConfigError> {
        check_window("vspeed", samples).inspect_err(|e| warn!(%e, "rejected configuration"))?;
        self.config.vspeed_window = samples;
        self.vspeed_window = WindowVariance::new(samples);
        info!(samples, "vspeed window rebuilt");
        Ok(())
    }

    pub fn set_vaccel_window(&mut self, samples: usize) -> Result<(), ConfigError> {
        check_window("vaccel", samples).inspect_err(|e| warn!(%e, "rejected configuration"))?;
        self.config.vaccel_window = samples;
        self.vaccel_window = WindowVariance::new(samples);
        info!(samples, "vaccel window rebuilt");
        Ok(())
    }

    /// Restarts the decimation count.
    pub fn set_decimation(&mut self, factor: usize) -> Result<(), ConfigError> {
        check_decimation(factor).inspect_err(|e| warn!(%e, "rejected configuration"))?;
        self.config.decimation = factor;
        self.decimation_counter = 0;
        info!(factor, "decimation changed");
        Ok(())
    }

    pub fn set_qnh(&mut self, qnh_hpa: f64) -> Result<(), ConfigError> {
        check_qnh(qnh_hpa).inspect_err(|e| warn!(%e, "rejected configuration"))?;
        self.config.qnh_hpa = qnh_hpa;
        Ok(())
    }

    pub fn set_estimator_tuning(&mut self, tuning: EstimatorTuning) -> Result<(), ConfigError> {
        check_tuning(&tuning).inspect_err(|e| warn!(%e, "rejected configuration"))?;
        self.config.estimator = tuning;
        self.estimator.set_tuning(tuning);
        Ok(())
    }

    fn ingest(&mut self, dt: f64, altitude: f64, burner: BurnerSignal) -> UpdateStatus {
        self.altitude_window.push(altitude);
        self.estimator
            .set_measurement_variance(self.altitude_window.variance());
        let status = self.estimator.update_with_burner(dt, altitude, burner);
        if status == UpdateStatus::Reanchored {
            // Spread from before the anchor says nothing about the new reference.
            self.altitude_window.clear();
            self.vspeed_window.clear();
            self.vaccel_window.clear();
            self.altitude_window.push(altitude);
            self.estimator
                .set_measurement_variance(self.altitude_window.variance());
        }
        self.vspeed_window.push(self.estimator.velocity());
        self.vaccel_window.push(self.estimator.acceleration());
        status
    }

    fn publish(&mut self, timestamp: f64) -> PublishedState {
        let estimator = &self.estimator;
        let altitude = estimator.altitude();
        let velocity = estimator.velocity();
        let acceleration = estimator.acceleration();
        let deceleration = estimator.is_decelerating();
        let zero_speed = estimator.zero_speed_altitude();
        let vspeed_std_dev = self.vspeed_window.standard_deviation();
        let vaccel_std_dev = self.vaccel_window.standard_deviation();

        let state = PublishedState {
            timestamp,
            altitude_m: altitude,
            altitude_qnh_m: isa_to_qnh_altitude(altitude, self.config.qnh_hpa),
            display_altitude: reference_altitude(
                altitude,
                self.config.qnh_hpa,
                self.config.transition_altitude_ft,
            ),
            raw_altitude_m: self.raw_altitude.unwrap_or(altitude),
            measurement_variance: estimator.measurement_variance(),
            vertical_speed_mps: velocity,
            vertical_accel_mps2: acceleration,
            burner_gain: estimator.burner_gain(),
            is_decelerating: deceleration.is_decelerating,
            time_to_zero_speed_s: deceleration.time_to_zero_speed,
            zero_speed_altitude_m: zero_speed.altitude,
            zero_speed_valid: zero_speed.valid,
            vspeed_std_dev,
            vaccel_std_dev,
            vspeed_ci95: Interval::ci95(velocity, vspeed_std_dev),
            vaccel_ci95: Interval::ci95(acceleration, vaccel_std_dev),
            sample_rate_hz: self.rate.average_rate(),
        };
        self.stats.published += 1;
        self.latest = Some(state);
        state
    }
}
