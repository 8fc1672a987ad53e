//! Runtime configuration of a flight session.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::{
    DEFAULT_DECIMATION, DEFAULT_TRANSITION_ALTITUDE_FEET, DEFAULT_WINDOW_SIZE,
    ISA_REFERENCE_PRESSURE_HPA,
};
use crate::error::ConfigError;
use crate::estimator::EstimatorTuning;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples in the altitude variance window, also the number of priming ticks.
    pub altitude_window: usize,
    pub vspeed_window: usize,
    pub vaccel_window: usize,
    /// Filter ticks per published state.
    pub decimation: usize,
    /// Local QNH, hPa. Display conversion only, never fed to the filter.
    pub qnh_hpa: f64,
    pub transition_altitude_ft: f64,
    pub estimator: EstimatorTuning,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            altitude_window: DEFAULT_WINDOW_SIZE,
            vspeed_window: DEFAULT_WINDOW_SIZE,
            vaccel_window: DEFAULT_WINDOW_SIZE,
            decimation: DEFAULT_DECIMATION,
            qnh_hpa: ISA_REFERENCE_PRESSURE_HPA,
            transition_altitude_ft: DEFAULT_TRANSITION_ALTITUDE_FEET,
            estimator: EstimatorTuning::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_window("altitude", self.altitude_window)?;
        check_window("vspeed", self.vspeed_window)?;
        check_window("vaccel", self.vaccel_window)?;
        check_decimation(self.decimation)?;
        check_qnh(self.qnh_hpa)?;
        if !self.transition_altitude_ft.is_finite() {
            return Err(ConfigError::Tuning {
                name: "transition_altitude_ft",
                constraint: "finite",
                value: self.transition_altitude_ft,
            });
        }
        check_tuning(&self.estimator)
    }
}

pub(crate) fn check_window(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::WindowSize { name, value })
    } else {
        Ok(())
    }
}

pub(crate) fn check_decimation(value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Decimation(value))
    } else {
        Ok(())
    }
}

pub(crate) fn check_qnh(qnh_hpa: f64) -> Result<(), ConfigError> {
    if qnh_hpa.is_finite() && qnh_hpa > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Qnh(qnh_hpa))
    }
}

pub(crate) fn check_tuning(tuning: &EstimatorTuning) -> Result<(), ConfigError> {
    let positive = [
        ("process_noise", tuning.process_noise),
        ("min_measurement_variance", tuning.min_measurement_variance),
        ("max_gap_s", tuning.max_gap_s),
        ("prime_dt_s", tuning.prime_dt_s),
        ("burner_gain_measurement_noise", tuning.burner_gain_measurement_noise),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(ConfigError::Tuning {
                name,
                constraint: "positive",
                value,
            });
        }
    }
    let non_negative = [
        ("burner_gain_process_noise", tuning.burner_gain_process_noise),
        ("accel_epsilon", tuning.accel_epsilon),
    ];
    for (name, value) in non_negative {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::Tuning {
                name,
                constraint: "non-negative",
                value,
            });
        }
    }
    Ok(())
}
