//! Barometric flight-state estimation for hot-air balloons.
//!
//! Raw pressure samples are converted to ISA altitude, filtered into altitude,
//! vertical speed and vertical acceleration, and published at a decimated rate with
//! deceleration forecasts and empirical confidence intervals.

pub mod altitude;
pub mod barometer;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod estimator;
pub mod pipeline;
pub mod rate;
pub mod recorder;
pub mod variance;

pub use altitude::{altitude_by_pressure, isa_to_qnh_altitude};
pub use config::PipelineConfig;
pub use context::FlightSession;
pub use error::{ConfigError, SourceError};
pub use estimator::{BalloonEstimator, BurnerSignal, EstimatorTuning, UpdateStatus};
pub use pipeline::{PressureSample, PublishedState, SampleOutcome, SamplePipeline};
pub use variance::{
    ExponentialWeightedVariance, RunningVariance, VarianceEstimator, WindowVariance,
};
