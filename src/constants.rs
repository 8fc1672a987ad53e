//! Constants used throughout the program.

/// ISA sea-level reference pressure in hPa:
pub const ISA_REFERENCE_PRESSURE_HPA: f64 = 1013.25;
/// Scale height of the barometric formula in meters:
pub const BAROMETRIC_SCALE_METERS: f64 = 44330.769;
/// Exponent of the barometric formula:
pub const BAROMETRIC_EXPONENT: f64 = 0.19029496;
/// Linear ISA to QNH correction, meters per hPa:
pub const QNH_LAPSE_RATE_METERS_PER_HPA: f64 = 8.23;

pub const METERS_TO_FEET: f64 = 3.28084;
pub const FEET_TO_METERS: f64 = 0.3048;

/// z-score of a two-sided 95% confidence interval:
pub const CI95_Z: f64 = 1.96;

/// Default number of samples in each variance window:
pub const DEFAULT_WINDOW_SIZE: usize = 5;
/// Default number of filter ticks per published state:
pub const DEFAULT_DECIMATION: usize = 1;
/// Altitude in feet at and above which the standard (ISA) reference is displayed:
pub const DEFAULT_TRANSITION_ALTITUDE_FEET: f64 = 7000.0;
/// Default decay of the exponentially-weighted variance:
pub const DEFAULT_EWMV_ALPHA: f64 = 0.1;

/// Spectral density of the white-jerk process noise, m^2/s^5:
pub const DEFAULT_PROCESS_NOISE: f64 = 0.5;
/// Floor applied to the altitude measurement variance, m^2:
pub const MIN_MEASUREMENT_VARIANCE: f64 = 1e-4;
/// Elapsed time above which the filter re-anchors on the next observation:
pub const DEFAULT_MAX_GAP_SECONDS: f64 = 10.0;
/// Synthetic tick length used while priming:
pub const DEFAULT_PRIME_DT_SECONDS: f64 = 1.0;
/// Acceleration magnitude below which no deceleration is reported, m/s^2:
pub const DEFAULT_ACCEL_EPSILON: f64 = 1e-3;

/// Initial altitude/velocity/acceleration variances after (re-)anchoring:
pub const INITIAL_ALTITUDE_VARIANCE: f64 = 1.0;
pub const INITIAL_VELOCITY_VARIANCE: f64 = 1.0;
pub const INITIAL_ACCELERATION_VARIANCE: f64 = 0.1;

/// Random-walk variance of the burner gain per burner event:
pub const DEFAULT_BURNER_GAIN_PROCESS_NOISE: f64 = 1e-4;
/// Variance of the acceleration change attributed to a burner event:
pub const DEFAULT_BURNER_GAIN_MEASUREMENT_NOISE: f64 = 0.05;
pub const INITIAL_BURNER_GAIN_VARIANCE: f64 = 1.0;
