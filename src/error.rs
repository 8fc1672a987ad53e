use thiserror::Error;

/// Rejected configuration. The previously valid configuration stays in force.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} window must hold at least one sample, got {value}")]
    WindowSize { name: &'static str, value: usize },
    #[error("decimation factor must be positive, got {0}")]
    Decimation(usize),
    #[error("QNH must be a finite positive pressure in hPa, got {0}")]
    Qnh(f64),
    #[error("EWMV alpha must lie in (0, 1], got {0}")]
    Alpha(f64),
    #[error("estimator tuning {name} must be finite and {constraint}, got {value}")]
    Tuning {
        name: &'static str,
        constraint: &'static str,
        value: f64,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("sensor read failed: {0}")]
    Sensor(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
