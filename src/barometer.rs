//! Pressure-sample sources feeding a flight session.

use std::io::BufRead;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::error::SourceError;
use crate::pipeline::PressureSample;

pub trait PressureSource {
    /// `Ok(None)` once the source is exhausted.
    fn next_sample(&mut self) -> Result<Option<PressureSample>, SourceError>;
}

/// Simulated barometer: slow sinusoidal weather drift plus uniform noise around a
/// start pressure, on a simulated clock.
pub struct MockBarometer {
    start_pressure: f64,
    current_pressure: f64,
    override_pressure: Option<f64>,
    start_timestamp: f64,
    ticks: u64,
    remaining: Option<u64>,
    rng: StdRng,
    /// Peak deviation of the slow drift, hPa.
    pub baseline_variation: f64,
    /// Peak-to-peak noise, hPa.
    pub noise_amplitude: f64,
    /// Sample interval, seconds.
    pub update_interval: f64,
    /// Frequency of the slow drift, Hz.
    pub slow_variation_freq: f64,
}

impl MockBarometer {
    pub fn new(start_pressure: f64, start_timestamp: f64, seed: u64) -> Self {
        MockBarometer {
            start_pressure,
            current_pressure: start_pressure,
            override_pressure: None,
            start_timestamp,
            ticks: 0,
            remaining: None,
            rng: StdRng::seed_from_u64(seed),
            baseline_variation: 5.0,
            noise_amplitude: 0.02,
            update_interval: 0.25,
            slow_variation_freq: 0.01,
        }
    }

    /// Stops after `samples` readings.
    pub fn with_limit(mut self, samples: u64) -> Self {
        self.remaining = Some(samples);
        self
    }

    /// Pins the output to `pressure` until cleared with `None`.
    pub fn set_mock_pressure(&mut self, pressure: Option<f64>) {
        self.override_pressure = pressure;
    }

    pub fn current_pressure(&self) -> f64 {
        self.current_pressure
    }

    fn update_pressure(&mut self, elapsed: f64) {
        if let Some(pressure) = self.override_pressure {
            self.current_pressure = pressure;
            return;
        }
        let slow_variation = (elapsed * self.slow_variation_freq * std::f64::consts::TAU).sin()
            * self.baseline_variation;
        let noise = if self.noise_amplitude > 0.0 {
            self.rng.gen_range(-0.5..0.5) * self.noise_amplitude
        } else {
            0.0
        };
        self.current_pressure = (self.start_pressure + slow_variation + noise).clamp(700.0, 1100.0);
    }
}

impl PressureSource for MockBarometer {
    fn next_sample(&mut self) -> Result<Option<PressureSample>, SourceError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let elapsed = self.ticks as f64 * self.update_interval;
        self.ticks += 1;
        self.update_pressure(elapsed);
        Ok(Some(PressureSample::new(
            self.current_pressure,
            self.start_timestamp + elapsed,
        )))
    }
}

/// Replays `timestamp,pressure[,loudness,duration]` lines. Blank lines, `#` comments
/// and a non-numeric header are skipped; malformed lines are logged and skipped.
pub struct ReplaySource<R: BufRead> {
    reader: R,
    line: String,
    line_number: usize,
    /// Whether a non-blank, non-comment line has been read yet.
    seen_content: bool,
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        ReplaySource {
            reader,
            line: String::new(),
            line_number: 0,
            seen_content: false,
        }
    }
}

fn parse_line(line: &str) -> Option<PressureSample> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 2 || fields.len() == 3 || fields.len() > 4 {
        return None;
    }
    let number = |i: usize| fields[i].parse::<f64>().ok();
    let sample = PressureSample::new(number(1)?, number(0)?);
    if fields.len() == 4 {
        Some(sample.with_burner(number(2)?, number(3)?))
    } else {
        Some(sample)
    }
}

impl<R: BufRead> PressureSource for ReplaySource<R> {
    fn next_sample(&mut self) -> Result<Option<PressureSample>, SourceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let first = !self.seen_content;
            self.seen_content = true;
            match parse_line(line) {
                Some(sample) => return Ok(Some(sample)),
                None if first => {
                    info!(header = line, "skipping replay header");
                }
                None => {
                    warn!(line_number = self.line_number, line, "skipping malformed replay line");
                }
            }
        }
    }
}

/// Live BMP280 on the Linux I2C bus.
#[cfg(feature = "bmp280")]
pub struct Bmp280Source {
    sensor: bmp280::Bmp280,
    poll_interval: std::time::Duration,
}

#[cfg(feature = "bmp280")]
impl Bmp280Source {
    /// Retries until the sensor answers; I2C errors right after boot are common.
    pub fn open(poll_interval: std::time::Duration) -> Self {
        let sensor = loop {
            match bmp280::Bmp280Builder::new().build() {
                Ok(dev) => break dev,
                Err(e) => {
                    warn!(error = ?e, "waiting for BMP280 sensor");
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }
            }
        };
        info!("BMP280 sensor initialized");
        Bmp280Source {
            sensor,
            poll_interval,
        }
    }
}

#[cfg(feature = "bmp280")]
impl PressureSource for Bmp280Source {
    fn next_sample(&mut self) -> Result<Option<PressureSample>, SourceError> {
        std::thread::sleep(self.poll_interval);
        let pressure_kpa = self
            .sensor
            .pressure_kpa()
            .map_err(|e| SourceError::Sensor(format!("{e:?}")))?;
        let now = chrono::Utc::now();
        let timestamp = now.timestamp_micros() as f64 / 1e6;
        Ok(Some(PressureSample::new(pressure_kpa as f64 * 10.0, timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn mock_barometer_is_reproducible() {
        let mut a = MockBarometer::new(850.0, 1000.0, 7).with_limit(50);
        let mut b = MockBarometer::new(850.0, 1000.0, 7).with_limit(50);
        for _ in 0..50 {
            assert_eq!(a.next_sample().unwrap(), b.next_sample().unwrap());
        }
        assert_eq!(a.next_sample().unwrap(), None);
    }

    #[test]
    fn mock_barometer_stays_near_start() {
        let mut baro = MockBarometer::new(850.0, 0.0, 1).with_limit(400);
        let mut last_timestamp = -1.0;
        while let Some(sample) = baro.next_sample().unwrap() {
            assert!((sample.pressure_hpa - 850.0).abs() <= 5.0 + 0.01 + 1e-9);
            assert!(sample.timestamp > last_timestamp);
            last_timestamp = sample.timestamp;
        }
        assert_eq!(last_timestamp, 399.0 * 0.25);
    }

    #[test]
    fn mock_pressure_override() {
        let mut baro = MockBarometer::new(850.0, 0.0, 1);
        baro.set_mock_pressure(Some(950.0));
        assert_eq!(baro.next_sample().unwrap().unwrap().pressure_hpa, 950.0);
        baro.set_mock_pressure(Some(2000.0));
        assert_eq!(baro.next_sample().unwrap().unwrap().pressure_hpa, 2000.0);
    }

    #[test]
    fn replay_parses_samples_and_skips_noise() {
        let text = "timestamp,pressure\n\
                    # warm-up\n\
                    100.0, 900.5\n\
                    \n\
                    100.5,900.4,0.7,0.5\n\
                    garbage,line\n\
                    101.0,nan\n";
        let mut source = ReplaySource::new(Cursor::new(text));
        assert_eq!(
            source.next_sample().unwrap(),
            Some(PressureSample::new(900.5, 100.0))
        );
        assert_eq!(
            source.next_sample().unwrap(),
            Some(PressureSample::new(900.4, 100.5).with_burner(0.7, 0.5))
        );
        let nan = source.next_sample().unwrap().unwrap();
        assert!(nan.pressure_hpa.is_nan());
        assert_eq!(source.next_sample().unwrap(), None);
    }

    #[test]
    fn header_after_leading_comments_is_still_a_header() {
        let text = "# recorded 2025-06-01\n\n\
                    timestamp,pressure\n\
                    5.0,1001.0\n\
                    time,pressure\n\
                    6.0,1000.9\n";
        let mut source = ReplaySource::new(Cursor::new(text));
        assert_eq!(
            source.next_sample().unwrap(),
            Some(PressureSample::new(1001.0, 5.0))
        );
        assert!(source.seen_content);
        assert_eq!(source.line_number, 4);
        // a second header later on is malformed data and is skipped
        assert_eq!(
            source.next_sample().unwrap(),
            Some(PressureSample::new(1000.9, 6.0))
        );
        assert_eq!(source.next_sample().unwrap(), None);
    }
}
