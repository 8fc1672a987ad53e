//! Records every published state to a CSV file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::altitude::ReferencedAltitude;
use crate::pipeline::PublishedState;

const HEADER: &str = "timestamp,altitude,altitude_qnh,display_reference,display_altitude,raw_altitude,measurement_variance,vspeed,vaccel,burner_gain,decelerating,time_to_zero_speed,zero_speed_altitude,zero_speed_valid,vspeed_ci95_lower,vspeed_ci95_upper,vaccel_ci95_lower,vaccel_ci95_upper,sample_rate";

pub struct FlightRecorder<W: Write> {
    writer: W,
    rows: u64,
}

impl FlightRecorder<BufWriter<File>> {
    /// Opens `<dir>/YYYY-MM-DD_HH-MM-SS.csv`, named by the current UTC time.
    pub fn create_in(dir: impl AsRef<Path>) -> io::Result<(Self, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let file_path = dir.join(format!(
            "{}.csv",
            chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S")
        ));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)?;
        let recorder = FlightRecorder::new(BufWriter::new(file))?;
        Ok((recorder, file_path))
    }
}

impl<W: Write> FlightRecorder<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "{HEADER}")?;
        Ok(FlightRecorder { writer, rows: 0 })
    }

    pub fn record(&mut self, state: &PublishedState) -> io::Result<()> {
        let (reference, display) = match state.display_altitude {
            ReferencedAltitude::Qnh(m) => ("QNH", m),
            ReferencedAltitude::Standard(m) => ("STD", m),
        };
        writeln!(
            self.writer,
            "{:.3},{:.3},{:.3},{},{:.3},{:.3},{:.5},{:.4},{:.4},{:.5},{},{:.2},{:.3},{},{:.4},{:.4},{:.4},{:.4},{:.3}",
            state.timestamp,
            state.altitude_m,
            state.altitude_qnh_m,
            reference,
            display,
            state.raw_altitude_m,
            state.measurement_variance,
            state.vertical_speed_mps,
            state.vertical_accel_mps2,
            state.burner_gain,
            u8::from(state.is_decelerating),
            state.time_to_zero_speed_s,
            state.zero_speed_altitude_m,
            u8::from(state.zero_speed_valid),
            state.vspeed_ci95.lower,
            state.vspeed_ci95.upper,
            state.vaccel_ci95.lower,
            state.vaccel_ci95.upper,
            state.sample_rate_hz,
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write> Drop for FlightRecorder<W> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
