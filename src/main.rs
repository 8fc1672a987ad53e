use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use montgolfiere::barometer::{MockBarometer, PressureSource, ReplaySource};
use montgolfiere::recorder::FlightRecorder;
use montgolfiere::{FlightSession, PipelineConfig, SamplePipeline};

#[derive(Parser)]
#[command(name = "montgolfiere")]
#[command(about = "Balloon variometer: barometric altitude, vertical speed and burner forecasts")]
#[command(version)]
struct Cli {
    /// TOML pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for CSV flight records; nothing is recorded when absent
    #[arg(short, long)]
    record_dir: Option<PathBuf>,

    /// Prime the filter at this ISA altitude (m) before the first sample
    #[arg(long)]
    prime: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay `timestamp,pressure[,loudness,duration]` lines from a file or `-` for stdin
    Replay { input: PathBuf },
    /// Run against the simulated barometer
    Simulate {
        #[arg(long, default_value_t = 2400)]
        samples: u64,
        #[arg(long, default_value_t = 850.0)]
        start_pressure: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Read a BMP280 on the Linux I2C bus
    #[cfg(feature = "bmp280")]
    Live {
        #[arg(long, default_value_t = 50)]
        poll_ms: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let mut pipeline = SamplePipeline::new(config)?;
    if let Some(altitude) = cli.prime {
        pipeline.prime(altitude);
    }

    match cli.command {
        Commands::Replay { input } => {
            if input.as_os_str() == "-" {
                run(pipeline, ReplaySource::new(io::stdin().lock()), &cli.record_dir)
            } else {
                let file = File::open(&input)
                    .with_context(|| format!("opening {}", input.display()))?;
                run(pipeline, ReplaySource::new(BufReader::new(file)), &cli.record_dir)
            }
        }
        Commands::Simulate {
            samples,
            start_pressure,
            seed,
        } => {
            let start = chrono::Utc::now().timestamp() as f64;
            let source = MockBarometer::new(start_pressure, start, seed).with_limit(samples);
            run(pipeline, source, &cli.record_dir)
        }
        #[cfg(feature = "bmp280")]
        Commands::Live { poll_ms } => {
            let source = montgolfiere::barometer::Bmp280Source::open(
                std::time::Duration::from_millis(poll_ms),
            );
            run(pipeline, source, &cli.record_dir)
        }
    }
}

fn run<S: PressureSource>(
    pipeline: SamplePipeline,
    source: S,
    record_dir: &Option<PathBuf>,
) -> Result<()> {
    let mut session = FlightSession::new(pipeline, source);
    if let Some(dir) = record_dir {
        let (recorder, path) = FlightRecorder::create_in(dir)
            .with_context(|| format!("creating flight record in {}", dir.display()))?;
        info!(path = %path.display(), "recording published states");
        session = session.with_recorder(recorder);
    }
    session.run(None)?;

    if let Some(state) = session.pipeline.latest() {
        println!("altitude:      {:.1} m (QNH {:.1} m)", state.altitude_m, state.altitude_qnh_m);
        println!(
            "vertical speed: {:.2} m/s  [{:.2}, {:.2}]",
            state.vertical_speed_mps, state.vspeed_ci95.lower, state.vspeed_ci95.upper
        );
        println!(
            "vertical accel: {:.3} m/s^2  [{:.3}, {:.3}]",
            state.vertical_accel_mps2, state.vaccel_ci95.lower, state.vaccel_ci95.upper
        );
        if state.zero_speed_valid {
            println!(
                "zero speed in {:.1} s at {:.1} m",
                state.time_to_zero_speed_s, state.zero_speed_altitude_m
            );
        }
        println!("sample rate:   {:.2} Hz", state.sample_rate_hz);
    }
    Ok(())
}
