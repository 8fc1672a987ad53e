use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::{debug, info, warn};

use crate::barometer::PressureSource;
use crate::error::SourceError;
use crate::pipeline::{SampleOutcome, SamplePipeline, SessionStats};
use crate::recorder::FlightRecorder;

/// One flight: a sample source, the pipeline it feeds and an optional recorder of
/// published states.
pub struct FlightSession<S: PressureSource, W: Write = BufWriter<File>> {
    pub pipeline: SamplePipeline,
    source: S,
    recorder: Option<FlightRecorder<W>>,
}

impl<S: PressureSource, W: Write> FlightSession<S, W> {
    pub fn new(pipeline: SamplePipeline, source: S) -> Self {
        FlightSession {
            pipeline,
            source,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: FlightRecorder<W>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Reads one sample and runs it through the pipeline. `Ok(None)` once the source
    /// is exhausted.
    pub fn step(&mut self) -> Result<Option<SampleOutcome>, SourceError> {
        let Some(sample) = self.source.next_sample()? else {
            return Ok(None);
        };
        let outcome = self.pipeline.process_sample(&sample);

        if let SampleOutcome::Published(state) = &outcome {
            debug!(
                altitude = state.altitude_m,
                vspeed = state.vertical_speed_mps,
                vaccel = state.vertical_accel_mps2,
                decelerating = state.is_decelerating,
                "published"
            );
            if let Some(recorder) = &mut self.recorder {
                if let Err(e) = recorder.record(state) {
                    warn!(error = %e, "failed to write flight record");
                }
            }
        }
        Ok(Some(outcome))
    }

    /// Runs until the source is exhausted or `max_samples` have been read. Sensor read
    /// failures are logged and skipped; I/O failures end the run.
    pub fn run(&mut self, max_samples: Option<u64>) -> Result<SessionStats, SourceError> {
        let mut read = 0u64;
        while max_samples.is_none_or(|max| read < max) {
            read += 1;
            match self.step() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(SourceError::Sensor(e)) => warn!(error = %e, "sensor read failed"),
                Err(e) => return Err(e),
            }
        }
        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.flush() {
                warn!(error = %e, "failed to flush flight record");
            }
        }
        let stats = *self.pipeline.stats();
        info!(
            samples = stats.samples,
            published = stats.published,
            rejected = stats.rejected(),
            reanchored = stats.reanchored,
            "session finished"
        );
        Ok(stats)
    }
}
