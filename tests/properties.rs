use proptest::prelude::*;

use montgolfiere::altitude::{altitude_by_pressure, isa_to_qnh_altitude};
use montgolfiere::pipeline::{PressureSample, RejectReason, SampleOutcome, SamplePipeline};
use montgolfiere::{
    BalloonEstimator, ExponentialWeightedVariance, PipelineConfig, RunningVariance,
    VarianceEstimator, WindowVariance,
};

fn two_pass_variance(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    data.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n
}

proptest! {
    #[test]
    fn variance_is_never_negative(
        data in prop::collection::vec(-1e6f64..1e6, 0..200),
        window in 1usize..40,
        alpha in 0.001f64..=1.0,
    ) {
        let mut estimators: Vec<Box<dyn VarianceEstimator>> = vec![
            Box::new(WindowVariance::new(window)),
            Box::new(RunningVariance::new()),
            Box::new(ExponentialWeightedVariance::new(alpha).unwrap()),
        ];
        for x in data {
            for estimator in estimators.iter_mut() {
                estimator.push(x);
                prop_assert!(estimator.variance() >= 0.0);
                prop_assert!(estimator.standard_deviation().is_finite());
            }
        }
    }

    #[test]
    fn full_window_is_exact(data in prop::collection::vec(-1e3f64..1e3, 1..30)) {
        let mut window = WindowVariance::new(data.len());
        for &x in &data {
            window.push(x);
        }
        let expected = if data.len() < 2 { 0.0 } else { two_pass_variance(&data) };
        prop_assert!((window.variance() - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    #[test]
    fn window_only_sees_latest_samples(
        data in prop::collection::vec(-1e3f64..1e3, 1..60),
        window in 2usize..10,
    ) {
        let mut estimator = WindowVariance::new(window);
        for &x in &data {
            estimator.push(x);
        }
        let tail = &data[data.len().saturating_sub(window)..];
        let expected = if tail.len() < 2 { 0.0 } else { two_pass_variance(tail) };
        prop_assert!((estimator.variance() - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    #[test]
    fn welford_matches_two_pass(data in prop::collection::vec(-1e4f64..1e4, 2..300)) {
        let mut running = RunningVariance::new();
        for &x in &data {
            running.push(x);
        }
        let expected = two_pass_variance(&data);
        prop_assert!((running.variance() - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    #[test]
    fn priming_converges(altitude in -400.0f64..12_000.0, ticks in 1usize..60) {
        let mut estimator = BalloonEstimator::default();
        estimator.prime(altitude, ticks);
        prop_assert!((estimator.altitude() - altitude).abs() < 1e-6);
        prop_assert!(estimator.velocity().abs() < 1e-6);
        prop_assert!(estimator.acceleration().abs() < 1e-6);
    }

    #[test]
    fn standard_qnh_is_identity(pressure in 500.0f64..1050.0) {
        let isa = altitude_by_pressure(pressure, Some(1013.25)).unwrap();
        prop_assert_eq!(isa_to_qnh_altitude(isa, 1013.25), isa);
        prop_assert_eq!(altitude_by_pressure(pressure, None).unwrap(), isa);
    }

    #[test]
    fn linear_qnh_correction_tracks_barometric_formula(
        pressure in 500.0f64..=1050.0,
        qnh in 950.0f64..=1050.0,
    ) {
        let isa = altitude_by_pressure(pressure, Some(1013.25)).unwrap();
        let linear = (isa_to_qnh_altitude(isa, qnh) - isa).abs();
        let exact = (altitude_by_pressure(pressure, Some(qnh)).unwrap() - isa).abs();
        prop_assert!((linear - exact).abs() <= 0.15 * linear + 1e-6,
            "linear {} exact {}", linear, exact);
    }

    #[test]
    fn stale_timestamps_leave_state_unchanged(
        t1 in 1.0f64..1e9,
        back in 0.0f64..1e3,
        pressure in 600.0f64..1050.0,
    ) {
        let mut pipeline = SamplePipeline::new(PipelineConfig::default()).unwrap();
        pipeline.process_sample(&PressureSample::new(pressure, t1));
        pipeline.process_sample(&PressureSample::new(pressure, t1 + 1.0));
        let state = pipeline.estimator().state();
        let published = pipeline.latest().copied();

        let stale = PressureSample::new(pressure - 1.0, t1 + 1.0 - back);
        let outcome = pipeline.process_sample(&stale);
        prop_assert_eq!(outcome, SampleOutcome::Rejected(RejectReason::NonMonotonicTimestamp));
        prop_assert_eq!(pipeline.estimator().state(), state);
        prop_assert_eq!(pipeline.latest().copied(), published);
        prop_assert_eq!(pipeline.previous_timestamp(), Some(t1 + 1.0));
    }

    #[test]
    fn decimation_publishes_every_nth_tick(factor in 1usize..10, steps in 0usize..60) {
        let config = PipelineConfig { decimation: factor, ..PipelineConfig::default() };
        let mut pipeline = SamplePipeline::new(config).unwrap();
        pipeline.process_sample(&PressureSample::new(900.0, 0.0));
        let mut published = 0;
        for i in 1..=steps {
            let sample = PressureSample::new(900.0 - 0.01 * i as f64, i as f64 * 0.5);
            match pipeline.process_sample(&sample) {
                SampleOutcome::Published(state) => {
                    published += 1;
                    prop_assert_eq!(i % factor, 0);
                    prop_assert_eq!(state.altitude_m, pipeline.estimator().altitude());
                    prop_assert_eq!(state.vertical_speed_mps, pipeline.estimator().velocity());
                }
                SampleOutcome::Filtered => prop_assert!(i % factor != 0),
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
        }
        prop_assert_eq!(published, steps / factor);
    }

    #[test]
    fn published_state_is_always_finite(
        samples in prop::collection::vec((300.0f64..1100.0, 0.001f64..40.0, 0.0f64..2.0), 1..150),
    ) {
        let mut pipeline = SamplePipeline::new(PipelineConfig::default()).unwrap();
        pipeline.prime(1000.0);
        let mut t = 1000.0;
        for (pressure, dt, loudness) in samples {
            t += dt;
            let sample = PressureSample::new(pressure, t).with_burner(loudness, dt.min(1.0));
            if let SampleOutcome::Published(state) = pipeline.process_sample(&sample) {
                for value in [
                    state.altitude_m,
                    state.vertical_speed_mps,
                    state.vertical_accel_mps2,
                    state.burner_gain,
                    state.time_to_zero_speed_s,
                    state.zero_speed_altitude_m,
                    state.vspeed_ci95.lower,
                    state.vspeed_ci95.upper,
                    state.vaccel_ci95.lower,
                    state.vaccel_ci95.upper,
                ] {
                    prop_assert!(value.is_finite());
                }
            }
        }
    }
}
