//! End-to-end tests of the public call surface against the engine double.
//! Run with: cargo test -p loqa-voicedsp --test voicedsp

use std::sync::Arc;
use std::time::Duration;

use loqa_engine::EngineError;
use loqa_engine::testing::{FakeEngine, sine};
use loqa_voicedsp::{
    FftOptions, FormantOptions, H1H2Options, HnrOptions, PitchOptions, SessionId, SessionOptions,
    ValidationError, VoiceDsp, WindowKind,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (FakeEngine, VoiceDsp) {
    init_tracing();
    let engine = FakeEngine::new();
    let dsp = VoiceDsp::new(Arc::new(engine.clone()));
    (engine, dsp)
}

fn short_frames(rate: u32) -> SessionOptions {
    SessionOptions::new(rate).frame_size(1600.0).hop_size(1600.0)
}

#[tokio::test]
async fn session_defaults_for_44100() {
    let (_engine, dsp) = setup();
    let handle = dsp.create_session(SessionOptions::new(44100)).await.unwrap();
    let cfg = handle.config;
    assert_eq!(cfg.sample_rate(), 44100);
    assert_eq!(cfg.min_frequency(), 80.0);
    assert_eq!(cfg.max_frequency(), 400.0);
    assert_eq!(cfg.frame_size(), 2048);
    assert_eq!(cfg.hop_size(), 512);
    assert_eq!(dsp.session_config(handle.id).unwrap(), cfg);
}

#[tokio::test]
async fn session_from_json_options() {
    let (_engine, dsp) = setup();
    let opts = SessionOptions::from_json(r#"{"sampleRate": 22050, "frameSize": 1024}"#).unwrap();
    let handle = dsp.create_session(opts).await.unwrap();
    assert_eq!(handle.config.hop_size(), 256);
    let json = serde_json::to_value(handle).unwrap();
    assert_eq!(json["config"]["frameSize"], 1024);
    assert_eq!(json["config"]["algorithm"], "pyin");
}

#[tokio::test]
async fn empty_buffer_never_reaches_engine() {
    let (engine, dsp) = setup();

    let errs = [
        dsp.compute_fft(vec![], 16000.0, FftOptions::default()).await.unwrap_err(),
        dsp.detect_pitch(vec![], 16000.0, PitchOptions::default()).await.unwrap_err(),
        dsp.extract_formants(vec![], 16000.0, FormantOptions::default()).await.unwrap_err(),
        dsp.analyze_spectrum(vec![], 16000.0).await.unwrap_err(),
        dsp.calculate_hnr(vec![], 16000.0, HnrOptions::default()).await.unwrap_err(),
        dsp.calculate_h1h2(vec![], 16000.0, H1H2Options::default()).await.unwrap_err(),
    ];
    for err in errs {
        assert_eq!(err.code(), "EMPTY_BUFFER", "{err}");
    }
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn buffer_checks_precede_sample_rate() {
    let (engine, dsp) = setup();
    let err = dsp.detect_pitch(vec![], 1.5, PitchOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "EMPTY_BUFFER");

    let err = dsp
        .detect_pitch(vec![0.1, f32::NAN], 1.5, PitchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        loqa_voicedsp::Error::Validation(ValidationError::NonFiniteSample { index: 1 })
    ));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn one_shot_length_is_bounded() {
    let (engine, dsp) = setup();
    let err = dsp
        .detect_pitch(vec![0.0; 16385], 16000.0, PitchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BUFFER_TOO_LARGE");
    assert_eq!(engine.calls(), 0);

    dsp.detect_pitch(vec![0.0; 16384], 16000.0, PitchOptions::default())
        .await
        .unwrap();

    // Session calls take whole clips.
    let handle = dsp.create_session(SessionOptions::new(16000)).await.unwrap();
    let clip = dsp.analyze_clip(handle.id, vec![0.0; 64000]).await.unwrap();
    assert_eq!(clip.frame_count, (64000 - 2048) / 512 + 1);
}

#[tokio::test]
async fn sample_rate_boundaries() {
    let (_engine, dsp) = setup();
    let buf = sine(200.0, 8000, 2048, 0.5);
    for rate in [8000.0, 48000.0] {
        dsp.detect_pitch(buf.clone(), rate, PitchOptions::default()).await.unwrap();
    }
    for rate in [7999.0, 48001.0] {
        let err = dsp.detect_pitch(buf.clone(), rate, PitchOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "OUT_OF_RANGE");
    }
    let err = dsp.create_session(SessionOptions::new(44100.5)).await.unwrap_err();
    assert_eq!(err.code(), "NOT_INTEGER");
}

#[tokio::test]
async fn fft_sizes() {
    let (_engine, dsp) = setup();
    let buf = sine(440.0, 16000, 1024, 0.5);
    for size in [256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0] {
        let opts = FftOptions {
            fft_size: Some(size),
            ..FftOptions::default()
        };
        let r = dsp.compute_fft(buf.clone(), 16000.0, opts).await.unwrap();
        assert_eq!(r.fft_size, size as usize);
        assert_eq!(r.magnitudes.len(), size as usize / 2);
    }
    let opts = FftOptions {
        fft_size: Some(1000.0),
        ..FftOptions::default()
    };
    let err = dsp.compute_fft(buf, 16000.0, opts).await.unwrap_err();
    assert_eq!(err.code(), "NOT_POWER_OF_TWO");
}

#[tokio::test]
async fn fft_phases_on_request() {
    let (_engine, dsp) = setup();
    let opts = FftOptions {
        fft_size: Some(256.0),
        window_type: Some(WindowKind::Hamming),
        include_phase: true,
    };
    let r = dsp.compute_fft(sine(1000.0, 8000, 256, 1.0), 8000.0, opts).await.unwrap();
    assert_eq!(r.phases.as_ref().map(Vec::len), Some(128));
    assert_eq!(r.sample_rate, 8000);
}

#[tokio::test]
async fn one_shot_analyses() {
    let (_engine, dsp) = setup();
    let tone = sine(220.0, 16000, 4096, 0.5);

    let pitch = dsp.detect_pitch(tone.clone(), 16000.0, PitchOptions::default()).await.unwrap();
    assert!(pitch.is_voiced);
    let f = pitch.frequency.unwrap();
    assert!((f - 220.0).abs() < 5.0, "{f}");

    let formants = dsp
        .extract_formants(tone.clone(), 16000.0, FormantOptions::default())
        .await
        .unwrap();
    assert!(formants.f1 < formants.f2 && formants.f2 < formants.f3);

    let hnr = dsp.calculate_hnr(tone.clone(), 16000.0, HnrOptions::default()).await.unwrap();
    assert!(hnr.is_voiced);

    let shape = dsp.analyze_spectrum(tone.clone(), 16000.0).await.unwrap();
    assert!(shape.centroid > 0.0);

    let h = dsp
        .calculate_h1h2(tone, 16000.0, H1H2Options { f0: Some(220.0) })
        .await
        .unwrap();
    assert_eq!(h.f0, 220.0);
    assert!(h.h1h2 > 0.0);
}

#[tokio::test]
async fn session_ids_are_unique_across_frees() {
    let (_engine, dsp) = setup();
    let mut seen = Vec::new();
    for _ in 0..5 {
        let id = dsp.create_session(SessionOptions::new(16000)).await.unwrap().id;
        assert!(!seen.contains(&id));
        seen.push(id);
        dsp.free_session(id).await.unwrap();
    }
    assert_eq!(dsp.session_count(), 0);
}

#[tokio::test]
async fn free_unknown_or_twice_is_handle_not_found() {
    let (engine, dsp) = setup();
    let err = dsp.free_session(SessionId::from_raw(99)).await.unwrap_err();
    assert!(err.is_handle_not_found());

    let id = dsp.create_session(SessionOptions::new(16000)).await.unwrap().id;
    dsp.free_session(id).await.unwrap();
    assert_eq!(engine.live_analyzers(), 0);

    let err = dsp.free_session(id).await.unwrap_err();
    assert_eq!(err.code(), "HANDLE_NOT_FOUND");

    let buf = sine(200.0, 16000, 4096, 0.5);
    assert!(dsp.analyze_clip(id, buf.clone()).await.unwrap_err().is_handle_not_found());
    assert!(dsp.analyze_frame(id, buf.clone()).await.unwrap_err().is_handle_not_found());
    assert!(dsp.process_buffer(id, buf).await.unwrap_err().is_handle_not_found());
    assert!(dsp.reset_session(id).await.unwrap_err().is_handle_not_found());
    assert!(dsp.session_config(id).unwrap_err().is_handle_not_found());
}

#[tokio::test]
async fn redecode_without_in_band_energy_is_unvoiced() {
    let (_engine, dsp) = setup();
    let id = dsp.create_session(SessionOptions::new(16000)).await.unwrap().id;

    let silent = dsp.process_buffer(id, vec![0.0; 16000]).await.unwrap();
    assert_eq!(silent.frame_count, 28);
    assert_eq!(silent.voiced_frame_count, 0);
    assert_eq!(silent.median_pitch, None);
    assert!(silent.pitch_track.iter().all(|&p| p == 0.0));

    let high = dsp.process_buffer(id, sine(1000.0, 16000, 16000, 0.5)).await.unwrap();
    assert_eq!(high.voiced_frame_count, 0);
    assert_eq!(high.median_pitch, None);
}

#[tokio::test]
async fn redecode_track_is_parallel() {
    let (_engine, dsp) = setup();
    let id = dsp.create_session(SessionOptions::new(16000)).await.unwrap().id;
    let track = dsp.process_buffer(id, sine(200.0, 16000, 8000, 0.5)).await.unwrap();
    assert_eq!(track.pitch_track.len(), track.frame_count);
    assert_eq!(track.voiced_probabilities.len(), track.frame_count);
    assert_eq!(track.timestamps.len(), track.frame_count);
    assert_eq!(track.voiced_frame_count, track.frame_count);
    assert_eq!(track.timestamps[1], 512.0 / 16000.0);
    let median = track.median_pitch.unwrap();
    assert!((median - 200.0).abs() < 5.0, "{median}");
}

#[tokio::test]
async fn reset_reproduces_fresh_session() {
    let (_engine, dsp) = setup();
    let clip = sine(200.0, 16000, 6400, 0.5);

    let fresh = dsp.create_session(short_frames(16000)).await.unwrap().id;
    let expected = dsp.analyze_clip(fresh, clip.clone()).await.unwrap();

    let used = dsp.create_session(short_frames(16000)).await.unwrap().id;
    dsp.analyze_clip(used, sine(350.0, 16000, 3200, 0.5)).await.unwrap();
    let carried = dsp.analyze_clip(used, clip.clone()).await.unwrap();
    assert_ne!(carried.frames, expected.frames);

    dsp.reset_session(used).await.unwrap();
    let again = dsp.analyze_clip(used, clip).await.unwrap();
    assert_eq!(again, expected);
}

#[tokio::test]
async fn analyze_frame_carries_state() {
    let (_engine, dsp) = setup();
    let id = dsp.create_session(short_frames(16000)).await.unwrap().id;
    let a = dsp.analyze_frame(id, sine(200.0, 16000, 1600, 0.5)).await.unwrap();
    let b = dsp.analyze_frame(id, sine(300.0, 16000, 1600, 0.5)).await.unwrap();
    let (fa, fb) = (a.frequency.unwrap(), b.frequency.unwrap());
    assert!((fb - (fa + 300.0) / 2.0).abs() < 5.0, "{fa} {fb}");
}

#[tokio::test]
async fn clip_statistics() {
    let (_engine, dsp) = setup();
    let id = dsp.create_session(short_frames(16000)).await.unwrap().id;

    let mut clip = sine(200.0, 16000, 3200, 0.5);
    clip.extend(std::iter::repeat_n(0.0, 1600));
    let r = dsp.analyze_clip(id, clip).await.unwrap();
    assert_eq!(r.frame_count, 3);
    assert_eq!(r.voiced_frame_count, 2);
    assert!(r.frames[2].frequency.is_none());
    assert!((r.median_pitch.unwrap() - 200.0).abs() < 5.0);
    assert!(r.pitch_std_dev.unwrap() < 1.0);
    let expected_prob = (0.9 + 0.9 + 0.1) / 3.0;
    assert!((r.mean_voiced_probability - expected_prob).abs() < 1e-5);
}

#[tokio::test]
async fn short_clip_yields_no_frames() {
    let (_engine, dsp) = setup();
    let id = dsp.create_session(SessionOptions::new(16000)).await.unwrap().id;
    let r = dsp.analyze_clip(id, vec![0.1; 100]).await.unwrap();
    assert_eq!(r.frame_count, 0);
    assert_eq!(r.median_pitch, None);
    assert_eq!(r.mean_voiced_probability, 0.0);
}

#[tokio::test]
async fn engine_error_carries_call_parameters() {
    let (engine, dsp) = setup();
    engine.fail_next(EngineError::ComputationFailed("transform diverged".into()));
    let opts = FftOptions {
        fft_size: Some(1024.0),
        ..FftOptions::default()
    };
    let err = dsp.compute_fft(vec![0.1; 512], 44100.0, opts).await.unwrap_err();
    assert_eq!(err.code(), "ENGINE_COMPUTATION_FAILED");
    let ctx = err.context().unwrap();
    assert_eq!(ctx.operation, "compute_fft");
    assert_eq!(ctx.sample_rate, Some(44100));
    assert_eq!(ctx.buffer_len, Some(512));
    assert_eq!(ctx.transform_size, Some(1024));
    assert!(err.to_string().contains("transform diverged"));

    let report = serde_json::to_value(err.report()).unwrap();
    assert_eq!(report["code"], "ENGINE_COMPUTATION_FAILED");
    assert_eq!(report["context"]["transformSize"], 1024);
}

#[tokio::test]
async fn session_engine_error_names_session() {
    let (engine, dsp) = setup();
    let id = dsp.create_session(SessionOptions::new(16000)).await.unwrap().id;
    engine.fail_next(EngineError::InvalidInput("frame too short".into()));
    let err = dsp.analyze_clip(id, vec![0.1; 4096]).await.unwrap_err();
    assert_eq!(err.code(), "ENGINE_INVALID_INPUT");
    assert_eq!(err.context().and_then(|c| c.session_id), Some(id));

    // Failures are not retried and leave the session usable.
    dsp.analyze_clip(id, vec![0.1; 4096]).await.unwrap();
}

#[tokio::test]
async fn h1h2_without_f0_can_fail_in_engine() {
    let (_engine, dsp) = setup();
    let err = dsp
        .calculate_h1h2(vec![0.0; 2048], 16000.0, H1H2Options::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ENGINE_COMPUTATION_FAILED");
}

#[tokio::test]
async fn create_failure_is_reported() {
    let (engine, dsp) = setup();
    engine.fail_next(EngineError::AllocationFailed("analyzer".into()));
    let err = dsp.create_session(SessionOptions::new(16000)).await.unwrap_err();
    assert_eq!(err.code(), "ENGINE_CREATION_FAILED");
    assert!(matches!(err.engine_error(), Some(EngineError::AllocationFailed(_))));
    assert_eq!(dsp.session_count(), 0);
    assert_eq!(engine.live_analyzers(), 0);
}

#[tokio::test]
async fn shutdown_frees_everything() {
    let (engine, dsp) = setup();
    for rate in [8000, 16000, 44100] {
        dsp.create_session(SessionOptions::new(rate)).await.unwrap();
    }
    assert_eq!(dsp.session_count(), 3);
    assert_eq!(engine.live_analyzers(), 3);

    assert_eq!(dsp.shutdown().await.unwrap(), 3);
    assert_eq!(dsp.session_count(), 0);
    assert_eq!(engine.live_analyzers(), 0);
    assert!(dsp.session_ids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_refuses_in_flight_creation() {
    let (engine, dsp) = setup();
    engine.set_delay(Some(Duration::from_millis(200)));

    let creating = {
        let dsp = dsp.clone();
        tokio::spawn(async move { dsp.create_session(SessionOptions::new(16000)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(dsp.shutdown().await.unwrap(), 0);
    let err = creating.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "REGISTRY_CLOSED");
    assert_eq!(dsp.session_count(), 0);
    assert_eq!(engine.live_analyzers(), 0);

    engine.set_delay(None);
    let err = dsp.create_session(SessionOptions::new(16000)).await.unwrap_err();
    assert_eq!(err.code(), "REGISTRY_CLOSED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sessions_run_concurrently() {
    let (_engine, dsp) = setup();
    let mut tasks = Vec::new();
    for freq in [120.0, 200.0, 280.0, 360.0] {
        let dsp = dsp.clone();
        tasks.push(tokio::spawn(async move {
            let id = dsp.create_session(short_frames(16000)).await.unwrap().id;
            let r = dsp.analyze_clip(id, sine(freq, 16000, 8000, 0.5)).await.unwrap();
            dsp.free_session(id).await.unwrap();
            (freq, r.median_pitch.unwrap())
        }));
    }
    for task in tasks {
        let (freq, median) = task.await.unwrap();
        assert!((median - freq).abs() < 5.0, "{freq}: {median}");
    }
    assert_eq!(dsp.session_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn free_waits_for_in_flight_analysis() {
    let (engine, dsp) = setup();
    let id = dsp.create_session(short_frames(16000)).await.unwrap().id;
    engine.set_delay(Some(Duration::from_millis(200)));

    let analyzing = {
        let dsp = dsp.clone();
        tokio::spawn(async move { dsp.analyze_clip(id, sine(200.0, 16000, 3200, 0.5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    dsp.free_session(id).await.unwrap();
    assert_eq!(engine.live_analyzers(), 0);

    let clip = analyzing.await.unwrap().unwrap();
    assert_eq!(clip.frame_count, 2);

    engine.set_delay(None);
    let err = dsp.analyze_clip(id, vec![0.1; 3200]).await.unwrap_err();
    assert!(err.is_handle_not_found());
}
