mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use revid::{
    ArenaKind, BufferPolicy, CodecId, EncoderSettings, EngineState, ExportConfig,
    FrameReversalEngine, Operation, Progress, ProgressValue, ReverseError, TrackKind,
};

use common::{
    FRAME_MS, Faults, MemoryBackend, Synthetic, VIDEO_TB, gray_video, init_tracing, ramp_audio,
    samples, span,
};

const SOURCE: &str = "/virtual/source.mov";
const OUTPUT: &str = "/virtual/reversed.mp4";

/// 10 frames (400ms) with a keyframe every 4, plus 400ms of audio.
fn av_source() -> Synthetic {
    Synthetic::new()
        .with_video(gray_video(10, 4))
        .with_audio(ramp_audio(3200, 500))
}

fn engine(backend: &MemoryBackend, config: ExportConfig) -> FrameReversalEngine {
    FrameReversalEngine::new(SOURCE, config, backend.as_backend())
}

fn payloads(frames: &[revid::VideoFrame]) -> Vec<u8> {
    frames.iter().map(|f| f.data[0]).collect()
}

#[tokio::test]
async fn reverses_frames_and_keeps_duration() {
    init_tracing();
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let summary = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();

    assert_eq!(summary.video_frames, 10);
    assert_eq!(summary.duration, Duration::from_millis(400));
    assert_eq!(summary.arena, ArenaKind::Memory);

    let out = backend.output(OUTPUT).unwrap();
    assert!(out.finished);
    assert_eq!(payloads(&out.video), (0..10u8).rev().collect::<Vec<_>>());

    for pair in out.video.windows(2) {
        assert!(pair[0].pts < pair[1].pts);
    }
    assert_eq!(out.video[0].pts.0, 0);
    assert!(out.video[0].keyframe);

    let diff = span(&out.video).abs_diff(Duration::from_millis(400));
    assert!(diff <= Duration::from_millis(FRAME_MS as u64));
}

#[tokio::test]
async fn reverses_audio_samples() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let summary = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();
    assert_eq!(summary.audio_frames, 3200);

    let out = backend.output(OUTPUT).unwrap();
    let expected = (0..3200).rev().map(|j| j as i16).collect::<Vec<_>>();
    assert_eq!(samples(&out.audio), expected);

    for pair in out.audio.windows(2) {
        assert!(pair[0].pts < pair[1].pts);
    }

    let audio = out.config.unwrap().audio.unwrap();
    assert_eq!(audio.sample_rate, 8000);
    assert_eq!(audio.channels, 1);
}

#[tokio::test]
async fn short_audio_keeps_its_place_on_the_reversed_timeline() {
    let backend = MemoryBackend::new();
    // 200ms of audio under 400ms of video
    backend.register(
        SOURCE,
        Synthetic::new()
            .with_video(gray_video(10, 4))
            .with_audio(ramp_audio(1600, 400)),
    );

    let summary = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();
    assert_eq!(summary.audio_frames, 1600);

    let out = backend.output(OUTPUT).unwrap();
    let first = &out.audio[0];
    assert_eq!(first.pts.to_duration(first.time_base), Duration::from_millis(200));
    assert_eq!(
        samples(&out.audio),
        (0..1600).rev().map(|j| j as i16).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn audio_past_the_video_end_is_cut() {
    let backend = MemoryBackend::new();
    // 500ms of audio under 400ms of video
    backend.register(
        SOURCE,
        Synthetic::new()
            .with_video(gray_video(10, 4))
            .with_audio(ramp_audio(4000, 500)),
    );

    let summary = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();
    assert_eq!(summary.audio_frames, 3200);

    let out = backend.output(OUTPUT).unwrap();
    assert_eq!(out.audio[0].pts.0, 0);
    assert_eq!(
        samples(&out.audio),
        (0..3200).rev().map(|j| j as i16).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn source_without_audio_exports_video_only() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, Synthetic::new().with_video(gray_video(6, 3)));

    let summary = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();
    assert_eq!(summary.audio_frames, 0);

    let out = backend.output(OUTPUT).unwrap();
    assert!(out.audio.is_empty());
    assert!(out.config.unwrap().audio.is_none());
    assert_eq!(backend.audio_opens(), 0);
}

#[tokio::test]
async fn skip_audio_yields_audio_free_output() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let config = ExportConfig::new().with_output(OUTPUT).with_skip_audio(true);
    engine(&backend, config).export().await.unwrap();

    let out = backend.output(OUTPUT).unwrap();
    assert!(out.audio.is_empty());
    assert!(out.config.unwrap().audio.is_none());
    assert_eq!(backend.audio_opens(), 0);
}

#[tokio::test]
async fn second_export_is_rejected_while_busy() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    backend.set_faults(Faults {
        read_delay: Some(Duration::from_millis(5)),
        ..Faults::default()
    });

    let engine = engine(&backend, ExportConfig::new().with_output(OUTPUT));
    let first = engine.export();
    assert!(engine.is_exporting());

    let second = engine.export().await.unwrap_err();
    assert!(matches!(second, ReverseError::ExportInProgress));
    assert_eq!(second.code(), -203);

    let summary = first.await.unwrap();
    assert_eq!(summary.video_frames, 10);
    assert_eq!(engine.state(), EngineState::Succeeded);

    // the engine accepts new work once the first export is done
    engine.export().await.unwrap();
}

#[tokio::test]
async fn missing_output_fails_without_io() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let engine = engine(&backend, ExportConfig::new());
    let err = engine.export().await.unwrap_err();

    assert!(matches!(err, ReverseError::MissingOutput));
    assert_eq!(err.code(), -100);
    assert_eq!(err.domain(), "revid.export");
    assert_eq!(backend.probes(), 0);
    assert_eq!(backend.writers(), 0);
    assert_eq!(engine.state(), EngineState::Created);
}

#[tokio::test]
async fn reversing_twice_restores_payloads() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();

    let restored = "/virtual/restored.mp4";
    FrameReversalEngine::new(
        OUTPUT,
        ExportConfig::new().with_output(restored),
        backend.as_backend(),
    )
    .export()
    .await
    .unwrap();

    let out = backend.output(restored).unwrap();
    assert_eq!(payloads(&out.video), (0..10u8).collect::<Vec<_>>());
    assert_eq!(
        samples(&out.audio),
        (0..3200).map(|j| j as i16).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn staged_arena_matches_memory_arena() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    let staging = tempfile::tempdir().unwrap();

    let policy = BufferPolicy::default()
        .with_force(ArenaKind::Staged)
        .with_staging_dir(staging.path())
        .with_max_run_frames(3);
    let config = ExportConfig::new()
        .with_output(OUTPUT)
        .with_buffer_policy(policy);

    let summary = engine(&backend, config).export().await.unwrap();
    assert_eq!(summary.arena, ArenaKind::Staged);

    let out = backend.output(OUTPUT).unwrap();
    assert_eq!(payloads(&out.video), (0..10u8).rev().collect::<Vec<_>>());

    // staged frames and the audio store are gone once the export returns
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn memory_limit_switches_to_staging() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    let staging = tempfile::tempdir().unwrap();

    let policy = BufferPolicy::default()
        .with_memory_limit(1)
        .with_staging_dir(staging.path());
    let config = ExportConfig::new()
        .with_output(OUTPUT)
        .with_buffer_policy(policy);

    let summary = engine(&backend, config).export().await.unwrap();
    assert_eq!(summary.arena, ArenaKind::Staged);
}

#[tokio::test]
async fn unknown_length_is_staged() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source().with_unknown_length());
    let staging = tempfile::tempdir().unwrap();

    let policy = BufferPolicy::default().with_staging_dir(staging.path());
    let config = ExportConfig::new()
        .with_output(OUTPUT)
        .with_buffer_policy(policy);

    let summary = engine(&backend, config).export().await.unwrap();
    assert_eq!(summary.arena, ArenaKind::Staged);

    let out = backend.output(OUTPUT).unwrap();
    assert_eq!(payloads(&out.video), (0..10u8).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn intra_only_source_reverses() {
    let backend = MemoryBackend::new();
    backend.register(
        SOURCE,
        Synthetic::new()
            .with_video(gray_video(5, 100))
            .with_video_codec(CodecId::ProRes),
    );

    engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();

    let out = backend.output(OUTPUT).unwrap();
    assert_eq!(payloads(&out.video), vec![4, 3, 2, 1, 0]);
}

#[tokio::test]
async fn only_first_video_track_is_used() {
    let backend = MemoryBackend::new();
    let mut other = gray_video(3, 1);
    for frame in &mut other {
        frame.data = vec![200; 4];
    }
    backend.register(
        SOURCE,
        Synthetic::new()
            .with_video(gray_video(4, 2))
            .with_video(other),
    );

    engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap();

    let out = backend.output(OUTPUT).unwrap();
    assert_eq!(payloads(&out.video), vec![3, 2, 1, 0]);
}

#[tokio::test]
async fn encoder_settings_reach_the_writer() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let config = ExportConfig::new()
        .with_output(OUTPUT)
        .with_video_settings(EncoderSettings::new().with("crf", 18))
        .with_audio_settings(EncoderSettings::new().with("bitrate", 96_000));
    engine(&backend, config).export().await.unwrap();

    let written = backend.output(OUTPUT).unwrap().config.unwrap();
    assert_eq!(written.video.settings.get("crf"), Some("18"));
    assert_eq!(written.video.time_base, VIDEO_TB);
    assert_eq!((written.video.width, written.video.height), (2, 2));
    assert_eq!(
        written.audio.unwrap().settings.get_parsed::<u32>("bitrate"),
        Some(96_000)
    );
}

#[tokio::test]
async fn load_probes_once() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let engine = engine(&backend, ExportConfig::new().with_output(OUTPUT));
    assert_eq!(engine.state(), EngineState::Created);

    engine.load().await.unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
    assert!(engine.analyzer().is_ready());

    engine.export().await.unwrap();
    assert_eq!(backend.probes(), 1);
}

#[tokio::test]
async fn unknown_source_is_a_reader_failure() {
    let backend = MemoryBackend::new();

    let engine = engine(&backend, ExportConfig::new().with_output(OUTPUT));
    let err = engine.export().await.unwrap_err();

    assert!(matches!(err, ReverseError::UnableToStartReader(_)));
    assert_eq!(err.code(), -101);
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(backend.writers(), 0);
}

#[tokio::test]
async fn video_open_failure_is_a_reader_failure() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    backend.set_faults(Faults {
        open_video: true,
        ..Faults::default()
    });

    let err = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap_err();
    assert!(matches!(err, ReverseError::UnableToStartReader(_)));
}

#[tokio::test]
async fn source_without_video_has_no_samples() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, Synthetic::new().with_audio(ramp_audio(800, 400)));

    let err = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap_err();
    assert!(matches!(err, ReverseError::NoSamples));
    assert_eq!(err.code(), -102);
}

#[tokio::test]
async fn empty_video_track_has_no_samples() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, Synthetic::new().with_video(Vec::new()));

    let err = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap_err();
    assert!(matches!(err, ReverseError::NoSamples));
    assert_eq!(backend.writers(), 0);
}

#[tokio::test]
async fn writer_open_failure_is_reported() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    backend.set_faults(Faults {
        create_writer: true,
        ..Faults::default()
    });

    let err = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap_err();
    assert!(matches!(err, ReverseError::UnableToStartWriter(_)));
    assert_eq!(err.code(), -103);
    assert!(backend.output(OUTPUT).is_none());
}

#[tokio::test]
async fn failed_frame_aborts_without_finalizing() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    backend.set_faults(Faults {
        write_video_at: Some(3),
        ..Faults::default()
    });

    let engine = engine(&backend, ExportConfig::new().with_output(OUTPUT));
    let err = engine.export().await.unwrap_err();

    match &err {
        ReverseError::UnableToWriteFrame {
            stream, position, ..
        } => {
            assert_eq!(*stream, TrackKind::Video);
            assert_eq!(*position, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), -104);
    assert!(backend.output(OUTPUT).is_none());
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test]
async fn failed_audio_read_aborts_without_finalizing() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    backend.set_faults(Faults {
        audio_read_at: Some(2),
        ..Faults::default()
    });

    let engine = engine(&backend, ExportConfig::new().with_output(OUTPUT));
    let err = engine.export().await.unwrap_err();

    match &err {
        ReverseError::UnableToWriteFrame {
            stream, position, ..
        } => {
            assert_eq!(*stream, TrackKind::Audio);
            assert_eq!(*position, 1000);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), -104);
    assert!(backend.output(OUTPUT).is_none());
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test]
async fn failed_audio_write_aborts_without_finalizing() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());
    backend.set_faults(Faults {
        write_audio_at: Some(1),
        ..Faults::default()
    });

    let err = engine(&backend, ExportConfig::new().with_output(OUTPUT))
        .export()
        .await
        .unwrap_err();

    match &err {
        ReverseError::UnableToWriteFrame {
            stream, position, ..
        } => {
            assert_eq!(*stream, TrackKind::Audio);
            // the short tail unit of the 1024-frame store goes first
            assert_eq!(*position, 3200 - 3 * 1024);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), -104);
    assert!(backend.output(OUTPUT).is_none());
}

#[tokio::test]
async fn callbacks_report_progress_then_result_once() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let updates: Arc<Mutex<Vec<Progress>>> = Arc::default();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let seen = Arc::clone(&updates);
    engine(&backend, ExportConfig::new().with_output(OUTPUT)).export_with_callbacks(
        move |progress| seen.lock().push(progress),
        move |result| {
            let _ = done_tx.send(result);
        },
    );

    let summary = done_rx.await.unwrap().unwrap();
    assert_eq!(summary.video_frames, 10);

    let updates = updates.lock().clone();
    assert!(updates.contains(&Progress {
        operation: Operation::Probing,
        value: ProgressValue::Indeterminate,
    }));
    assert!(updates.contains(&Progress {
        operation: Operation::ExportingAudio,
        value: ProgressValue::Indeterminate,
    }));
    for fraction in updates.iter().filter_map(Progress::fraction) {
        assert!((0.0..=1.0).contains(&fraction));
    }

    let last_write = updates
        .iter()
        .rev()
        .find(|p| p.operation == Operation::Writing)
        .and_then(Progress::fraction);
    assert_eq!(last_write, Some(1.0));
}

#[tokio::test]
async fn handle_streams_progress() {
    let backend = MemoryBackend::new();
    backend.register(SOURCE, av_source());

    let mut handle = engine(&backend, ExportConfig::new().with_output(OUTPUT)).export();

    let mut operations = Vec::new();
    while let Some(progress) = handle.next_progress().await {
        if operations.last() != Some(&progress.operation) {
            operations.push(progress.operation);
        }
    }
    handle.wait().await.unwrap();

    assert_eq!(
        operations,
        vec![
            Operation::Probing,
            Operation::ReadingVideo,
            Operation::ExportingAudio,
            Operation::Writing,
            Operation::Finalizing,
        ]
    );
}
