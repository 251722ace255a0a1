use anyhow::Context;
use log::{info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

mod audio_capture;
mod config;
mod continuous_session;
mod download;
mod error;
mod frame;
mod frame_queue;
mod noise_filter;
mod recognition;
mod stats_reporter;
mod streaming_recognizer;
mod transcription_stats;
mod wav_dump;

use audio_capture::AudioCapture;
use continuous_session::ContinuousSession;
use frame_queue::FrameQueue;
use noise_filter::{FilterConfig, NoiseFilter};
use recognition::WhisperBackend;
use stats_reporter::StatsReporter;
use streaming_recognizer::{RecognizerConfig, StreamingRecognizer};
use transcription_stats::TranscriptionStats;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_config = config::read_app_config();
    app_config.validate().context("invalid configuration")?;

    match AudioCapture::list_input_devices() {
        Ok(names) if names.is_empty() => warn!("no audio input devices found"),
        Ok(names) => info!("available input devices: {}", names.join(", ")),
        Err(e) => warn!("could not enumerate input devices: {e}"),
    }

    let model_path = download::init_model(&app_config).await?;

    let stats = Arc::new(Mutex::new(TranscriptionStats::new()));
    let backend = WhisperBackend::new(&model_path, &app_config, stats.clone())
        .context("failed to initialize recognition backend")?;

    let running = Arc::new(AtomicBool::new(true));
    let queue = Arc::new(FrameQueue::new(app_config.queue_capacity));
    let (segment_tx, mut segment_rx) = broadcast::channel(100);

    let mut capture = AudioCapture::new();
    capture
        .start(queue.clone(), running.clone(), &app_config)
        .context("failed to open audio input")?;

    let stats_reporter = StatsReporter::new(
        stats.clone(),
        running.clone(),
        app_config.log_stats_enabled,
    );
    stats_reporter.start_periodic_reporting();

    let filter = NoiseFilter::new(FilterConfig::from_config(&app_config));
    let mut recognizer = StreamingRecognizer::new(
        RecognizerConfig::from_config(&app_config),
        Box::new(backend),
    );
    if app_config.save_utterance_audio {
        recognizer = recognizer.with_audio_dump(PathBuf::from(&app_config.utterance_audio_dir));
    }

    let mut session = ContinuousSession::new(
        queue,
        filter,
        recognizer,
        running.clone(),
        segment_tx,
        &app_config,
    );
    let session_task = tokio::task::spawn_blocking(move || session.run());

    // surface transcribed segments on stdout as they arrive
    tokio::spawn(async move {
        while let Ok(segment) = segment_rx.recv().await {
            println!("{}", segment.text);
        }
    });

    let running_for_signal = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            running_for_signal.store(false, Ordering::Relaxed);
        }
    });

    let session_result = session_task
        .await
        .context("transcription session panicked")?;

    running.store(false, Ordering::Relaxed);
    capture.stop();
    stats_reporter.report_final();

    session_result.context("transcription session failed")?;
    Ok(())
}
