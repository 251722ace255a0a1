use ct2rs::{ComputeType, Config, Device, Whisper, WhisperOptions};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::error::RecognitionError;
use crate::frame::UtteranceBuffer;
use crate::transcription_stats::TranscriptionStats;

/// Text produced by a backend for one utterance.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    /// Backend-reported confidence in [0, 1]
    pub confidence: f32,
}

/// The single, statically-checked seam to the speech-to-text engine.
pub trait RecognitionBackend: Send {
    fn recognize(&mut self, utterance: &UtteranceBuffer) -> Result<Transcription, RecognitionError>;
}

/// Whisper via CTranslate2. The model is loaded synchronously at session
/// start, owned here, and released when the session's recognizer is dropped.
pub struct WhisperBackend {
    whisper: Whisper,
    language: String,
    options: WhisperOptions,
    stats: Arc<Mutex<TranscriptionStats>>,
}

impl WhisperBackend {
    pub fn new(
        model_path: &Path,
        app_config: &AppConfig,
        stats: Arc<Mutex<TranscriptionStats>>,
    ) -> Result<Self, RecognitionError> {
        let compute_type = match app_config.compute_type.as_str() {
            "FLOAT16" => ComputeType::FLOAT16,
            "INT8" => ComputeType::INT8,
            _ => ComputeType::INT8,
        };

        let mut config = Config::default();
        config.device = Device::CPU;
        config.compute_type = compute_type;
        config.num_threads_per_replica = 8;

        let whisper = Whisper::new(model_path, config)
            .map_err(|e| RecognitionError::ModelLoad(e.to_string()))?;
        info!("Whisper model loaded from {:?}", model_path);

        Ok(Self {
            whisper,
            language: app_config.language.clone(),
            options: app_config.whisper_options.to_whisper_options(),
            stats,
        })
    }
}

impl RecognitionBackend for WhisperBackend {
    fn recognize(&mut self, utterance: &UtteranceBuffer) -> Result<Transcription, RecognitionError> {
        let samples = utterance.samples();
        let audio_secs = utterance.duration_secs() as f32;

        let inference_start = Instant::now();
        let result = self
            .whisper
            .generate(&samples, Some(self.language.as_str()), false, &self.options)
            .map_err(|e| RecognitionError::Backend(e.to_string()))?;
        let inference_secs = inference_start.elapsed().as_secs_f32();

        if let Some(mut stats) = self.stats.try_lock() {
            stats.record(audio_secs, inference_secs);
        }

        let text = result
            .first()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        debug!(
            "transcribed {audio_secs:.2}s of audio in {inference_secs:.2}s: '{text}'"
        );

        // ct2rs exposes no per-segment score
        Ok(Transcription {
            text,
            confidence: 1.0,
        })
    }
}
