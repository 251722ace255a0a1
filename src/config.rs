use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whisper decoding parameters, mirrored into [`ct2rs::WhisperOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperOptionsSerde {
    pub beam_size: usize,
    pub patience: f32,
    pub repetition_penalty: f32,
}

impl Default for WhisperOptionsSerde {
    fn default() -> Self {
        Self {
            beam_size: 5,
            patience: 1.0,
            repetition_penalty: 1.25,
        }
    }
}

impl WhisperOptionsSerde {
    pub fn to_whisper_options(&self) -> ct2rs::WhisperOptions {
        ct2rs::WhisperOptions {
            beam_size: self.beam_size,
            patience: self.patience,
            repetition_penalty: self.repetition_penalty,
            ..Default::default()
        }
    }
}

/// Tuning for the spectral noise filter, separate from the utterance
/// detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterTuning {
    /// Smoothing factor for the adaptive noise estimates, in (0, 1]
    pub ema_alpha: f32,
    /// How aggressively the noise spectrum is subtracted
    pub oversubtraction: f32,
    /// Lowest per-bin gain the filter will apply, in [0, 1]
    pub gain_floor: f32,
    /// A frame counts as speech when its energy exceeds gate * noise floor
    pub speech_gate: f32,
}

impl Default for FilterTuning {
    fn default() -> Self {
        Self {
            ema_alpha: 0.05,
            oversubtraction: 1.5,
            gain_floor: 0.1,
            speech_gate: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Main model to use for transcription
    pub model: String,
    /// Optional URL of a pre-converted CTranslate2 model archive (.tar.gz)
    pub model_archive_url: Option<String>,
    /// Language for transcription
    pub language: String,
    /// Compute type for model inference
    pub compute_type: String,
    /// Input device selected by name substring; default device when unset
    pub input_device: Option<String>,
    /// Whether to log statistics
    pub log_stats_enabled: bool,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Duration of one capture frame in milliseconds
    pub frame_duration_ms: u64,
    /// RMS energy above which a frame counts as speech activity
    pub speech_threshold: f32,
    /// Sub-threshold gap tolerated inside an utterance before it is finished
    pub trailing_silence_ms: u64,
    /// Hard cap on utterance length; continuous speech is cut here
    pub max_utterance_ms: u64,
    /// Frames used to seed the noise-floor estimate before filtering starts
    pub noise_floor_seed_frames: usize,
    /// Capacity of the capture-to-processing frame queue
    pub queue_capacity: usize,
    /// Write each finalized utterance as a WAV file
    pub save_utterance_audio: bool,
    /// Directory for utterance WAV files
    pub utterance_audio_dir: String,
    /// Whisper model configuration
    pub whisper_options: WhisperOptionsSerde,
    /// Noise filter configuration
    pub filter: FilterTuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "openai/whisper-base.en".to_string(),
            model_archive_url: None,
            language: "en".to_string(),
            compute_type: "INT8".to_string(),
            input_device: None,
            log_stats_enabled: true,
            sample_rate: 16000, // what Whisper expects
            frame_duration_ms: 32,
            speech_threshold: 0.015,
            trailing_silence_ms: 700,
            max_utterance_ms: 15000,
            noise_floor_seed_frames: 50,
            queue_capacity: 4,
            save_utterance_audio: false,
            utterance_audio_dir: "utterances".to_string(),
            whisper_options: WhisperOptionsSerde::default(),
            filter: FilterTuning::default(),
        }
    }
}

impl AppConfig {
    /// Samples per capture frame.
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms / 1000) as usize
    }

    /// Trailing-silence tolerance expressed in whole frames, at least one.
    pub fn trailing_silence_frames(&self) -> usize {
        self.trailing_silence_ms.div_ceil(self.frame_duration_ms).max(1) as usize
    }

    /// Utterance length cap expressed in whole frames, at least one.
    pub fn max_utterance_frames(&self) -> usize {
        (self.max_utterance_ms / self.frame_duration_ms).max(1) as usize
    }

    /// Rejects configurations the pipeline cannot run with. Called once at
    /// startup; a failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.frame_duration_ms == 0 {
            return Err(ConfigError::ZeroFrameDuration);
        }
        if self.frame_samples() == 0 {
            return Err(ConfigError::FrameTooShort {
                sample_rate: self.sample_rate,
                frame_duration_ms: self.frame_duration_ms,
            });
        }
        if !self.speech_threshold.is_finite() || self.speech_threshold < 0.0 {
            return Err(ConfigError::InvalidSpeechThreshold(self.speech_threshold));
        }
        if self.trailing_silence_ms == 0 {
            return Err(ConfigError::ZeroTrailingSilence);
        }
        if self.max_utterance_ms < self.frame_duration_ms {
            return Err(ConfigError::UtteranceCapTooShort {
                max_utterance_ms: self.max_utterance_ms,
                frame_duration_ms: self.frame_duration_ms,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        let filter = &self.filter;
        if !(filter.ema_alpha > 0.0 && filter.ema_alpha <= 1.0) {
            return Err(ConfigError::InvalidEmaAlpha(filter.ema_alpha));
        }
        if !(0.0..=1.0).contains(&filter.gain_floor) {
            return Err(ConfigError::InvalidGainFloor(filter.gain_floor));
        }
        if !(filter.oversubtraction > 0.0) {
            return Err(ConfigError::InvalidOversubtraction(filter.oversubtraction));
        }
        if filter.speech_gate < 1.0 || !filter.speech_gate.is_finite() {
            return Err(ConfigError::InvalidSpeechGate(filter.speech_gate));
        }
        Ok(())
    }
}

/// Reads `config.json` from the working directory. A missing or unparsable
/// file falls back to defaults; out-of-range values are caught later by
/// [`AppConfig::validate`].
pub fn read_app_config() -> AppConfig {
    match std::fs::read_to_string("config.json") {
        Ok(config_str) => match serde_json::from_str(&config_str) {
            Ok(config) => config,
            Err(e) => {
                warn!("failed to parse config.json: {e}. Using default configuration.");
                AppConfig::default()
            }
        },
        Err(e) => {
            warn!("failed to read config.json: {e}. Using default configuration.");
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_derived_frame_quantities() {
        let config = AppConfig::default();
        assert_eq!(config.frame_samples(), 512); // 32 ms at 16 kHz
        assert_eq!(config.trailing_silence_frames(), 22); // ceil(700 / 32)
        assert_eq!(config.max_utterance_frames(), 468); // 15000 / 32
    }

    #[test]
    fn test_non_positive_durations_are_rejected() {
        let mut config = AppConfig::default();
        config.frame_duration_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroFrameDuration)
        ));

        let mut config = AppConfig::default();
        config.trailing_silence_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTrailingSilence)
        ));

        let mut config = AppConfig::default();
        config.sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSampleRate)));
    }

    #[test]
    fn test_utterance_cap_must_cover_a_frame() {
        let mut config = AppConfig::default();
        config.max_utterance_ms = 10;
        config.frame_duration_ms = 32;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UtteranceCapTooShort { .. })
        ));
    }

    #[test]
    fn test_threshold_must_be_finite() {
        let mut config = AppConfig::default();
        config.speech_threshold = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSpeechThreshold(_))
        ));
        config.speech_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filter_tuning_bounds() {
        let mut config = AppConfig::default();
        config.filter.ema_alpha = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEmaAlpha(_))
        ));

        let mut config = AppConfig::default();
        config.filter.gain_floor = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGainFloor(_))
        ));
    }
}
