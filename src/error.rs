use thiserror::Error;

/// Failures of the audio input device. All of these are fatal to the session.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to initialize audio host: {0}")]
    Host(String),

    #[error("no audio input device matching \"{0}\"")]
    NotFound(String),

    #[error("failed to open input stream: {0}")]
    Open(String),

    #[error("failed to start input stream: {0}")]
    Start(String),

    #[error("audio input device stopped delivering frames")]
    Disconnected,
}

/// Failures of the recognition backend. Model loading happens at session
/// start and is fatal; a per-utterance failure is recovered by discarding
/// the utterance and resuming.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("failed to load recognition model: {0}")]
    ModelLoad(String),

    #[error("recognition backend failed: {0}")]
    Backend(String),
}

/// Invalid configuration values, rejected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample_rate must be positive")]
    ZeroSampleRate,

    #[error("frame_duration_ms must be positive")]
    ZeroFrameDuration,

    #[error("frame of {frame_duration_ms} ms holds no samples at {sample_rate} Hz")]
    FrameTooShort {
        sample_rate: u32,
        frame_duration_ms: u64,
    },

    #[error("speech_threshold must be finite and non-negative (got {0})")]
    InvalidSpeechThreshold(f32),

    #[error("trailing_silence_ms must be positive")]
    ZeroTrailingSilence,

    #[error("max_utterance_ms ({max_utterance_ms}) must cover at least one frame of {frame_duration_ms} ms")]
    UtteranceCapTooShort {
        max_utterance_ms: u64,
        frame_duration_ms: u64,
    },

    #[error("queue_capacity must be positive")]
    ZeroQueueCapacity,

    #[error("filter.ema_alpha must be in (0, 1] (got {0})")]
    InvalidEmaAlpha(f32),

    #[error("filter.gain_floor must be in [0, 1] (got {0})")]
    InvalidGainFloor(f32),

    #[error("filter.oversubtraction must be positive (got {0})")]
    InvalidOversubtraction(f32),

    #[error("filter.speech_gate must be at least 1 (got {0})")]
    InvalidSpeechGate(f32),
}
