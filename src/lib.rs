pub mod audio_capture;
pub mod config;
pub mod continuous_session;
pub mod download;
pub mod error;
pub mod frame;
pub mod frame_queue;
pub mod noise_filter;
pub mod recognition;
pub mod stats_reporter;
pub mod streaming_recognizer;
pub mod transcription_stats;
pub mod wav_dump;

// Re-export key components for easier access
pub use audio_capture::AudioCapture;
pub use config::{read_app_config, AppConfig};
pub use continuous_session::ContinuousSession;
pub use error::{ConfigError, DeviceError, RecognitionError};
pub use frame::{AudioFrame, FilteredFrame, TranscriptSegment, UtteranceBuffer};
pub use frame_queue::FrameQueue;
pub use noise_filter::{FilterConfig, NoiseFilter};
pub use recognition::{RecognitionBackend, Transcription, WhisperBackend};
pub use stats_reporter::StatsReporter;
pub use streaming_recognizer::{RecognizerConfig, StreamingRecognizer, UtteranceState};
pub use transcription_stats::TranscriptionStats;
