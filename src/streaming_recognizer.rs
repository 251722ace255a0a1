use log::{debug, warn};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::RecognitionError;
use crate::frame::{FilteredFrame, TranscriptSegment, UtteranceBuffer};
use crate::recognition::RecognitionBackend;
use crate::wav_dump;

/// Where the recognizer currently is between utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    /// Waiting for speech activity
    Listening,
    /// Collecting frames of an ongoing utterance
    Accumulating,
    /// Handing the buffered utterance to the backend; transient, the state
    /// settles back to `Listening` within the same `push_frame` call
    Finalizing,
}

/// Utterance detection parameters, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// RMS energy above which a frame counts as speech activity
    pub speech_threshold: f32,
    /// Sub-threshold frames tolerated before an utterance is finished
    pub trailing_silence_frames: usize,
    /// Hard cap on buffered frames per utterance
    pub max_utterance_frames: usize,
}

impl RecognizerConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            speech_threshold: config.speech_threshold,
            trailing_silence_frames: config.trailing_silence_frames(),
            max_utterance_frames: config.max_utterance_frames(),
        }
    }
}

/// Buffers filtered frames, detects utterance boundaries by energy, and
/// runs the recognition backend once per detected utterance.
///
/// Silence inside the tolerance window stays part of the utterance (quiet
/// speech tails live there); the frame that exhausts the tolerance does not.
/// On a backend failure the buffered audio is discarded and detection starts
/// over; stale audio is not worth re-processing in a real-time pipeline.
pub struct StreamingRecognizer {
    config: RecognizerConfig,
    backend: Box<dyn RecognitionBackend>,
    state: UtteranceState,
    buffer: UtteranceBuffer,
    trailing_silence: usize,
    audio_dump_dir: Option<PathBuf>,
}

impl StreamingRecognizer {
    pub fn new(config: RecognizerConfig, backend: Box<dyn RecognitionBackend>) -> Self {
        Self {
            config,
            backend,
            state: UtteranceState::Listening,
            buffer: UtteranceBuffer::new(),
            trailing_silence: 0,
            audio_dump_dir: None,
        }
    }

    /// Enables dumping each finalized utterance as a WAV file into `dir`.
    pub fn with_audio_dump(mut self, dir: PathBuf) -> Self {
        self.audio_dump_dir = Some(dir);
        self
    }

    pub fn state(&self) -> UtteranceState {
        self.state
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.frame_count()
    }

    /// Feeds one frame through the utterance state machine. Returns a
    /// segment only when this frame finished an utterance; a backend
    /// failure discards the utterance and resets to `Listening`.
    pub fn push_frame(
        &mut self,
        frame: FilteredFrame,
    ) -> Result<Option<TranscriptSegment>, RecognitionError> {
        match self.state {
            UtteranceState::Listening => {
                if frame.rms() > self.config.speech_threshold {
                    debug!("speech activity at frame {}", frame.seq());
                    self.state = UtteranceState::Accumulating;
                    self.trailing_silence = 0;
                    self.buffer.push(frame);
                    if self.buffer.frame_count() >= self.config.max_utterance_frames {
                        return self.finalize();
                    }
                }
                Ok(None)
            }
            UtteranceState::Accumulating => {
                if frame.rms() > self.config.speech_threshold {
                    self.trailing_silence = 0;
                    self.buffer.push(frame);
                } else {
                    self.trailing_silence += 1;
                    if self.trailing_silence >= self.config.trailing_silence_frames {
                        // this frame is past the utterance; it is not included
                        return self.finalize();
                    }
                    self.buffer.push(frame);
                }
                if self.buffer.frame_count() >= self.config.max_utterance_frames {
                    return self.finalize();
                }
                Ok(None)
            }
            // finalization never rests across calls
            UtteranceState::Finalizing => Ok(None),
        }
    }

    fn finalize(&mut self) -> Result<Option<TranscriptSegment>, RecognitionError> {
        self.state = UtteranceState::Finalizing;

        let (start_seq, end_seq) = match (self.buffer.start_seq(), self.buffer.end_seq()) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                self.reset();
                return Ok(None);
            }
        };

        if let Some(dir) = &self.audio_dump_dir {
            if let Err(e) = wav_dump::write_utterance(dir, &self.buffer) {
                warn!("failed to dump utterance audio: {e}");
            }
        }

        debug!(
            "finalizing utterance [{start_seq}, {end_seq}] ({} frames, {:.2}s)",
            self.buffer.frame_count(),
            self.buffer.duration_secs()
        );

        let result = self.backend.recognize(&self.buffer);
        self.reset();

        match result {
            Ok(transcription) if transcription.text.is_empty() => {
                debug!("empty transcription for [{start_seq}, {end_seq}], dropping");
                Ok(None)
            }
            Ok(transcription) => Ok(Some(TranscriptSegment::new(
                transcription.text,
                start_seq,
                end_seq,
                transcription.confidence,
            ))),
            Err(e) => Err(e),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.trailing_silence = 0;
        self.state = UtteranceState::Listening;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::Transcription;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FRAME_SAMPLES: usize = 160;

    /// Records each utterance's bounds and replies with canned text.
    struct MockBackend {
        calls: Arc<AtomicUsize>,
        fail: bool,
        reply: String,
        seen_bounds: Arc<parking_lot::Mutex<Vec<(u64, u64)>>>,
    }

    impl MockBackend {
        fn new(reply: &str) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                reply: reply.to_string(),
                seen_bounds: Arc::new(parking_lot::Mutex::new(Vec::new())),
            }
        }

        fn failing() -> Self {
            let mut backend = Self::new("");
            backend.fail = true;
            backend
        }
    }

    impl RecognitionBackend for MockBackend {
        fn recognize(
            &mut self,
            utterance: &UtteranceBuffer,
        ) -> Result<Transcription, RecognitionError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.seen_bounds.lock().push((
                utterance.start_seq().expect("non-empty utterance"),
                utterance.end_seq().expect("non-empty utterance"),
            ));
            if self.fail {
                return Err(RecognitionError::Backend("mock failure".into()));
            }
            Ok(Transcription {
                text: self.reply.clone(),
                confidence: 0.9,
            })
        }
    }

    fn frame(seq: u64, amplitude: f32) -> FilteredFrame {
        FilteredFrame::new(vec![amplitude; FRAME_SAMPLES], 16000, 1, seq)
    }

    fn recognizer_with(
        backend: MockBackend,
        tolerance: usize,
        max_frames: usize,
    ) -> StreamingRecognizer {
        StreamingRecognizer::new(
            RecognizerConfig {
                speech_threshold: 5.0,
                trailing_silence_frames: tolerance,
                max_utterance_frames: max_frames,
            },
            Box::new(backend),
        )
    }

    /// Energies [0,0,8,9,9,0,0,0,0,0] with threshold 5 and tolerance 3:
    /// speech starts at frame 2, the third trailing silence frame (7)
    /// finishes the utterance, and the segment spans [2, 6].
    #[test]
    fn test_burst_with_trailing_silence_yields_one_segment() {
        let backend = MockBackend::new("hello");
        let calls = backend.calls.clone();
        let mut recognizer = recognizer_with(backend, 3, 100);

        let energies = [0.0, 0.0, 8.0, 9.0, 9.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut segments = Vec::new();
        for (seq, energy) in energies.iter().enumerate() {
            if let Some(segment) = recognizer.push_frame(frame(seq as u64, *energy)).unwrap() {
                segments.push((seq, segment));
            }
        }

        assert_eq!(segments.len(), 1);
        let (emitted_at, segment) = &segments[0];
        assert_eq!(*emitted_at, 7);
        assert_eq!(segment.start_seq, 2);
        assert_eq!(segment.end_seq, 6);
        assert_eq!(segment.text, "hello");
        assert!((segment.confidence - 0.9).abs() < 1e-6);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(recognizer.state(), UtteranceState::Listening);
        assert_eq!(recognizer.buffered_frames(), 0);
    }

    #[test]
    fn test_all_silence_never_leaves_listening() {
        let backend = MockBackend::new("nope");
        let calls = backend.calls.clone();
        let mut recognizer = recognizer_with(backend, 3, 100);

        for seq in 0..200 {
            let result = recognizer.push_frame(frame(seq, 0.0)).unwrap();
            assert!(result.is_none());
            assert_eq!(recognizer.state(), UtteranceState::Listening);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_max_utterance_cap_forces_finalization() {
        let backend = MockBackend::new("long");
        let bounds = backend.seen_bounds.clone();
        let mut recognizer = recognizer_with(backend, 3, 5);

        let mut segment = None;
        for seq in 0..5 {
            // continuous speech, no trailing silence at all
            if let Some(s) = recognizer.push_frame(frame(seq, 9.0)).unwrap() {
                segment = Some(s);
            }
        }
        let segment = segment.expect("cap must finalize the utterance");
        assert_eq!(segment.start_seq, 0);
        assert_eq!(segment.end_seq, 4);
        assert_eq!(bounds.lock()[0], (0, 4));
        assert_eq!(recognizer.state(), UtteranceState::Listening);
    }

    #[test]
    fn test_backend_failure_discards_buffer_and_resumes() {
        let backend = MockBackend::failing();
        let mut recognizer = recognizer_with(backend, 2, 100);

        recognizer.push_frame(frame(0, 9.0)).unwrap();
        recognizer.push_frame(frame(1, 9.0)).unwrap();
        recognizer.push_frame(frame(2, 0.0)).unwrap();
        let err = recognizer.push_frame(frame(3, 0.0));
        assert!(err.is_err());

        // fresh start: empty buffer, listening again
        assert_eq!(recognizer.state(), UtteranceState::Listening);
        assert_eq!(recognizer.buffered_frames(), 0);
        assert!(recognizer.push_frame(frame(4, 0.0)).unwrap().is_none());
        assert_eq!(recognizer.state(), UtteranceState::Listening);
    }

    #[test]
    fn test_segments_are_ordered_and_disjoint() {
        let backend = MockBackend::new("seg");
        let mut recognizer = recognizer_with(backend, 2, 100);

        let mut segments = Vec::new();
        let mut seq = 0u64;
        for _ in 0..4 {
            // a burst of speech followed by enough silence to finalize
            for _ in 0..3 {
                if let Some(s) = recognizer.push_frame(frame(seq, 8.0)).unwrap() {
                    segments.push(s);
                }
                seq += 1;
            }
            for _ in 0..3 {
                if let Some(s) = recognizer.push_frame(frame(seq, 0.0)).unwrap() {
                    segments.push(s);
                }
                seq += 1;
            }
        }

        assert_eq!(segments.len(), 4);
        for window in segments.windows(2) {
            assert!(window[0].end_seq < window[1].start_seq);
        }
        for segment in &segments {
            assert!(segment.end_seq >= segment.start_seq);
        }
    }

    #[test]
    fn test_silence_within_tolerance_stays_in_utterance() {
        let backend = MockBackend::new("gap");
        let mut recognizer = recognizer_with(backend, 3, 100);

        // speech, a two-frame dip, speech again, then real silence
        let energies = [8.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0];
        let mut segments = Vec::new();
        for (seq, energy) in energies.iter().enumerate() {
            if let Some(s) = recognizer.push_frame(frame(seq as u64, *energy)).unwrap() {
                segments.push(s);
            }
        }
        assert_eq!(segments.len(), 1);
        // the dip at frames 1-2 was bridged; 4 and 5 are kept as tail
        assert_eq!(segments[0].start_seq, 0);
        assert_eq!(segments[0].end_seq, 5);
    }

    #[test]
    fn test_empty_transcription_emits_nothing() {
        let backend = MockBackend::new("");
        let calls = backend.calls.clone();
        let mut recognizer = recognizer_with(backend, 1, 100);

        recognizer.push_frame(frame(0, 9.0)).unwrap();
        let result = recognizer.push_frame(frame(1, 0.0)).unwrap();
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(recognizer.state(), UtteranceState::Listening);
    }
}
