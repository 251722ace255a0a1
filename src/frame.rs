/// Root-mean-square energy of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// A fixed-duration slice of captured audio. Immutable once captured;
/// sequence numbers are assigned by the capture callback and are strictly
/// increasing and gapless within a session.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    seq: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, seq: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            seq,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// The denoised counterpart of exactly one [`AudioFrame`]. Ownership passes
/// from capture to filter to recognizer; there is never more than one owner.
#[derive(Debug, Clone)]
pub struct FilteredFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    seq: u64,
}

impl FilteredFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, seq: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            seq,
        }
    }

    /// Consumes a frame unchanged, for the pass-through paths of the filter.
    pub fn passthrough(frame: AudioFrame) -> Self {
        Self {
            samples: frame.samples,
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            seq: frame.seq,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Ordered run of filtered frames accumulated since the last silence
/// boundary. Cleared after every emitted segment.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    frames: Vec<FilteredFrame>,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: FilteredFrame) {
        debug_assert!(
            self.frames.last().map_or(true, |last| frame.seq() > last.seq()),
            "frames must arrive in sequence order"
        );
        self.frames.push(frame);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn start_seq(&self) -> Option<u64> {
        self.frames.first().map(|f| f.seq())
    }

    pub fn end_seq(&self) -> Option<u64> {
        self.frames.last().map(|f| f.seq())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.frames.first().map(|f| f.sample_rate())
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames.iter().map(|f| f.duration_secs()).sum()
    }

    /// Contiguous copy of the buffered samples, in frame order.
    pub fn samples(&self) -> Vec<f32> {
        let total = self.frames.iter().map(|f| f.samples().len()).sum();
        let mut samples = Vec::with_capacity(total);
        for frame in &self.frames {
            samples.extend_from_slice(frame.samples());
        }
        samples
    }
}

/// One transcribed utterance. Immutable after creation.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seq: u64,
    pub end_seq: u64,
    pub confidence: f32,
}

impl TranscriptSegment {
    pub fn new(text: String, start_seq: u64, end_seq: u64, confidence: f32) -> Self {
        debug_assert!(end_seq >= start_seq, "segment must not end before it starts");
        Self {
            text,
            start_seq,
            end_seq,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64, samples: Vec<f32>) -> FilteredFrame {
        FilteredFrame::new(samples, 16000, 1, seq)
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let samples = vec![0.5; 480];
        assert!((rms(&samples) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_frame_duration() {
        let f = AudioFrame::new(vec![0.0; 480], 16000, 1, 0);
        assert!((f.duration_secs() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_passthrough_preserves_identity() {
        let f = AudioFrame::new(vec![0.1, -0.2, 0.3], 16000, 1, 7);
        let filtered = FilteredFrame::passthrough(f.clone());
        assert_eq!(filtered.samples(), f.samples());
        assert_eq!(filtered.seq(), 7);
        assert_eq!(filtered.sample_rate(), 16000);
    }

    #[test]
    fn test_utterance_buffer_bounds_and_samples() {
        let mut buffer = UtteranceBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.start_seq(), None);

        buffer.push(frame(3, vec![0.1, 0.2]));
        buffer.push(frame(4, vec![0.3]));
        assert_eq!(buffer.frame_count(), 2);
        assert_eq!(buffer.start_seq(), Some(3));
        assert_eq!(buffer.end_seq(), Some(4));
        assert_eq!(buffer.samples(), vec![0.1, 0.2, 0.3]);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.end_seq(), None);
    }

    #[test]
    fn test_segment_confidence_is_clamped() {
        let segment = TranscriptSegment::new("hi".into(), 2, 6, 1.7);
        assert_eq!(segment.confidence, 1.0);
        let segment = TranscriptSegment::new("hi".into(), 2, 6, -0.3);
        assert_eq!(segment.confidence, 0.0);
    }

    #[test]
    #[should_panic(expected = "segment must not end before it starts")]
    fn test_segment_rejects_inverted_bounds_in_debug() {
        TranscriptSegment::new("hi".into(), 6, 2, 0.5);
    }
}
