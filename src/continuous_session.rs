use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::error::DeviceError;
use crate::frame::TranscriptSegment;
use crate::frame_queue::{FrameQueue, PopOutcome};
use crate::noise_filter::NoiseFilter;
use crate::streaming_recognizer::StreamingRecognizer;

/// How long the queue may stay empty before the input device is presumed
/// gone. Capture delivers frames continuously even in silence, so a healthy
/// device never starves the queue this long.
const DEVICE_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the capture → filter → recognize loop for one session.
///
/// Every frame is processed start-to-finish on this one task; ordering is
/// what keeps the utterance buffer contiguous. Cancellation is observed at
/// least once per frame duration through the queue pop timeout, and a
/// partially accumulated utterance is discarded on exit rather than
/// force-finalized.
pub struct ContinuousSession {
    queue: Arc<FrameQueue>,
    filter: NoiseFilter,
    recognizer: StreamingRecognizer,
    running: Arc<AtomicBool>,
    segment_tx: broadcast::Sender<TranscriptSegment>,
    frame_duration: Duration,
}

impl ContinuousSession {
    pub fn new(
        queue: Arc<FrameQueue>,
        filter: NoiseFilter,
        recognizer: StreamingRecognizer,
        running: Arc<AtomicBool>,
        segment_tx: broadcast::Sender<TranscriptSegment>,
        config: &AppConfig,
    ) -> Self {
        Self {
            queue,
            filter,
            recognizer,
            running,
            segment_tx,
            frame_duration: Duration::from_millis(config.frame_duration_ms),
        }
    }

    /// Blocks until cancellation or a fatal device failure. Recognition
    /// failures are logged and swallowed per-utterance; the loop continues
    /// with the next frame.
    pub fn run(&mut self) -> Result<(), DeviceError> {
        info!("transcription session started");
        let mut last_frame = Instant::now();

        while self.running.load(Ordering::Relaxed) {
            match self.queue.pop_timeout(self.frame_duration) {
                PopOutcome::Frame(frame) => {
                    last_frame = Instant::now();
                    let filtered = self.filter.apply(frame);
                    match self.recognizer.push_frame(filtered) {
                        Ok(Some(segment)) => self.publish(segment),
                        Ok(None) => {}
                        Err(e) => warn!("utterance discarded: {e}"),
                    }
                }
                PopOutcome::Empty => {
                    if last_frame.elapsed() >= DEVICE_STALL_TIMEOUT {
                        error!(
                            "no audio frames for {DEVICE_STALL_TIMEOUT:?}, treating input device as gone"
                        );
                        return Err(DeviceError::Disconnected);
                    }
                }
                PopOutcome::Closed => {
                    error!("frame queue closed by the capture side");
                    return Err(DeviceError::Disconnected);
                }
            }
        }

        if self.recognizer.buffered_frames() > 0 {
            info!(
                "cancelled mid-utterance, discarding {} buffered frames",
                self.recognizer.buffered_frames()
            );
        }
        info!("transcription session stopped");
        Ok(())
    }

    fn publish(&self, segment: TranscriptSegment) {
        info!(
            "segment [{}, {}] ({:.2}): {}",
            segment.start_seq, segment.end_seq, segment.confidence, segment.text
        );
        if self.segment_tx.send(segment).is_err() {
            debug!("no transcript subscribers");
        }
    }
}
