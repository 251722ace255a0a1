use log::warn;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

use crate::frame::AudioFrame;

/// Result of a consumer pop.
#[derive(Debug)]
pub enum PopOutcome {
    Frame(AudioFrame),
    /// Nothing arrived within the timeout
    Empty,
    /// The producer is gone and the queue is drained
    Closed,
}

struct Inner {
    frames: VecDeque<AudioFrame>,
    closed: bool,
    overruns: u64,
}

/// Bounded queue between the capture callback and the processing task.
///
/// When the consumer falls behind, the OLDEST frame is dropped to make room;
/// real-time audio favors freshness over completeness. Closing the queue
/// lets the consumer distinguish a lost device from a momentarily idle one.
pub struct FrameQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame queue capacity must be positive");
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
                overruns: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueues a frame, evicting the oldest one on overrun. Frames pushed
    /// after `close` are discarded.
    pub fn push(&self, frame: AudioFrame) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        if inner.frames.len() == self.capacity {
            if let Some(dropped) = inner.frames.pop_front() {
                inner.overruns += 1;
                warn!(
                    "frame queue overrun: dropped frame {} (consumer falling behind)",
                    dropped.seq()
                );
            }
        }
        inner.frames.push_back(frame);
        drop(inner);
        self.available.notify_one();
    }

    /// Takes the next frame, waiting up to `timeout` for one to arrive.
    /// Frames enqueued before `close` are still delivered.
    pub fn pop_timeout(&self, timeout: Duration) -> PopOutcome {
        let mut inner = self.inner.lock();
        if let Some(frame) = inner.frames.pop_front() {
            return PopOutcome::Frame(frame);
        }
        if inner.closed {
            return PopOutcome::Closed;
        }
        self.available.wait_for(&mut inner, timeout);
        if let Some(frame) = inner.frames.pop_front() {
            PopOutcome::Frame(frame)
        } else if inner.closed {
            PopOutcome::Closed
        } else {
            PopOutcome::Empty
        }
    }

    /// Marks the producer as gone and wakes any waiting consumer.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Total frames evicted due to a slow consumer.
    pub fn overruns(&self) -> u64 {
        self.inner.lock().overruns
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame::new(vec![0.0; 8], 16000, 1, seq)
    }

    fn pop_now(queue: &FrameQueue) -> PopOutcome {
        queue.pop_timeout(Duration::from_millis(0))
    }

    #[test]
    fn test_frames_come_out_in_order() {
        let queue = FrameQueue::new(4);
        queue.push(frame(0));
        queue.push(frame(1));
        match (pop_now(&queue), pop_now(&queue)) {
            (PopOutcome::Frame(a), PopOutcome::Frame(b)) => {
                assert_eq!(a.seq(), 0);
                assert_eq!(b.seq(), 1);
            }
            other => panic!("expected two frames, got {other:?}"),
        }
    }

    #[test]
    fn test_overrun_drops_oldest() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0));
        queue.push(frame(1));
        queue.push(frame(2)); // evicts frame 0
        assert_eq!(queue.overruns(), 1);
        match pop_now(&queue) {
            PopOutcome::Frame(f) => assert_eq!(f.seq(), 1),
            other => panic!("expected frame 1, got {other:?}"),
        }
        match pop_now(&queue) {
            PopOutcome::Frame(f) => assert_eq!(f.seq(), 2),
            other => panic!("expected frame 2, got {other:?}"),
        }
    }

    #[test]
    fn test_pop_times_out_empty() {
        let queue = FrameQueue::new(2);
        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(5)),
            PopOutcome::Empty
        ));
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0));
        queue.close();
        assert!(matches!(pop_now(&queue), PopOutcome::Frame(_)));
        assert!(matches!(pop_now(&queue), PopOutcome::Closed));
        // pushes after close are ignored
        queue.push(frame(1));
        assert!(matches!(pop_now(&queue), PopOutcome::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue = std::sync::Arc::new(FrameQueue::new(2));
        let q = queue.clone();
        let handle = std::thread::spawn(move || q.pop_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(matches!(handle.join().unwrap(), PopOutcome::Closed));
    }
}
