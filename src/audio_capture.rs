use log::{error, info, warn};
use portaudio as pa;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::DeviceError;
use crate::frame::AudioFrame;
use crate::frame_queue::FrameQueue;

const CHANNELS: i32 = 1;
const INTERLEAVED: bool = true;

/// Manages audio capture using PortAudio.
///
/// The capture callback is the only producer of frames: it stamps each
/// buffer with the next sequence number and hands it to the frame queue.
/// Sequence numbers are assigned here, before any queueing, so they are
/// strictly increasing and gapless even when the queue later sheds load.
pub struct AudioCapture {
    pa_stream: Option<pa::Stream<pa::NonBlocking, pa::Input<f32>>>,
    queue: Option<Arc<FrameQueue>>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self {
            pa_stream: None,
            queue: None,
        }
    }

    /// Names of all input-capable devices, for startup logging and for
    /// picking an `input_device` config value.
    pub fn list_input_devices() -> Result<Vec<String>, DeviceError> {
        let pa = pa::PortAudio::new().map_err(|e| DeviceError::Host(e.to_string()))?;
        let mut names = Vec::new();
        for device in pa.devices().map_err(|e| DeviceError::Host(e.to_string()))? {
            let (_, info) = device.map_err(|e| DeviceError::Host(e.to_string()))?;
            if info.max_input_channels > 0 {
                names.push(info.name.to_string());
            }
        }
        Ok(names)
    }

    /// Opens and starts the input stream. Frames flow into `queue` until
    /// `running` clears or the capture is stopped.
    pub fn start(
        &mut self,
        queue: Arc<FrameQueue>,
        running: Arc<AtomicBool>,
        config: &AppConfig,
    ) -> Result<(), DeviceError> {
        let pa = pa::PortAudio::new().map_err(|e| DeviceError::Host(e.to_string()))?;

        let input_params = match &config.input_device {
            Some(wanted) => {
                let index = Self::find_input_device(&pa, wanted)?;
                let latency = pa
                    .device_info(index)
                    .map_err(|e| DeviceError::Open(e.to_string()))?
                    .default_low_input_latency;
                pa::StreamParameters::<f32>::new(index, CHANNELS, INTERLEAVED, latency)
            }
            None => pa
                .default_input_stream_params::<f32>(CHANNELS)
                .map_err(|e| DeviceError::Open(e.to_string()))?,
        };

        let frame_samples = config.frame_samples() as u32;
        let input_settings = pa::InputStreamSettings::new(
            input_params,
            config.sample_rate as f64,
            frame_samples,
        );

        let sample_rate = config.sample_rate;
        let queue_for_callback = queue.clone();
        let mut next_seq: u64 = 0;
        let callback = move |pa::InputStreamCallbackArgs { buffer, .. }| {
            let frame = AudioFrame::new(buffer.to_vec(), sample_rate, 1, next_seq);
            next_seq += 1;
            queue_for_callback.push(frame);
            if running.load(Ordering::Relaxed) {
                pa::Continue
            } else {
                pa::Complete
            }
        };

        let mut stream = pa
            .open_non_blocking_stream(input_settings, callback)
            .map_err(|e| DeviceError::Open(e.to_string()))?;

        stream
            .start()
            .map_err(|e| DeviceError::Start(e.to_string()))?;

        info!(
            "audio capture started ({} Hz, {} samples per frame)",
            sample_rate, frame_samples
        );
        self.pa_stream = Some(stream);
        self.queue = Some(queue);
        Ok(())
    }

    fn find_input_device(pa: &pa::PortAudio, wanted: &str) -> Result<pa::DeviceIndex, DeviceError> {
        for device in pa.devices().map_err(|e| DeviceError::Host(e.to_string()))? {
            let (index, info) = device.map_err(|e| DeviceError::Host(e.to_string()))?;
            if info.max_input_channels > 0 && info.name.contains(wanted) {
                info!("using input device: {}", info.name);
                return Ok(index);
            }
        }
        error!("no input device matching \"{wanted}\"");
        Err(DeviceError::NotFound(wanted.to_string()))
    }

    /// Stops the stream and closes the frame queue so the consumer sees the
    /// producer is gone.
    pub fn stop(&mut self) {
        if let Some(stream) = &mut self.pa_stream {
            if let Err(e) = stream.stop() {
                warn!("failed to stop input stream: {e}");
            }
            if let Err(e) = stream.close() {
                warn!("failed to close input stream: {e}");
            }
        }
        self.pa_stream = None;
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
