use log::debug;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::frame::{AudioFrame, FilteredFrame};

/// Parameters of the spectral noise filter, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Samples per frame; frames of any other length pass through untouched
    pub frame_samples: usize,
    /// Frames used to seed the noise estimates before suppression starts
    pub seed_frames: usize,
    /// Smoothing factor for the adaptive estimates, in (0, 1]
    pub ema_alpha: f32,
    /// Subtraction aggressiveness applied to the noise spectrum
    pub oversubtraction: f32,
    /// Lowest per-bin gain, in [0, 1]
    pub gain_floor: f32,
    /// Energy above gate * noise floor classifies a frame as speech
    pub speech_gate: f32,
}

impl FilterConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            frame_samples: config.frame_samples(),
            seed_frames: config.noise_floor_seed_frames,
            ema_alpha: config.filter.ema_alpha,
            oversubtraction: config.filter.oversubtraction,
            gain_floor: config.filter.gain_floor,
            speech_gate: config.filter.speech_gate,
        }
    }
}

/// Per-frame spectral subtraction with an adaptive noise estimate.
///
/// The filter keeps two running estimates: a per-bin noise magnitude
/// spectrum and a scalar noise-floor energy. Both are seeded from the first
/// `seed_frames` frames and afterwards updated only on frames classified as
/// non-speech, so a sudden loud transient neither gets suppressed nor leaks
/// into the floor. Frames seen before the estimate exists pass through
/// unfiltered.
pub struct NoiseFilter {
    config: FilterConfig,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    noise_magnitudes: Vec<f32>,
    noise_floor: f32,
    frames_seen: usize,
}

impl NoiseFilter {
    pub fn new(config: FilterConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(config.frame_samples);
        let fft_inverse = planner.plan_fft_inverse(config.frame_samples);
        let frame_samples = config.frame_samples;
        Self {
            config,
            fft_forward,
            fft_inverse,
            spectrum: Vec::with_capacity(frame_samples),
            noise_magnitudes: Vec::new(),
            noise_floor: 0.0,
            frames_seen: 0,
        }
    }

    /// Current noise-floor energy estimate.
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// True once the seed phase is over and an estimate exists.
    pub fn is_seeded(&self) -> bool {
        self.frames_seen >= self.config.seed_frames && !self.noise_magnitudes.is_empty()
    }

    /// Denoises one frame. Never fails; anything the filter cannot handle
    /// passes through unchanged.
    pub fn apply(&mut self, frame: AudioFrame) -> FilteredFrame {
        if frame.len() != self.config.frame_samples {
            debug!(
                "frame {} has {} samples, expected {}; passing through",
                frame.seq(),
                frame.len(),
                self.config.frame_samples
            );
            return FilteredFrame::passthrough(frame);
        }

        let energy = frame.rms();
        self.frames_seen += 1;

        if self.frames_seen <= self.config.seed_frames {
            self.seed(frame.samples(), energy);
            return FilteredFrame::passthrough(frame);
        }

        let is_speech = energy > self.config.speech_gate * self.noise_floor;
        if !is_speech {
            self.adapt(frame.samples(), energy);
        }

        if self.noise_magnitudes.is_empty() {
            // No estimate yet (seed_frames == 0 and nothing classified as
            // noise); degrade to a pass-through.
            return FilteredFrame::passthrough(frame);
        }

        let samples = self.subtract(frame.samples());
        FilteredFrame::new(samples, frame.sample_rate(), frame.channels(), frame.seq())
    }

    /// Running-average seeding during the first `seed_frames` frames.
    fn seed(&mut self, samples: &[f32], energy: f32) {
        let magnitudes = self.magnitudes(samples);
        let n = self.frames_seen as f32;
        if self.noise_magnitudes.is_empty() {
            self.noise_magnitudes = magnitudes;
        } else {
            for (estimate, magnitude) in self.noise_magnitudes.iter_mut().zip(&magnitudes) {
                *estimate += (magnitude - *estimate) / n;
            }
        }
        self.noise_floor += (energy - self.noise_floor) / n;
        if self.frames_seen == self.config.seed_frames {
            debug!("noise floor seeded at {:.6}", self.noise_floor);
        }
    }

    /// Exponential update on frames classified as non-speech.
    fn adapt(&mut self, samples: &[f32], energy: f32) {
        let alpha = self.config.ema_alpha;
        let magnitudes = self.magnitudes(samples);
        if self.noise_magnitudes.is_empty() {
            self.noise_magnitudes = magnitudes;
        } else {
            for (estimate, magnitude) in self.noise_magnitudes.iter_mut().zip(&magnitudes) {
                *estimate += alpha * (magnitude - *estimate);
            }
        }
        self.noise_floor += alpha * (energy - self.noise_floor);
    }

    /// Per-bin magnitudes of a frame.
    fn magnitudes(&mut self, samples: &[f32]) -> Vec<f32> {
        self.load_spectrum(samples);
        self.fft_forward.process(&mut self.spectrum);
        self.spectrum.iter().map(|bin| bin.norm()).collect()
    }

    /// Spectral subtraction: scale each bin down by the estimated noise
    /// magnitude, clamped at the gain floor, and transform back.
    fn subtract(&mut self, samples: &[f32]) -> Vec<f32> {
        self.load_spectrum(samples);
        self.fft_forward.process(&mut self.spectrum);

        for (bin, noise_magnitude) in self.spectrum.iter_mut().zip(&self.noise_magnitudes) {
            let magnitude = bin.norm();
            if magnitude <= f32::EPSILON {
                continue;
            }
            let cleaned = magnitude - self.config.oversubtraction * noise_magnitude;
            let gain = (cleaned / magnitude).max(self.config.gain_floor);
            *bin = *bin * gain;
        }

        self.fft_inverse.process(&mut self.spectrum);
        let scale = 1.0 / samples.len() as f32;
        self.spectrum.iter().map(|bin| bin.re * scale).collect()
    }

    fn load_spectrum(&mut self, samples: &[f32]) {
        self.spectrum.clear();
        self.spectrum
            .extend(samples.iter().map(|s| Complex::new(*s, 0.0)));
    }
}
