use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::frame::UtteranceBuffer;

const FALLBACK_SAMPLE_RATE: u32 = 16000;

/// Writes a finalized utterance as a 16-bit mono WAV named by its frame
/// bounds. Useful for checking what the recognizer actually heard.
pub fn write_utterance(dir: &Path, utterance: &UtteranceBuffer) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let start = utterance.start_seq().unwrap_or(0);
    let end = utterance.end_seq().unwrap_or(start);
    let path = dir.join(format!("utterance_{start:08}_{end:08}.wav"));

    let spec = WavSpec {
        channels: 1,
        sample_rate: utterance.sample_rate().unwrap_or(FALLBACK_SAMPLE_RATE),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(&path, spec)?;
    for sample in utterance.samples() {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize()?;

    debug!("wrote utterance audio to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FilteredFrame;

    #[test]
    fn test_written_wav_round_trips() {
        let dir = std::env::temp_dir().join("nitido_wav_dump_test");
        let mut buffer = UtteranceBuffer::new();
        buffer.push(FilteredFrame::new(vec![0.0, 0.5, -0.5, 1.0], 16000, 1, 3));

        let path = write_utterance(&dir, &buffer).unwrap();
        assert!(path.ends_with("utterance_00000003_00000003.wav"));

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[3], i16::MAX);

        let _ = fs::remove_file(path);
    }
}
