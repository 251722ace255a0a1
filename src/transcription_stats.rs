use log::warn;
use std::fs::OpenOptions;
use std::io::Write;

/// Running statistics about recognition performance.
#[derive(Default, Clone)]
pub struct TranscriptionStats {
    pub utterances_processed: usize,
    pub total_audio_secs: f32,
    pub total_inference_secs: f32,
    pub min_rtf: f32,
    pub max_rtf: f32,
    pub avg_rtf: f32,
}

impl TranscriptionStats {
    pub fn new() -> Self {
        Self {
            utterances_processed: 0,
            total_audio_secs: 0.0,
            total_inference_secs: 0.0,
            min_rtf: f32::MAX,
            max_rtf: 0.0,
            avg_rtf: 0.0,
        }
    }

    /// Records one recognized utterance. RTF below 1.0 means the backend
    /// keeps up with real time.
    pub fn record(&mut self, audio_secs: f32, inference_secs: f32) {
        if audio_secs <= 0.0 {
            return;
        }
        let rtf = inference_secs / audio_secs;

        self.utterances_processed += 1;
        self.total_audio_secs += audio_secs;
        self.total_inference_secs += inference_secs;

        self.min_rtf = self.min_rtf.min(rtf);
        self.max_rtf = self.max_rtf.max(rtf);
        self.avg_rtf = self.total_inference_secs / self.total_audio_secs;
    }

    pub fn report(&self) -> String {
        format!(
            "Transcription Statistics:\n\
             - Utterances processed: {}\n\
             - Total audio duration: {:.2}s\n\
             - Total inference time: {:.2}s\n\
             - Average real-time factor (RTF): {:.2}x\n\
             - Min RTF: {:.2}x\n\
             - Max RTF: {:.2}x",
            self.utterances_processed,
            self.total_audio_secs,
            self.total_inference_secs,
            self.avg_rtf,
            if self.min_rtf == f32::MAX {
                0.0
            } else {
                self.min_rtf
            },
            self.max_rtf
        )
    }

    /// Appends a timestamped report to the stats log file.
    pub fn log_to_file(&self, is_final: bool) {
        if self.utterances_processed == 0 {
            return;
        }
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let report_type = if is_final {
            "Final Report"
        } else {
            "Periodic Report"
        };
        let file_content = format!("\n--- {} ({}) ---\n{}\n", timestamp, report_type, self.report());

        match OpenOptions::new()
            .append(true)
            .create(true)
            .open("transcription_stats.log")
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{file_content}") {
                    warn!("failed to write to stats file: {e}");
                }
            }
            Err(e) => warn!("failed to open stats file: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tracks_rtf_bounds() {
        let mut stats = TranscriptionStats::new();
        stats.record(2.0, 1.0); // rtf 0.5
        stats.record(1.0, 2.0); // rtf 2.0
        assert_eq!(stats.utterances_processed, 2);
        assert!((stats.min_rtf - 0.5).abs() < 1e-6);
        assert!((stats.max_rtf - 2.0).abs() < 1e-6);
        assert!((stats.avg_rtf - 1.0).abs() < 1e-6); // 3s inference / 3s audio
    }

    #[test]
    fn test_zero_duration_utterance_is_ignored() {
        let mut stats = TranscriptionStats::new();
        stats.record(0.0, 1.0);
        assert_eq!(stats.utterances_processed, 0);
    }

    #[test]
    fn test_report_with_no_utterances() {
        let stats = TranscriptionStats::new();
        let report = stats.report();
        assert!(report.contains("Utterances processed: 0"));
        assert!(report.contains("Min RTF: 0.00x"));
    }
}
