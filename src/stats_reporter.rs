use log::info;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::transcription_stats::TranscriptionStats;

const STATS_INTERVAL_SECS: u64 = 10;

/// Periodically reports recognition statistics while the session runs.
pub struct StatsReporter {
    transcription_stats: Arc<Mutex<TranscriptionStats>>,
    running: Arc<AtomicBool>,
    enabled: bool,
}

impl StatsReporter {
    pub fn new(
        transcription_stats: Arc<Mutex<TranscriptionStats>>,
        running: Arc<AtomicBool>,
        enabled: bool,
    ) -> Self {
        Self {
            transcription_stats,
            running,
            enabled,
        }
    }

    /// Spawns the periodic reporting task. A no-op when stats are disabled.
    pub fn start_periodic_reporting(&self) {
        if !self.enabled {
            info!("stats reporting disabled");
            return;
        }
        info!(
            "stats reporting enabled, every {}s to console and transcription_stats.log",
            STATS_INTERVAL_SECS
        );

        let transcription_stats = self.transcription_stats.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(STATS_INTERVAL_SECS));
            while running.load(Ordering::Relaxed) {
                interval.tick().await;
                if let Some(stats) = transcription_stats.try_lock() {
                    if stats.utterances_processed > 0 {
                        info!("{}", stats.report());
                        stats.log_to_file(false);
                    }
                }
            }
            info!("stats reporting stopped");
        });
    }

    /// Logs the final report once, typically on shutdown.
    pub fn report_final(&self) {
        if !self.enabled {
            return;
        }
        let stats = self.transcription_stats.lock();
        if stats.utterances_processed > 0 {
            info!("{}", stats.report());
            stats.log_to_file(true);
        } else {
            info!("no utterances were transcribed");
        }
    }
}
