//! Per-run metric logging for external inspection.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One row of the per-epoch metrics log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
}

/// Summary written once at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub track: String,
    pub optimizer: String,
    pub dense1: usize,
    pub dense2: usize,
    pub started_unix: u64,
    pub epochs_run: usize,
    pub best_val_loss: f32,
    pub early_stopped: bool,
}

/// Appends epoch metrics to `metrics.csv` in a per-run directory and writes
/// a `run.json` summary when the run finishes. One directory per run, keyed
/// by track, optimizer, dense layer sizes, and start time.
pub struct RunLogger {
    dir: PathBuf,
    wrote_header: bool,
}

impl RunLogger {
    pub fn new(models_dir: &Path, track: &str, run_name: &str) -> Result<Self> {
        let dir = models_dir.join(track).join(run_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating run log dir {}", dir.display()))?;
        Ok(RunLogger {
            dir,
            wrote_header: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_epoch(&mut self, metrics: &EpochMetrics) -> Result<()> {
        let path = self.dir.join("metrics.csv");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if !self.wrote_header {
            writeln!(file, "epoch,train_loss,val_loss")?;
            self.wrote_header = true;
        }
        writeln!(
            file,
            "{},{:.6},{:.6}",
            metrics.epoch, metrics.train_loss, metrics.val_loss
        )?;
        Ok(())
    }

    pub fn finish(&self, summary: &RunSummary) -> Result<()> {
        let path = self.dir.join("run.json");
        let json = serde_json::to_vec_pretty(summary)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_epochs_with_single_header() {
        let tmp = tempfile::tempdir().unwrap();
        let mut logger = RunLogger::new(tmp.path(), "oval", "adam-150-50-0").unwrap();
        for epoch in 1..=3 {
            logger
                .log_epoch(&EpochMetrics {
                    epoch,
                    train_loss: 1.0 / epoch as f32,
                    val_loss: 1.5 / epoch as f32,
                })
                .unwrap();
        }
        let csv = fs::read_to_string(logger.dir().join("metrics.csv")).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "epoch,train_loss,val_loss");
        assert!(lines[1].starts_with("1,"));
    }

    #[test]
    fn summary_round_trips_through_json() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = RunLogger::new(tmp.path(), "oval", "sgd-150-50-0").unwrap();
        let summary = RunSummary {
            track: "oval".into(),
            optimizer: "sgd".into(),
            dense1: 150,
            dense2: 50,
            started_unix: 0,
            epochs_run: 12,
            best_val_loss: 0.42,
            early_stopped: true,
        };
        logger.finish(&summary).unwrap();
        let loaded: RunSummary =
            serde_json::from_slice(&fs::read(logger.dir().join("run.json")).unwrap()).unwrap();
        assert_eq!(loaded.epochs_run, 12);
        assert!(loaded.early_stopped);
    }
}
