// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch to <run_dir>/metrics.csv so a
// run's learning curves can be plotted afterwards.
//
//   epoch,train_loss,lr,skipped_steps,val_acc,val_f1,val_auc,best,test_auc
//   1,1.402113,0.001,0,0.512,0.4012,0.7021,true,0.688
//   2,1.210845,0.000994,0,0.498,0.389,0.6954,false,
//
// `test_auc` is only filled on epochs that produced a new best
// checkpoint, since that is the only time the test split runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,

    /// Mean label-smoothed cross-entropy over the training batches
    pub train_loss: f64,

    /// Learning rate used during this epoch
    pub lr: f64,

    /// Optimiser steps dropped because the loss was not finite
    pub skipped_steps: usize,

    pub val_acc: f64,
    pub val_f1:  f64,
    pub val_auc: f64,

    /// Whether this epoch set a new best validation score
    pub best: bool,

    pub test_auc: Option<f64>,
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { csv_path: dir.join("metrics.csv") })
    }

    /// Append one row, writing the header first if the file is new.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let is_new = !self.csv_path.exists();
        let file   = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(m)?;
        writer.flush()?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_auc={:.4}",
            m.epoch,
            m.train_loss,
            m.val_auc,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(epoch: usize, test_auc: Option<f64>) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 1.0,
            lr: 1e-3,
            skipped_steps: 0,
            val_acc: 0.5,
            val_f1: 0.4,
            val_auc: 0.6,
            best: test_auc.is_some(),
            test_auc,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&row(1, Some(0.7))).unwrap();
        logger.log(&row(2, None)).unwrap();

        let text  = std::fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,train_loss,lr"));
        assert!(lines[2].ends_with("false,"));

        let mut reader = csv::Reader::from_path(logger.csv_path()).unwrap();
        let rows: Vec<EpochMetrics> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].test_auc, Some(0.7));
        assert_eq!(rows[1].test_auc, None);
    }
}
