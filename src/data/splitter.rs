// ============================================================
// Layer 4 — Train / Validation / Test Splitter
// ============================================================
// Produces the three disjoint sample lists for one fold.
//
// Two sources of truth:
//
//   1. A split file (`--data-info`, relative to the data root)
//      listing every fold explicitly:
//
//        [
//          { "train": ["0/a.png", ...], "val": [...], "test": [...] },
//          ...
//        ]
//
//   2. No split file → a stratified 7:1:2 split. Each class is
//      shuffled on its own with a seeded RNG so every fold is
//      reproducible: `evaluate` rebuilds the exact test set that
//      `train` used.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use crate::data::error::DataError;
use crate::domain::sample::ImageSample;

/// Fraction of each class that goes to training
pub const TRAIN_FRACTION: f64 = 0.7;
/// Fraction of each class that goes to validation; the rest is test
pub const VAL_FRACTION: f64 = 0.1;

/// The three sample lists of one fold.
#[derive(Debug, Clone, Default)]
pub struct FoldSplit {
    pub train: Vec<ImageSample>,
    pub val:   Vec<ImageSample>,
    pub test:  Vec<ImageSample>,
}

impl FoldSplit {
    /// Every split must hold at least one sample.
    pub fn ensure_non_empty(&self) -> Result<(), DataError> {
        if self.train.is_empty() {
            return Err(DataError::EmptySplit("train"));
        }
        if self.val.is_empty() {
            return Err(DataError::EmptySplit("validation"));
        }
        if self.test.is_empty() {
            return Err(DataError::EmptySplit("test"));
        }
        Ok(())
    }
}

/// One entry of a split file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldEntry {
    pub train: Vec<PathBuf>,
    pub val:   Vec<PathBuf>,
    pub test:  Vec<PathBuf>,
}

/// Build the split for `fold`, from the split file when it exists.
pub fn split_for_fold(
    samples:    Vec<ImageSample>,
    root:       &Path,
    split_file: Option<&Path>,
    fold:       usize,
    seed:       u64,
) -> Result<FoldSplit> {
    match split_file.filter(|p| p.is_file()) {
        Some(path) => {
            tracing::info!("Using fold {} from split file '{}'", fold, path.display());
            split_from_file(samples, root, path, fold)
        }
        None => {
            tracing::info!("No split file found, using stratified 7:1:2 split (fold {})", fold);
            Ok(stratified_split(samples, TRAIN_FRACTION, VAL_FRACTION, seed.wrapping_add(fold as u64)))
        }
    }
}

/// Resolve the entries of a split file against the discovered samples.
///
/// Entries that match no discovered sample are skipped with a warning.
pub fn split_from_file(
    samples: Vec<ImageSample>,
    root:    &Path,
    path:    &Path,
    fold:    usize,
) -> Result<FoldSplit> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read split file '{}'", path.display()))?;
    let folds: Vec<FoldEntry> = serde_json::from_str(&json)
        .with_context(|| format!("Split file '{}' is not a list of folds", path.display()))?;

    let entry = folds.get(fold).ok_or_else(|| DataError::FoldOutOfRange {
        path:      path.to_path_buf(),
        fold,
        available: folds.len(),
    })?;

    let by_path: HashMap<PathBuf, ImageSample> = samples
        .into_iter()
        .map(|s| (s.path.clone(), s))
        .collect();

    let mut missing = 0usize;
    let mut resolve = |names: &[PathBuf]| -> Vec<ImageSample> {
        names
            .iter()
            .filter_map(|rel| {
                let found = by_path.get(&root.join(rel)).cloned();
                if found.is_none() {
                    missing += 1;
                }
                found
            })
            .collect()
    };

    let split = FoldSplit {
        train: resolve(&entry.train),
        val:   resolve(&entry.val),
        test:  resolve(&entry.test),
    };
    if missing > 0 {
        tracing::warn!("{} split-file entries did not match any image", missing);
    }
    Ok(split)
}

/// Shuffle `samples` with `rng` and split off the first `fraction`.
pub fn split_with_rng<T>(mut samples: Vec<T>, fraction: f64, rng: &mut StdRng) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * fraction).round() as usize;
    let split_at = split_at.min(total);

    let rest = samples.split_off(split_at);
    (samples, rest)
}

/// Per-class shuffled split into train / val / test.
pub fn stratified_split(
    samples:        Vec<ImageSample>,
    train_fraction: f64,
    val_fraction:   f64,
    seed:           u64,
) -> FoldSplit {
    let mut rng = StdRng::seed_from_u64(seed);

    // BTreeMap so classes are visited in a fixed order
    let mut by_class: BTreeMap<usize, Vec<ImageSample>> = BTreeMap::new();
    for s in samples {
        by_class.entry(s.label).or_default().push(s);
    }

    let mut split = FoldSplit::default();
    for (_, group) in by_class {
        let n = group.len() as f64;
        let (train, rest) = split_with_rng(group, train_fraction, &mut rng);
        // val fraction of the whole class, taken from what is left
        let val_share = if rest.is_empty() {
            0.0
        } else {
            ((n * val_fraction).round() / rest.len() as f64).min(1.0)
        };
        let (val, test) = split_with_rng(rest, val_share, &mut rng);

        split.train.extend(train);
        split.val.extend(val);
        split.test.extend(test);
    }

    tracing::debug!(
        "Dataset split: {} training, {} validation, {} test",
        split.train.len(),
        split.val.len(),
        split.test.len(),
    );
    split
}
