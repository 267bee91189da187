// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Each dataset family stores its labels differently (folders,
// file name suffixes, CSV annotations). The application layer
// only needs "give me every labelled image", so that is the
// one trait the loaders implement.

use anyhow::Result;
use crate::domain::sample::ImageSample;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Anything that can enumerate labelled images.
///
/// Implementations:
///   - ClassFolderSource → one sub-directory per class
///   - SuffixLabelSource → label is the `_N` suffix of the file name
///   - AnnotatedSource   → labels come from a CSV file
pub trait SampleSource {
    /// Return every labelled sample, sorted by path.
    fn discover(&self) -> Result<Vec<ImageSample>>;

    /// Human-readable class names, indexed by label.
    fn class_names(&self) -> Vec<String>;
}
