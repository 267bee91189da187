// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image directory on disk to batched
// tensors on the compute device:
//
//   data path
//       │
//       ▼
//   loader        → finds labelled images (SampleSource impls)
//       │
//       ▼
//   splitter      → train / val / test for the selected fold
//       │
//       ▼
//   ImageDataset  → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher  → decodes, resizes, normalises, stacks
//       │
//       ▼
//   DataLoader    → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Typed errors raised while locating and splitting data
pub mod error;

/// Sample discovery for each dataset layout
pub mod loader;

/// Fold files and deterministic stratified splits
pub mod splitter;

/// Image decoding and normalisation
pub mod transform;

/// Implements Burn's Dataset trait for image samples
pub mod dataset;

/// Implements Burn's Batcher trait to create image batches
pub mod batcher;
