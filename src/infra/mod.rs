// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the training loop and the
// use cases:
//
//   checkpoint.rs — run directory, config JSON, best weights,
//                   LoRA adapter export, best.json
//   metrics.rs    — one CSV row per epoch
//   result.rs     — accumulates predictions and computes
//                   ACC / SEN / PRE / F1 / AUC
//
// Reference: Burn Book §5 (Checkpointing)
//            Rust Book §9 (Error Handling with anyhow)

/// Run directory and checkpoint files
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Classification metrics and best-epoch tracking
pub mod result;
