// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no model code, no metric math,
// no argument parsing. Each use case asks the other layers to
// do the work in the right order.
//
// Reference: Clean Architecture pattern

/// Training run: data, model, epoch loop, checkpoints
pub mod train_use_case;

/// Test-split scoring of a finished run
pub mod evaluate_use_case;
