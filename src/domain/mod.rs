// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a training run:
//   - which images exist and what class each one belongs to
//   - which dataset a data path refers to
//   - which backbone and adaptation strategy to use
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// A labelled image on disk and the dataset families we know
pub mod sample;

// Backbone / adaptation strategy selectors
pub mod strategy;

// Core abstractions (traits) that other layers implement
pub mod traits;
