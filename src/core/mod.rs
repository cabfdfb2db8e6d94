//! Core functionality for image comparison

/// Runs a full comparison: score, then explain.
pub mod compare;
/// Turns upload bytes into fixed-shape pixel arrays.
pub mod decode;
/// Embedding backends and vector math.
pub mod embeddings;
pub mod explain;
pub mod similarity;
/// Temporary on-disk copies of uploads.
pub mod staging;
