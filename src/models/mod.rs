//! Request-scoped data carried through a comparison

/// Uploads, scores and reports for a single comparison.
pub mod comparison;
