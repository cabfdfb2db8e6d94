//! Similarity scoring on a 0-100 scale.
//!
//! Two strategies exist and are picked once at startup:
//!
//! - **Embedding**: cosine similarity of backbone features, rescaled from
//!   `[-1, 1]` with `(cos + 1) / 2 * 100`.
//! - **Pixel**: `max(0, 100 - mean(|a - b|) / 2)` over the resized RGB arrays.
//!
//! The scales are not calibrated against each other. Every result carries
//! its [`SimilarityMethod`] so callers can tell them apart.

use ndarray::Zip;
use std::sync::Arc;

use crate::core::decode::PreprocessedImage;
use crate::core::embeddings::{cosine_similarity, load_backend, EmbeddingBackend};
use crate::error::{AppError, Result};
use crate::models::comparison::{SimilarityMethod, SimilarityResult};
use crate::state::EmbeddingConfig;
use crate::utils::round_to;

/// Lowest score on the output scale
pub const MIN_SCORE: f64 = 0.0;
/// Highest score on the output scale
pub const MAX_SCORE: f64 = 100.0;

/// The feature extraction strategy in use for the lifetime of the process
#[derive(Debug, Clone)]
pub enum FeatureExtractor {
    /// Pretrained network embeddings compared by cosine similarity
    Embedding(Arc<dyn EmbeddingBackend>),
    /// Raw pixel comparison, used when no backend is available
    Pixel,
}

impl FeatureExtractor {
    /// Pick a strategy by trying to bring up the configured embedding backend.
    ///
    /// Never fails: an unavailable backend selects the pixel strategy.
    pub fn probe(config: &EmbeddingConfig) -> Self {
        match load_backend(config) {
            Ok(backend) => {
                log::info!(
                    "Similarity strategy: embedding ({}, {} dimensions)",
                    backend.name(),
                    backend.dimension()
                );
                Self::Embedding(backend)
            }
            Err(AppError::ExtractionUnavailable(reason)) => {
                log::warn!("Similarity strategy: pixel fallback ({})", reason);
                Self::Pixel
            }
            Err(e) => {
                log::warn!("Similarity strategy: pixel fallback (unexpected: {})", e);
                Self::Pixel
            }
        }
    }

    /// Wrap an already loaded backend
    pub fn with_backend(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self::Embedding(backend)
    }

    /// The method this extractor's scores are tagged with
    pub fn method(&self) -> SimilarityMethod {
        match self {
            Self::Embedding(_) => SimilarityMethod::Embedding,
            Self::Pixel => SimilarityMethod::Pixel,
        }
    }

    /// Score two preprocessed images.
    ///
    /// Runs inference synchronously; call from a blocking context.
    pub fn score(&self, a: &PreprocessedImage, b: &PreprocessedImage) -> Result<SimilarityResult> {
        let score = match self {
            Self::Embedding(backend) => {
                let ea = backend.embed(a)?;
                let eb = backend.embed(b)?;
                let cos = cosine_similarity(&ea, &eb)?;
                log::debug!("{} cosine similarity: {:.6}", backend.name(), cos);
                embedding_score(cos)
            }
            Self::Pixel => pixel_score(a, b),
        };

        Ok(SimilarityResult {
            score,
            method: self.method(),
        })
    }
}

/// Map a cosine similarity onto the 0-100 scale
pub fn embedding_score(cos: f32) -> f64 {
    finalize((f64::from(cos) + 1.0) / 2.0 * 100.0)
}

/// Mean absolute channel difference between two images, in `[0, 255]`.
///
/// Channels are compared with `abs_diff`, so `|10 - 200|` is 190 in either
/// order; plain `u8` subtraction would wrap around and must not be used here.
pub fn mean_abs_diff(a: &PreprocessedImage, b: &PreprocessedImage) -> f64 {
    let (pa, pb) = (a.pixels(), b.pixels());
    let total = Zip::from(pa)
        .and(pb)
        .fold(0u64, |acc, &x, &y| acc + u64::from(x.abs_diff(y)));

    total as f64 / pa.len() as f64
}

/// Pixel-difference similarity on the 0-100 scale
pub fn pixel_score(a: &PreprocessedImage, b: &PreprocessedImage) -> f64 {
    finalize(MAX_SCORE - mean_abs_diff(a, b) / 2.0)
}

fn finalize(raw: f64) -> f64 {
    let clamped = if raw.is_nan() {
        MIN_SCORE
    } else {
        raw.clamp(MIN_SCORE, MAX_SCORE)
    };
    round_to(clamped, 2)
}
