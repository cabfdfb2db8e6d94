#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! # imagediff
//!
//! An HTTP service that scores how similar two images are and asks a
//! multimodal language model to explain the result.
//!
//! ## Features
//!
//! - **Decoding**: JPEG, PNG, WebP and GIF uploads resized to a fixed 224×224 RGB array
//! - **Embedding similarity**: cosine similarity of pretrained ResNet-50 features (`embeddings` feature)
//! - **Pixel similarity**: mean absolute pixel difference, used when no backbone is available
//! - **Explanations**: Google Gemini describes the similarities and differences
//! - **Web API**: `POST /compare/` with two multipart uploads
//!
//! The embedding and pixel scores live on different, uncalibrated 0-100
//! scales; every result says which one produced it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imagediff::{compare, AppState, Config, Result, UploadedImage};
//!
//! # async fn run() -> Result<()> {
//! let state = AppState::initialize(Config::from_env()?)?;
//! let a = UploadedImage::new("image1", None, Some("image/png"), std::fs::read("a.png")?);
//! let b = UploadedImage::new("image2", None, Some("image/png"), std::fs::read("b.png")?);
//!
//! let report = compare(&state.extractor, state.explainer.as_ref(), &a, &b).await?;
//! println!("{} ({}): {}", report.similarity.score, report.similarity.method, report.explanation);
//! # Ok(())
//! # }
//! ```

// Internal modules
pub mod api;
pub mod core;
/// Defines the application's error types and result aliases.
pub mod error;
pub mod models;
/// Configuration and the shared application state.
pub mod state;
mod utils;

/// Package metadata captured at build time
#[allow(dead_code, unreachable_pub)]
pub(crate) mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Public API exports
pub use crate::{
    core::{
        compare::compare,
        decode::{decode_image, PreprocessedImage},
        embeddings::{cosine_similarity, Embedding, EmbeddingBackend},
        explain::{DisabledExplainer, Explainer, GeminiExplainer},
        similarity::FeatureExtractor,
    },
    error::{AppError, Result, ResultExt},
    models::comparison::{ComparisonReport, SimilarityMethod, SimilarityResult, UploadedImage},
    state::{AppState, Config, EmbeddingConfig, ExplanationConfig},
};

#[cfg(feature = "web")]
pub use crate::api::{compare_images, create_router, health_check};

#[cfg(feature = "embeddings")]
pub use crate::core::embeddings::ResNetBackend;

/// Initialize logging with sensible defaults.
///
/// Honors `RUST_LOG`; defaults to `info`. HTTP traces from `tower-http`
/// reach the same logger through `tracing`'s `log` bridge.
///
/// # Errors
///
/// Returns an error if a logger was already installed.
///
/// # Example
///
/// ```no_run
/// use imagediff::init;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     init()?;
///     // Application code here
///     Ok(())
/// }
/// ```
pub fn init() -> Result<()> {
    let env = env_logger::Env::default()
        .default_filter_or("info")
        .default_write_style_or("auto");

    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .map_err(|e| AppError::Config(format!("logger: {}", e)))?;

    log::info!(
        "Initializing {} {}",
        built_info::PKG_NAME,
        built_info::PKG_VERSION
    );
    Ok(())
}
