use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::explain::{self, Explainer};
use crate::core::similarity::FeatureExtractor;
use crate::error::{AppError, Result};

/// Default Gemini model used for explanations
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
/// Default root of the Gemini REST API
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for the application
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Directory uploads are staged in while a request runs
    pub upload_dir: PathBuf,
    /// Maximum request body size in bytes
    pub max_upload_size: usize,
    /// Embedding backend configuration
    pub embedding: EmbeddingConfig,
    /// Explanation client configuration
    pub explanation: ExplanationConfig,
}

/// Embedding backend configuration
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    /// Pretrained weights for the backbone; without them the pixel
    /// strategy is used
    pub weights_path: Option<PathBuf>,
    /// L2-normalize embeddings before comparing them
    pub normalize: bool,
}

/// Explanation client configuration
#[derive(Clone)]
pub struct ExplanationConfig {
    /// Gemini API key; `None` disables explanations
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// API root URL
    pub base_url: String,
    /// Request timeout. Unset means the call may wait indefinitely.
    pub timeout: Option<Duration>,
    /// Include the computed score in the prompt
    pub include_score: bool,
}

impl std::fmt::Debug for ExplanationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplanationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("include_score", &self.include_score)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            upload_dir: std::env::temp_dir(),
            max_upload_size: 20 * 1024 * 1024, // 20MB
            embedding: EmbeddingConfig::default(),
            explanation: ExplanationConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            weights_path: None,
            normalize: true,
        }
    }
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: None,
            include_score: true,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables, starting from
    /// the defaults. Call `dotenv` first if a `.env` file should apply.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<SocketAddr>("BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(dir) = env_var("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(size) = env_parse::<usize>("MAX_UPLOAD_SIZE")? {
            config.max_upload_size = size;
        }

        config.embedding.weights_path = env_var("EMBEDDING_WEIGHTS").map(PathBuf::from);
        if let Some(normalize) = env_parse::<bool>("EMBEDDING_NORMALIZE")? {
            config.embedding.normalize = normalize;
        }

        config.explanation.api_key = env_var("GEMINI_API_KEY").or_else(|| env_var("gemini_api_key"));
        if let Some(model) = env_var("GEMINI_MODEL") {
            config.explanation.model = model;
        }
        if let Some(url) = env_var("GEMINI_BASE_URL") {
            config.explanation.base_url = url;
        }
        config.explanation.timeout = env_parse::<u64>("GEMINI_TIMEOUT_SECS")?.map(Duration::from_secs);
        if let Some(include) = env_parse::<bool>("EXPLANATION_INCLUDE_SCORE")? {
            config.explanation.include_score = include;
        }

        Ok(config)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| AppError::Config(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}

/// Application state shared across handlers. Built once at startup and
/// never mutated afterwards.
#[derive(Clone)]
#[derive(Debug)]
pub struct AppState {
    /// Application configuration
    pub config: Config,
    /// Feature extraction strategy chosen at startup
    pub extractor: FeatureExtractor,
    /// Explanation client chosen at startup
    pub explainer: Arc<dyn Explainer>,
}

impl AppState {
    /// Probe the embedding backend, build the explanation client and
    /// freeze the result into shared state
    pub fn initialize(config: Config) -> Result<Arc<Self>> {
        let extractor = FeatureExtractor::probe(&config.embedding);
        let explainer = explain::from_config(&config.explanation)
            .map_err(|e| AppError::Config(format!("explanation client: {}", e)))?;

        Ok(Self::from_parts(config, extractor, explainer))
    }

    /// Assemble state from already constructed parts
    pub fn from_parts(
        config: Config,
        extractor: FeatureExtractor,
        explainer: Arc<dyn Explainer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            extractor,
            explainer,
        })
    }
}
