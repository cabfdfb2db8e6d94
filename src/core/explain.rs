//! Natural-language explanations from a remote multimodal model.
//!
//! [`explain_or_fallback`] is the boundary the rest of the crate calls: it
//! never fails, it degrades to a fixed message instead.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::models::comparison::{SimilarityResult, UploadedImage};
use crate::state::ExplanationConfig;

/// Returned when no client is configured at all.
pub const NOT_CONFIGURED_FALLBACK: &str = "The AI explanation could not be generated because the Gemini API is not configured or failed to initialize.";

const FAILURE_FALLBACK_PREFIX: &str =
    "The AI explanation could not be generated due to a server-side issue";

const BASE_PROMPT: &str = "You are an expert image analyst. Compare these two images and describe their similarities and differences briefly.";

/// Why an explanation could not be produced
#[derive(Debug, thiserror::Error)]
pub enum ExplanationError {
    /// No API key was configured
    #[error("explanation client is not configured")]
    NotConfigured,

    /// The request never got a response
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the response body, or the raw body
        message: String,
    },

    /// The prompt was rejected by the model's safety filters
    #[error("prompt blocked: {0}")]
    Blocked(String),

    /// The response held no text
    #[error("response contained no text")]
    EmptyResponse,
}

/// Inputs for one explanation
#[derive(Debug, Clone, Copy)]
pub struct ExplanationRequest<'a> {
    /// First uploaded image
    pub first: &'a UploadedImage,
    /// Second uploaded image
    pub second: &'a UploadedImage,
    /// Score already computed for the pair
    pub similarity: SimilarityResult,
}

/// A text-generation service that accepts images
pub trait Explainer: Send + Sync + fmt::Debug {
    /// Model identifier, for logs and health output
    fn model(&self) -> &str;

    /// Ask the model to describe the pair. Single attempt, no retries.
    fn explain<'a>(
        &'a self,
        request: ExplanationRequest<'a>,
    ) -> BoxFuture<'a, Result<String, ExplanationError>>;
}

/// Build the explainer described by the configuration.
///
/// Without an API key this is a [`DisabledExplainer`].
pub fn from_config(config: &ExplanationConfig) -> Result<Arc<dyn Explainer>, ExplanationError> {
    match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            let client = GeminiExplainer::new(config, key)?;
            log::info!(
                "Explanations enabled via {} at {}",
                client.model,
                client.base_url
            );
            Ok(Arc::new(client))
        }
        _ => {
            log::warn!("GEMINI_API_KEY is not set; explanations will use the fallback text");
            Ok(Arc::new(DisabledExplainer))
        }
    }
}

/// Run the explainer, turning every failure into the fixed fallback text
pub async fn explain_or_fallback(explainer: &dyn Explainer, request: ExplanationRequest<'_>) -> String {
    match explainer.explain(request).await {
        Ok(text) => text,
        Err(ExplanationError::NotConfigured) => NOT_CONFIGURED_FALLBACK.to_string(),
        Err(e) => {
            log::warn!("Explanation from {} failed: {}", explainer.model(), e);
            fallback_text(&e)
        }
    }
}

/// The degraded explanation for a failed call, embedding the error detail
pub fn fallback_text(err: &ExplanationError) -> String {
    format!("{}: {}", FAILURE_FALLBACK_PREFIX, err)
}

/// Instruction text sent with the images
pub fn build_prompt(similarity: Option<&SimilarityResult>) -> String {
    match similarity {
        None => BASE_PROMPT.to_string(),
        Some(result) => format!(
            "{}\n\nA {} comparison scored this pair {:.2} on a scale of 0 to 100, where 100 means identical.\n\
             Answer in two short paragraphs:\n\
             1. Summary: the main reason for this score (subject, texture, composition).\n\
             2. Differences: the visual discrepancies that kept the score from 100 (perspective, lighting, cropping, background).\n\
             Return only the analysis text.",
            BASE_PROMPT, result.method, result.score
        ),
    }
}

/// Stand-in used when no API key is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExplainer;

impl Explainer for DisabledExplainer {
    fn model(&self) -> &str {
        "disabled"
    }

    fn explain<'a>(
        &'a self,
        _request: ExplanationRequest<'a>,
    ) -> BoxFuture<'a, Result<String, ExplanationError>> {
        Box::pin(async { Err(ExplanationError::NotConfigured) })
    }
}

/// Client for the Gemini `generateContent` REST endpoint
pub struct GeminiExplainer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    include_score: bool,
}

impl fmt::Debug for GeminiExplainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiExplainer")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("include_score", &self.include_score)
            .finish_non_exhaustive()
    }
}

impl GeminiExplainer {
    /// Create a client. The timeout is only applied when configured.
    pub fn new(config: &ExplanationConfig, api_key: &str) -> Result<Self, ExplanationError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            include_score: config.include_score,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(&self, request: &ExplanationRequest<'_>) -> GenerateContentRequest {
        let similarity = self.include_score.then_some(&request.similarity);
        let parts = vec![
            Part::text(build_prompt(similarity)),
            Part::inline(request.first),
            Part::inline(request.second),
        ];

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
        }
    }

    async fn send(&self, body: GenerateContentRequest) -> Result<String, ExplanationError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            return Err(ExplanationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            ExplanationError::Api {
                status: status.as_u16(),
                message: format!("malformed response body: {}", e),
            }
        })?;
        parsed.into_text()
    }
}

impl Explainer for GeminiExplainer {
    fn model(&self) -> &str {
        &self.model
    }

    fn explain<'a>(
        &'a self,
        request: ExplanationRequest<'a>,
    ) -> BoxFuture<'a, Result<String, ExplanationError>> {
        let body = self.build_request(&request);
        Box::pin(async move {
            log::debug!(
                "Requesting explanation from {} ({} + {} bytes)",
                self.model,
                request.first.len(),
                request.second.len()
            );
            self.send(body).await
        })
    }
}

// Wire types for generateContent. Only the fields we read or write.

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn inline(image: &UploadedImage) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.data),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, ExplanationError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ExplanationError::Blocked(reason));
        }

        let text = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let trimmed = text.trim();
        if trimmed.is_empty() {
            Err(ExplanationError::EmptyResponse)
        } else {
            Ok(trimmed.to_string())
        }
    }
}
