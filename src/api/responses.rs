use serde::{Deserialize, Serialize};

use crate::models::comparison::{ComparisonReport, SimilarityMethod};
use crate::utils::data_uri;
use crate::core::staging::StagedUpload;

/// Body of a successful `POST /compare/`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompareResponse {
    /// Similarity on the 0-100 scale of `method`
    pub similarity: f64,
    /// Which strategy produced `similarity`
    pub method: SimilarityMethod,
    /// Model explanation or fallback text
    pub explanation: String,
    /// Explanation nested the way the web frontend reads it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Insights>,
    /// The uploads echoed back as data URIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<EchoedImages>,
}

/// Nested explanation in the detailed response
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Insights {
    /// Same text as the top-level `explanation`
    pub llm_explanation: String,
}

/// Uploaded images encoded as `data:` URIs
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EchoedImages {
    /// First upload
    pub image_a_uri: String,
    /// Second upload
    pub image_b_uri: String,
}

impl CompareResponse {
    /// Plain `{similarity, method, explanation}` response
    pub fn summary(report: ComparisonReport) -> Self {
        Self {
            similarity: report.similarity.score,
            method: report.similarity.method,
            explanation: report.explanation,
            insights: None,
            images: None,
        }
    }

    /// Response that also echoes both uploads and nests the explanation
    pub fn detailed(report: ComparisonReport, first: &StagedUpload, second: &StagedUpload) -> Self {
        let mut response = Self::summary(report);
        response.insights = Some(Insights {
            llm_explanation: response.explanation.clone(),
        });
        response.images = Some(EchoedImages {
            image_a_uri: data_uri(&first.upload().mime_type, &first.upload().data),
            image_b_uri: data_uri(&second.upload().mime_type, &second.upload().data),
        });
        response
    }
}

/// Body of `GET /`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: String,
    /// Human readable status line
    pub message: String,
    /// Strategy chosen at startup
    pub similarity_method: SimilarityMethod,
    /// Crate version
    pub version: String,
}
