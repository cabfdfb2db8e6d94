use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// MIME type assumed when neither the upload nor its file name tells us one.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// An image as received from the client, alive for one request only.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Multipart field the image arrived in (`image1`, `file2`, ...).
    pub field: String,
    /// Original client-side file name, if one was sent.
    pub file_name: Option<String>,
    /// MIME type forwarded to the explanation model.
    pub mime_type: String,
    /// Raw upload bytes.
    pub data: Bytes,
}

impl UploadedImage {
    /// Creates an upload, resolving its MIME type from the declared content
    /// type first, then from the file name, then falling back to JPEG.
    pub fn new(
        field: impl Into<String>,
        file_name: Option<String>,
        declared_mime: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        let mime_type = declared_mime
            .filter(|m| m.starts_with("image/"))
            .map(str::to_string)
            .or_else(|| {
                file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .filter(|m| m.type_() == mime_guess::mime::IMAGE)
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

        Self {
            field: field.into(),
            file_name,
            mime_type,
            data: data.into(),
        }
    }

    /// Size of the upload in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the upload carried no bytes at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Which extractor produced a score.
///
/// The two scales are not calibrated against each other: a pixel score of 80
/// and an embedding score of 80 say different things.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMethod {
    /// Cosine similarity of pretrained-network embeddings
    Embedding,
    /// Mean absolute pixel difference of the resized images
    Pixel,
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => f.write_str("embedding"),
            Self::Pixel => f.write_str("pixel"),
        }
    }
}

/// A similarity score on the 0-100 scale with its provenance.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct SimilarityResult {
    /// Score in `[0, 100]`, rounded to two decimals
    pub score: f64,
    /// Method that produced the score
    pub method: SimilarityMethod,
}

/// Everything one comparison yields: exactly one score and one explanation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComparisonReport {
    /// The similarity score
    pub similarity: SimilarityResult,
    /// Model-written explanation, or the fixed fallback text
    pub explanation: String,
}
