//! Utility functions and helpers for the comparison service

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;

/// Round to a fixed number of decimal digits
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Prefix for staged upload files, unique per request
pub(crate) fn staging_prefix(request_id: &uuid::Uuid) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
    format!("compare_{}_{}_", timestamp, request_id.simple())
}

/// File extension (with leading dot) to stage an upload under, if it has a
/// sensible one
pub(crate) fn staging_suffix(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Encode bytes as a `data:` URI
pub(crate) fn data_uri(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}
