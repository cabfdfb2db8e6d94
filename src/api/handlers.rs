use axum::{
    extract::{
        multipart::MultipartRejection, rejection::QueryRejection,
        Multipart, Query, State,
    },
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    core::{compare::compare_staged, staging::StagedUpload},
    error::{AppError, Result},
    models::comparison::UploadedImage,
    utils::staging_prefix,
    AppState,
};

use super::responses::{CompareResponse, HealthResponse};

/// Query parameters of `POST /compare/`
#[derive(Debug, Deserialize, Default)]
pub struct CompareParams {
    /// Echo both uploads back and nest the explanation under `insights`
    #[serde(default)]
    pub include_images: bool,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    First,
    Second,
}

/// Form field names accepted for each image
fn slot_for(field: &str) -> Option<Slot> {
    match field {
        "image1" | "file1" => Some(Slot::First),
        "image2" | "file2" => Some(Slot::Second),
        _ => None,
    }
}

/// Compare two uploaded images.
///
/// Accepts `image1`/`image2` or `file1`/`file2`. Uploads are staged to disk
/// for the duration of the request. Extractor rejections are turned into
/// [`AppError`] so every failure carries a `detail` body.
pub async fn compare_images(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<CompareParams>, QueryRejection>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<CompareResponse>> {
    let Query(params) = params?;
    let mut multipart = multipart?;
    let request_id = Uuid::new_v4();
    let prefix = staging_prefix(&request_id);

    // Staged files are removed when these guards drop, on every return path
    let mut first: Option<StagedUpload> = None;
    let mut second: Option<StagedUpload> = None;

    // Process the multipart form data
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        let Some(slot) = slot_for(&name) else {
            log::debug!("[{}] ignoring form field {:?}", request_id, name);
            continue;
        };

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await?;

        let upload = UploadedImage::new(name, file_name, content_type.as_deref(), content);
        let staged = StagedUpload::stage(&state.config.upload_dir, &prefix, upload).await?;

        match slot {
            Slot::First => first = Some(staged),
            Slot::Second => second = Some(staged),
        }
    }

    let first = first.ok_or_else(|| {
        AppError::InvalidInput("missing upload field `image1` (or `file1`)".to_string())
    })?;
    let second = second.ok_or_else(|| {
        AppError::InvalidInput("missing upload field `image2` (or `file2`)".to_string())
    })?;

    let report = compare_staged(&state.extractor, state.explainer.as_ref(), &first, &second).await?;

    log::info!(
        "[{}] compared {} ({} bytes) with {} ({} bytes): {:.2} via {}",
        request_id,
        first.upload().field,
        first.upload().len(),
        second.upload().field,
        second.upload().len(),
        report.similarity.score,
        report.similarity.method
    );

    let response = if params.include_images {
        CompareResponse::detailed(report, &first, &second)
    } else {
        CompareResponse::summary(report)
    };

    Ok(Json(response))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Image Similarity API is running".to_string(),
        similarity_method: state.extractor.method(),
        version: crate::built_info::PKG_VERSION.to_string(),
    })
}
