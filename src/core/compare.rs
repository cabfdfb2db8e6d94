use crate::core::decode::{decode_file, decode_image};
use crate::core::explain::{explain_or_fallback, Explainer, ExplanationRequest};
use crate::core::similarity::FeatureExtractor;
use crate::core::staging::StagedUpload;
use crate::error::Result;
use crate::models::comparison::{ComparisonReport, SimilarityResult, UploadedImage};

/// Decode and score two in-memory uploads on the blocking pool
pub async fn score_uploads(
    extractor: &FeatureExtractor,
    first: &UploadedImage,
    second: &UploadedImage,
) -> Result<SimilarityResult> {
    let extractor = extractor.clone();
    let (a, b) = (first.data.clone(), second.data.clone());

    tokio::task::spawn_blocking(move || {
        let a = decode_image(&a)?;
        let b = decode_image(&b)?;
        extractor.score(&a, &b)
    })
    .await?
}

/// Decode and score two staged uploads on the blocking pool
pub async fn score_staged(
    extractor: &FeatureExtractor,
    first: &StagedUpload,
    second: &StagedUpload,
) -> Result<SimilarityResult> {
    let extractor = extractor.clone();
    let (a, b) = (first.path().to_path_buf(), second.path().to_path_buf());

    tokio::task::spawn_blocking(move || {
        let a = decode_file(&a)?;
        let b = decode_file(&b)?;
        extractor.score(&a, &b)
    })
    .await?
}

/// Score then explain. Only scoring can fail; explanation failures are
/// absorbed into fallback text.
pub async fn compare(
    extractor: &FeatureExtractor,
    explainer: &dyn Explainer,
    first: &UploadedImage,
    second: &UploadedImage,
) -> Result<ComparisonReport> {
    let similarity = score_uploads(extractor, first, second).await?;
    Ok(finish(explainer, first, second, similarity).await)
}

/// Same as [`compare`] for uploads staged on disk
pub async fn compare_staged(
    extractor: &FeatureExtractor,
    explainer: &dyn Explainer,
    first: &StagedUpload,
    second: &StagedUpload,
) -> Result<ComparisonReport> {
    let similarity = score_staged(extractor, first, second).await?;
    Ok(finish(explainer, first.upload(), second.upload(), similarity).await)
}

async fn finish(
    explainer: &dyn Explainer,
    first: &UploadedImage,
    second: &UploadedImage,
    similarity: SimilarityResult,
) -> ComparisonReport {
    let explanation = explain_or_fallback(
        explainer,
        ExplanationRequest {
            first,
            second,
            similarity,
        },
    )
    .await;

    ComparisonReport {
        similarity,
        explanation,
    }
}
