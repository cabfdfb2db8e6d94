#![cfg(feature = "web")]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use assert_fs::TempDir;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode, Uri},
    Json, Router,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::Array1;
use predicates::prelude::*;
use serde_json::{json, Value};
use tower::ServiceExt;

use imagediff::core::explain::{self, NOT_CONFIGURED_FALLBACK};
use imagediff::{
    create_router, AppState, Config, DisabledExplainer, Embedding, EmbeddingBackend,
    ExplanationConfig, FeatureExtractor, PreprocessedImage, Result,
};

const BOUNDARY: &str = "X-IMAGEDIFF-TEST-BOUNDARY";
const VALID_KEY: &str = "test-key";

fn png(color: [u8; 3]) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(48, 48, Rgb(color));
    // a diagonal so the image is not flat
    for i in 0..48 {
        img.put_pixel(i, i, Rgb([255, 255, 255]));
    }
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .unwrap();
    out
}

fn multipart(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, data) in parts {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY, field, field
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn compare_request(uri: &str, parts: &[(&str, &[u8])]) -> Request<Body> {
    let body = multipart(parts);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn pixel_app(upload_dir: &Path) -> Router {
    let config = Config {
        upload_dir: upload_dir.to_path_buf(),
        ..Config::default()
    };
    create_router(AppState::from_parts(
        config,
        FeatureExtractor::Pixel,
        Arc::new(DisabledExplainer),
    ))
}

fn gemini_app(upload_dir: &Path, base_url: &str, key: &str) -> Router {
    let config = Config {
        upload_dir: upload_dir.to_path_buf(),
        explanation: ExplanationConfig {
            api_key: Some(key.to_string()),
            model: "gemini-test".to_string(),
            base_url: base_url.to_string(),
            ..ExplanationConfig::default()
        },
        ..Config::default()
    };
    let explainer = explain::from_config(&config.explanation).unwrap();
    create_router(AppState::from_parts(config, FeatureExtractor::Pixel, explainer))
}

/// Answers like `generateContent`, rejecting any key but `VALID_KEY`
async fn fake_gemini(uri: Uri, headers: HeaderMap, Json(request): Json<Value>) -> (StatusCode, Json<Value>) {
    let key = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok());
    if key != Some(VALID_KEY) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT"
                }
            })),
        );
    }

    let parts = request["contents"][0]["parts"].as_array().map_or(0, |p| p.len());
    let text = format!("{} with {} parts", uri.path(), parts);
    (
        StatusCode::OK,
        Json(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        })),
    )
}

async fn spawn_fake_gemini() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(fake_gemini))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Debug)]
struct MeanColor;

impl EmbeddingBackend for MeanColor {
    fn name(&self) -> &str {
        "mean-color"
    }

    fn dimension(&self) -> usize {
        3
    }

    fn embed(&self, image: &PreprocessedImage) -> Result<Embedding> {
        let px = image.pixels().mapv(f32::from);
        let n = (px.len() / 3) as f32;
        let mut sums = [0.0f32; 3];
        for ((_, _, c), v) in px.indexed_iter() {
            sums[c] += v;
        }
        Ok(Array1::from(sums.iter().map(|s| s / n).collect::<Vec<_>>()))
    }
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "Image Similarity API is running");
    assert_eq!(body["similarity_method"], "pixel");
}

#[tokio::test]
async fn test_identical_images_score_100_on_pixel_path() {
    let dir = TempDir::new().unwrap();
    let image = png([30, 90, 150]);
    let request = compare_request("/compare/", &[("image1", image.as_slice()), ("image2", image.as_slice())]);
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["similarity"], 100.0);
    assert_eq!(body["method"], "pixel");
    assert_eq!(body["explanation"], NOT_CONFIGURED_FALLBACK);
    assert!(body.get("images").is_none());
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_file_field_names_are_accepted() {
    let dir = TempDir::new().unwrap();
    let (a, b) = (png([0, 0, 0]), png([255, 255, 255]));
    let request = compare_request("/compare", &[("file1", a.as_slice()), ("file2", b.as_slice())]);
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::OK);
    let score = body["similarity"].as_f64().unwrap();
    assert!((0.0..100.0).contains(&score));
}

#[tokio::test]
async fn test_malformed_upload_is_a_500_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let image = png([1, 2, 3]);
    let request = compare_request(
        "/compare/",
        &[("image1", &b"this is not an image"[..]), ("image2", image.as_slice())],
    );
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(predicate::str::starts_with("Internal Server Error during processing").eval(detail));
    assert!(predicate::str::contains("Image decode error").eval(detail));
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_missing_second_image_is_rejected() {
    let dir = TempDir::new().unwrap();
    let image = png([1, 2, 3]);
    let request = compare_request("/compare/", &[("image1", image.as_slice())]);
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("image2"));
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_detailed_response_echoes_images() {
    let dir = TempDir::new().unwrap();
    let (a, b) = (png([10, 10, 10]), png([20, 20, 20]));
    let request = compare_request(
        "/compare/?include_images=true",
        &[("image1", a.as_slice()), ("image2", b.as_slice())],
    );
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insights"]["llm_explanation"], body["explanation"]);
    let uri = body["images"]["image_a_uri"].as_str().unwrap();
    assert!(uri.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_explanation_from_remote_model() {
    let dir = TempDir::new().unwrap();
    let base_url = spawn_fake_gemini().await;
    let (a, b) = (png([200, 0, 0]), png([0, 0, 200]));
    let request = compare_request("/compare/", &[("image1", a.as_slice()), ("image2", b.as_slice())]);
    let (status, body) = send(gemini_app(dir.path(), &base_url, VALID_KEY), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["explanation"],
        "/v1beta/models/gemini-test:generateContent with 3 parts"
    );
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_rejected_key_degrades_to_fallback() {
    let dir = TempDir::new().unwrap();
    let base_url = spawn_fake_gemini().await;
    let image = png([5, 5, 5]);
    let request = compare_request("/compare/", &[("image1", image.as_slice()), ("image2", image.as_slice())]);
    let (status, body) = send(gemini_app(dir.path(), &base_url, "wrong-key"), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["similarity"], 100.0);
    let explanation = body["explanation"].as_str().unwrap();
    assert!(explanation.starts_with("The AI explanation could not be generated due to a server-side issue"));
    assert!(explanation.contains("API key not valid"));
}

#[tokio::test]
async fn test_unreachable_model_degrades_to_fallback() {
    let dir = TempDir::new().unwrap();
    // grab a free port, then close it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let image = png([5, 5, 5]);
    let request = compare_request("/compare/", &[("image1", image.as_slice()), ("image2", image.as_slice())]);
    let (status, body) = send(gemini_app(dir.path(), &base_url, VALID_KEY), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["similarity"], 100.0);
    assert!(body["explanation"]
        .as_str()
        .unwrap()
        .starts_with("The AI explanation could not be generated due to a server-side issue"));
}

#[tokio::test]
async fn test_embedding_strategy_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        upload_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let state = AppState::from_parts(
        config,
        FeatureExtractor::with_backend(Arc::new(MeanColor)),
        Arc::new(DisabledExplainer),
    );

    let image = png([90, 40, 10]);
    let request = compare_request("/compare/", &[("image1", image.as_slice()), ("image2", image.as_slice())]);
    let (status, first) = send(create_router(state.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["method"], "embedding");
    assert!(first["similarity"].as_f64().unwrap() >= 99.9);

    let request = compare_request("/compare/", &[("image1", image.as_slice()), ("image2", image.as_slice())]);
    let (_, second) = send(create_router(state), request).await;
    assert_eq!(first["similarity"], second["similarity"]);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        upload_dir: dir.path().to_path_buf(),
        max_upload_size: 1024,
        ..Config::default()
    };
    let app = create_router(AppState::from_parts(
        config,
        FeatureExtractor::Pixel,
        Arc::new(DisabledExplainer),
    ));

    let big = vec![0u8; 4096];
    let request = compare_request("/compare/", &[("image1", big.as_slice()), ("image2", big.as_slice())]);
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Payload too large"));
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_a_400_with_detail() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/compare/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image1": "nope"}"#))
        .unwrap();
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(predicate::str::starts_with("Upload error").eval(detail));
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn test_bad_query_is_a_400_with_detail() {
    let dir = TempDir::new().unwrap();
    let image = png([1, 2, 3]);
    let request = compare_request(
        "/compare/?include_images=maybe",
        &[("image1", image.as_slice()), ("image2", image.as_slice())],
    );
    let (status, body) = send(pixel_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(predicate::str::starts_with("Invalid input").eval(detail));
    assert!(predicate::str::contains("query string").eval(detail));
    assert_eq!(staged_files(dir.path()), 0);
}
