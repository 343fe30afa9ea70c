//! Customization asset upload integration tests.

mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use common::TestHarness;

fn file_form(bytes: &[u8], file_name: &str, mime: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes.to_vec())
            .file_name(file_name)
            .mime_type(mime),
    )
}

#[tokio::test]
async fn upload_image_success() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/uploads")
        .add_header("authorization", harness.user_auth_header())
        .multipart(file_form(b"\x89PNG fake", "logo.png", "image/png"))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["resource_type"], "image");
    assert!(body["url"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.test/clipforge/uploads/"));

    let uploads = harness.storage.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "clipforge/uploads");
    assert_eq!(uploads[0].2, 9);
}

#[tokio::test]
async fn upload_video_success() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/uploads")
        .add_header("authorization", harness.user_auth_header())
        .multipart(file_form(b"mp4", "clip.mp4", "video/mp4"))
        .await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<serde_json::Value>()["resource_type"], "video");
}

#[tokio::test]
async fn upload_rejects_other_file_types() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/uploads")
        .add_header("authorization", harness.user_auth_header())
        .multipart(file_form(b"%PDF", "brief.pdf", "application/pdf"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert!(harness.storage.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upload_rejects_empty_file() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/uploads")
        .add_header("authorization", harness.user_auth_header())
        .multipart(file_form(b"", "logo.png", "image/png"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_requires_file_part() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/uploads")
        .add_header("authorization", harness.user_auth_header())
        .multipart(MultipartForm::new().add_text("note", "hello"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_without_auth_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/uploads")
        .multipart(file_form(b"png", "logo.png", "image/png"))
        .await
        .assert_status_unauthorized();
}
