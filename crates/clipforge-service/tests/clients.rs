//! HTTP client tests against mocked provider and storage APIs.

use clipforge_service::provider::{
    ProviderJobState, RegisterTemplateRequest, SubmitJobRequest, TemplateFormat, UploadInfo,
};
use clipforge_service::storage::{ResourceType, UploadOptions};
use clipforge_service::{CloudStorageClient, MediaStorage, ProviderClient, ProviderError, RenderProvider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Render provider
// ============================================================================

fn provider(server: &MockServer) -> ProviderClient {
    ProviderClient::new(format!("{}/v1/", server.uri()), "pk_test").unwrap()
}

#[tokio::test]
async fn register_template_sends_format_and_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/templates"))
        .and(header("authorization", "Bearer pk_test"))
        .and(body_partial_json(json!({ "type": "zip", "displayName": "template_3" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "tpl_9",
            "status": "created",
            "displayName": "template_3",
            "uploadInfo": { "url": format!("{}/upload/tpl_9", server.uri()) }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let template = provider(&server)
        .register_template(&RegisterTemplateRequest {
            format: TemplateFormat::Zip,
            display_name: "template_3".into(),
        })
        .await
        .unwrap();

    assert_eq!(template.id, "tpl_9");
    assert!(!template.is_uploaded());
    let upload = template.upload_info.unwrap();
    assert_eq!(upload.method, "PUT");
    assert!(upload.url.ends_with("/upload/tpl_9"));
}

#[tokio::test]
async fn upload_template_puts_bytes_without_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload/tpl_9"))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let target = UploadInfo {
        url: format!("{}/upload/tpl_9", server.uri()),
        method: "put".into(),
    };
    provider(&server)
        .upload_template(&target, b"PK project".to_vec())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    assert_eq!(requests[0].body, b"PK project");
}

#[tokio::test]
async fn get_template_maps_not_found_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/templates/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/templates/tpl_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tpl_9",
            "status": "uploaded",
            "compositions": ["main"],
            "layers": [{ "layerName": "txt_1", "composition": "main" }]
        })))
        .mount(&server)
        .await;

    let client = provider(&server);
    assert!(client.get_template("gone").await.unwrap().is_none());

    let template = client.get_template("tpl_9").await.unwrap().unwrap();
    assert!(template.is_uploaded());
    assert_eq!(template.compositions, vec!["main".to_string()]);
    assert_eq!(template.layers[0].layer_name, "txt_1");
}

#[tokio::test]
async fn submit_job_normalizes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/jobs"))
        .and(body_partial_json(json!({
            "template": { "id": "tpl_9", "composition": "main" },
            "webhook": { "url": "https://api.test/webhooks/render", "method": "POST" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "jobId": "job_7",
            "renderStatus": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = SubmitJobRequest::new(
        "tpl_9",
        "main",
        &[],
        Some("https://api.test/webhooks/render".into()),
    );
    let job = provider(&server).submit_job(&request).await.unwrap();

    assert_eq!(job.id, "job_7");
    assert_eq!(job.state, ProviderJobState::Queued);
}

#[tokio::test]
async fn get_job_reads_nested_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/jobs/job_7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job_7",
            "state": "Finished",
            "output": { "url": "https://provider.test/job_7.mp4" }
        })))
        .mount(&server)
        .await;

    let job = provider(&server).get_job("job_7").await.unwrap();

    assert_eq!(job.state, ProviderJobState::Finished);
    assert_eq!(job.output_url.as_deref(), Some("https://provider.test/job_7.mp4"));
}

#[tokio::test]
async fn provider_errors_carry_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/jobs"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "error": "unknown composition" })),
        )
        .mount(&server)
        .await;

    let request = SubmitJobRequest::new("tpl_9", "nope", &[], None);
    let err = provider(&server).submit_job(&request).await.unwrap_err();

    match err {
        ProviderError::Api { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "unknown composition");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn delete_template_tolerates_missing_asset() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/templates/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server).delete_template("gone").await.unwrap();
}

#[tokio::test]
async fn download_output_returns_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/out/job_7.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4 bytes".to_vec()))
        .mount(&server)
        .await;

    let bytes = provider(&server)
        .download_output(&format!("{}/out/job_7.mp4", server.uri()))
        .await
        .unwrap();

    assert_eq!(bytes, b"mp4 bytes");
}

// ============================================================================
// Durable storage
// ============================================================================

#[tokio::test]
async fn storage_upload_posts_signed_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/video/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "secure_url": "https://cdn.storage.test/demo/video/upload/clipforge/renders/01J.mp4",
            "public_id": "clipforge/renders/01J",
            "format": "mp4",
            "bytes": 9,
            "duration": 4.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CloudStorageClient::new(server.uri(), "demo", "key_1", "secret_1").unwrap();
    let mut options = UploadOptions::render_output("01J");
    options.file_name = Some("01J.mp4".into());

    let media = client.upload_bytes(b"mp4 bytes".to_vec(), &options).await.unwrap();

    assert_eq!(media.public_id, "clipforge/renders/01J");
    assert_eq!(media.duration, Some(4.5));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    for field in ["api_key", "signature", "timestamp", "folder", "public_id", "file"] {
        assert!(body.contains(&format!("name=\"{field}\"")), "missing {field}");
    }
    assert!(body.contains("clipforge/renders"));
    assert!(!body.contains("secret_1"));
}

#[tokio::test]
async fn storage_errors_carry_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/image/upload"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": { "message": "Invalid image file" } })),
        )
        .mount(&server)
        .await;

    let client = CloudStorageClient::new(server.uri(), "demo", "key_1", "secret_1").unwrap();
    let options = UploadOptions::user_asset(ResourceType::Image, Some("logo.png".into()));

    let err = client.upload_bytes(b"not an image".to_vec(), &options).await.unwrap_err();

    assert!(err.to_string().contains("Invalid image file"));
}
