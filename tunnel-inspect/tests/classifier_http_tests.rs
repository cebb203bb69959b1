//! HTTP classifier client against a local stub server

mod helpers;

use axum::http::StatusCode;
use helpers::{spawn_stub_classifier, test_core};
use std::sync::Arc;
use std::time::Duration;
use tunnel_common::{DefectType, InspectionStatus, Severity};
use tunnel_inspect::config::ClassifierSettings;
use tunnel_inspect::db::inspections;
use tunnel_inspect::services::{
    ClassificationRequest, ClassifierError, DefectClassifier, HttpDefectClassifier, ImageSubmission,
};
use tunnel_inspect::SubmissionError;

const BARE_RESULT: &str =
    r#"{"defectType":"Water Seepage","severity":"Medium","confidence":81.5,"crackDensity":0.02}"#;

fn settings(endpoint: String, timeout: Duration, api_key: Option<&str>) -> ClassifierSettings {
    ClassifierSettings {
        endpoint,
        timeout,
        api_key: api_key.map(str::to_string),
    }
}

fn request() -> ClassificationRequest {
    ClassificationRequest {
        image: vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4],
        mime_type: "image/jpeg".to_string(),
        section: Some("A-2".to_string()),
    }
}

#[tokio::test]
async fn test_bare_result_is_decoded() {
    let server = spawn_stub_classifier(StatusCode::OK, BARE_RESULT, Duration::ZERO).await;
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), Duration::from_secs(5), None)).unwrap();

    let raw = client.classify(request()).await.unwrap();
    assert_eq!(raw.defect_type, "Water Seepage");
    assert_eq!(raw.severity, "Medium");
    assert_eq!(raw.confidence, 81.5);
    assert_eq!(raw.crack_density, Some(0.02));
    assert_eq!(raw.max_crack_width, None);
}

#[tokio::test]
async fn test_envelope_result_is_unwrapped() {
    let body = r#"{"success":true,"analysis":{"defectType":"Crack","severity":"Critical","confidence":97}}"#;
    let server = spawn_stub_classifier(StatusCode::OK, body, Duration::ZERO).await;
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), Duration::from_secs(5), None)).unwrap();

    let raw = client.classify(request()).await.unwrap();
    assert_eq!(raw.defect_type, "Crack");
    assert_eq!(raw.severity, "Critical");
    assert_eq!(raw.confidence, 97.0);
}

#[tokio::test]
async fn test_request_carries_multipart_fields_and_key() {
    let server = spawn_stub_classifier(StatusCode::OK, BARE_RESULT, Duration::ZERO).await;
    let client = HttpDefectClassifier::new(&settings(
        server.endpoint(),
        Duration::from_secs(5),
        Some("sk-test-123"),
    ))
    .unwrap();

    client.classify(request()).await.unwrap();

    let received = server.received();
    assert_eq!(received.len(), 1);
    let seen = &received[0];
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test-123"));
    assert!(seen
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    assert!(seen.body_contains(r#"name="image""#));
    assert!(seen.body_contains("Content-Type: image/jpeg"));
    assert!(seen.body_contains(r#"name="section""#));
    assert!(seen.body_contains("A-2"));
}

#[tokio::test]
async fn test_no_key_sends_no_authorization() {
    let server = spawn_stub_classifier(StatusCode::OK, BARE_RESULT, Duration::ZERO).await;
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), Duration::from_secs(5), None)).unwrap();

    client.classify(request()).await.unwrap();
    assert_eq!(server.received()[0].authorization, None);
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = spawn_stub_classifier(
        StatusCode::SERVICE_UNAVAILABLE,
        r#"{"error":"model loading"}"#,
        Duration::ZERO,
    )
    .await;
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), Duration::from_secs(5), None)).unwrap();

    match client.classify(request()).await {
        Err(ClassifierError::Unavailable(msg)) => {
            assert!(msg.contains("503"), "message was {}", msg);
            assert!(msg.contains("model loading"), "message was {}", msg);
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_envelope_is_unavailable() {
    let body = r#"{"success":false,"error":"image too dark"}"#;
    let server = spawn_stub_classifier(StatusCode::OK, body, Duration::ZERO).await;
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), Duration::from_secs(5), None)).unwrap();

    match client.classify(request()).await {
        Err(ClassifierError::Unavailable(msg)) => assert!(msg.contains("image too dark")),
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let server = spawn_stub_classifier(StatusCode::OK, "<html>gateway</html>", Duration::ZERO).await;
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), Duration::from_secs(5), None)).unwrap();

    assert!(matches!(
        client.classify(request()).await,
        Err(ClassifierError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unavailable() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpDefectClassifier::new(&settings(
        format!("http://{}/analyze", addr),
        Duration::from_secs(5),
        None,
    ))
    .unwrap();

    assert!(matches!(
        client.classify(request()).await,
        Err(ClassifierError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_slow_server_times_out_through_coordinator() {
    let server = spawn_stub_classifier(StatusCode::OK, BARE_RESULT, Duration::from_secs(3)).await;
    let timeout = Duration::from_millis(200);
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), timeout, None)).unwrap();
    let f = test_core(Arc::new(client), timeout).await.unwrap();

    let image = vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0];
    let result = f
        .core
        .coordinator
        .submit(ImageSubmission {
            size_bytes: image.len() as u64,
            image,
            mime_type: "image/jpeg".to_string(),
            section_ref: "A-1".to_string(),
            engineer_id: f.inspector.id,
            notes: None,
            image_url: None,
        })
        .await;

    match result {
        Err(SubmissionError::ClassifierTimeout(after)) => assert_eq!(after, timeout),
        other => panic!("expected ClassifierTimeout, got {:?}", other),
    }

    let pending = inspections::pending_inspection_dates(f.pool(), Some(f.inspector.id))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_http_classifier_drives_full_submission() {
    let server = spawn_stub_classifier(StatusCode::OK, BARE_RESULT, Duration::ZERO).await;
    let timeout = Duration::from_secs(5);
    let client = HttpDefectClassifier::new(&settings(server.endpoint(), timeout, None)).unwrap();
    let f = test_core(Arc::new(client), timeout).await.unwrap();

    let image = vec![0x89, b'P', b'N', b'G', 0, 0, 0, 0];
    let outcome = f
        .core
        .coordinator
        .submit(ImageSubmission {
            size_bytes: image.len() as u64,
            image,
            mime_type: "image/png".to_string(),
            section_ref: "a-2".to_string(),
            engineer_id: f.inspector.id,
            notes: Some("ring 14 damp patch".to_string()),
            image_url: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.inspection.status, InspectionStatus::Analyzed);
    let classification = outcome.inspection.classification.expect("classification stored");
    assert_eq!(classification.defect_type, DefectType::WaterSeepage);
    assert_eq!(classification.severity, Severity::Medium);
    assert_eq!(classification.confidence_score, 81.5);
    assert!(outcome.alert.is_none());
    assert!(server.received()[0].body_contains("Content-Type: image/png"));
    assert!(server.received()[0].body_contains("A-2"));
}
