//! Integration tests for the document API client

mod common;

use common::{client_with_tokens, fresh_token, stored};
use kazana_core::auth::TokenSlot;
use kazana_core::models::Category;
use kazana_core::{ApiError, SessionEvent, SessionState};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_login_stores_credential_pair() {
    let server = MockServer::start().await;
    let access = fresh_token("amina");
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .and(body_json(json!({ "username": "amina", "password": "s3cret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": access,
            "refresh": "refresh-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_tokens(&server, None, None);
    let mut events = client.subscribe();

    client.login("amina", "s3cret").await.unwrap();
    assert_eq!(stored(&store, TokenSlot::Access), Some(access));
    assert_eq!(stored(&store, TokenSlot::Refresh).as_deref(), Some("refresh-1"));
    assert_eq!(client.session_state().unwrap(), SessionState::Valid);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn);
}

#[tokio::test]
async fn test_login_with_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "No active account found with the given credentials"
        })))
        .mount(&server)
        .await;

    let (client, store) = client_with_tokens(&server, None, None);
    let err = client.login("amina", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
    assert_eq!(stored(&store, TokenSlot::Access), None);
}

#[tokio::test]
async fn test_signup_surfaces_service_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signup/"))
        .and(body_json(json!({ "username": "amina", "email": "a@example.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "message": "Username already exists" })))
        .mount(&server)
        .await;

    let (client, _store) = client_with_tokens(&server, None, None);
    let err = client.signup("amina", "a@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected(ref msg) if msg == "Username already exists"));
}

#[tokio::test]
async fn test_signup_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signup/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 4 })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with_tokens(&server, None, None);
    client.signup("amina", "a@example.com", "pw").await.unwrap();
}

#[tokio::test]
async fn test_list_documents_parses_service_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "file": "/media/documents/w2.pdf",
                "category": "tax",
                "confidence_score": 0.934,
                "uploaded_at": "2024-02-10T08:30:00Z"
            },
            {
                "id": 2,
                "file": "/media/documents/deed.pdf",
                "category": "Real Estate",
                "confidence_score": 0.61,
                "uploaded_at": "2024-02-11T09:00:00.512Z"
            }
        ])))
        .mount(&server)
        .await;

    let access = fresh_token("amina");
    let (client, _store) = client_with_tokens(&server, Some(&access), Some("r1"));
    let docs = client.list_documents().await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].file_name(), "w2.pdf");
    assert_eq!(docs[0].confidence_display(), "93.40%");
    assert_eq!(docs[1].category, Category::RealEstate);
}

#[tokio::test]
async fn test_upload_sends_multipart_with_category() {
    let server = MockServer::start().await;
    let access = fresh_token("amina");
    Mock::given(method("POST"))
        .and(path("/documents/"))
        .and(header("authorization", format!("Bearer {}", access).as_str()))
        .and(body_string_contains("name=\"file\"; filename=\"scan.txt\""))
        .and(body_string_contains("hello kazana"))
        .and(body_string_contains("name=\"category\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 42,
            "file": "/media/documents/scan.txt",
            "category": "medical",
            "confidence_score": 0.78,
            "uploaded_at": "2024-02-12T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let upload_path = dir.path().join("scan.txt");
    std::fs::write(&upload_path, "hello kazana").unwrap();

    let (client, _store) = client_with_tokens(&server, Some(&access), Some("r1"));
    let doc = client
        .upload_document(&upload_path, Some(Category::Medical))
        .await
        .unwrap();
    assert_eq!(doc.id, 42);
    assert_eq!(doc.category, Category::Medical);
}

#[tokio::test]
async fn test_upload_missing_file_is_io_error() {
    let server = MockServer::start().await;
    let (client, _store) = client_with_tokens(&server, None, None);
    let err = client
        .upload_document(std::path::Path::new("/definitely/not/here.pdf"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Io(_)));
}

#[tokio::test]
async fn test_update_category_sends_wire_value() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/documents/7/update_category/"))
        .and(body_json(json!({ "category": "real_estate" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "updated" })))
        .expect(1)
        .mount(&server)
        .await;

    let access = fresh_token("amina");
    let (client, _store) = client_with_tokens(&server, Some(&access), Some("r1"));
    client.update_category(7, Category::RealEstate).await.unwrap();
}

#[tokio::test]
async fn test_errors_propagate_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/documents/99/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Not found." })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/documents/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let access = fresh_token("amina");
    let (client, store) = client_with_tokens(&server, Some(&access), Some("r1"));

    let err = client.delete_document(99).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref body) if body.contains("Not found.")));

    let err = client.list_documents().await.unwrap_err();
    assert!(matches!(err, ApiError::ServerError(ref body) if body == "maintenance"));
    assert!(!err.requires_login());

    // Ordinary failures do not touch the session
    assert_eq!(stored(&store, TokenSlot::Access), Some(access));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let server = MockServer::start().await;
    let access = fresh_token("amina");
    let (client, store) = client_with_tokens(&server, Some(&access), Some("r1"));

    client.logout().unwrap();
    assert_eq!(stored(&store, TokenSlot::Access), None);
    assert_eq!(stored(&store, TokenSlot::Refresh), None);
    assert_eq!(client.session_state().unwrap(), SessionState::Absent);
}
