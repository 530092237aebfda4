//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use kazana_core::auth::{MemoryTokenStore, TokenSlot, TokenStore};
use kazana_core::ApiClient;
use wiremock::MockServer;

/// Unsigned JWT-shaped token expiring `secs` from now (negative for the past)
pub fn token_expiring_in(secs: i64, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"exp":{},"sub":"{}"}}"#,
        Utc::now().timestamp() + secs,
        subject
    ));
    format!("{}.{}.sig", header, payload)
}

pub fn fresh_token(subject: &str) -> String {
    token_expiring_in(3600, subject)
}

pub fn expired_token(subject: &str) -> String {
    token_expiring_in(-60, subject)
}

/// Client against `server` with the given tokens already stored
pub fn client_with_tokens(
    server: &MockServer,
    access: Option<&str>,
    refresh: Option<&str>,
) -> (ApiClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    if let Some(access) = access {
        store.set(TokenSlot::Access, access).unwrap();
    }
    if let Some(refresh) = refresh {
        store.set(TokenSlot::Refresh, refresh).unwrap();
    }
    let client = ApiClient::new(&server.uri(), store.clone(), Duration::zero()).unwrap();
    (client, store)
}

pub fn stored(store: &MemoryTokenStore, slot: TokenSlot) -> Option<String> {
    store.get(slot).unwrap()
}
