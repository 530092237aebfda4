//! API client for the Kazana document service.
//!
//! Every call to a protected endpoint is built as a `reqwest::Request`,
//! authorized by the [`SessionGatekeeper`], then dispatched.

use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::{SessionEvent, SessionGatekeeper, SessionState, TokenStore};
use crate::models::{
    Category, Document, ErrorBody, LoginRequest, SignupRequest, TokenPair, UpdateCategoryRequest,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Production API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://mykazana.onrender.com/api";

/// HTTP request timeout in seconds.
/// Uploads wait on server-side classification, so this is generous.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// API client for the document service.
/// Clone is cheap - reqwest::Client and the gatekeeper share state internally.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    gatekeeper: SessionGatekeeper,
}

impl ApiClient {
    /// Create a client whose session lives in `store`
    pub fn new(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        expiry_leeway: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let gatekeeper = SessionGatekeeper::new(store, client.clone(), &base_url, expiry_leeway);

        Ok(Self {
            client,
            base_url,
            gatekeeper,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn gatekeeper(&self) -> &SessionGatekeeper {
        &self.gatekeeper
    }

    /// Subscribe to session events (login required, refreshed, ...)
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.gatekeeper.subscribe()
    }

    pub fn session_state(&self) -> Result<SessionState, ApiError> {
        Ok(self.gatekeeper.state()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ===== Session =====

    /// Exchange username and password for a credential pair and store it.
    /// Sent outside the gatekeeper so a stale session cannot interfere.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/auth/login/"))
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let pair: TokenPair = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;
        self.gatekeeper.login(&pair)?;
        info!(username = username, "Logged in");
        Ok(())
    }

    /// Create an account. The service's error message, if any, is surfaced
    /// as `ApiError::Rejected`.
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/signup/"))
            .json(&SignupRequest {
                username,
                email,
                password,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(username = username, "Account created");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body).ok().and_then(|b| b.message) {
            Some(message) => Err(ApiError::Rejected(message)),
            None => Err(ApiError::from_status(status, &body)),
        }
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        Ok(self.gatekeeper.logout()?)
    }

    // ===== Request Plumbing =====

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Authorize, dispatch and check a request
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = self.gatekeeper.prepare(builder.build()?).await?;
        let method = request.method().clone();
        let url = request.url().path().to_string();

        let response = self.client.execute(request).await?;
        debug!(%method, url = %url, status = %response.status(), "API response");

        let result = Self::check_response(response).await;
        if matches!(result, Err(ApiError::Unauthorized)) {
            // Caller decides whether this ends the session
            warn!(%method, url = %url, "Request rejected as unauthorized");
        }
        result
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let url = response.url().path().to_string();
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
    }

    // ===== Documents =====

    /// Fetch every document visible to the current user
    pub async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        let documents: Vec<Document> = self.send_json(self.client.get(self.url("/documents/"))).await?;
        debug!(count = documents.len(), "Fetched documents");
        Ok(documents)
    }

    /// Upload a file for classification. `category` is a hint; the returned
    /// document carries the category the service settled on.
    pub async fn upload_document(
        &self,
        path: &Path,
        category: Option<Category>,
    ) -> Result<Document, ApiError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let size = bytes.len();

        let mut form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.clone()));
        if let Some(category) = category {
            form = form.text("category", category.as_str());
        }

        let document: Document = self
            .send_json(self.client.post(self.url("/documents/")).multipart(form))
            .await?;
        info!(
            file = %file_name,
            bytes = size,
            category = %document.category,
            confidence = document.confidence_score,
            "Uploaded document"
        );
        Ok(document)
    }

    pub async fn update_category(&self, id: i64, category: Category) -> Result<(), ApiError> {
        let url = self.url(&format!("/documents/{}/update_category/", id));
        self.send(self.client.patch(url).json(&UpdateCategoryRequest { category }))
            .await?;
        info!(id = id, category = %category, "Updated document category");
        Ok(())
    }

    pub async fn delete_document(&self, id: i64) -> Result<(), ApiError> {
        let url = self.url(&format!("/documents/{}/", id));
        self.send(self.client.delete(url)).await?;
        info!(id = id, "Deleted document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new(
            "http://localhost:8000/api/",
            Arc::new(MemoryTokenStore::new()),
            Duration::zero(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(client.url("/documents/"), "http://localhost:8000/api/documents/");
    }
}
