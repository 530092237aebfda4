//! Request authorization and silent token refresh.
//!
//! Every protected request passes through [`SessionGatekeeper::prepare`]
//! before dispatch. An expired access token is refreshed first; concurrent
//! callers that observe the same expiry share one in-flight refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Request};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::claims;
use super::store::{StoreError, TokenSlot, TokenStore};
use super::AuthError;
use crate::models::{RefreshRequest, RefreshResponse, TokenPair};

/// Refresh endpoint, relative to the API base URL
const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Buffered session events per subscriber before old ones are dropped
const EVENT_CHANNEL_CAPACITY: usize = 16;

type SharedRefresh = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Session lifecycle notifications for the hosting application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    /// The session could not be renewed and has been cleared.
    /// The host should send the user back to login.
    LoginRequired { reason: String },
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Valid,
    Expired,
}

enum RefreshTicket {
    /// The store already holds a usable token
    Ready(String),
    Pending { id: u64, refresh: SharedRefresh },
}

struct InFlightRefresh {
    id: u64,
    epoch: u64,
    future: SharedRefresh,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    http: Client,
    refresh_url: String,
    leeway_ms: i64,
    in_flight: Mutex<Option<InFlightRefresh>>,
    next_refresh_id: AtomicU64,
    // Bumped on login/logout; waiters on an older epoch give up
    epoch: watch::Sender<u64>,
    // Held while checking the epoch and writing credentials
    write_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionGatekeeper {
    inner: Arc<Inner>,
}

impl SessionGatekeeper {
    /// `http` is used for refresh calls only and should not add auth headers.
    pub fn new(
        store: Arc<dyn TokenStore>,
        http: Client,
        api_base_url: &str,
        expiry_leeway: Duration,
    ) -> Self {
        let (epoch, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                http,
                refresh_url: format!("{}{}", api_base_url.trim_end_matches('/'), REFRESH_PATH),
                leeway_ms: expiry_leeway.num_milliseconds().max(0),
                in_flight: Mutex::new(None),
                next_refresh_id: AtomicU64::new(1),
                epoch,
                write_lock: Mutex::new(()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> Result<SessionState, AuthError> {
        Ok(match self.inner.read(TokenSlot::Access)? {
            None => SessionState::Absent,
            Some(token) if self.inner.is_expired(&token) => SessionState::Expired,
            Some(_) => SessionState::Valid,
        })
    }

    /// Store a freshly issued credential pair, replacing any previous session
    pub fn login(&self, pair: &TokenPair) -> Result<(), AuthError> {
        {
            let _guard = self.inner.lock_writes();
            self.inner.invalidate_refresh();
            self.inner.store.set(TokenSlot::Access, &pair.access).map_err(storage_error)?;
            self.inner.store.set(TokenSlot::Refresh, &pair.refresh).map_err(storage_error)?;
        }
        info!("Session started");
        self.inner.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Clear the session. Requests waiting on a refresh fail with
    /// [`AuthError::SessionClosed`].
    pub fn logout(&self) -> Result<(), AuthError> {
        {
            let _guard = self.inner.lock_writes();
            self.inner.invalidate_refresh();
            self.inner.store.clear().map_err(storage_error)?;
        }
        info!("Session ended");
        self.inner.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Attach a valid bearer token to `request`, refreshing first if needed.
    /// Without a stored token the request is returned unchanged.
    pub async fn prepare(&self, mut request: Request) -> Result<Request, AuthError> {
        if let Some(token) = self.ensure_fresh().await? {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AuthError::MalformedCredential)?;
            value.set_sensitive(true);
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Ok(request)
    }

    /// Return a non-expired access token, or `None` when logged out.
    ///
    /// Idempotent: if a refresh is already running, this awaits it instead
    /// of starting another.
    pub async fn ensure_fresh(&self) -> Result<Option<String>, AuthError> {
        let Some(token) = self.inner.read(TokenSlot::Access)? else {
            return Ok(None);
        };
        if !self.inner.is_expired(&token) {
            return Ok(Some(token));
        }
        self.await_refresh().await.map(Some)
    }

    async fn await_refresh(&self) -> Result<String, AuthError> {
        let mut epoch_rx = self.inner.epoch.subscribe();
        let epoch = *epoch_rx.borrow_and_update();

        let (id, refresh) = match self.join_or_start_refresh(epoch)? {
            RefreshTicket::Ready(token) => return Ok(token),
            RefreshTicket::Pending { id, refresh } => (id, refresh),
        };
        let result = tokio::select! {
            result = refresh => result,
            _ = epoch_rx.changed() => {
                debug!("Session closed while waiting for refresh");
                Err(AuthError::SessionClosed)
            }
        };
        self.inner.finish_refresh(id);
        result
    }

    fn join_or_start_refresh(&self, epoch: u64) -> Result<RefreshTicket, AuthError> {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref existing) = *in_flight {
            // A finished future left behind by cancelled waiters is not reused
            if existing.epoch == epoch && existing.future.peek().is_none() {
                debug!(refresh_id = existing.id, "Joining in-flight token refresh");
                return Ok(RefreshTicket::Pending {
                    id: existing.id,
                    refresh: existing.future.clone(),
                });
            }
        }

        // Nothing to join. A refresh may have completed since the caller
        // last read the store, or the session may be gone.
        match self.inner.read(TokenSlot::Access)? {
            None => return Err(AuthError::SessionClosed),
            Some(token) if !self.inner.is_expired(&token) => return Ok(RefreshTicket::Ready(token)),
            Some(_) => {}
        }

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        debug!(refresh_id = id, "Access token expired, starting refresh");
        let future = run_refresh(Arc::downgrade(&self.inner), epoch).boxed().shared();
        *in_flight = Some(InFlightRefresh {
            id,
            epoch,
            future: future.clone(),
        });
        Ok(RefreshTicket::Pending { id, refresh: future })
    }
}

impl Inner {
    fn read(&self, slot: TokenSlot) -> Result<Option<String>, AuthError> {
        self.store.get(slot).map_err(storage_error)
    }

    fn is_expired(&self, token: &str) -> bool {
        claims::is_expired(token, Utc::now().timestamp_millis(), self.leeway_ms)
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Start a new epoch and drop the in-flight refresh. Caller holds the write lock.
    fn invalidate_refresh(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
        let dropped = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(refresh) = dropped {
            debug!(refresh_id = refresh.id, "Cancelled in-flight token refresh");
        }
    }

    fn finish_refresh(&self, id: u64) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.as_ref().is_some_and(|r| r.id == id) {
            *in_flight = None;
        }
    }

    async fn request_access_token(&self) -> Result<String, String> {
        let refresh = match self.store.get(TokenSlot::Refresh) {
            Ok(Some(token)) => token,
            Ok(None) => return Err("no refresh token stored".to_string()),
            Err(e) => return Err(format!("could not read refresh token: {}", e)),
        };

        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("refresh endpoint returned {}", status));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed refresh response: {}", e))?;
        if body.access.is_empty() {
            return Err("refresh response carried an empty access token".to_string());
        }
        Ok(body.access)
    }

    /// Clear both credentials after an unrecoverable refresh failure
    fn tear_down(&self, epoch: u64, reason: &str) -> bool {
        let _guard = self.lock_writes();
        if *self.epoch.borrow() != epoch {
            return false;
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credentials after refresh failure");
        }
        error!(reason = reason, "Token refresh failed, session cleared");
        true
    }
}

async fn run_refresh(inner: Weak<Inner>, epoch: u64) -> Result<String, AuthError> {
    let Some(inner) = inner.upgrade() else {
        return Err(AuthError::SessionClosed);
    };

    match inner.request_access_token().await {
        Ok(access) => {
            {
                let _guard = inner.lock_writes();
                // A logout or new login raced us; the result belongs to a dead session
                if *inner.epoch.borrow() != epoch {
                    debug!("Discarding refreshed token for a closed session");
                    return Err(AuthError::SessionClosed);
                }
                inner.store.set(TokenSlot::Access, &access).map_err(storage_error)?;
            }
            info!("Access token refreshed");
            inner.emit(SessionEvent::Refreshed);
            Ok(access)
        }
        Err(reason) => {
            if !inner.tear_down(epoch, &reason) {
                return Err(AuthError::SessionClosed);
            }
            inner.emit(SessionEvent::LoginRequired {
                reason: reason.clone(),
            });
            Err(AuthError::RefreshFailed(reason))
        }
    }
}

fn storage_error(e: StoreError) -> AuthError {
    AuthError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::token_with_exp;
    use crate::auth::MemoryTokenStore;

    fn gatekeeper(store: Arc<MemoryTokenStore>) -> SessionGatekeeper {
        // Unroutable base URL: these tests never reach the refresh endpoint
        SessionGatekeeper::new(store, Client::new(), "http://127.0.0.1:9/api/", Duration::zero())
    }

    fn valid_token() -> String {
        token_with_exp(Utc::now().timestamp() + 3600)
    }

    fn get(url: &str) -> Request {
        Client::new().get(url).build().unwrap()
    }

    #[test]
    fn test_refresh_url_joins_base() {
        let gk = gatekeeper(Arc::new(MemoryTokenStore::new()));
        assert_eq!(gk.inner.refresh_url, "http://127.0.0.1:9/api/auth/token/refresh/");
    }

    #[tokio::test]
    async fn test_no_token_passes_through() {
        let gk = gatekeeper(Arc::new(MemoryTokenStore::new()));
        let request = gk.prepare(get("http://localhost/documents/")).await.unwrap();
        assert!(request.headers().get(header::AUTHORIZATION).is_none());
        assert_eq!(gk.state().unwrap(), SessionState::Absent);
    }

    #[tokio::test]
    async fn test_valid_token_is_attached() {
        let store = Arc::new(MemoryTokenStore::new());
        let gk = gatekeeper(store.clone());
        let access = valid_token();
        gk.login(&TokenPair {
            access: access.clone(),
            refresh: "r".to_string(),
        })
        .unwrap();

        let request = gk.prepare(get("http://localhost/documents/")).await.unwrap();
        let value = request.headers().get(header::AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), format!("Bearer {}", access));
        assert!(value.is_sensitive());
        assert_eq!(gk.state().unwrap(), SessionState::Valid);
    }

    #[tokio::test]
    async fn test_login_and_logout_emit_events() {
        let store = Arc::new(MemoryTokenStore::new());
        let gk = gatekeeper(store.clone());
        let mut events = gk.subscribe();

        gk.login(&TokenPair {
            access: valid_token(),
            refresh: "r".to_string(),
        })
        .unwrap();
        gk.logout().unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
        assert_eq!(store.get(TokenSlot::Access).unwrap(), None);
        assert_eq!(store.get(TokenSlot::Refresh).unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_tears_down() {
        let store = Arc::new(MemoryTokenStore::new());
        store.set(TokenSlot::Access, &token_with_exp(1)).unwrap();
        let gk = gatekeeper(store.clone());
        let mut events = gk.subscribe();
        assert_eq!(gk.state().unwrap(), SessionState::Expired);

        let err = gk.prepare(get("http://localhost/documents/")).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert_eq!(store.get(TokenSlot::Access).unwrap(), None);
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::LoginRequired { .. }
        ));
        assert!(gk.inner.in_flight.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_refresh_is_not_restarted() {
        let store = Arc::new(MemoryTokenStore::new());
        let gk = gatekeeper(store.clone());
        let epoch = *gk.inner.epoch.borrow();

        // Another caller's refresh landed between our expiry check and the lock
        let refreshed = valid_token();
        store.set(TokenSlot::Access, &refreshed).unwrap();
        match gk.join_or_start_refresh(epoch).unwrap() {
            RefreshTicket::Ready(token) => assert_eq!(token, refreshed),
            RefreshTicket::Pending { .. } => panic!("started a second refresh"),
        }
        assert!(gk.inner.in_flight.lock().unwrap().is_none());

        // Same, with the finished future still parked in the slot
        let finished = futures::future::ready(Ok::<_, AuthError>(refreshed.clone()))
            .boxed()
            .shared();
        finished.clone().await.unwrap();
        *gk.inner.in_flight.lock().unwrap() = Some(InFlightRefresh {
            id: 99,
            epoch,
            future: finished,
        });
        match gk.join_or_start_refresh(epoch).unwrap() {
            RefreshTicket::Ready(token) => assert_eq!(token, refreshed),
            RefreshTicket::Pending { .. } => panic!("started a second refresh"),
        }
        assert_eq!(gk.inner.in_flight.lock().unwrap().as_ref().map(|r| r.id), Some(99));
    }

    #[tokio::test]
    async fn test_join_after_logout_reports_closed_session() {
        let gk = gatekeeper(Arc::new(MemoryTokenStore::new()));
        let epoch = *gk.inner.epoch.borrow();
        assert!(matches!(
            gk.join_or_start_refresh(epoch),
            Err(AuthError::SessionClosed)
        ));
    }
}
