//! Session management for the document service.
//!
//! This module provides:
//! - `SessionGatekeeper`: attaches bearer tokens to outgoing requests and
//!   silently refreshes expired ones, one refresh at a time
//! - `TokenStore`: the two persisted credential slots, with memory, file
//!   and OS keychain backends
//! - `TokenClaims`: expiry inspection of access tokens
//!
//! When a refresh fails the stored credentials are cleared and a
//! `SessionEvent::LoginRequired` is broadcast to subscribers.

pub mod cipher;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod gatekeeper;
pub mod store;

pub use claims::TokenClaims;
pub use credentials::KeyringTokenStore;
pub use error::AuthError;
pub use gatekeeper::{SessionEvent, SessionGatekeeper, SessionState};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenSlot, TokenStore};
