//! Core library for the Kazana document service client.
//!
//! - `auth`: session gatekeeper, token storage and expiry inspection
//! - `api`: typed calls to the document service
//! - `models`: wire and display models
//! - `cache`: offline copy of the document list
//! - `config`: persisted settings

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, SessionEvent, SessionGatekeeper, SessionState, TokenStore};
pub use cache::CacheManager;
pub use config::Config;
