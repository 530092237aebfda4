//! REST API client module for the Kazana document service.
//!
//! This module provides the `ApiClient` for logging in, listing, uploading,
//! recategorizing and deleting documents.
//!
//! Protected calls are authorized by the session gatekeeper, which attaches
//! a JWT bearer token and refreshes it when it has expired.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
