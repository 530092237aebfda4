//! Data models for the document service.
//!
//! - `TokenPair` and the auth request/response bodies
//! - `Document`, `Category`: classified documents as returned by the API
//! - `DocumentFilter`: category/name filtering and sort order for display

pub mod auth;
pub mod document;

pub use auth::{ErrorBody, LoginRequest, RefreshRequest, RefreshResponse, SignupRequest, TokenPair};
pub use document::{Category, Document, DocumentFilter, DocumentSortColumn, UpdateCategoryRequest};
