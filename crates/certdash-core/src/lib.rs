//! Core library for certdash.
//!
//! This crate provides:
//! - `api`: REST client with bearer authentication and single-flight token refresh
//! - `auth`: persisted credential storage and the observable session
//! - `models`: wire types for accounts, organizations, members and invites
//! - `pagination`: reusable paginated fetch controller
//! - `config`: configuration and state directory resolution

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod pagination;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, Session, SessionBridge};
pub use config::Config;
pub use pagination::{PageState, PaginationOptions, Paginator};
