//! REST API client module for the certificate platform.
//!
//! This module provides the `ApiClient` for communicating with the
//! platform's REST API: authentication, profile, organizations, members and
//! invitations.
//!
//! Authenticated calls carry the stored access token as a bearer token. A 401
//! triggers one shared refresh through `RefreshCoordinator`, after which the
//! original request is re-sent exactly once.

pub mod client;
pub mod error;
pub mod refresh;
pub mod request;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, LogoUpload};
pub use error::ApiError;
pub use refresh::{RefreshCoordinator, RefreshState};
pub use request::{ApiRequest, RequestAuthenticator, RetryState, TrackedRequest};
pub use transport::{HttpTransport, RawResponse, ReqwestTransport};
