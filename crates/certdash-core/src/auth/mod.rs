//! Authentication module for managing the session and the access credential.
//!
//! This module provides:
//! - `CredentialStore`: persisted access token with fail-open-to-logged-out reads
//! - `Session`: the observable "who is logged in" state
//! - `SessionBridge`: the single writer that applies login, refresh, startup
//!   and logout outcomes to both of the above

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionBridge, SessionEpoch};
