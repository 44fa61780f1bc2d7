//! Observable session state and the bridge that owns it.
//!
//! `SessionBridge` is the only writer of the `Session`; everything else reads
//! snapshots or subscribes to changes through a `watch` channel. Login, token
//! refresh, startup and logout outcomes all flow through here so the
//! credential store and the visible identity never disagree.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::{AuthPayload, UserIdentity};
use crate::utils::avatar_initials;

use super::CredentialStore;

/// Who is logged in. Either fully anonymous or authenticated with an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<UserIdentity>,
    authenticated: bool,
}

impl Session {
    fn authenticated(identity: UserIdentity) -> Self {
        Self {
            identity: Some(identity),
            authenticated: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.identity.as_ref().map(|i| i.id)
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.email.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.name.as_str())
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.identity.as_ref().and_then(|i| i.avatar_url.as_deref())
    }

    /// Initials shown when there is no avatar image
    pub fn initials(&self) -> String {
        avatar_initials(self.name())
    }
}

/// Marks one session lifetime. Every login and logout starts a new epoch, so
/// a token refresh that settles after the session it was started for has
/// ended can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEpoch(u64);

pub struct SessionBridge {
    credentials: Arc<CredentialStore>,
    session: watch::Sender<Session>,
    // Held across every credential + session transition
    epoch: Mutex<u64>,
}

impl SessionBridge {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            credentials,
            session,
            epoch: Mutex::new(0),
        }
    }

    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Epoch of the current session
    pub fn epoch(&self) -> SessionEpoch {
        SessionEpoch(*self.lock_epoch())
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Current session state
    pub fn snapshot(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Receive every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_authenticated()
    }

    /// Store the credential and authenticate with the returned identity
    pub fn on_login_success(&self, payload: &AuthPayload) {
        let mut epoch = self.lock_epoch();
        *epoch = epoch.wrapping_add(1);
        self.credentials.set(&payload.access_token);
        self.session
            .send_replace(Session::authenticated(payload.identity.clone()));
        info!(user_id = payload.identity.id, "Logged in");
    }

    /// Store the refreshed credential and update identity fields.
    /// The authenticated flag is left as it is.
    ///
    /// A refresh started in an earlier epoch is dropped and `false` returned:
    /// the user logged out (or in again) while it was in flight.
    pub fn on_token_refreshed(&self, started: SessionEpoch, payload: &AuthPayload) -> bool {
        let epoch = self.lock_epoch();
        if *epoch != started.0 {
            debug!("Dropping token refreshed for an ended session");
            return false;
        }
        self.credentials.set(&payload.access_token);
        self.session.send_if_modified(|session| {
            if !session.authenticated {
                return false;
            }
            let changed = session.identity.as_ref() != Some(&payload.identity);
            session.identity = Some(payload.identity.clone());
            changed
        });
        debug!(user_id = payload.identity.id, "Access token refreshed");
        true
    }

    /// Authenticate with an identity fetched from `/users/me`
    pub fn on_identity_fetched(&self, identity: UserIdentity) {
        self.session.send_if_modified(|session| {
            let next = Session::authenticated(identity);
            if *session == next {
                return false;
            }
            *session = next;
            true
        });
    }

    /// Clear the session and the stored credential
    pub fn on_logout(&self) {
        let mut epoch = self.lock_epoch();
        self.end_session(&mut epoch);
    }

    /// Log out after a failed refresh, unless that session already ended
    pub fn on_refresh_failed(&self, started: SessionEpoch) -> bool {
        let mut epoch = self.lock_epoch();
        if *epoch != started.0 {
            return false;
        }
        self.end_session(&mut epoch);
        true
    }

    fn end_session(&self, epoch: &mut u64) {
        *epoch = epoch.wrapping_add(1);
        self.credentials.clear();
        self.session.send_if_modified(|session| {
            if *session == Session::default() {
                return false;
            }
            *session = Session::default();
            true
        });
        info!("Session cleared");
    }

    /// Restore the session from a persisted credential.
    /// Returns whether the session ended up authenticated.
    pub async fn on_startup(&self, api: &ApiClient) -> bool {
        if !self.credentials.has_credential() {
            debug!("No persisted credential, starting anonymous");
            return false;
        }

        match api.fetch_me().await {
            Ok(identity) => {
                info!(user_id = identity.id, "Session restored");
                self.on_identity_fetched(identity);
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not restore session");
                self.on_logout();
                false
            }
        }
    }
}
