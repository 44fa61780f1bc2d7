//! Single-flight access-token refresh.
//!
//! However many requests are rejected with 401 at the same time, only one
//! `POST /auth/refresh` is in flight. The first caller installs a shared
//! future in the pending slot; later callers clone it and wait on the same
//! outcome. Installing and attaching both happen under a synchronous lock,
//! so two callers can never both observe an empty slot.

use std::sync::{Arc, Mutex, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::auth::{SessionBridge, SessionEpoch};
use crate::models::{ApiResponse, AuthPayload};

use super::request::{ApiRequest, REFRESH_PATH};
use super::transport::HttpTransport;
use super::ApiError;

/// New access token, or the error every waiter is rejected with
pub type RefreshOutcome = Result<String, Arc<ApiError>>;

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type PendingSlot = Mutex<Option<PendingRefresh>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionBridge>,
    pending: Arc<PendingSlot>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn HttpTransport>, session: Arc<SessionBridge>) -> Self {
        Self {
            transport,
            session,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> RefreshState {
        let slot = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Wait for a refreshed access token, starting a refresh only if none is
    /// already in flight.
    pub async fn refreshed_token(&self) -> RefreshOutcome {
        let pending = {
            let mut slot = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Attaching to in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let pending = Self::run(
                        Arc::clone(&self.transport),
                        Arc::clone(&self.session),
                        self.session.epoch(),
                        Arc::downgrade(&self.pending),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    async fn run(
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionBridge>,
        started: SessionEpoch,
        slot: Weak<PendingSlot>,
    ) -> RefreshOutcome {
        info!("Refreshing access token");

        let outcome = match Self::request_refresh(transport.as_ref()).await {
            Ok(payload) if session.on_token_refreshed(started, &payload) => {
                Ok(payload.access_token)
            }
            Ok(_) => {
                info!("Session ended while refreshing, discarding new token");
                Err(Arc::new(ApiError::Unauthorized(
                    "Session ended during token refresh".to_string(),
                )))
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, logging out");
                session.on_refresh_failed(started);
                Err(Arc::new(e))
            }
        };

        // Settled: the next 401 starts a fresh refresh
        if let Some(slot) = slot.upgrade() {
            *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        }

        outcome
    }

    async fn request_refresh(transport: &dyn HttpTransport) -> Result<AuthPayload, ApiError> {
        let response = transport.execute(&ApiRequest::post(REFRESH_PATH)).await?;
        if !response.status.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }

        let envelope: ApiResponse<AuthPayload> = serde_json::from_str(&response.body)?;
        envelope
            .data
            .filter(|payload| !payload.access_token.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("Refresh response carried no access token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{auth_body, ScriptedTransport};
    use crate::auth::CredentialStore;
    use reqwest::StatusCode;

    fn coordinator(transport: Arc<ScriptedTransport>) -> (RefreshCoordinator, Arc<SessionBridge>) {
        let session = Arc::new(SessionBridge::new(Arc::new(CredentialStore::in_memory())));
        (RefreshCoordinator::new(transport, Arc::clone(&session)), session)
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_refresh() {
        let transport = ScriptedTransport::new();
        let gate = transport.gate_refresh();
        transport.on_refresh(StatusCode::OK, auth_body("fresh"));
        let (coordinator, session) = coordinator(Arc::clone(&transport));

        let release = {
            let transport = Arc::clone(&transport);
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                transport.wait_for_refresh_calls(1).await;
                assert_eq!(coordinator.state(), RefreshState::Refreshing);
                gate.notify_one();
            })
        };

        let outcomes =
            futures::future::join_all((0..5).map(|_| coordinator.refreshed_token())).await;
        release.await.expect("release task");

        for outcome in outcomes {
            assert_eq!(outcome.expect("refresh succeeds"), "fresh");
        }
        assert_eq!(transport.refresh_calls(), 1);
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(session.credentials().get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_failed_refresh_rejects_and_logs_out() {
        let transport = ScriptedTransport::new();
        transport.on_refresh(StatusCode::UNAUTHORIZED, r#"{"errorMessage":"Refresh token expired"}"#);
        let (coordinator, session) = coordinator(Arc::clone(&transport));
        session.credentials().set("stale");

        let err = coordinator.refreshed_token().await.expect_err("refresh fails");
        assert!(err.is_unauthorized());
        assert_eq!(session.credentials().get(), None);
        assert!(!session.is_authenticated());
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_slot_clears_between_refreshes() {
        let transport = ScriptedTransport::new();
        transport.on_refresh(StatusCode::OK, auth_body("first"));
        let (coordinator, _) = coordinator(Arc::clone(&transport));

        assert_eq!(coordinator.refreshed_token().await.as_deref().ok(), Some("first"));
        transport.on_refresh(StatusCode::OK, auth_body("second"));
        assert_eq!(coordinator.refreshed_token().await.as_deref().ok(), Some("second"));
        assert_eq!(transport.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_a_failure() {
        let transport = ScriptedTransport::new();
        transport.on_refresh(StatusCode::OK, r#"{"errorCode":0,"data":null}"#);
        let (coordinator, session) = coordinator(Arc::clone(&transport));
        session.credentials().set("stale");

        let err = coordinator.refreshed_token().await.expect_err("refresh fails");
        assert!(matches!(*err, ApiError::InvalidResponse(_)));
        assert_eq!(session.credentials().get(), None);
    }
}
