//! API client for communicating with the certificate platform REST API.
//!
//! This module provides the `ApiClient` struct for authenticating, restoring
//! and ending sessions, and for the account, organization, membership and
//! invitation endpoints used by the dashboard screens.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, SessionBridge};
use crate::config::Config;
use crate::models::{
    ApiResponse, AuthPayload, CreateInviteRequest, CreateOrganizationRequest, LoginRequest,
    Organization, OrganizationInvite, OrganizationMember, OrganizationSummary, PageResponse,
    RegisterRequest, UpdateProfileRequest, UserIdentity, UserProfile,
};

use super::refresh::{RefreshCoordinator, RefreshState};
use super::request::{
    ApiRequest, FormPart, RequestAuthenticator, TrackedRequest, LOGIN_PATH, LOGOUT_PATH,
    REGISTER_PATH,
};
use super::transport::{HttpTransport, RawResponse, ReqwestTransport};
use super::ApiError;

/// Logo image attached to a new organization.
#[derive(Debug, Clone)]
pub struct LogoUpload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl LogoUpload {
    /// Guess the MIME type from the file extension
    pub fn from_file_name(file_name: &str, bytes: Vec<u8>) -> Self {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let mime = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "svg" => "image/svg+xml",
            _ => "application/octet-stream",
        };
        Self {
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        }
    }
}

/// API client for the certificate platform.
/// Clone is cheap - every clone shares the transport, credential store,
/// session and pending refresh.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    authenticator: RequestAuthenticator,
    refresh: RefreshCoordinator,
    session: Arc<SessionBridge>,
}

impl ApiClient {
    /// Create a client from configuration: reqwest transport against the
    /// resolved base URL, credential and cookies persisted in the state dir.
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.api_base_url();
        let state_dir = config.state_dir()?;
        let timeout = Duration::from_secs(config.request_timeout_secs());
        debug!(base_url = %base_url, state_dir = %state_dir.display(), "Creating API client");

        let transport = ReqwestTransport::new(&base_url, timeout, Some(&state_dir))?;
        let credentials = Arc::new(CredentialStore::open(&state_dir));
        let session = Arc::new(SessionBridge::new(credentials));

        Ok(Self::with_transport(Arc::new(transport), session))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, session: Arc<SessionBridge>) -> Self {
        let authenticator = RequestAuthenticator::new(Arc::clone(session.credentials()));
        let refresh = RefreshCoordinator::new(Arc::clone(&transport), Arc::clone(&session));
        Self {
            transport,
            authenticator,
            refresh,
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionBridge> {
        &self.session
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresh.state()
    }

    /// Send a request with the stored credential attached.
    ///
    /// A 401 on a request that may refresh waits for the shared token
    /// refresh and re-sends the request once with the new token. A second
    /// 401, or a 401 on login/refresh, is final. Every other non-success
    /// status is returned as the matching `ApiError`.
    pub async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let tracked = TrackedRequest::new(request);

        let response = self.attempt(tracked.request(), None).await?;
        if response.status != StatusCode::UNAUTHORIZED || !tracked.may_refresh() {
            return Self::check_response(response);
        }

        warn!(path = %tracked.request().path, "Access token rejected, waiting for refresh");
        let tracked = tracked.into_retry();
        let token = self
            .refresh
            .refreshed_token()
            .await
            .map_err(ApiError::SessionExpired)?;

        debug!(path = %tracked.request().path, "Retrying with refreshed token");
        let response = self.attempt(tracked.request(), Some(&token)).await?;
        Self::check_response(response)
    }

    async fn attempt(&self, request: &ApiRequest, token: Option<&str>) -> Result<RawResponse, ApiError> {
        let mut outgoing = request.clone();
        match token {
            Some(token) => self.authenticator.decorate_with(&mut outgoing, token),
            None => self.authenticator.decorate(&mut outgoing),
        }
        self.transport.execute(&outgoing).await
    }

    fn check_response(response: RawResponse) -> Result<RawResponse, ApiError> {
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    fn parse_envelope<T: DeserializeOwned>(response: &RawResponse) -> Result<ApiResponse<T>, ApiError> {
        if response.body.trim().is_empty() {
            return Ok(ApiResponse {
                error_message: None,
                error_code: None,
                data: None,
            });
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Send and decode the envelope's `data`, which must be present
    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        Self::parse_envelope::<T>(&response)?
            .data
            .ok_or_else(|| ApiError::InvalidResponse(format!("Response from {} carried no data", path)))
    }

    /// Send, ignoring any response payload
    async fn call_unit(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.send(request).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Log in and populate the session
    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let payload: AuthPayload = self.call(request).await?;
        self.session.on_login_success(&payload);
        Ok(payload.identity)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::post(REGISTER_PATH).json(request)?).await?;
        info!(email = %request.email, "Account registered");
        Ok(())
    }

    /// Best-effort server logout. The local session is cleared regardless.
    pub async fn logout(&self) {
        let request = ApiRequest::post(LOGOUT_PATH);
        match self.attempt(&request, None).await {
            Ok(response) if response.status.is_success() => debug!("Server session ended"),
            Ok(response) => warn!(status = response.status.as_u16(), "Server logout rejected"),
            Err(e) => warn!(error = %e, "Server logout failed"),
        }
        self.session.on_logout();
    }

    /// Identity of the current user
    pub async fn fetch_me(&self) -> Result<UserIdentity, ApiError> {
        self.call(ApiRequest::get("/users/me")).await
    }

    /// Re-fetch the identity and push it into the session
    pub async fn reload_identity(&self) -> Result<UserIdentity, ApiError> {
        let identity = self.fetch_me().await?;
        self.session.on_identity_fetched(identity.clone());
        Ok(identity)
    }

    // ===== Profile =====

    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.call(ApiRequest::get("/users/me/profile")).await
    }

    pub async fn update_profile(&self, request: &UpdateProfileRequest) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::put("/users/me/profile").json(request)?)
            .await
    }

    // ===== Organizations =====

    /// Organizations the current user belongs to (paged)
    pub async fn fetch_organizations(
        &self,
        page: u32,
        size: u32,
    ) -> Result<PageResponse<OrganizationSummary>, ApiError> {
        let request = ApiRequest::get("/organizations")
            .query("page", page)
            .query("size", size);
        self.call(request).await
    }

    /// All organizations of the current user, without paging
    pub async fn fetch_organizations_brief(&self) -> Result<Vec<OrganizationSummary>, ApiError> {
        self.call(ApiRequest::get("/organizations/brief")).await
    }

    pub async fn fetch_organization(&self, organization_id: i64) -> Result<Organization, ApiError> {
        self.call(ApiRequest::get(format!("/organizations/{}", organization_id)))
            .await
    }

    /// Create an organization. Sent as multipart: a `data` JSON part and a `logo` file part.
    pub async fn create_organization(
        &self,
        request: &CreateOrganizationRequest,
        logo: LogoUpload,
    ) -> Result<(), ApiError> {
        let parts = vec![
            FormPart::Json {
                name: "data".to_string(),
                value: serde_json::to_value(request)?,
            },
            FormPart::File {
                name: "logo".to_string(),
                file_name: logo.file_name,
                mime: logo.mime,
                bytes: logo.bytes,
            },
        ];
        self.call_unit(ApiRequest::post("/organizations").multipart(parts))
            .await?;
        info!(code = %request.code, "Organization created");
        Ok(())
    }

    // ===== Members =====

    pub async fn fetch_members(
        &self,
        organization_id: i64,
        page: u32,
        size: u32,
    ) -> Result<PageResponse<OrganizationMember>, ApiError> {
        let request = ApiRequest::get(format!("/organizations/{}/members", organization_id))
            .query("page", page)
            .query("size", size);
        self.call(request).await
    }

    pub async fn promote_to_moderator(&self, organization_id: i64, user_id: i64) -> Result<(), ApiError> {
        let path = format!(
            "/organizations/{}/members/{}/promote-moderator",
            organization_id, user_id
        );
        self.call_unit(ApiRequest::post(path)).await
    }

    pub async fn demote_to_member(&self, organization_id: i64, user_id: i64) -> Result<(), ApiError> {
        let path = format!(
            "/organizations/{}/members/{}/demote-member",
            organization_id, user_id
        );
        self.call_unit(ApiRequest::post(path)).await
    }

    /// Remove a member from the organization
    pub async fn kick_member(&self, organization_id: i64, user_id: i64) -> Result<(), ApiError> {
        let path = format!("/organizations/{}/members/{}", organization_id, user_id);
        self.call_unit(ApiRequest::delete(path)).await
    }

    // ===== Invitations =====

    pub async fn invite_user(
        &self,
        organization_id: i64,
        request: &CreateInviteRequest,
    ) -> Result<(), ApiError> {
        let path = format!("/organizations/{}/invites", organization_id);
        self.call_unit(ApiRequest::post(path).json(request)?).await
    }

    /// Invites sent by an organization (paged)
    pub async fn fetch_organization_invites(
        &self,
        organization_id: i64,
        page: u32,
        size: u32,
    ) -> Result<PageResponse<OrganizationInvite>, ApiError> {
        let request = ApiRequest::get(format!("/organizations/{}/invites", organization_id))
            .query("page", page)
            .query("size", size);
        self.call(request).await
    }

    /// Invites received by a user (paged)
    pub async fn fetch_user_invites(
        &self,
        user_id: i64,
        page: u32,
        size: u32,
    ) -> Result<PageResponse<OrganizationInvite>, ApiError> {
        let request = ApiRequest::get(format!("/users/{}/invites", user_id))
            .query("page", page)
            .query("size", size);
        self.call(request).await
    }

    pub async fn accept_invite(&self, token: &str) -> Result<(), ApiError> {
        self.invite_action(token, "accept").await
    }

    pub async fn decline_invite(&self, token: &str) -> Result<(), ApiError> {
        self.invite_action(token, "decline").await
    }

    pub async fn cancel_invite(&self, token: &str) -> Result<(), ApiError> {
        self.invite_action(token, "cancel").await
    }

    async fn invite_action(&self, token: &str, action: &str) -> Result<(), ApiError> {
        if token.is_empty() || token.contains('/') {
            return Err(ApiError::BadRequest(format!("Invalid invite token: {:?}", token)));
        }
        let path = format!("/organizations/invites/{}/{}", token, action);
        self.call_unit(ApiRequest::post(path)).await
    }
}
