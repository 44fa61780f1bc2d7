//! Data models for the certificate platform API.
//!
//! This module contains the wire types exchanged with the REST API:
//!
//! - `ApiResponse`, `PageResponse`: response envelope and page metadata
//! - `AuthPayload`, `UserIdentity`: login/refresh results and session identity
//! - `UserProfile`: editable account details
//! - `OrganizationSummary`, `Organization`: organization listings and detail
//! - `OrganizationMember`, `OrganizationInvite`: membership and invitations

pub mod auth;
pub mod common;
pub mod invite;
pub mod member;
pub mod organization;
pub mod user;

pub use auth::{AuthPayload, LoginRequest, RegisterRequest, UserIdentity};
pub use common::{ApiResponse, PageResponse};
pub use invite::{CreateInviteRequest, InviteStatus, OrganizationInvite};
pub use member::OrganizationMember;
pub use organization::{
    CreateOrganizationRequest, Organization, OrganizationRole, OrganizationSummary, ServicePlan,
};
pub use user::{Gender, UpdateProfileRequest, UserProfile};
