use serde::{Deserialize, Serialize};

use super::user::Gender;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub phone_number: String,
    pub address: String,
    /// ISO date (YYYY-MM-DD)
    pub dob: String,
    pub gender: Gender,
    pub password: String,
}

/// Identity of the logged-in user as reported by login, refresh and `/users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(rename = "avatarUrl", default)]
    pub avatar_url: Option<String>,
}

/// Result of a successful login or token refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "userSessionResponse")]
    pub identity: UserIdentity,
}
