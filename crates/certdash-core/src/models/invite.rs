use std::fmt;

use serde::{Deserialize, Serialize};

use super::organization::OrganizationRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

impl InviteStatus {
    /// Only pending invites can still be accepted, declined or cancelled
    pub fn is_actionable(&self) -> bool {
        matches!(self, InviteStatus::Pending)
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InviteStatus::Pending => "Pending",
            InviteStatus::Accepted => "Accepted",
            InviteStatus::Declined => "Declined",
            InviteStatus::Cancelled => "Cancelled",
            InviteStatus::Expired => "Expired",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationInvite {
    pub id: i64,
    pub invite_token: String,
    pub organization_id: i64,
    pub organization_name: String,
    #[serde(default)]
    pub organization_code: Option<String>,
    #[serde(default)]
    pub organization_logo_url: Option<String>,
    pub invitee_email: String,
    #[serde(default)]
    pub inviter_name: Option<String>,
    #[serde(default)]
    pub inviter_email: Option<String>,
    pub invited_role: OrganizationRole,
    pub status: InviteStatus,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    pub invitee_email: String,
    pub invited_role: OrganizationRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_message: Option<String>,
}
