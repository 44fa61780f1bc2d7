use serde::{Deserialize, Serialize};

use super::organization::OrganizationRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMember {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub name: String,
    pub email: String,
    #[serde(rename = "avatarUrl", default)]
    pub avatar_url: Option<String>,
    pub role: OrganizationRole,
}
