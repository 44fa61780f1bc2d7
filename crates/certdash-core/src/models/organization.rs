use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a user inside an organization.
/// Unknown roles from the server are kept verbatim instead of failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrganizationRole {
    Owner,
    Moderator,
    Member,
    Other(String),
}

impl OrganizationRole {
    pub fn as_str(&self) -> &str {
        match self {
            OrganizationRole::Owner => "OWNER",
            OrganizationRole::Moderator => "MODERATOR",
            OrganizationRole::Member => "MEMBER",
            OrganizationRole::Other(s) => s.as_str(),
        }
    }

    /// Whether this role may invite users and manage pending invites
    pub fn can_manage_invites(&self) -> bool {
        matches!(self, OrganizationRole::Owner | OrganizationRole::Moderator)
    }

    /// Whether this role may promote, demote or remove members
    pub fn can_manage_members(&self) -> bool {
        matches!(self, OrganizationRole::Owner)
    }
}

impl From<String> for OrganizationRole {
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "OWNER" => OrganizationRole::Owner,
            "MODERATOR" => OrganizationRole::Moderator,
            "MEMBER" => OrganizationRole::Member,
            _ => OrganizationRole::Other(s),
        }
    }
}

impl From<OrganizationRole> for String {
    fn from(role: OrganizationRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for OrganizationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServicePlan {
    Free,
    Pro,
    Enterprise,
}

/// Organization as listed for the current user, including their role in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSummary {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(rename = "logoUrl", default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub role: OrganizationRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,

    // Legal information
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub tax_code: Option<String>,
    #[serde(default)]
    pub legal_address: Option<String>,
    #[serde(default)]
    pub representative_name: Option<String>,

    // Contact information
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,

    #[serde(default)]
    pub service_plan: Option<ServicePlan>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub legal_name: String,
    pub tax_code: String,
    pub legal_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_name: Option<String>,

    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_organization_summary() {
        let json = r#"{"id":7,"name":"Acme Certs","code":"ACME","domain":null,"logoUrl":"https://cdn.example.com/acme.png","description":"","role":"MODERATOR"}"#;
        let org: OrganizationSummary =
            serde_json::from_str(json).expect("Failed to parse organization summary");
        assert_eq!(org.id, 7);
        assert_eq!(org.role, OrganizationRole::Moderator);
        assert!(org.role.can_manage_invites());
        assert!(!org.role.can_manage_members());
    }

    #[test]
    fn test_unknown_role_is_preserved() {
        let role: OrganizationRole =
            serde_json::from_str(r#""AUDITOR""#).expect("Failed to parse role");
        assert_eq!(role, OrganizationRole::Other("AUDITOR".to_string()));
        assert_eq!(serde_json::to_string(&role).expect("serialize role"), r#""AUDITOR""#);
    }

    #[test]
    fn test_create_request_skips_empty_optionals() {
        let req = CreateOrganizationRequest {
            name: "Acme".to_string(),
            code: "ACME".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).expect("serialize create request");
        assert!(value.get("domain").is_none());
        assert_eq!(value["legalName"], "");
    }
}
