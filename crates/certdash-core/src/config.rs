//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, request timeout, last used email and
//! the organization currently selected for organization-scoped commands.
//!
//! Configuration is stored at `~/.config/certdash/config.json`; session state
//! (credential and refresh cookie) lives under the platform data directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{OrganizationRole, OrganizationSummary};

/// Application name used for config/state directory paths
const APP_NAME: &str = "certdash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "CERTDASH_API_URL";

/// Base URL used when neither the environment nor the config file sets one
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Organization remembered between runs for organization-scoped commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOrganization {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub role: OrganizationRole,
}

impl From<&OrganizationSummary> for SelectedOrganization {
    fn from(org: &OrganizationSummary) -> Self {
        Self {
            id: org.id,
            name: org.name.clone(),
            code: org.code.clone(),
            role: org.role.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub last_email: Option<String>,
    pub selected_organization: Option<SelectedOrganization>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted credential and cookie jar
    pub fn state_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::cache_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Resolve the API base URL: environment, then config file, then default.
    /// Trailing slashes are stripped so paths can be appended directly.
    pub fn api_base_url(&self) -> String {
        let env_url = std::env::var(API_URL_ENV).ok();
        Self::resolve_base_url(env_url.as_deref(), self.api_base_url.as_deref())
    }

    fn resolve_base_url(env_url: Option<&str>, config_url: Option<&str>) -> String {
        let url = env_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or_else(|| config_url.map(str::trim).filter(|u| !u.is_empty()))
            .unwrap_or(DEFAULT_API_URL);
        url.trim_end_matches('/').to_string()
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base_url_precedence() {
        assert_eq!(
            Config::resolve_base_url(Some("https://api.example.com/"), Some("http://other")),
            "https://api.example.com"
        );
        assert_eq!(
            Config::resolve_base_url(Some("  "), Some("http://other:9000")),
            "http://other:9000"
        );
        assert_eq!(Config::resolve_base_url(None, None), DEFAULT_API_URL);
    }

    #[test]
    fn test_request_timeout_default() {
        let mut config = Config::default();
        assert_eq!(config.request_timeout_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
        config.request_timeout_secs = Some(0);
        assert_eq!(config.request_timeout_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
        config.request_timeout_secs = Some(5);
        assert_eq!(config.request_timeout_secs(), 5);
    }

    #[test]
    fn test_config_round_trips_selected_organization() {
        let config = Config {
            selected_organization: Some(SelectedOrganization {
                id: 7,
                name: "Acme".to_string(),
                code: "ACME".to_string(),
                role: OrganizationRole::Owner,
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).expect("serialize config");
        let parsed: Config = serde_json::from_str(&json).expect("parse config");
        assert_eq!(parsed.selected_organization, config.selected_organization);
    }
}
