use serde::{Deserialize, Serialize};

/// Envelope every endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ApiResponse<T> {
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Error message, if the server supplied a non-blank one
    pub fn message(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct PageResponse<T> {
    #[serde(default)]
    pub content: Vec<T>,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
    #[serde(rename = "totalElements", default)]
    pub total_elements: u64,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

impl<T> PageResponse<T> {
    /// An empty page, used when a list has nothing to fetch yet
    pub fn empty(size: u32) -> Self {
        Self {
            content: Vec::new(),
            total_pages: 0,
            total_elements: 0,
            number: 0,
            size,
        }
    }

    pub fn is_last(&self) -> bool {
        self.number.saturating_add(1) >= self.total_pages
    }
}
