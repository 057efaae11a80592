use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of construct a denylist rule looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeCategory {
    ExternalScript,
    ExternalStylesheet,
    Fetch,
    XmlHttpRequest,
    WebSocket,
    Beacon,
}

impl fmt::Display for UnsafeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnsafeCategory::ExternalScript => "external_script",
            UnsafeCategory::ExternalStylesheet => "external_stylesheet",
            UnsafeCategory::Fetch => "fetch",
            UnsafeCategory::XmlHttpRequest => "xml_http_request",
            UnsafeCategory::WebSocket => "web_socket",
            UnsafeCategory::Beacon => "beacon",
        };
        write!(f, "{}", s)
    }
}

impl UnsafeCategory {
    /// Short hint shown to the kid who pasted the code
    pub fn hint(&self) -> &'static str {
        match self {
            UnsafeCategory::ExternalScript => "Remove <script src=...> tags and paste the script inline.",
            UnsafeCategory::ExternalStylesheet => "Remove <link href=...> tags and put styles in a <style> tag.",
            UnsafeCategory::Fetch => "Games can't use fetch() to reach the internet.",
            UnsafeCategory::XmlHttpRequest => "Games can't use XMLHttpRequest to reach the internet.",
            UnsafeCategory::WebSocket => "Games can't open WebSocket connections.",
            UnsafeCategory::Beacon => "Games can't use navigator.sendBeacon.",
        }
    }
}

/// Reasons submitted game code is refused before it reaches an iframe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Code too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("This code appears to use external resources or networking ({category}). {}", .category.hint())]
    UnsafeContent { category: UnsafeCategory },
}

impl ValidationError {
    /// Stable machine-readable kind, used in job results
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::TooLarge { .. } => "too_large",
            ValidationError::UnsafeContent { .. } => "unsafe_content",
        }
    }

    pub fn category(&self) -> Option<UnsafeCategory> {
        match self {
            ValidationError::UnsafeContent { category } => Some(*category),
            ValidationError::TooLarge { .. } => None,
        }
    }
}
