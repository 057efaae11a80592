//! Sandbox wrapper - turns pasted game code into an embeddable document

use std::fmt;
use tracing::{debug, warn};

use super::config::{get_config, SandboxConfig};
use super::csp::ContentSecurityPolicy;
use super::denylist::{get_denylist, Denylist};
use super::template::DocumentTemplate;
use crate::bridge::bootstrap::bootstrap_script_tag;
use crate::core::ValidationError;

/// A complete HTML document ready to be used as an iframe `srcdoc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxDocument {
    html: String,
}

impl SandboxDocument {
    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn into_string(self) -> String {
        self.html
    }

    /// UTF-8 byte length
    pub fn len(&self) -> usize {
        self.html.len()
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }
}

impl fmt::Display for SandboxDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html)
    }
}

/// Validates and wraps user code
pub struct SandboxWrapper<'a> {
    max_bytes: usize,
    denylist: &'a Denylist,
    template: DocumentTemplate,
}

impl<'a> SandboxWrapper<'a> {
    pub fn new(config: &SandboxConfig, denylist: &'a Denylist) -> Self {
        Self {
            max_bytes: config.max_document_bytes,
            denylist,
            template: DocumentTemplate::new(
                ContentSecurityPolicy::default().meta_tag(),
                bootstrap_script_tag(),
            ),
        }
    }

    /// Reject oversized or network-using code, then wrap it
    pub fn wrap(&self, raw_html: &str) -> Result<SandboxDocument, ValidationError> {
        let size = raw_html.len();
        if size > self.max_bytes {
            warn!("Rejected game code: {} bytes exceeds {}", size, self.max_bytes);
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        if let Some(category) = self.denylist.find_match(raw_html) {
            warn!("Rejected game code: matched denylist category {}", category);
            return Err(ValidationError::UnsafeContent { category });
        }

        let html = self.template.render(raw_html);
        debug!("Wrapped game code: {} bytes -> {} bytes", size, html.len());

        Ok(SandboxDocument { html })
    }
}

/// Wrap code using the global sandbox configuration and denylist
pub fn wrap_for_sandbox(raw_html: &str) -> Result<SandboxDocument, ValidationError> {
    SandboxWrapper::new(get_config(), get_denylist()).wrap(raw_html)
}
