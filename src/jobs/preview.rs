use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::utils::sha256_hex;
use crate::core::{UnsafeCategory, ValidationError};
use crate::sandbox::{get_config, wrap_for_sandbox, FrameAttributes};
use crate::storage::DocumentStore;

/// Request to turn pasted game code into a sandboxed document
#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewJob {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub code: String,
    /// Also upload the wrapped document to storage
    #[serde(default)]
    pub publish: bool,
}

/// Why a preview was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewFailure {
    /// "too_large" | "unsafe_content" | "system_error"
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<UnsafeCategory>,
    pub message: String,
}

impl From<&ValidationError> for PreviewFailure {
    fn from(err: &ValidationError) -> Self {
        Self {
            kind: err.kind().to_string(),
            category: err.category(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResult {
    pub request_id: String,
    pub success: bool,
    /// Wrapped document, to be used as the iframe `srcdoc`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Storage key of the published document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
    /// `sandbox`/`allow` attributes for the iframe that loads `document`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PreviewFailure>,
}

impl PreviewResult {
    pub fn system_error(request_id: &str, message: String) -> Self {
        Self {
            request_id: request_id.to_string(),
            success: false,
            document: None,
            document_path: None,
            frame: None,
            error: Some(PreviewFailure {
                kind: "system_error".into(),
                category: None,
                message,
            }),
        }
    }
}

/// Storage key for a published document (content-addressed)
pub fn document_key(html: &str) -> String {
    format!("previews/{}.html", sha256_hex(html.as_bytes()))
}

pub async fn process_preview_job(
    job: &PreviewJob,
    documents: &dyn DocumentStore,
) -> Result<PreviewResult> {
    let document = match wrap_for_sandbox(&job.code) {
        Ok(document) => document,
        Err(e) => {
            return Ok(PreviewResult {
                request_id: job.request_id.clone(),
                success: false,
                document: None,
                document_path: None,
                frame: None,
                error: Some(PreviewFailure::from(&e)),
            });
        }
    };

    let document_path = if job.publish {
        let key = document_key(document.as_str());
        documents.put_document(&key, document.as_str()).await?;
        info!(
            "Published preview {} (game {:?}) to {}",
            job.request_id, job.game_id, key
        );
        Some(key)
    } else {
        None
    };

    Ok(PreviewResult {
        request_id: job.request_id.clone(),
        success: true,
        document: Some(document.into_string()),
        document_path,
        frame: Some(FrameAttributes::from_config(get_config())),
        error: None,
    })
}
