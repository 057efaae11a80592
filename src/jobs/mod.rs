pub mod preview;

use crate::jobs::preview::PreviewJob;
use serde::{Deserialize, Serialize};

/// Worker job enum - represents different types of jobs the worker can process
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum WorkerJob {
    /// Validate and wrap pasted game code
    #[serde(rename = "preview")]
    Preview(PreviewJob),
}
