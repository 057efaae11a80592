//! Vibe Code Labs game sandbox: wraps pasted HTML/JS games into a
//! CSP-locked document and bridges messages between the host page and the
//! game iframe.

pub mod bridge;
pub mod core;
pub mod jobs;
pub mod redis_manager;
pub mod sandbox;
pub mod storage;

pub use crate::core::{UnsafeCategory, ValidationError};
pub use crate::sandbox::{wrap_for_sandbox, SandboxDocument};
