//! Sandbox module - Game document wrapper
//!
//! This module turns pasted game code into a document that is safe to load
//! into a sandboxed iframe. It handles:
//! - Size budget and denylist checks
//! - Document normalization (`<html>`/`<head>` shell)
//! - CSP meta tag and bridge bootstrap injection
//!
//! The sandbox module does NOT:
//! - Enforce anything at runtime (the iframe sandbox attribute and CSP do)
//! - Persist code or revisions
//! - Talk to the running game (that's the bridge's job)

pub mod config;
pub mod csp;
pub mod denylist;
pub mod template;
pub mod wrapper;

// Re-exports for convenience
pub use config::{
    check_iframe_sandbox, get_config, init_config, FrameAttributes, SandboxConfig,
    DEFAULT_IFRAME_SANDBOX, IFRAME_ALLOW,
};
pub use csp::ContentSecurityPolicy;
pub use denylist::{get_denylist, init_denylist, Denylist};
pub use template::DocumentTemplate;
pub use wrapper::{wrap_for_sandbox, SandboxDocument, SandboxWrapper};
