//! Sandbox configuration
//!
//! Limits and iframe settings for game previews, loaded from environment or set dynamically.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Flags the hosting page puts on the game iframe by default.
/// No `allow-same-origin`, so user code stays isolated from the app origin.
pub const DEFAULT_IFRAME_SANDBOX: &str = "allow-scripts allow-pointer-lock";

/// `allow` attribute for the game iframe (fullscreen is not a sandbox flag)
pub const IFRAME_ALLOW: &str = "fullscreen";

/// Sandbox flags that must never be granted to game code
const FORBIDDEN_SANDBOX_FLAGS: &[&str] = &[
    "allow-same-origin",
    "allow-top-navigation",
    "allow-top-navigation-by-user-activation",
    "allow-forms",
    "allow-downloads",
    "allow-popups",
    "allow-popups-to-escape-sandbox",
];

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Max UTF-8 byte length of submitted code (default: 200_000)
    pub max_document_bytes: usize,
    /// How long a save-state request waits for the game (default: 1000ms)
    pub state_request_timeout_ms: u64,
    /// iframe `sandbox` attribute value
    pub iframe_sandbox: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 200_000,
            state_request_timeout_ms: 1_000,
            iframe_sandbox: DEFAULT_IFRAME_SANDBOX.to_string(),
        }
    }
}

impl SandboxConfig {
    /// Load configuration, falling back to defaults for unset or unparsable values
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_document_bytes: env_or("SANDBOX_MAX_BYTES", defaults.max_document_bytes),
            state_request_timeout_ms: env_or(
                "STATE_REQUEST_TIMEOUT_MS",
                defaults.state_request_timeout_ms,
            ),
            iframe_sandbox: std::env::var("IFRAME_SANDBOX").unwrap_or(defaults.iframe_sandbox),
        }
    }

    pub fn state_request_timeout(&self) -> Duration {
        Duration::from_millis(self.state_request_timeout_ms)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Check an iframe `sandbox` attribute value. Scripts must be allowed;
/// same-origin, navigation, forms, downloads and popups must not.
pub fn check_iframe_sandbox(flags: &str) -> anyhow::Result<()> {
    let tokens: Vec<&str> = flags.split_whitespace().collect();

    if !tokens.contains(&"allow-scripts") {
        anyhow::bail!("iframe sandbox must include allow-scripts: {:?}", flags);
    }
    if let Some(flag) = tokens
        .iter()
        .find(|t| FORBIDDEN_SANDBOX_FLAGS.contains(&t.to_ascii_lowercase().as_str()))
    {
        anyhow::bail!("iframe sandbox flag {} is not allowed for game code", flag);
    }

    Ok(())
}

/// Attributes the hosting page sets on the game iframe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAttributes {
    pub sandbox: String,
    pub allow: String,
}

impl FrameAttributes {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            sandbox: config.iframe_sandbox.clone(),
            allow: IFRAME_ALLOW.to_string(),
        }
    }
}

/// Global sandbox configuration
static SANDBOX_CONFIG: OnceLock<SandboxConfig> = OnceLock::new();

/// Initialize sandbox configuration
pub fn init_config(config: SandboxConfig) -> anyhow::Result<()> {
    check_iframe_sandbox(&config.iframe_sandbox)?;

    SANDBOX_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Sandbox configuration already initialized"))?;

    Ok(())
}

/// Get sandbox configuration
pub fn get_config() -> &'static SandboxConfig {
    SANDBOX_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<SandboxConfig> = OnceLock::new();

        warn!("Sandbox configuration not initialized, using default");
        DEFAULT.get_or_init(SandboxConfig::default)
    })
}
