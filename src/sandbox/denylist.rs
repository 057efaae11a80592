//! Denylist of networking / external-resource patterns

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::core::UnsafeCategory;

const EMBEDDED_DENYLIST: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/denylist.toml"));

/// A compiled denylist rule
#[derive(Debug, Clone)]
pub struct DenyRule {
    pub category: UnsafeCategory,
    pub pattern: Regex,
}

/// Ordered set of rules; the first matching rule names the category
#[derive(Debug, Clone)]
pub struct Denylist {
    rules: Vec<DenyRule>,
}

/// Raw TOML configuration
#[derive(Debug, Deserialize)]
struct RawDenylist {
    #[serde(default)]
    rule: Vec<RawDenyRule>,
}

#[derive(Debug, Deserialize)]
struct RawDenyRule {
    category: UnsafeCategory,
    pattern: String,
}

impl Denylist {
    /// Parse a denylist from TOML content
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw: RawDenylist = toml::from_str(content).context("Invalid denylist TOML")?;

        let rules = raw
            .rule
            .into_iter()
            .map(|r| {
                let pattern = Regex::new(&r.pattern).with_context(|| {
                    format!("Invalid {} denylist pattern: {}", r.category, r.pattern)
                })?;
                Ok(DenyRule {
                    category: r.category,
                    pattern,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if rules.is_empty() {
            anyhow::bail!("Denylist has no rules");
        }

        Ok(Self { rules })
    }

    /// Load a denylist from a TOML file on disk
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read denylist {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// The rules shipped with the crate
    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_toml(EMBEDDED_DENYLIST)
    }

    /// First category whose pattern matches, if any
    pub fn find_match(&self, content: &str) -> Option<UnsafeCategory> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(content))
            .map(|rule| rule.category)
    }

    pub fn rules(&self) -> &[DenyRule] {
        &self.rules
    }
}

/// Global denylist
static DENYLIST: OnceLock<Denylist> = OnceLock::new();

/// Initialize the denylist, from `path` if given, otherwise the embedded rules
pub fn init_denylist(path: Option<&Path>) -> anyhow::Result<()> {
    let denylist = match path {
        Some(path) => Denylist::from_path(path)?,
        None => Denylist::embedded()?,
    };

    DENYLIST
        .set(denylist)
        .map_err(|_| anyhow::anyhow!("Denylist already initialized"))?;

    Ok(())
}

/// Get the active denylist
pub fn get_denylist() -> &'static Denylist {
    DENYLIST.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<Denylist> = OnceLock::new();

        DEFAULT.get_or_init(|| {
            warn!("Denylist not initialized, using embedded rules");
            match Denylist::embedded() {
                Ok(denylist) => denylist,
                // The embedded file is covered by tests; an empty list would admit everything.
                Err(e) => panic!("embedded denylist is invalid: {:#}", e),
            }
        })
    })
}
