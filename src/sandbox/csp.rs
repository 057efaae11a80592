//! Content-Security-Policy injected into every sandboxed document

use std::fmt;

/// Value of the `http-equiv` attribute on the injected meta tag
pub const CSP_HTTP_EQUIV: &str = "Content-Security-Policy";

/// An ordered list of CSP directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: Vec<(&'static str, &'static str)>,
}

impl Default for ContentSecurityPolicy {
    /// Deny everything except inline script/style and `data:` images.
    fn default() -> Self {
        Self {
            directives: vec![
                ("default-src", "'none'"),
                ("connect-src", "'none'"),
                ("img-src", "data:"),
                ("media-src", "'none'"),
                ("font-src", "'none'"),
                ("frame-src", "'none'"),
                ("worker-src", "'none'"),
                ("style-src", "'unsafe-inline'"),
                ("script-src", "'unsafe-inline'"),
            ],
        }
    }
}

impl ContentSecurityPolicy {
    /// Source list for a directive, if present
    pub fn directive(&self, name: &str) -> Option<&'static str> {
        self.directives
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// The `<meta http-equiv=...>` tag carrying this policy
    pub fn meta_tag(&self) -> String {
        format!(
            r#"<meta http-equiv="{}" content="{}">"#,
            CSP_HTTP_EQUIV, self
        )
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.directives {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{} {};", name, value)?;
            first = false;
        }
        Ok(())
    }
}
