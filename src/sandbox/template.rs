//! Document template
//!
//! Composes the final sandboxed document from user markup, the CSP meta tag
//! and the bridge bootstrap script. Injected elements always land at the
//! start of `<head>`: CSP first, bootstrap second, then whatever the user
//! put in their head.

use regex::Regex;
use std::sync::OnceLock;

/// Shell used when the input has no `<html>` element
const SHELL_PREFIX: &str = "<!doctype html><html><head></head><body>";
const SHELL_SUFFIX: &str = "</body></html>";

struct Patterns {
    script_block: Regex,
    html_tag: Regex,
    head_tag: Regex,
    html_open: Regex,
    head_open: Regex,
    csp_meta: Regex,
    bootstrap: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        script_block: compile(r"(?is)<script\b[^>]*>.*?</script\s*>"),
        html_tag: compile(r"(?i)<html[\s>]"),
        head_tag: compile(r"(?i)<head[\s>]"),
        html_open: compile(r"(?i)<html(?:\s[^>]*)?>"),
        head_open: compile(r"(?i)<head(?:\s[^>]*)?>"),
        csp_meta: compile(
            r#"(?i)<meta\s+http-equiv\s*=\s*["']?content-security-policy["']?[^>]*>"#,
        ),
        bootstrap: compile(r#"(?s)<script id="vibelab-bridge">.*?</script>"#),
    })
}

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => unreachable!("static template pattern {} is invalid: {}", pattern, e),
    }
}

/// Elements injected into every document
#[derive(Debug, Clone)]
pub struct DocumentTemplate {
    pub csp_meta: String,
    pub bootstrap_script: String,
}

impl DocumentTemplate {
    pub fn new(csp_meta: impl Into<String>, bootstrap_script: impl Into<String>) -> Self {
        Self {
            csp_meta: csp_meta.into(),
            bootstrap_script: bootstrap_script.into(),
        }
    }

    /// Render a complete document from arbitrary user markup
    pub fn render(&self, user_html: &str) -> String {
        let html = normalize_document(user_html);
        let html = strip_injections(&html);
        self.inject_into_head(&html)
    }

    fn inject_into_head(&self, html: &str) -> String {
        let injected = format!("{}{}", self.csp_meta, self.bootstrap_script);
        match find_markup(&patterns().head_open, html) {
            Some(end) => {
                let mut out = String::with_capacity(html.len() + injected.len());
                out.push_str(&html[..end]);
                out.push_str(&injected);
                out.push_str(&html[end..]);
                out
            }
            // normalize_document guarantees a head; keep the injection anyway
            None => format!("{}{}", injected, html),
        }
    }
}

/// End offset of the first match of `re` that is markup, not text inside a
/// `<script>` block
fn find_markup(re: &Regex, html: &str) -> Option<usize> {
    let scripts: Vec<(usize, usize)> = patterns()
        .script_block
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();

    re.find_iter(html)
        .find(|m| {
            !scripts
                .iter()
                .any(|&(start, end)| m.start() > start && m.start() < end)
        })
        .map(|m| m.end())
}

/// Ensure the markup has `<html>` and `<head>` elements. Input without a
/// root element always goes into the full shell.
pub fn normalize_document(user_html: &str) -> String {
    let p = patterns();
    let html = user_html.trim();

    if find_markup(&p.html_tag, html).is_none() {
        return format!("{}{}{}", SHELL_PREFIX, html, SHELL_SUFFIX);
    }
    if find_markup(&p.head_tag, html).is_some() {
        return html.to_string();
    }

    match find_markup(&p.html_open, html) {
        Some(end) => format!("{}<head></head>{}", &html[..end], &html[end..]),
        None => html.to_string(),
    }
}

/// Remove a previously injected CSP meta tag and bootstrap script
fn strip_injections(html: &str) -> String {
    let p = patterns();
    let html = p.csp_meta.replace_all(html, "");
    p.bootstrap.replace_all(&html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> DocumentTemplate {
        DocumentTemplate::new("<meta CSP>", "<script>BOOT</script>")
    }

    #[test]
    fn test_fragment_gets_shell() {
        let out = template().render("  <canvas></canvas>\n");
        assert_eq!(
            out,
            "<!doctype html><html><head><meta CSP><script>BOOT</script></head>\
             <body><canvas></canvas></body></html>"
        );
    }

    #[test]
    fn test_missing_head_is_inserted_after_html_open() {
        let out = template().render(r#"<html lang="en"><body>x</body></html>"#);
        assert_eq!(
            out,
            r#"<html lang="en"><head><meta CSP><script>BOOT</script></head><body>x</body></html>"#
        );
    }

    #[test]
    fn test_injected_as_first_children_of_existing_head() {
        let out = template().render(
            "<!DOCTYPE html><HTML><HEAD class=\"a\"><title>t</title></HEAD><body></body></HTML>",
        );
        assert_eq!(
            out,
            "<!DOCTYPE html><HTML><HEAD class=\"a\"><meta CSP><script>BOOT</script>\
             <title>t</title></HEAD><body></body></HTML>"
        );
    }

    #[test]
    fn test_fragment_with_head_text_in_script_gets_shell() {
        let out = template().render("<canvas></canvas><script>var tag = '<head>';</script>");
        assert_eq!(
            out,
            "<!doctype html><html><head><meta CSP><script>BOOT</script></head>\
             <body><canvas></canvas><script>var tag = '<head>';</script></body></html>"
        );
    }

    #[test]
    fn test_fragment_with_head_but_no_html_gets_shell() {
        let out = normalize_document("<head><title>t</title></head><p>x</p>");
        assert!(out.starts_with(SHELL_PREFIX));
        assert!(out.ends_with(SHELL_SUFFIX));
    }

    #[test]
    fn test_head_text_in_document_script_is_not_a_head() {
        let out = template()
            .render(r#"<html><body><script>document.title = "<head>" + "<html>";</script></body></html>"#);
        assert_eq!(
            out,
            r#"<html><head><meta CSP><script>BOOT</script></head><body><script>document.title = "<head>" + "<html>";</script></body></html>"#
        );
    }

    #[test]
    fn test_html_text_in_fragment_script_is_not_a_root() {
        let out = normalize_document("<script>let s = '<html>';</script>");
        assert!(out.starts_with(SHELL_PREFIX));
    }

    #[test]
    fn test_header_element_is_not_a_head() {
        let out = normalize_document("<html><body><header>hi</header></body></html>");
        assert_eq!(out, "<html><head></head><body><header>hi</header></body></html>");
    }

    #[test]
    fn test_existing_csp_meta_is_replaced() {
        let tpl = DocumentTemplate::new(
            r#"<meta http-equiv="Content-Security-Policy" content="default-src 'none';">"#,
            "",
        );
        let out = tpl.render(
            r#"<html><head><meta http-equiv='content-security-policy' content="default-src *"></head></html>"#,
        );
        assert_eq!(out.to_ascii_lowercase().matches("content-security-policy").count(), 1);
        assert!(!out.contains("default-src *"));
    }
}
