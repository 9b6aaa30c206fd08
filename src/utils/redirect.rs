//! Post-login redirect validation
//!
//! Redirect targets arrive from a flash value recorded before login and must
//! never send the user off-site. Only same-site relative paths are accepted;
//! anything else falls back to the service root.

/// Validate a post-login redirect target, falling back to `/`
///
/// Accepted values are relative paths starting with a single `/`. Absolute
/// URLs, scheme-relative URLs (`//evil.example`) and backslash variants are
/// rejected.
#[must_use]
pub fn safe_redirect(target: &str) -> String {
    if is_safe_path(target) {
        target.to_string()
    } else {
        "/".to_string()
    }
}

fn is_safe_path(target: &str) -> bool {
    if !target.starts_with('/') {
        return false;
    }
    // "//host" and "/\host" are treated as protocol-relative by browsers
    if target.starts_with("//") || target.starts_with("/\\") {
        return false;
    }
    // A parseable absolute URL means a scheme sneaked in
    if target.contains(':') && url::Url::parse(target).is_ok() {
        return false;
    }
    true
}
