//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Attachment URLs are often pre-signed, and requester details are personal
//! data; these functions keep both out of logs.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo and the query string from a URL.
///
/// - `https://user:pw@desk.example.com/a/1?token=x` → `https://****@desk.example.com/a/1`
/// - `https://desk.example.com/a/1` → unchanged
pub fn redact_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &without_query[..scheme_end + 3];
            return format!("{}****@{}", scheme, &after_scheme[at_pos + 1..]);
        }
    }

    without_query.to_string()
}

/// Masks the local part of an email address, keeping the first character.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/docs/medical_certificate/a.pdf")),
            "a.pdf"
        );
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_url_strips_credentials_and_query() {
        assert_eq!(
            redact_url("https://key:X@desk.example.com/att/1?sig=abc"),
            "https://****@desk.example.com/att/1"
        );
        assert_eq!(
            redact_url("https://desk.example.com/att/1"),
            "https://desk.example.com/att/1"
        );
        assert_eq!(
            redact_url("https://desk.example.com/att/user@example.com"),
            "https://desk.example.com/att/user@example.com"
        );
    }

    #[test]
    fn test_redact_email() {
        assert_eq!(redact_email("jane@example.com"), "j***@example.com");
        assert_eq!(redact_email("not-an-email"), "<redacted>");
    }
}
