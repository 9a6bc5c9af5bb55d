//! Secret resolution for the desk API key and the webhook signing secret.
//!
//! A secret can be configured three ways, checked in this order:
//!
//! 1. **Direct value** (`api_key: "..."`), handy for local runs
//! 2. **File** (`api_key_file: /run/secrets/desk_api_key`), the container secrets pattern
//! 3. **Environment variable** (`api_key_env: CERTDESK_DESK_API_KEY`)

use secrecy::SecretString;
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first configured source. Empty strings count
/// as "not configured". File and environment values are trimmed.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = non_empty(direct) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = non_empty(file_path) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|source| SecretError::FileReadError {
            path: expanded.clone(),
            source,
        })?;
        return checked(content.trim(), || format!("file '{}'", expanded));
    }

    if let Some(name) = non_empty(env_var) {
        return match std::env::var(name) {
            Ok(value) => checked(value.trim(), || format!("env var '{}'", name)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but `Ok(None)` when nothing is configured.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    [direct, file_path, env_var]
        .into_iter()
        .any(|s| non_empty(s).is_some())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn checked(value: &str, origin: impl FnOnce() -> String) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty { origin: origin() });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands a leading `~` (not `~user`) to the home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_VAR: &str = "CERTDESK_TEST_SECRET";

    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var(TEST_VAR, "from-env");
        let secret = resolve_secret(Some("direct"), None, Some(TEST_VAR)).unwrap();
        assert_eq!(secret.expose_secret(), "direct");
        std::env::remove_var(TEST_VAR);
    }

    #[test]
    #[serial]
    fn test_file_before_env_and_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  desk-key  ").unwrap();
        std::env::set_var(TEST_VAR, "from-env");

        let secret =
            resolve_secret(None, Some(file.path().to_str().unwrap()), Some(TEST_VAR)).unwrap();
        assert_eq!(secret.expose_secret(), "desk-key");
        std::env::remove_var(TEST_VAR);
    }

    #[test]
    #[serial]
    fn test_env_fallback_and_empty_strings_skipped() {
        std::env::set_var(TEST_VAR, "from-env\n");
        let secret = resolve_secret(Some(""), Some(""), Some(TEST_VAR)).unwrap();
        assert_eq!(secret.expose_secret(), "from-env");
        std::env::remove_var(TEST_VAR);
    }

    #[test]
    #[serial]
    fn test_missing_and_empty_env_var() {
        std::env::remove_var(TEST_VAR);
        assert!(matches!(
            resolve_secret(None, None, Some(TEST_VAR)),
            Err(SecretError::EnvVarNotSet { .. })
        ));

        std::env::set_var(TEST_VAR, "   ");
        assert!(matches!(
            resolve_secret(None, None, Some(TEST_VAR)),
            Err(SecretError::Empty { .. })
        ));
        std::env::remove_var(TEST_VAR);
    }

    #[test]
    fn test_no_source_and_missing_file() {
        assert!(matches!(
            resolve_secret(None, None, None),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(matches!(
            resolve_secret(None, Some("/nonexistent/certdesk/secret"), None),
            Err(SecretError::FileReadError { .. })
        ));
    }

    #[test]
    fn test_optional_resolution() {
        assert!(resolve_secret_optional(None, None, None).unwrap().is_none());
        assert!(resolve_secret_optional(Some("x"), None, None).unwrap().is_some());
        assert!(resolve_secret_optional(None, Some("/nonexistent/certdesk/secret"), None).is_err());
    }

    #[test]
    fn test_has_secret_source() {
        assert!(!has_secret_source(None, Some(""), None));
        assert!(has_secret_source(None, None, Some("VAR")));
    }
}
