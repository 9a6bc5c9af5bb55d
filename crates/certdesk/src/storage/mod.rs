//! Document file storage.
//!
//! Files live under a root resolved at write time (see [`StorageResolver`]).
//! Everything handed back to callers is a root-relative storage key so that
//! records stay valid if the root moves between persistent and temporary.

pub mod filesystem;
pub mod resolver;

use std::path::{Component, Path};

use chrono::{DateTime, Utc};

use crate::error::StorageError;

pub use filesystem::{FileStorage, StoredFile};
pub use resolver::{ResolvedRoot, StorageMode, StorageResolver};

/// Number of checksum characters embedded in a storage key.
const CHECKSUM_PREFIX_LEN: usize = 12;

/// Builds `<category>/<timestamp>-<checksum prefix>.<ext>`.
pub fn storage_key(
    category: &str,
    checksum: &str,
    content_type: &str,
    filename: &str,
    now: DateTime<Utc>,
) -> String {
    let prefix: String = checksum.chars().take(CHECKSUM_PREFIX_LEN).collect();
    format!(
        "{}/{}-{}.{}",
        category,
        now.format("%Y%m%dT%H%M%S%6f"),
        prefix,
        file_extension(content_type, filename)
    )
}

/// Picks a file extension from the content type, then the original filename.
fn file_extension(content_type: &str, filename: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/pdf" => return "pdf".to_string(),
        "image/jpeg" | "image/jpg" => return "jpg".to_string(),
        "image/png" => return "png".to_string(),
        _ => {}
    }

    let from_name = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());
    if let Some(ext) = from_name {
        return ext;
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|e| e.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Checks that a key stays inside the storage root.
pub fn validate_key(key: &str) -> Result<&Path, StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.trim().is_empty() {
        return Err(invalid("key is empty"));
    }
    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => return Err(invalid("parent directory references are not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("key must be relative to the storage root"))
            }
            Component::CurDir => return Err(invalid("'.' components are not allowed")),
        }
    }
    Ok(path)
}
