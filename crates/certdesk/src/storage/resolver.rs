//! Storage root resolution with a temporary fallback.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StorageError;

/// Where documents are being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Persistent,
    Temporary,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Temporary => "temporary",
        }
    }
}

/// A resolved storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    pub path: PathBuf,
    pub mode: StorageMode,
}

impl ResolvedRoot {
    /// Joins a validated, root-relative key onto this root.
    pub fn build_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.path.join(super::validate_key(key)?))
    }
}

/// Resolves the document root on every call, so a persistent mount that
/// appears or disappears at runtime is picked up by the next write.
#[derive(Debug, Clone)]
pub struct StorageResolver {
    persistent_root: Option<PathBuf>,
    persistent_root_env: Option<String>,
    temporary_root: PathBuf,
}

impl StorageResolver {
    pub fn new(
        persistent_root: Option<PathBuf>,
        persistent_root_env: Option<String>,
        temporary_root: PathBuf,
    ) -> Self {
        Self {
            persistent_root,
            persistent_root_env,
            temporary_root,
        }
    }

    /// Always writes to the temporary root. Useful for tests and dry runs.
    pub fn temporary_only(temporary_root: impl AsRef<Path>) -> Self {
        Self::new(None, None, temporary_root.as_ref().to_path_buf())
    }

    /// Returns the persistent root if it is configured and is a directory,
    /// otherwise the temporary root. Never fails and never creates the
    /// persistent root.
    pub fn resolve_root(&self) -> ResolvedRoot {
        match self.persistent_candidate() {
            Some(candidate) => match std::fs::metadata(&candidate) {
                Ok(meta) if meta.is_dir() => {
                    debug!(root = %candidate.display(), "Using persistent storage root");
                    return ResolvedRoot {
                        path: candidate,
                        mode: StorageMode::Persistent,
                    };
                }
                Ok(_) => warn!(
                    root = %candidate.display(),
                    "Persistent storage root is not a directory; falling back to temporary storage"
                ),
                Err(e) => warn!(
                    root = %candidate.display(),
                    error = %e,
                    "Persistent storage root unavailable; falling back to temporary storage"
                ),
            },
            None => warn!("No persistent storage root configured; using temporary storage"),
        }

        ResolvedRoot {
            path: self.temporary_root.clone(),
            mode: StorageMode::Temporary,
        }
    }

    /// Resolves the root and joins `key` onto it.
    pub fn build_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        self.resolve_root().build_path(key)
    }

    fn persistent_candidate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.persistent_root {
            return Some(path.clone());
        }
        let var = self.persistent_root_env.as_deref()?;
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value.trim())),
            _ => None,
        }
    }
}
