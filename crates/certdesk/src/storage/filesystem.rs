use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

use super::resolver::ResolvedRoot;

/// A file written by [`FileStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Root-relative key. Differs from the requested key when a file with
    /// that name already existed.
    pub key: String,
    pub path: PathBuf,
    pub bytes_written: u64,
}

pub struct FileStorage {
    root: ResolvedRoot,
}

impl FileStorage {
    pub fn new(root: ResolvedRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ResolvedRoot {
        &self.root
    }

    /// Writes `content` under `key`, creating intermediate directories.
    ///
    /// The on-disk size is checked against `content.len()` after the write.
    pub fn store(&self, key: &str, content: &[u8]) -> Result<StoredFile, StorageError> {
        let target = self.root.build_path(key)?;
        if let Some(parent) = target.parent() {
            ensure_directory(parent)?;
        }

        let (key, path) = self.create_exclusive(key, &target, content)?;

        let expected = content.len() as u64;
        let written = std::fs::metadata(&path)
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?
            .len();
        if written != expected {
            let _ = std::fs::remove_file(&path);
            return Err(StorageError::ShortWrite {
                path,
                written,
                expected,
            });
        }

        Ok(StoredFile {
            key,
            path,
            bytes_written: written,
        })
    }

    /// Removes a previously stored file. Missing files are not an error.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.root.build_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFile { path, source: e }),
        }
    }

    /// Creates the file with `create_new`, numbering the name on conflict.
    fn create_exclusive(
        &self,
        key: &str,
        target: &Path,
        content: &[u8],
    ) -> Result<(String, PathBuf), StorageError> {
        let (key_base, key_ext) = split_extension(key);

        for counter in 1..=1000 {
            let (try_key, try_path) = if counter == 1 {
                (key.to_string(), target.to_path_buf())
            } else {
                let numbered = match key_ext {
                    Some(ext) => format!("{}_{}{}", key_base, counter, ext),
                    None => format!("{}_{}", key_base, counter),
                };
                let path = self.root.build_path(&numbered)?;
                (numbered, path)
            };

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(file) => {
                    write_new(file, &try_path, content)?;
                    return Ok((try_key, try_path));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::FileExists(target.to_path_buf()))
    }
}

/// Writes into a file this call just created; on failure the partial file
/// is removed.
fn write_new<W: Write>(mut file: W, path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Err(e) = file.write_all(content).and_then(|_| file.flush()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Splits `dir/name.ext` into (`dir/name`, Some(`.ext`)), only looking at the
/// final path segment.
fn split_extension(key: &str) -> (&str, Option<&str>) {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let pos = name_start + dot;
            (&key[..pos], Some(&key[pos..]))
        }
        _ => (key, None),
    }
}
