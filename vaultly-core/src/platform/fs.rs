//! Directory-backed [`AtomicBlobStore`].
//!
//! Writes follow write-to-temp, `fsync`, rename, then `fsync` of the parent
//! directory, so readers always see either the old or the new content.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::AtomicBlobStore;
use crate::error::{VaultError, VaultResult};

fn io_error(context: impl std::fmt::Display, err: &std::io::Error) -> VaultError {
    VaultError::Cache(format!("{context}: {err}"))
}

/// Stores each blob as a file in one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    directory: PathBuf,
}

impl FsBlobStore {
    /// Creates a blob store rooted at `directory`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P) -> VaultResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            io_error(
                format!("failed to create blob directory '{}'", directory.display()),
                &e,
            )
        })?;
        Ok(Self { directory })
    }

    fn blob_path(&self, name: &str) -> VaultResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(VaultError::invalid_input("name", "must be a plain file name"));
        }
        Ok(self.directory.join(name))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!(".{name}.tmp"))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> VaultResult<()> {
        File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| io_error("failed to fsync blob directory", &e))
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn sync_directory(&self) -> VaultResult<()> {
        // Directories cannot be opened for sync here; rename is still atomic.
        Ok(())
    }
}

impl AtomicBlobStore for FsBlobStore {
    fn read(&self, name: String) -> VaultResult<Option<Vec<u8>>> {
        let path = self.blob_path(&name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(
                format!("failed to read blob '{}'", path.display()),
                &e,
            )),
        }
    }

    fn write_atomic(&self, name: String, bytes: Vec<u8>) -> VaultResult<()> {
        let final_path = self.blob_path(&name)?;
        let temp_path = self.temp_path(&name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                io_error(
                    format!("failed to create temporary file '{}'", temp_path.display()),
                    &e,
                )
            })?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                io_error(
                    format!("failed to write temporary file '{}'", temp_path.display()),
                    &e,
                )
            })?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            io_error(
                format!("failed to rename into '{}'", final_path.display()),
                &e,
            )
        })?;

        self.sync_directory()
    }

    fn delete(&self, name: String) -> VaultResult<()> {
        let path = self.blob_path(&name)?;
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(
                format!("failed to delete blob '{}'", path.display()),
                &e,
            )),
        }
    }
}
