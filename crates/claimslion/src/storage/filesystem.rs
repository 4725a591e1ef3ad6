use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::storage::ContentStore;

/// Stores uploads as `<root>/<key>.<extension>`.
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), StorageError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| StorageError::CreateDirectory {
                path: self.root.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Resolves a reference to a path inside the root, rejecting anything
    /// that could escape it.
    fn resolve(&self, file_ref: &str) -> Result<PathBuf, StorageError> {
        let valid = !file_ref.is_empty()
            && file_ref != "."
            && !file_ref.contains("..")
            && !file_ref.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidReference(file_ref.to_string()));
        }
        Ok(self.root.join(file_ref))
    }
}

impl ContentStore for LocalContentStore {
    fn put(&self, key: &str, extension: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let file_ref = format!("{}.{}", key, extension.to_ascii_lowercase());
        let path = self.resolve(&file_ref)?;
        self.ensure_root()?;

        // create_new gives O_CREAT | O_EXCL: an existing blob is never replaced.
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => return Err(StorageError::WriteFile { path, source: e }),
        };

        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(StorageError::WriteFile { path, source: e });
        }

        log::debug!("Stored {} bytes as {}", bytes.len(), file_ref);
        Ok(file_ref)
    }

    fn get(&self, file_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_ref)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(file_ref.to_string())
            } else {
                StorageError::ReadFile { path, source: e }
            }
        })
    }

    fn delete(&self, file_ref: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_ref)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFile { path, source: e }),
        }
    }
}
