//! Tracker file store — master copies served by `fetchfile`.
//!
//! Files live flat under the store root: `{root}/{file_name}`. Names are
//! single path components; anything that could escape the root is refused.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::Mmap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Directory of files the tracker can hand out.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err("failed to create store root", &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file name to its path inside the store.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Read a whole file. Returns `None` if it is not in the store.
    ///
    /// The file is memory-mapped and copied once into the returned `Bytes`.
    pub fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Ok(None);
        }

        let file = fs::File::open(&path).map_err(io_err("failed to open", &path))?;
        let len = file
            .metadata()
            .map_err(io_err("failed to stat", &path))?
            .len();
        if len == 0 {
            return Ok(Some(Bytes::new()));
        }

        // Safety: file is opened read-only and we don't mutate the mmap
        let mmap = unsafe { Mmap::map(&file).map_err(io_err("failed to mmap", &path))? };
        Ok(Some(Bytes::copy_from_slice(&mmap)))
    }

    /// Store a file.
    ///
    /// Writes are atomic: write to temp file, then rename.
    pub fn put(&self, name: &str, data: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name)?;
        let tmp_path = self.root.join(format!(".{name}.tmp"));
        {
            let mut file =
                fs::File::create(&tmp_path).map_err(io_err("failed to create", &tmp_path))?;
            file.write_all(data)
                .map_err(io_err("failed to write", &tmp_path))?;
            file.sync_all().map_err(io_err("failed to sync", &tmp_path))?;
        }
        fs::rename(&tmp_path, &path).map_err(io_err("failed to rename", &tmp_path))?;

        tracing::debug!(file = name, bytes = data.len(), "stored file");
        Ok(path)
    }

    /// Count files in the store (for startup logging).
    pub fn count(&self) -> usize {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }
}

/// A stored name must be one plain path component.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
