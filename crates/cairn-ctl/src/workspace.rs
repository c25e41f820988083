//! Peer workspace — the directory a peer keeps its files and chunks in.
//!
//! Layout, relative to the workspace root `<parent>/<localPort>`:
//!   `<fileName>`                 assembled or fetched files
//!   `raw/<fileName>/<index>`     chunk artifacts produced by `split`

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cairn_services::store::validate_name;
use cairn_services::{chunk_codec, ChunkError, ChunkSet};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    #[error("{0} already exists")]
    Exists(PathBuf),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PeerWorkspace {
    root: PathBuf,
    chunk_size: usize,
}

impl PeerWorkspace {
    /// Open (creating if needed) the workspace for the peer on `port`.
    pub fn open(parent: &Path, port: u16, chunk_size: usize) -> Result<Self, WorkspaceError> {
        let root = parent.join(port.to_string());
        fs::create_dir_all(&root).map_err(|source| WorkspaceError::Io {
            action: "failed to create workspace",
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, chunk_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        validate_name(name).map_err(|_| WorkspaceError::InvalidName(name.to_string()))?;
        Ok(self.root.join(name))
    }

    pub fn chunk_dir(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        validate_name(name).map_err(|_| WorkspaceError::InvalidName(name.to_string()))?;
        Ok(self.root.join("raw").join(name))
    }

    /// Split `<root>/<name>` into `<root>/raw/<name>/`.
    pub fn split(&self, name: &str) -> Result<ChunkSet, WorkspaceError> {
        let source = self.file_path(name)?;
        let chunk_dir = self.chunk_dir(name)?;
        Ok(chunk_codec::split(&source, &chunk_dir, self.chunk_size)?)
    }

    /// Rebuild `<root>/<name>` from `<root>/raw/<name>/`. Returns its length.
    pub fn build(&self, name: &str) -> Result<u64, WorkspaceError> {
        let chunk_dir = self.chunk_dir(name)?;
        let output = self.file_path(name)?;
        Ok(chunk_codec::build(&chunk_dir, &output)?)
    }

    /// Save a fetched file. Never overwrites.
    pub fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.file_path(name)?;
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Exists(path));
            }
            Err(source) => {
                return Err(WorkspaceError::Io {
                    action: "failed to create",
                    path,
                    source,
                })
            }
        };

        let written = file.write_all(data).and_then(|()| file.sync_all());
        if let Err(source) = written {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(WorkspaceError::Io {
                action: "failed to write",
                path,
                source,
            });
        }
        tracing::debug!(file = name, bytes = data.len(), "saved fetched file");
        Ok(path)
    }
}
