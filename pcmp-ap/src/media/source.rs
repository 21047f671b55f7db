//! Source collaborator: open a track by name

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::io::MediaSource;
use tracing::debug;

/// A seekable byte stream the demuxer can consume
pub struct SourceDescriptor {
    /// Name the source was opened under
    pub name: String,
    pub stream: Box<dyn MediaSource>,
    /// File extension hint for container probing
    pub extension: Option<String>,
}

impl SourceDescriptor {
    /// Wrap an in-memory buffer (tests, embedded assets)
    pub fn from_bytes(name: &str, bytes: Vec<u8>, extension: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            stream: Box::new(std::io::Cursor::new(bytes)),
            extension: extension.map(str::to_string),
        }
    }
}

impl std::fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// Opens tracks by name
pub trait SourceProvider: Send + Sync {
    fn open(&self, name: &str) -> Result<SourceDescriptor>;
}

/// Opens files, resolving relative names against a media root folder
#[derive(Debug, Clone)]
pub struct FileSourceProvider {
    root: PathBuf,
}

impl FileSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl SourceProvider for FileSourceProvider {
    fn open(&self, name: &str) -> Result<SourceDescriptor> {
        let path = self.resolve(name);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        debug!("Opened source {}", path.display());

        Ok(SourceDescriptor {
            name: name.to_string(),
            stream: Box::new(file),
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string),
        })
    }
}
