//! File content provider over a local directory.

use aqua_prov::{CollaboratorError, FileContentProvider};
use async_trait::async_trait;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::io::ErrorKind;

/// Resolves `file_index` names relative to a root directory.
///
/// Names that would escape the root (absolute paths, `..`) are treated as absent.
#[derive(Debug, Clone)]
pub struct DirectoryFiles {
    root: Utf8PathBuf,
}

impl DirectoryFiles {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Option<Utf8PathBuf> {
        let relative = Utf8Path::new(name);
        let contained = relative
            .components()
            .all(|c| matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir));
        contained.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl FileContentProvider for DirectoryFiles {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, CollaboratorError> {
        let Some(full) = self.resolve(path) else {
            return Ok(None);
        };
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CollaboratorError::Unavailable(format!("{full}: {e}"))),
        }
    }
}
