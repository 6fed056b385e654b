use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::error::DomainError;

/// File-backed storage for generated report exports. Every stored blob gets
/// a uuid id; the public URL is served by the HTTP layer from the same id.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub async fn open(root: &Path) -> Result<Self, DomainError> {
        tokio::fs::create_dir_all(root).await.map_err(|error| {
            DomainError::Storage(format!("failed to create export directory: {error}"))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub async fn store_csv(&self, contents: &str) -> Result<String, DomainError> {
        let id = Uuid::new_v4().to_string();
        tokio::fs::write(self.path_for(&id), contents)
            .await
            .map_err(|error| DomainError::Storage(format!("failed to write export: {error}")))?;
        Ok(id)
    }

    pub async fn read_csv(&self, id: &str) -> Result<Option<String>, DomainError> {
        if !is_valid_export_id(id) {
            return Ok(None);
        }
        match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(DomainError::Storage(format!(
                "failed to read export: {error}"
            ))),
        }
    }

    #[must_use]
    pub fn url_for(&self, id: &str) -> String {
        format!("/exports/{id}")
    }

    #[must_use]
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.csv"))
    }
}

/// Export ids are uuids; anything else (path separators in particular) is
/// rejected before it reaches the filesystem.
fn is_valid_export_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|value| value.is_ascii_alphanumeric() || value == '-')
}
