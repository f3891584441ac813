use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

/// Object storage for profile pictures and message attachments. Uploads
/// happen outside this service; we only release objects we stop referencing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn destroy(&self, public_id: &str) -> Result<()>;
}

/// Objects kept as flat files under a single directory.
pub struct LocalObjectStore {
    dir: PathBuf,
}

impl LocalObjectStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Resolve `public_id` inside the storage dir. Ids may contain folders
    /// but never climb out of the root.
    pub fn object_path(&self, public_id: &str) -> Result<PathBuf> {
        let rel = Path::new(public_id);
        if public_id.is_empty()
            || !rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object id: {}", public_id);
        }
        Ok(self.dir.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn destroy(&self, public_id: &str) -> Result<()> {
        let path = self.object_path(public_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Destroyed object {}", public_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
