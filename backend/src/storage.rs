use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
}

/// Flat, append-only namespace of public files.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Fails if an object with the same name already exists.
    async fn put_object(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    async fn object_exists(&self, name: &str) -> Result<bool>;

    async fn list_objects(&self) -> Result<Vec<StoredObject>>;
}

pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(&['/', '\\'][..]) || name == "." || name == ".." {
            bail!("invalid object name {name:?}");
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ObjectStorage for LocalDiskStorage {
    async fn put_object(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.object_path(name)?;
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;

        if let Err(err) = write_all_and_sync(&mut file, &bytes).await {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(err).with_context(|| format!("failed to write {}", path.display()));
        }
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> Result<bool> {
        let path = self.object_path(name)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
        }
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.root.display()))
            }
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                objects.push(StoredObject {
                    name: name.to_string(),
                    size: meta.len(),
                });
            }
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}

async fn write_all_and_sync(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}
