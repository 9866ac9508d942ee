//! Single-file stores encoded as JSON or MessagePack.

use super::contents::StoreContents;
use super::engine::{StoreEngine, StoreKind, normalize_location};
use crate::core::{MigrationError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    MessagePack,
}

#[derive(Debug, Clone)]
pub struct FileStoreEngine {
    format: FileFormat,
}

impl FileStoreEngine {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    pub fn json() -> Self {
        Self::new(FileFormat::Json)
    }

    pub fn message_pack() -> Self {
        Self::new(FileFormat::MessagePack)
    }

    fn encode(&self, contents: &StoreContents) -> Result<Vec<u8>> {
        match self.format {
            FileFormat::Json => serde_json::to_vec_pretty(contents).map_err(|err| {
                MigrationError::Serialization(format!("Failed to encode JSON store: {err}"))
            }),
            FileFormat::MessagePack => rmp_serde::to_vec_named(contents).map_err(|err| {
                MigrationError::Serialization(format!("Failed to encode MessagePack store: {err}"))
            }),
        }
    }

    fn decode(&self, location: &Path, bytes: &[u8]) -> Result<StoreContents> {
        match self.format {
            FileFormat::Json => serde_json::from_slice(bytes).map_err(|err| {
                MigrationError::Serialization(format!(
                    "Failed to decode JSON store '{}': {}",
                    location.display(),
                    err
                ))
            }),
            FileFormat::MessagePack => rmp_serde::from_slice(bytes).map_err(|err| {
                MigrationError::Serialization(format!(
                    "Failed to decode MessagePack store '{}': {}",
                    location.display(),
                    err
                ))
            }),
        }
    }
}

#[async_trait]
impl StoreEngine for FileStoreEngine {
    fn kind(&self) -> StoreKind {
        match self.format {
            FileFormat::Json => StoreKind::JsonFile,
            FileFormat::MessagePack => StoreKind::MessagePackFile,
        }
    }

    async fn exists(&self, location: &Path) -> Result<bool> {
        fs::try_exists(location).await.map_err(|err| {
            MigrationError::Io(format!(
                "Failed to stat store '{}': {}",
                location.display(),
                err
            ))
        })
    }

    async fn load(&self, location: &Path) -> Result<StoreContents> {
        let bytes = fs::read(location).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MigrationError::Store(format!("store '{}' does not exist", location.display()))
            } else {
                MigrationError::Io(format!(
                    "Failed to read store '{}': {}",
                    location.display(),
                    err
                ))
            }
        })?;
        self.decode(location, &bytes)
    }

    async fn write(&self, location: &Path, contents: &StoreContents) -> Result<()> {
        let bytes = self.encode(contents)?;
        atomic_write(location, &bytes).await
    }

    async fn replace(&self, target: &Path, replacement: &Path) -> Result<()> {
        fs::rename(replacement, target).await.map_err(|err| {
            MigrationError::Io(format!(
                "Failed to move '{}' over '{}': {}",
                replacement.display(),
                target.display(),
                err
            ))
        })
    }

    /// The canonical path of the file, or of its directory when the file
    /// does not exist yet.
    async fn lock_key(&self, location: &Path) -> Result<PathBuf> {
        if let Ok(canonical) = fs::canonicalize(location).await {
            return Ok(canonical);
        }
        let absolute = if location.is_absolute() {
            location.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|err| {
                    MigrationError::Io(format!("Failed to resolve working directory: {err}"))
                })?
                .join(location)
        };
        let normalized = normalize_location(&absolute);
        match (normalized.parent(), normalized.file_name()) {
            (Some(parent), Some(name)) => match fs::canonicalize(parent).await {
                Ok(parent) => Ok(parent.join(name)),
                Err(_) => Ok(normalized),
            },
            _ => Ok(normalized),
        }
    }

    async fn destroy(&self, location: &Path) -> Result<()> {
        match fs::remove_file(location).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MigrationError::Io(format!(
                "Failed to remove store '{}': {}",
                location.display(),
                err
            ))),
        }
    }
}

/// Writes to a temp sibling, syncs it, then renames it over `path`.
async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(|err| {
            MigrationError::Io(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = temp_path(path);
    if let Err(err) = write_synced(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(MigrationError::Io(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        )));
    }
    Ok(())
}

async fn write_synced(tmp: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |err: std::io::Error| {
        MigrationError::Io(format!("Failed to write temp file '{}': {}", tmp.display(), err))
    };
    let mut file = fs::File::create(tmp).await.map_err(io_err)?;
    file.write_all(bytes).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoredObject;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn contents() -> StoreContents {
        StoreContents {
            format_version: 1,
            metadata: BTreeMap::from([("schema_fingerprint".to_string(), "abc".to_string())]),
            objects: vec![
                StoredObject::new("Book")
                    .with_id("b1")
                    .with_attribute("title", json!("Dune"))
                    .with_relationship("author", ["a1"]),
            ],
        }
    }

    #[tokio::test]
    async fn test_write_then_load_both_formats() {
        let dir = tempfile::tempdir().expect("temp dir");
        for (engine, name) in [
            (FileStoreEngine::json(), "store.json"),
            (FileStoreEngine::message_pack(), "store.msgpack"),
        ] {
            let path = dir.path().join(name);
            assert!(!engine.exists(&path).await.unwrap());
            engine.write(&path, &contents()).await.unwrap();
            assert!(engine.exists(&path).await.unwrap());
            assert_eq!(engine.load(&path).await.unwrap(), contents());
            assert!(!temp_path(&path).exists());
        }
    }

    #[tokio::test]
    async fn test_replace_and_destroy() {
        let dir = tempfile::tempdir().expect("temp dir");
        let engine = FileStoreEngine::json();
        let target = dir.path().join("store.json");
        let scratch = engine.scratch_location(&target);

        engine.write(&target, &StoreContents { objects: vec![], ..contents() }).await.unwrap();
        engine.write(&scratch, &contents()).await.unwrap();
        engine.replace(&target, &scratch).await.unwrap();

        assert!(!scratch.exists());
        assert_eq!(engine.load(&target).await.unwrap().objects.len(), 1);

        engine.destroy(&target).await.unwrap();
        engine.destroy(&target).await.unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_lock_key_is_shared_by_every_spelling() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let engine = FileStoreEngine::json();
        let plain = dir.path().join("store.json");
        let detour = dir.path().join("sub").join("..").join("store.json");

        // not written yet
        assert_eq!(
            engine.lock_key(&plain).await.unwrap(),
            engine.lock_key(&detour).await.unwrap()
        );

        engine.write(&plain, &contents()).await.unwrap();
        let key = engine.lock_key(&plain).await.unwrap();
        assert_eq!(engine.lock_key(&detour).await.unwrap(), key);
        assert!(key.is_absolute());
    }

    #[tokio::test]
    async fn test_load_reports_corrupt_and_missing_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let engine = FileStoreEngine::json();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            engine.load(&path).await,
            Err(MigrationError::Serialization(_))
        ));
        assert!(matches!(
            engine.load(&dir.path().join("missing.json")).await,
            Err(MigrationError::Store(_))
        ));
    }
}
