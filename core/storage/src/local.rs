//! Local filesystem storage provider.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::provider::StorageProvider;
use keyward_common::{Error, Result, StorageKey};

/// Local filesystem storage provider.
///
/// Each key is stored as one file under the root directory. Writes go to a
/// uniquely named temporary file that is synced and then renamed over the
/// target, so a crash leaves either the old or the new value, never a
/// partial one.
///
/// On unix the root is owner-only (`0o700`) and every value file is created
/// `0o600`, since the session area holds the derived key.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    /// - On unix, the root is accessible to its owner only
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Sync for constructor
        if !root.exists() {
            create_private_dir(&root)?;
        }
        restrict_root(&root)?;

        Ok(Self { root })
    }

    /// Root directory of this provider.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_fs_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn tmp_path(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(format!("{}.tmp.{}", key.as_str(), Uuid::new_v4().simple()))
    }

    async fn write_tmp(tmp_path: &Path, value: &[u8]) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp_path).await?;
        file.write_all(value).await?;
        file.sync_all().await?;
        Ok(())
    }

    #[cfg(unix)]
    async fn sync_root(&self) -> Result<()> {
        let dir = fs::File::open(&self.root).await?;
        dir.sync_all().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync_root(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(unix)]
fn restrict_root(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();
    if mode & 0o077 != 0 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_root(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        let fs_path = self.to_fs_path(key);

        match fs::read(&fs_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &StorageKey, value: Vec<u8>) -> Result<()> {
        let fs_path = self.to_fs_path(key);
        let tmp_path = self.tmp_path(key);

        if let Err(e) = Self::write_tmp(&tmp_path, &value).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp_path, &fs_path).await {
            warn!(key = %key, "Atomic replace failed, discarding staged value");
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Storage(format!(
                "Failed to replace {}: {}",
                key, e
            )));
        }

        self.sync_root().await?;

        debug!(key = %key, size = value.len(), "Value stored");
        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool> {
        let fs_path = self.to_fs_path(key);

        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool> {
        Ok(fs::try_exists(self.to_fs_path(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(name: &str) -> StorageKey {
        StorageKey::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_local_put_get() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();
        let data = b"Hello, Local!".to_vec();

        provider.put(&key("vault_data"), data.clone()).await.unwrap();
        let loaded = provider.get(&key("vault_data")).await.unwrap();

        assert_eq!(loaded, Some(data));
    }

    #[tokio::test]
    async fn test_local_get_missing() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();

        assert_eq!(provider.get(&key("absent")).await.unwrap(), None);
        assert!(!provider.exists(&key("absent")).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_replace_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();

        provider.put(&key("k"), vec![1, 2, 3]).await.unwrap();
        provider.put(&key("k"), vec![4, 5]).await.unwrap();

        assert_eq!(provider.get(&key("k")).await.unwrap(), Some(vec![4, 5]));

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_local_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();

        provider.put(&key("session_data"), vec![9]).await.unwrap();
        assert!(provider.delete(&key("session_data")).await.unwrap());
        assert!(!provider.delete(&key("session_data")).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_creates_root() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        let provider = LocalProvider::new(&nested).unwrap();

        provider.put(&key("x"), vec![0]).await.unwrap();
        assert!(nested.join("x").exists());
        assert_eq!(provider.root(), nested.as_path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("session");
        let provider = LocalProvider::new(&root).unwrap();
        provider.put(&key("session_data"), vec![7]).await.unwrap();

        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode(&root) & 0o077, 0);
        assert_eq!(mode(&root.join("session_data")) & 0o077, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_tightens_existing_root() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("shared");
        std::fs::create_dir(&root).unwrap();
        std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755)).unwrap();

        LocalProvider::new(&root).unwrap();
        let mode = std::fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
