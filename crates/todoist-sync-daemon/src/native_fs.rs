//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use todoist_sync::fs::{FileEntry, FileSystem, FsError, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Vault on the local disk, rooted at `base_path`.
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    async fn ensure_parent(&self, full_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(e, parent.display()))?;
        }
        Ok(())
    }
}

fn io_error(e: std::io::Error, path: impl std::fmt::Display) -> FsError {
    let path = path.to_string();
    match e.kind() {
        ErrorKind::NotFound => FsError::NotFound(path),
        ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
        ErrorKind::DirectoryNotEmpty => FsError::NotEmpty(path),
        ErrorKind::IsADirectory => FsError::IsDirectory(path),
        ErrorKind::NotADirectory => FsError::NotDirectory(path),
        _ => FsError::Io(format!("{}: {}", path, e)),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        fs::read(&full_path).await.map_err(|e| io_error(e, path))
    }

    async fn create(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        self.ensure_parent(&full_path).await?;

        // create_new refuses to clobber a file that appeared since the check
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
            .map_err(|e| io_error(e, path))?;
        file.write_all(content)
            .await
            .map_err(|e| io_error(e, path))?;
        file.flush().await.map_err(|e| io_error(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.full_path(from);
        let to_path = self.full_path(to);
        self.ensure_parent(&to_path).await?;

        // Linking fails if the target exists, so nothing that appears at `to`
        // after the scan is ever replaced
        match fs::hard_link(&from_path, &to_path).await {
            Ok(()) => fs::remove_file(&from_path)
                .await
                .map_err(|e| io_error(e, from)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(FsError::AlreadyExists(to.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FsError::NotFound(from.to_string())),
            Err(e) => {
                // Volumes without hard links (FAT, some network shares)
                tracing::debug!("Hard link {} failed ({}), renaming after a check", to, e);
                if fs::try_exists(&to_path).await.map_err(|e| io_error(e, to))? {
                    return Err(FsError::AlreadyExists(to.to_string()));
                }
                fs::rename(&from_path, &to_path)
                    .await
                    .map_err(|e| io_error(e, from))
            }
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| io_error(e, path))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(e, path))? {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().await.map_err(|e| io_error(e, &name))?;

            entries.push(FileEntry {
                name,
                is_dir: file_type.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        fs::try_exists(&full_path)
            .await
            .map_err(|e| io_error(e, path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| io_error(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        if path.trim_matches('/').is_empty() {
            return Err(FsError::Io("Refusing to remove the vault root".into()));
        }
        let full_path = self.full_path(path);
        fs::remove_dir(&full_path)
            .await
            .map_err(|e| io_error(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault() -> (TempDir, NativeFs) {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let (dir, fs) = vault();

        fs.create("Projects/Alpha.md", b"hello").await.unwrap();

        assert_eq!(fs.read("Projects/Alpha.md").await.unwrap(), b"hello");
        assert!(dir.path().join("Projects").is_dir());
        assert!(matches!(
            fs.create("Projects/Alpha.md", b"again").await,
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(fs.read("Projects/Alpha.md").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_rename_never_overwrites() {
        let (dir, fs) = vault();
        fs.create("a.md", b"a").await.unwrap();
        // Written behind the vault's back, as a user or sync client would
        std::fs::write(dir.path().join("b.md"), b"b").unwrap();

        assert!(matches!(
            fs.rename("a.md", "b.md").await,
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(fs.read("a.md").await.unwrap(), b"a");
        assert_eq!(fs.read("b.md").await.unwrap(), b"b");

        fs.rename("a.md", "deep/er/c.md").await.unwrap();
        assert!(!fs.exists("a.md").await.unwrap());
        assert_eq!(fs.read("deep/er/c.md").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_rename_missing_source_is_not_found() {
        let (dir, fs) = vault();

        assert!(matches!(
            fs.rename("gone.md", "Projects/new.md").await,
            Err(FsError::NotFound(_))
        ));
        assert!(!dir.path().join("Projects/new.md").exists());
    }

    #[tokio::test]
    async fn test_list_and_remove_dir() {
        let (_dir, fs) = vault();
        fs.mkdir("Projects/Work").await.unwrap();
        fs.mkdir("Projects/Work").await.unwrap();
        fs.create("Projects/Home.md", b"").await.unwrap();

        let mut names: Vec<(String, bool)> = fs
            .list("Projects")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![("Home.md".to_string(), false), ("Work".to_string(), true)]
        );

        assert!(fs.remove_dir("Projects").await.is_err());
        fs.remove_dir("Projects/Work").await.unwrap();
        assert!(!fs.exists("Projects/Work").await.unwrap());
        assert!(fs.remove_dir("").await.is_err());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, fs) = vault();
        assert!(matches!(
            fs.read("nope.md").await,
            Err(FsError::NotFound(_))
        ));
    }
}
