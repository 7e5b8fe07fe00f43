//! FileSystem trait abstraction for the local note store.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in todoist-sync-daemon) - Uses tokio::fs
//!
//! Paths are vault-relative and `/`-separated. The empty string is the vault root.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Platform-independent note store abstraction.
///
/// Mutating operations never overwrite: `create` and `rename` fail with
/// `FsError::AlreadyExists` when the destination is occupied, so a racing
/// manual edit surfaces as a conflict instead of lost content.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create a new file (creates parent directories if needed).
    /// Fails if anything already exists at `path`.
    async fn create(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Move a file to `to` (creates parent directories if needed).
    /// Fails if anything already exists at `to`.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create directory (and parents if needed). Existing directories are not an error.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<()>;
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
    dirs: RwLock<HashSet<String>>,
    /// Number of operations that changed the tree (create, rename, new dir, removal)
    mutations: AtomicUsize,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut dirs = HashSet::new();
        dirs.insert(String::new()); // Root directory
        Self {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(dirs),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Total number of mutating operations applied so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Read a file as UTF-8 text (test convenience).
    pub fn read_string(&self, path: &str) -> Option<String> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        files
            .get(&path)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
    }

    /// Whether `path` is a directory.
    pub fn is_dir(&self, path: &str) -> bool {
        let path = Self::normalize_path(path);
        self.dirs.read().unwrap().contains(&path)
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn parent_path(path: &str) -> Option<String> {
        let normalized = Self::normalize_path(path);
        if normalized.is_empty() {
            None
        } else {
            match normalized.rfind('/') {
                Some(pos) => Some(normalized[..pos].to_string()),
                None => Some(String::new()),
            }
        }
    }

    fn occupied(&self, path: &str) -> bool {
        self.files.read().unwrap().contains_key(path) || self.dirs.read().unwrap().contains(path)
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        if self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::IsDirectory(path));
        }
        let files = self.files.read().unwrap();
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path))
    }

    async fn create(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        if self.occupied(&path) {
            return Err(FsError::AlreadyExists(path));
        }

        if let Some(parent) = Self::parent_path(&path) {
            self.mkdir(&parent).await?;
        }

        self.files.write().unwrap().insert(path, content.to_vec());
        self.bump();
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalize_path(from);
        let to = Self::normalize_path(to);

        if self.dirs.read().unwrap().contains(&from) {
            return Err(FsError::IsDirectory(from));
        }
        if !self.files.read().unwrap().contains_key(&from) {
            return Err(FsError::NotFound(from));
        }
        if self.occupied(&to) {
            return Err(FsError::AlreadyExists(to));
        }

        if let Some(parent) = Self::parent_path(&to) {
            self.mkdir(&parent).await?;
        }

        let mut files = self.files.write().unwrap();
        if let Some(content) = files.remove(&from) {
            files.insert(to, content);
        }
        drop(files);
        self.bump();
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let dirs = self.dirs.read().unwrap();
        if !dirs.contains(&path) {
            return Err(FsError::NotFound(path));
        }

        let mut entries = Vec::new();

        let files = self.files.read().unwrap();
        for file_path in files.keys() {
            if let Some(rest) = file_path.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: false,
                    });
                }
            }
        }

        for dir_path in dirs.iter() {
            if let Some(rest) = dir_path.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: true,
                    });
                }
            }
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize_path(path);
        Ok(self.occupied(&path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Ok(()); // Root always exists
        }
        if self.files.read().unwrap().contains_key(&path) {
            return Err(FsError::NotDirectory(path));
        }
        if self.dirs.read().unwrap().contains(&path) {
            return Ok(());
        }

        // Create parent first
        if let Some(parent) = Self::parent_path(&path) {
            Box::pin(self.mkdir(&parent)).await?;
        }

        if self.dirs.write().unwrap().insert(path) {
            self.bump();
        }
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Err(FsError::Io("Refusing to remove the vault root".into()));
        }
        if self.files.read().unwrap().contains_key(&path) {
            return Err(FsError::NotDirectory(path));
        }
        if !self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::NotFound(path));
        }
        if !self.list(&path).await?.is_empty() {
            return Err(FsError::NotEmpty(path));
        }

        self.dirs.write().unwrap().remove(&path);
        self.bump();
        Ok(())
    }
}

// Implement FileSystem for Arc<T> where T: FileSystem
// This allows a test to keep a handle on the store it hands to the engine
#[async_trait]
impl<T: FileSystem + ?Sized> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn create(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).create(path, content).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path).await
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        (**self).remove_dir(path).await
    }
}

/// List all markdown files in the vault, sorted by path.
///
/// Hidden files and directories (leading `.`) are skipped.
pub async fn list_markdown_files<F: FileSystem + ?Sized>(fs: &F) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut dirs_to_visit = vec![String::new()]; // Start with root

    while let Some(dir) = dirs_to_visit.pop() {
        let entries = fs.list(&dir).await?;

        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }

            let path = join(&dir, &entry.name);
            if entry.is_dir {
                dirs_to_visit.push(path);
            } else if path.ends_with(".md") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Join two vault-relative path fragments.
pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

/// Parent folder of a vault-relative path ("" for top-level entries).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Whether `path` equals `folder` or lies beneath it.
pub fn is_within(path: &str, folder: &str) -> bool {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        return true;
    }
    path == folder
        || path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}
