//! Identity index: which local note holds which remote project id.

use crate::fs::{self, FileSystem};
use crate::markdown;
use serde::Serialize;
use std::collections::HashMap;

/// A note carrying an identity tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNote {
    /// Vault-relative path
    pub path: String,
    /// Value of the identity tag
    pub id: String,
}

/// A note whose id was already claimed by an earlier note in the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateTag {
    pub id: String,
    /// Note that keeps the id
    pub kept: String,
    /// Note that was ignored
    pub ignored: String,
}

/// Read the tags of every markdown note in the vault.
///
/// Untagged notes are dropped. Unreadable notes are logged and skipped so a
/// single bad file cannot stop a pass. The result is in path order.
pub async fn scan_notes<F: FileSystem + ?Sized>(fs: &F) -> fs::Result<Vec<LocalNote>> {
    let mut notes = Vec::new();

    for path in fs::list_markdown_files(fs).await? {
        let bytes = match fs.read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Skipping unreadable note {}: {}", path, e);
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        if let Some(id) = markdown::identity_tag(&content) {
            notes.push(LocalNote { path, id });
        }
    }

    Ok(notes)
}

/// Remote id -> note path, rebuilt every pass.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_id: HashMap<String, String>,
    /// Every tagged note, duplicates included
    by_path: HashMap<String, String>,
    duplicates: Vec<DuplicateTag>,
}

impl IdentityIndex {
    /// Index scanned notes. The first note (in path order) carrying an id owns it.
    pub fn build(notes: &[LocalNote]) -> Self {
        let mut index = Self::default();
        for note in notes {
            index.by_path.insert(note.path.clone(), note.id.clone());
            match index.by_id.get(&note.id) {
                Some(kept) => {
                    tracing::warn!(
                        "Duplicate {} {} in {} (already held by {}), ignoring",
                        markdown::IDENTITY_KEY,
                        note.id,
                        note.path,
                        kept
                    );
                    index.duplicates.push(DuplicateTag {
                        id: note.id.clone(),
                        kept: kept.clone(),
                        ignored: note.path.clone(),
                    });
                }
                None => {
                    index.by_id.insert(note.id.clone(), note.path.clone());
                }
            }
        }
        index
    }

    /// Current path of the note holding `id`.
    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    /// Id tagged in the note at `path`, if that note is tagged.
    pub fn id_at(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    pub fn duplicates(&self) -> &[DuplicateTag] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
