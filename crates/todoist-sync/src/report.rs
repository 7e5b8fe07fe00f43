//! Summary of one sync pass.

use crate::identity::DuplicateTag;
use serde::Serialize;

/// A note relocated by the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteMove {
    pub from: String,
    pub to: String,
}

/// An operation skipped because its target was occupied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub path: String,
    pub reason: String,
}

/// A project (or note) whose handling failed; the pass carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// Remote projects fetched
    pub projects: usize,
    /// Tagged notes found in the vault
    pub tagged_notes: usize,
    /// Notes created for newly seen projects
    pub created: Vec<String>,
    /// Notes moved to their canonical path
    pub moved: Vec<NoteMove>,
    /// Projects whose note was already in place
    pub unchanged: usize,
    pub conflicts: Vec<Conflict>,
    pub failures: Vec<Failure>,
    /// Notes moved into the archive
    pub archived: Vec<NoteMove>,
    /// Orphaned notes already sitting in the archive
    pub already_archived: usize,
    /// Empty folders removed after moves
    pub pruned_folders: Vec<String>,
    pub duplicates: Vec<DuplicateTag>,
    pub breadcrumb_failures: Vec<Failure>,
}

impl PassReport {
    /// Number of changes applied to the vault.
    pub fn mutations(&self) -> usize {
        self.created.len() + self.moved.len() + self.archived.len() + self.pruned_folders.len()
    }

    /// Whether anything needs a human to look at it.
    pub fn has_problems(&self) -> bool {
        !self.conflicts.is_empty()
            || !self.failures.is_empty()
            || !self.duplicates.is_empty()
            || !self.breadcrumb_failures.is_empty()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} projects: {} created, {} moved, {} unchanged, {} archived, {} conflicts, {} failures",
            self.projects,
            self.created.len(),
            self.moved.len(),
            self.unchanged,
            self.archived.len(),
            self.conflicts.len(),
            self.failures.len()
        )
    }
}
