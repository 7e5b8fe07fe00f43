//! Archiver: relocates notes whose remote project no longer exists.
//!
//! Notes go to `<archive>/<year>/Q<quarter>/<category>/<id>.md`, where the
//! category is the folder the note was in. Nothing is ever deleted.

use crate::clock;
use crate::fs::{self, FileSystem, FsError};
use crate::identity::LocalNote;
use crate::project;
use crate::reconciler::HandledSet;
use crate::report::{Conflict, Failure, NoteMove, PassReport};
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

pub struct Archiver<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    archive_folder: String,
    project_folder: String,
    today: NaiveDate,
}

impl<'a, F: FileSystem + ?Sized> Archiver<'a, F> {
    pub fn new(fs: &'a F, archive_folder: &str, project_folder: &str, today: NaiveDate) -> Self {
        Self {
            fs,
            archive_folder: archive_folder.trim_matches('/').to_string(),
            project_folder: project_folder.trim_matches('/').to_string(),
            today,
        }
    }

    /// Folder receiving this quarter's archived notes.
    pub fn quarter_folder(&self) -> String {
        format!(
            "{}/{}/Q{}",
            self.archive_folder,
            self.today.year(),
            clock::quarter(self.today)
        )
    }

    /// Archive path for a note.
    pub fn archive_path(&self, note: &LocalNote) -> String {
        format!(
            "{}/{}/{}.md",
            self.quarter_folder(),
            self.category(&note.path),
            project::sanitize(&note.id)
        )
    }

    /// Name of the folder a note lives in; top-level notes fall back to the
    /// project folder's name.
    fn category(&self, path: &str) -> String {
        let folder = fs::parent(path);
        let folder = if folder.is_empty() {
            self.project_folder.as_str()
        } else {
            folder
        };
        match folder.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "Unsorted".to_string(),
        }
    }

    /// Move every tagged note whose id was not handled into the archive.
    pub async fn run(&self, notes: &[LocalNote], handled: &HandledSet, report: &mut PassReport) {
        let mut ensured: HashSet<String> = HashSet::new();

        for note in notes {
            if handled.contains(&note.id) {
                continue;
            }
            if fs::is_within(&note.path, &self.archive_folder) {
                tracing::debug!("{} already archived", note.path);
                report.already_archived += 1;
                continue;
            }
            self.archive_with(note, &mut ensured, report).await;
        }
    }

    /// Archive a single note. Returns whether it was moved; conflicts and
    /// failures are recorded in `report`.
    pub async fn archive(&self, note: &LocalNote, report: &mut PassReport) -> bool {
        self.archive_with(note, &mut HashSet::new(), report).await
    }

    async fn archive_with(
        &self,
        note: &LocalNote,
        ensured: &mut HashSet<String>,
        report: &mut PassReport,
    ) -> bool {
        let target = self.archive_path(note);
        match self.archive_note(note, &target, ensured).await {
            Ok(()) => {
                tracing::info!("Archived {} -> {}", note.path, target);
                report.archived.push(NoteMove {
                    from: note.path.clone(),
                    to: target,
                });
                true
            }
            Err(FsError::AlreadyExists(_)) => {
                tracing::warn!("Cannot archive {}: {} is occupied", note.path, target);
                report.conflicts.push(Conflict {
                    path: target,
                    reason: format!("archive target occupied; {} left in place", note.path),
                });
                false
            }
            Err(e) => {
                tracing::warn!("Failed to archive {}: {}", note.path, e);
                report.failures.push(Failure {
                    id: note.id.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    async fn archive_note(
        &self,
        note: &LocalNote,
        target: &str,
        ensured: &mut HashSet<String>,
    ) -> fs::Result<()> {
        let folder = fs::parent(target);
        if !ensured.contains(folder) {
            if !self.fs.exists(folder).await? {
                self.fs.mkdir(folder).await?;
            }
            ensured.insert(folder.to_string());
        }
        self.fs.rename(&note.path, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    fn note(path: &str, id: &str) -> LocalNote {
        LocalNote {
            path: path.into(),
            id: id.into(),
        }
    }

    #[test]
    fn test_archive_path_layout() {
        let fs = InMemoryFs::new();
        let archiver = Archiver::new(&fs, "Archive", "Projects", date());

        assert_eq!(
            archiver.archive_path(&note("Projects/Work/Acme.md", "99")),
            "Archive/2024/Q2/Work/99.md"
        );
        assert_eq!(
            archiver.archive_path(&note("Projects/Alpha.md", "1")),
            "Archive/2024/Q2/Projects/1.md"
        );
        assert_eq!(
            archiver.archive_path(&note("Loose.md", "a/b")),
            "Archive/2024/Q2/Projects/a-b.md"
        );
    }

    #[tokio::test]
    async fn test_archives_unhandled_notes_only() {
        let fs = InMemoryFs::new();
        fs.create("Projects/Gone.md", b"---\nTodoistId: 99\n---\nkeep me")
            .await
            .unwrap();
        fs.create("Projects/Live.md", b"---\nTodoistId: 1\n---\n")
            .await
            .unwrap();

        let notes = vec![note("Projects/Gone.md", "99"), note("Projects/Live.md", "1")];
        let handled = HandledSet::from(["1".to_string()]);
        let mut report = PassReport::default();

        Archiver::new(&fs, "Archive", "Projects", date())
            .run(&notes, &handled, &mut report)
            .await;

        assert_eq!(report.archived.len(), 1);
        assert_eq!(
            fs.read_string("Archive/2024/Q2/Projects/99.md").unwrap(),
            "---\nTodoistId: 99\n---\nkeep me"
        );
        assert!(!fs.exists("Projects/Gone.md").await.unwrap());
        assert!(fs.exists("Projects/Live.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_already_archived_notes_are_left_alone() {
        let fs = InMemoryFs::new();
        fs.create("Archive/2023/Q4/Work/99.md", b"---\nTodoistId: 99\n---\n")
            .await
            .unwrap();
        let before = fs.mutation_count();

        let notes = vec![note("Archive/2023/Q4/Work/99.md", "99")];
        let mut report = PassReport::default();
        Archiver::new(&fs, "Archive", "Projects", date())
            .run(&notes, &HandledSet::new(), &mut report)
            .await;

        assert_eq!(report.already_archived, 1);
        assert!(report.archived.is_empty());
        assert_eq!(fs.mutation_count(), before);
    }

    #[tokio::test]
    async fn test_occupied_archive_target_is_conflict() {
        let fs = InMemoryFs::new();
        fs.create("Projects/A.md", b"---\nTodoistId: 5\n---\nA").await.unwrap();
        fs.create("Archive/2024/Q2/Projects/5.md", b"older").await.unwrap();

        let notes = vec![note("Projects/A.md", "5")];
        let mut report = PassReport::default();
        Archiver::new(&fs, "Archive", "Projects", date())
            .run(&notes, &HandledSet::new(), &mut report)
            .await;

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(fs.read_string("Projects/A.md").unwrap(), "---\nTodoistId: 5\n---\nA");
        assert_eq!(fs.read_string("Archive/2024/Q2/Projects/5.md").unwrap(), "older");
    }
}
