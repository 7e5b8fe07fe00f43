//! Reconciler: brings each remote project's note to its canonical path.

use crate::archiver::Archiver;
use crate::engine::SyncSettings;
use crate::error::{Result, SyncError};
use crate::fs::{self, FileSystem, FsError};
use crate::identity::{IdentityIndex, LocalNote};
use crate::markdown;
use crate::project::{ProjectTree, RemoteProject};
use crate::remote::{NewTask, TodoistApi};
use crate::report::{Conflict, Failure, NoteMove, PassReport};
use crate::resolver::PathResolver;
use std::collections::HashSet;

/// Ids the archiver must leave alone for the rest of the pass: every remote
/// project, plus deleted projects whose notes were already archived to free a
/// path.
pub type HandledSet = HashSet<String>;

/// What happened to one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectAction {
    Created(String),
    Moved(NoteMove),
    Unchanged(String),
}

pub struct Reconciler<'a, F: FileSystem + ?Sized, T: TodoistApi + ?Sized> {
    fs: &'a F,
    api: &'a T,
    settings: &'a SyncSettings,
    tree: &'a ProjectTree,
    index: &'a IdentityIndex,
    archiver: &'a Archiver<'a, F>,
    resolver: PathResolver<'a, F>,
    evicted: HashSet<String>,
}

impl<'a, F: FileSystem + ?Sized, T: TodoistApi + ?Sized> Reconciler<'a, F, T> {
    pub fn new(
        fs: &'a F,
        api: &'a T,
        settings: &'a SyncSettings,
        tree: &'a ProjectTree,
        index: &'a IdentityIndex,
        archiver: &'a Archiver<'a, F>,
    ) -> Self {
        Self {
            fs,
            api,
            settings,
            tree,
            index,
            archiver,
            resolver: PathResolver::new(fs, tree, &settings.project_folder),
            evicted: HashSet::new(),
        }
    }

    /// Reconcile every project, recording outcomes in `report`.
    ///
    /// A failing project is logged and recorded; the rest still run. Every
    /// project id is handled, failed or not, so a broken parent chain never
    /// sends a live project's note to the archive.
    pub async fn run(mut self, report: &mut PassReport) -> HandledSet {
        let mut handled = HandledSet::new();
        let tree = self.tree;

        for project in tree.iter() {
            handled.insert(project.id.clone());

            match self.reconcile_project(project, report).await {
                Ok(ProjectAction::Created(path)) => report.created.push(path),
                Ok(ProjectAction::Moved(note_move)) => report.moved.push(note_move),
                Ok(ProjectAction::Unchanged(path)) => {
                    tracing::debug!("{} already at {}", project.id, path);
                    report.unchanged += 1;
                }
                Err(SyncError::Conflict { path, reason }) => {
                    tracing::warn!("Conflict for project {} at {}: {}", project.id, path, reason);
                    report.conflicts.push(Conflict { path, reason });
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to reconcile project {} ({:?}): {}",
                        project.id,
                        project.name,
                        e
                    );
                    report.failures.push(Failure {
                        id: project.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        handled.extend(self.evicted);
        handled
    }

    async fn reconcile_project(
        &mut self,
        project: &RemoteProject,
        report: &mut PassReport,
    ) -> Result<ProjectAction> {
        let index = self.index;
        let target = self.resolver.note_path(project).await?;
        let current = index.path_of(&project.id);

        if current == Some(target.as_str()) {
            return Ok(ProjectAction::Unchanged(target));
        }

        if self.fs.exists(&target).await? {
            if let Some(from) = current.filter(|from| differs_only_in_case(from, &target)) {
                // The disk matched the old spelling, so it ignores case
                if !self.spelled_exactly(&target).await? {
                    return self.recase(project, from, target).await;
                }
            }

            match index.id_at(&target) {
                None => {
                    return match current {
                        Some(path) => Err(SyncError::Conflict {
                            path: target,
                            reason: format!(
                                "occupied by an untagged file; note for project {} stays at {}",
                                project.id, path
                            ),
                        }),
                        None => Ok(ProjectAction::Unchanged(target)),
                    };
                }
                Some(id)
                    if self.tree.contains(id) || index.path_of(id) != Some(target.as_str()) =>
                {
                    return Err(SyncError::Conflict {
                        path: target,
                        reason: format!(
                            "occupied by a note tagged {} {}; project {} left as is",
                            markdown::IDENTITY_KEY,
                            id,
                            project.id
                        ),
                    });
                }
                Some(id) => self.evict(id, &target, report).await?,
            }
        }

        match current {
            None => {
                let content = markdown::render_project_note(&project.id, &project.name);
                self.fs
                    .create(&target, content.as_bytes())
                    .await
                    .map_err(|e| occupied_as_conflict(e, &target))?;
                tracing::info!("Created {} for project {}", target, project.id);

                if self.settings.create_breadcrumb_tasks {
                    self.leave_breadcrumb(project, &target, report).await;
                }
                Ok(ProjectAction::Created(target))
            }
            Some(from) => {
                self.fs
                    .rename(from, &target)
                    .await
                    .map_err(|e| occupied_as_conflict(e, &target))?;
                tracing::info!("Moved {} -> {} for project {}", from, target, project.id);
                Ok(ProjectAction::Moved(NoteMove {
                    from: from.to_string(),
                    to: target,
                }))
            }
        }
    }

    /// Archive the note of a deleted project sitting on `target`.
    async fn evict(&mut self, id: &str, target: &str, report: &mut PassReport) -> Result<()> {
        self.evicted.insert(id.to_string());
        let note = LocalNote {
            path: target.to_string(),
            id: id.to_string(),
        };
        if self.archiver.archive(&note, report).await {
            Ok(())
        } else {
            Err(SyncError::Conflict {
                path: target.to_string(),
                reason: format!(
                    "held by the note of deleted project {} which could not be archived",
                    id
                ),
            })
        }
    }

    /// Move a note whose new path differs from the old one only in letter
    /// case, on a disk that treats both spellings as the same file.
    ///
    /// The note passes through a temporary name. When only folder names
    /// differ the note is already reachable at its path and stays put.
    async fn recase(
        &self,
        project: &RemoteProject,
        from: &str,
        target: String,
    ) -> Result<ProjectAction> {
        if file_name(from) == file_name(&target) {
            tracing::debug!("{} differs from {} only in folder case", from, target);
            return Ok(ProjectAction::Unchanged(from.to_string()));
        }

        let temp = format!("{}.recasing.md", from.strip_suffix(".md").unwrap_or(from));
        self.fs
            .rename(from, &temp)
            .await
            .map_err(|e| occupied_as_conflict(e, &temp))?;
        if let Err(e) = self.fs.rename(&temp, &target).await {
            if let Err(undo) = self.fs.rename(&temp, from).await {
                tracing::warn!("Failed to restore {} from {}: {}", from, temp, undo);
            }
            return Err(occupied_as_conflict(e, &target));
        }

        tracing::info!("Moved {} -> {} for project {}", from, target, project.id);
        Ok(ProjectAction::Moved(NoteMove {
            from: from.to_string(),
            to: target,
        }))
    }

    /// Whether every segment of `path` is listed with exactly this spelling.
    async fn spelled_exactly(&self, path: &str) -> Result<bool> {
        let mut folder = String::new();
        for segment in path.split('/') {
            let entries = self.fs.list(&folder).await?;
            if !entries.iter().any(|entry| entry.name == segment) {
                return Ok(false);
            }
            folder = fs::join(&folder, segment);
        }
        Ok(true)
    }

    /// Add a task to the project linking back to its new note.
    async fn leave_breadcrumb(
        &self,
        project: &RemoteProject,
        path: &str,
        report: &mut PassReport,
    ) {
        let task = NewTask {
            content: breadcrumb_content(&self.settings.vault_name, &project.name, path),
            project_id: project.id.clone(),
        };
        if let Err(e) = self.api.create_task(&task).await {
            tracing::warn!(
                "Failed to create breadcrumb task for project {}: {}",
                project.id,
                e
            );
            report.breadcrumb_failures.push(Failure {
                id: project.id.clone(),
                error: e.to_string(),
            });
        }
    }
}

fn occupied_as_conflict(err: FsError, target: &str) -> SyncError {
    match err {
        FsError::AlreadyExists(_) => SyncError::Conflict {
            path: target.to_string(),
            reason: "target appeared during the pass".into(),
        },
        other => other.into(),
    }
}

fn differs_only_in_case(a: &str, b: &str) -> bool {
    a != b && a.to_lowercase() == b.to_lowercase()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Markdown link opening the note in the vault.
pub fn breadcrumb_content(vault_name: &str, project_name: &str, note_path: &str) -> String {
    let file = note_path.strip_suffix(".md").unwrap_or(note_path);
    format!(
        "[{} notes](obsidian://open?vault={}&file={})",
        project_name,
        urlencoding::encode(vault_name),
        urlencoding::encode(file)
    )
}
