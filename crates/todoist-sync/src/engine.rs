//! SyncEngine: runs one complete reconciliation pass.
//!
//! A pass fetches the remote project set, indexes the vault, reconciles every
//! project to its canonical path, archives notes whose project is gone, and
//! removes folders the pass left empty. Nothing survives between passes except
//! the files themselves.

use crate::archiver::Archiver;
use crate::clock::Clock;
use crate::error::Result;
use crate::fs::{self, FileSystem};
use crate::identity::{scan_notes, IdentityIndex, LocalNote};
use crate::project::ProjectTree;
use crate::reconciler::Reconciler;
use crate::remote::TodoistApi;
use crate::report::PassReport;

/// Immutable settings for the engine, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Vault folder mirroring the remote hierarchy
    pub project_folder: String,
    /// Vault folder receiving archived notes
    pub archive_folder: String,
    /// Vault name used in breadcrumb links
    pub vault_name: String,
    pub create_breadcrumb_tasks: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            project_folder: "Projects".into(),
            archive_folder: "Archive".into(),
            vault_name: "Vault".into(),
            create_breadcrumb_tasks: true,
        }
    }
}

pub struct SyncEngine<F, T, C> {
    fs: F,
    api: T,
    clock: C,
    settings: SyncSettings,
}

impl<F, T, C> SyncEngine<F, T, C>
where
    F: FileSystem,
    T: TodoistApi,
    C: Clock,
{
    pub fn new(fs: F, api: T, clock: C, settings: SyncSettings) -> Self {
        Self {
            fs,
            api,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Run one pass.
    ///
    /// Fails only when the remote fetch or the vault scan fails, in which
    /// case nothing in the vault has been touched. Per-project problems are
    /// contained and recorded in the returned report.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let projects = match self.api.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                tracing::error!("Failed to fetch remote projects, aborting pass: {}", e);
                return Err(e.into());
            }
        };

        let mut report = PassReport::default();
        let tree = ProjectTree::new(projects);
        report.projects = tree.len();

        let notes = scan_notes(&self.fs).await?;
        let index = IdentityIndex::build(&notes);
        report.tagged_notes = notes.len();
        report.duplicates = index.duplicates().to_vec();
        tracing::debug!(
            "Pass start: {} remote projects, {} tagged notes",
            tree.len(),
            notes.len()
        );

        let archiver = Archiver::new(
            &self.fs,
            &self.settings.archive_folder,
            &self.settings.project_folder,
            self.clock.today(),
        );
        let handled =
            Reconciler::new(&self.fs, &self.api, &self.settings, &tree, &index, &archiver)
                .run(&mut report)
                .await;

        // Duplicates stay where they are; only the note owning an id is archived.
        let owners: Vec<LocalNote> = notes
            .into_iter()
            .filter(|note| index.path_of(&note.id) == Some(note.path.as_str()))
            .collect();
        archiver.run(&owners, &handled, &mut report).await;

        self.prune_emptied_folders(&mut report).await;

        if report.has_problems() {
            tracing::warn!("Sync pass finished with problems: {}", report.summary());
        } else {
            tracing::info!("Sync pass complete: {}", report.summary());
        }
        Ok(report)
    }

    /// Remove folders inside the project folder that this pass emptied.
    async fn prune_emptied_folders(&self, report: &mut PassReport) {
        let mut candidates: Vec<String> = report
            .moved
            .iter()
            .chain(report.archived.iter())
            .map(|m| fs::parent(&m.from).to_string())
            .filter(|folder| self.prunable(folder))
            .collect();
        // Deepest first so a parent is only considered after its children.
        candidates.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));
        candidates.dedup();

        for folder in candidates {
            let mut current = folder;
            while self.prunable(&current) {
                match self.remove_if_empty(&current).await {
                    Ok(true) => {
                        tracing::info!("Removed empty folder {}", current);
                        let next = fs::parent(&current).to_string();
                        report.pruned_folders.push(current);
                        current = next;
                    }
                    Ok(false) => break,
                    Err(e) => {
                        tracing::warn!("Failed to remove folder {}: {}", current, e);
                        break;
                    }
                }
            }
        }
    }

    fn prunable(&self, folder: &str) -> bool {
        let project_folder = self.settings.project_folder.trim_matches('/');
        !folder.is_empty()
            && folder != project_folder
            && fs::is_within(folder, project_folder)
            && !fs::is_within(folder, &self.settings.archive_folder)
    }

    async fn remove_if_empty(&self, folder: &str) -> fs::Result<bool> {
        if !self.fs.exists(folder).await? || !self.fs.list(folder).await?.is_empty() {
            return Ok(false);
        }
        self.fs.remove_dir(folder).await?;
        Ok(true)
    }
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::SyncError;
    use crate::fs::InMemoryFs;
    use crate::project::RemoteProject;
    use crate::remote::InMemoryTodoist;
    use chrono::NaiveDate;
    use std::sync::Arc;

    type TestEngine = SyncEngine<Arc<InMemoryFs>, InMemoryTodoist, FixedClock>;

    fn engine(projects: Vec<RemoteProject>) -> (TestEngine, Arc<InMemoryFs>, InMemoryTodoist) {
        let fs = Arc::new(InMemoryFs::new());
        let api = InMemoryTodoist::new(projects);
        let clock = FixedClock(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
        let engine = SyncEngine::new(fs.clone(), api.clone(), clock, SyncSettings::default());
        (engine, fs, api)
    }

    fn hierarchy() -> Vec<RemoteProject> {
        vec![
            RemoteProject::root("1", "Work"),
            RemoteProject::child("2", "Clients", "1"),
            RemoteProject::child("3", "Acme", "2"),
            RemoteProject::root("4", "Home"),
        ]
    }

    #[tokio::test]
    async fn test_creates_note_for_new_project() {
        let (engine, fs, _) = engine(vec![RemoteProject::root("1", "Alpha")]);

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.created, vec!["Projects/Alpha.md".to_string()]);
        let note = fs.read_string("Projects/Alpha.md").unwrap();
        assert!(note.starts_with("---\nTodoistId: 1\n"));
    }

    #[tokio::test]
    async fn test_second_pass_performs_no_mutations() {
        let (engine, fs, _) = engine(hierarchy());
        fs.create("Projects/Gone.md", b"---\nTodoistId: 99\n---\n")
            .await
            .unwrap();

        let first = engine.run_pass().await.unwrap();
        assert_eq!(first.created.len(), 4);
        assert_eq!(first.archived.len(), 1);

        let before = fs.mutation_count();
        let second = engine.run_pass().await.unwrap();

        assert_eq!(fs.mutation_count(), before);
        assert_eq!(second.mutations(), 0);
        assert_eq!(second.unchanged, 4);
        assert_eq!(second.already_archived, 1);
        assert!(!second.has_problems());
    }

    #[tokio::test]
    async fn test_new_project_replaces_deleted_namesake_in_one_pass() {
        let (engine, fs, _) = engine(vec![RemoteProject::root("1", "Alpha")]);
        fs.create("Projects/Alpha.md", b"---\nTodoistId: 99\n---\nold project")
            .await
            .unwrap();

        let first = engine.run_pass().await.unwrap();

        assert_eq!(first.created, vec!["Projects/Alpha.md".to_string()]);
        assert_eq!(first.archived.len(), 1);
        assert_eq!(first.archived[0].to, "Archive/2024/Q2/Projects/99.md");
        assert_eq!(first.unchanged, 0);
        assert!(!first.has_problems());
        assert!(fs
            .read_string("Projects/Alpha.md")
            .unwrap()
            .contains("TodoistId: 1"));

        let before = fs.mutation_count();
        let second = engine.run_pass().await.unwrap();

        assert_eq!(fs.mutation_count(), before);
        assert_eq!(second.mutations(), 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.already_archived, 1);
    }

    #[tokio::test]
    async fn test_parent_rename_moves_descendants() {
        let (engine, fs, api) = engine(hierarchy());
        engine.run_pass().await.unwrap();
        let acme = fs.read_string("Projects/Work/Clients/Acme.md").unwrap();

        api.rename("1", "Job");
        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.moved.len(), 3);
        assert!(fs.exists("Projects/Job.md").await.unwrap());
        assert!(fs.exists("Projects/Job/Clients.md").await.unwrap());
        assert_eq!(
            fs.read_string("Projects/Job/Clients/Acme.md").unwrap(),
            acme
        );
        assert!(fs.exists("Projects/Home.md").await.unwrap());

        // The old branch is gone entirely, the project root stays
        assert!(!fs.exists("Projects/Work").await.unwrap());
        assert_eq!(
            report.pruned_folders,
            vec!["Projects/Work/Clients".to_string(), "Projects/Work".to_string()]
        );
        assert!(fs.is_dir("Projects"));
    }

    #[tokio::test]
    async fn test_renamed_project_note_keeps_content() {
        let (engine, fs, _) = engine(vec![RemoteProject::root("1", "NewName")]);
        let original = "---\nTodoistId: 1\n---\n\nMeeting notes\n";
        fs.create("Projects/OldName.md", original.as_bytes())
            .await
            .unwrap();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.moved.len(), 1);
        assert!(report.created.is_empty());
        assert!(!fs.exists("Projects/OldName.md").await.unwrap());
        assert_eq!(fs.read_string("Projects/NewName.md").unwrap(), original);
    }

    #[tokio::test]
    async fn test_archives_note_of_deleted_project() {
        let (engine, fs, _) = engine(vec![RemoteProject::root("1", "Alpha")]);
        fs.create("Projects/Work/Old Client.md", b"---\nTodoistId: 99\n---\nhistory")
            .await
            .unwrap();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.archived.len(), 1);
        assert_eq!(
            fs.read_string("Archive/2024/Q2/Work/99.md").unwrap(),
            "---\nTodoistId: 99\n---\nhistory"
        );
        assert!(!fs.exists("Projects/Work/Old Client.md").await.unwrap());
        assert_eq!(report.pruned_folders, vec!["Projects/Work".to_string()]);
    }

    #[tokio::test]
    async fn test_untagged_notes_are_never_touched() {
        let (engine, fs, _) = engine(vec![]);
        fs.create("Projects/Scratch.md", b"# just thoughts")
            .await
            .unwrap();
        fs.create("Daily/2024-05-17.md", b"---\ntags: [daily]\n---\n")
            .await
            .unwrap();
        let before = fs.mutation_count();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(fs.mutation_count(), before);
        assert_eq!(report.tagged_notes, 0);
    }

    #[tokio::test]
    async fn test_dangling_parent_fails_only_that_project() {
        let (engine, fs, _) = engine(vec![
            RemoteProject::root("1", "Alpha"),
            RemoteProject::child("2", "Lost", "404"),
        ]);
        fs.create("Projects/Lost.md", b"---\nTodoistId: 2\n---\n")
            .await
            .unwrap();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "2");
        assert_eq!(report.created, vec!["Projects/Alpha.md".to_string()]);
        // A failed project still counts as handled, so its note is not archived
        assert!(report.archived.is_empty());
        assert!(fs.exists("Projects/Lost.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_is_reported_as_malformed() {
        let (engine, _, _) = engine(vec![
            RemoteProject::child("a", "A", "b"),
            RemoteProject::child("b", "B", "a"),
            RemoteProject::root("c", "C"),
        ]);

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.error.contains("cycle")));
        assert_eq!(report.created, vec!["Projects/C.md".to_string()]);
    }

    #[tokio::test]
    async fn test_archived_note_is_restored_when_project_returns() {
        let (engine, fs, api) = engine(vec![]);
        fs.create("Projects/Alpha.md", b"---\nTodoistId: 1\n---\nkept")
            .await
            .unwrap();

        let first = engine.run_pass().await.unwrap();
        assert_eq!(first.archived[0].to, "Archive/2024/Q2/Projects/1.md");

        api.set_projects(vec![RemoteProject::root("1", "Alpha")]);
        let second = engine.run_pass().await.unwrap();

        assert_eq!(second.moved.len(), 1);
        assert!(second.created.is_empty());
        assert_eq!(
            fs.read_string("Projects/Alpha.md").unwrap(),
            "---\nTodoistId: 1\n---\nkept"
        );
        // The archive is never pruned
        assert!(fs.is_dir("Archive/2024/Q2/Projects"));
    }

    #[tokio::test]
    async fn test_duplicate_tags_first_wins() {
        let (engine, fs, _) = engine(vec![RemoteProject::root("1", "Alpha")]);
        fs.create("Projects/A.md", b"---\nTodoistId: 1\n---\nfirst")
            .await
            .unwrap();
        fs.create("Projects/B.md", b"---\nTodoistId: 1\n---\nsecond")
            .await
            .unwrap();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].kept, "Projects/A.md");
        assert_eq!(report.duplicates[0].ignored, "Projects/B.md");
        assert_eq!(
            fs.read_string("Projects/Alpha.md").unwrap(),
            "---\nTodoistId: 1\n---\nfirst"
        );
        assert_eq!(
            fs.read_string("Projects/B.md").unwrap(),
            "---\nTodoistId: 1\n---\nsecond"
        );
        assert!(report.archived.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_vault_untouched() {
        let (engine, fs, api) = engine(vec![RemoteProject::root("1", "Alpha")]);
        fs.create("Projects/Gone.md", b"---\nTodoistId: 99\n---\n")
            .await
            .unwrap();
        api.fail_list_with(Some("connection reset"));
        let before = fs.mutation_count();

        let err = engine.run_pass().await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(fs.mutation_count(), before);
        assert!(fs.exists("Projects/Gone.md").await.unwrap());
        assert!(api.created_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_prune_never_leaves_project_folder() {
        let (engine, fs, _) = engine(vec![]);
        fs.create("Inbox/Loose.md", b"---\nTodoistId: 7\n---\n")
            .await
            .unwrap();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.archived.len(), 1);
        assert!(report.pruned_folders.is_empty());
        assert!(fs.is_dir("Inbox"));
    }
}
