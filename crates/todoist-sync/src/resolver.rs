//! Canonical path resolution for remote projects.
//!
//! A project named `Beta` under `Alpha` maps to the note `Projects/Alpha/Beta.md`;
//! `Projects/Alpha/` is Alpha's folder and holds its children.

use crate::error::Result;
use crate::fs::{self, FileSystem};
use crate::project::{path_segment, ProjectTree, RemoteProject, TreeError};
use std::collections::{HashMap, HashSet};

/// Resolves folders for one pass, creating ancestors on demand.
///
/// Folder paths are memoized per project id and folder existence is checked
/// at most once per pass, so siblings sharing ancestors cost nothing extra.
pub struct PathResolver<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    tree: &'a ProjectTree,
    base: String,
    /// project id -> that project's folder
    folders: HashMap<String, String>,
    /// folders known to exist on disk
    ensured: HashSet<String>,
}

impl<'a, F: FileSystem + ?Sized> PathResolver<'a, F> {
    pub fn new(fs: &'a F, tree: &'a ProjectTree, base: &str) -> Self {
        Self {
            fs,
            tree,
            base: base.trim_matches('/').to_string(),
            folders: HashMap::new(),
            ensured: HashSet::new(),
        }
    }

    /// Folder that holds `project`'s children: `<parent folder>/<name>`.
    ///
    /// Every ancestor folder exists on disk when this returns; the project's
    /// own folder is only computed.
    pub async fn resolve_folder(&mut self, project: &RemoteProject) -> Result<String> {
        if let Some(folder) = self.folders.get(&project.id) {
            return Ok(folder.clone());
        }

        let tree = self.tree;

        // Walk up until a root or an already-resolved ancestor.
        let mut chain = vec![project];
        let mut seen = HashSet::from([project.id.as_str()]);
        let mut parent_folder = loop {
            let current = chain[chain.len() - 1];
            match tree.parent_of(current)? {
                None => break self.base.clone(),
                Some(parent) => {
                    if let Some(folder) = self.folders.get(&parent.id) {
                        break folder.clone();
                    }
                    if !seen.insert(parent.id.as_str()) {
                        return Err(TreeError::Cycle {
                            project_id: project.id.clone(),
                        }
                        .into());
                    }
                    chain.push(parent);
                }
            }
        };

        // Build top-down so ancestors exist before their children.
        self.ensure(&parent_folder).await?;
        for node in chain.into_iter().rev() {
            let folder = fs::join(&parent_folder, &path_segment(node)?);
            if node.id != project.id {
                self.ensure(&folder).await?;
            }
            self.folders.insert(node.id.clone(), folder.clone());
            parent_folder = folder;
        }

        Ok(parent_folder)
    }

    /// Canonical note path: `<parent folder>/<name>.md`, with the containing
    /// folder created if needed.
    pub async fn note_path(&mut self, project: &RemoteProject) -> Result<String> {
        let segment = path_segment(project)?;
        let tree = self.tree;
        let folder = match tree.parent_of(project)? {
            None => self.base.clone(),
            Some(parent) => self.resolve_folder(parent).await?,
        };
        self.ensure(&folder).await?;
        Ok(fs::join(&folder, &format!("{}.md", segment)))
    }

    async fn ensure(&mut self, folder: &str) -> Result<()> {
        if folder.is_empty() || self.ensured.contains(folder) {
            return Ok(());
        }
        if !self.fs.exists(folder).await? {
            self.fs.mkdir(folder).await?;
            tracing::debug!("Created folder {}", folder);
        }
        self.ensured.insert(folder.to_string());
        Ok(())
    }
}
