//! Remote project model and the per-pass project tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A node of the remote project hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl RemoteProject {
    pub fn root(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
        }
    }

    pub fn child(
        id: impl Into<String>,
        name: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: Some(parent_id.into()),
        }
    }
}

/// The remote project set violates the forest invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Project {project_id} references missing parent {parent_id}")]
    DanglingParent {
        project_id: String,
        parent_id: String,
    },

    #[error("Project {project_id} is part of a parent cycle")]
    Cycle { project_id: String },

    #[error("Project {project_id} has a name that cannot be used as a path segment: {name:?}")]
    InvalidName { project_id: String, name: String },
}

/// All projects of one fetch, indexed by id.
///
/// Keeps the fetch order so passes iterate deterministically.
#[derive(Debug, Clone, Default)]
pub struct ProjectTree {
    order: Vec<String>,
    by_id: HashMap<String, RemoteProject>,
}

impl ProjectTree {
    /// Build the tree. When an id appears twice the first occurrence wins.
    pub fn new(projects: Vec<RemoteProject>) -> Self {
        let mut tree = Self::default();
        for project in projects {
            if tree.by_id.contains_key(&project.id) {
                tracing::warn!(
                    "Duplicate remote project id {} ({:?}), keeping first occurrence",
                    project.id,
                    project.name
                );
                continue;
            }
            tree.order.push(project.id.clone());
            tree.by_id.insert(project.id.clone(), project);
        }
        tree
    }

    pub fn get(&self, id: &str) -> Option<&RemoteProject> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Projects in fetch order.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteProject> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Look up a project's parent, failing when the reference dangles.
    pub fn parent_of(&self, project: &RemoteProject) -> Result<Option<&RemoteProject>, TreeError> {
        match project.parent_id.as_deref() {
            None => Ok(None),
            Some(parent_id) => self.get(parent_id).map(Some).ok_or_else(|| {
                TreeError::DanglingParent {
                    project_id: project.id.clone(),
                    parent_id: parent_id.to_string(),
                }
            }),
        }
    }
}

/// Turn a project name into a single folder/file name.
///
/// Path separators and characters most filesystems reject become `-`.
pub fn path_segment(project: &RemoteProject) -> Result<String, TreeError> {
    let segment = sanitize(&project.name).trim().to_string();

    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(TreeError::InvalidName {
            project_id: project.id.clone(),
            name: project.name.clone(),
        });
    }
    Ok(segment)
}

/// Replace characters that are unsafe in a file or folder name with `-`.
pub(crate) fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_rest_payload() {
        let json = r#"[
            {"id": "1", "name": "Inbox", "parent_id": null, "color": "grey", "is_favorite": false},
            {"id": "2", "name": "Child", "parent_id": "1"}
        ]"#;
        let projects: Vec<RemoteProject> = serde_json::from_str(json).unwrap();
        assert_eq!(projects[0], RemoteProject::root("1", "Inbox"));
        assert_eq!(projects[1], RemoteProject::child("2", "Child", "1"));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let tree = ProjectTree::new(vec![
            RemoteProject::root("1", "First"),
            RemoteProject::root("1", "Second"),
            RemoteProject::root("2", "Other"),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("1").unwrap().name, "First");
        let ids: Vec<&str> = tree.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_parent_of_reports_dangling_reference() {
        let orphan = RemoteProject::child("2", "Orphan", "404");
        let tree = ProjectTree::new(vec![orphan.clone()]);
        assert_eq!(
            tree.parent_of(&orphan).unwrap_err(),
            TreeError::DanglingParent {
                project_id: "2".into(),
                parent_id: "404".into()
            }
        );
    }

    #[test]
    fn test_path_segment_sanitizes() {
        let p = RemoteProject::root("1", "  Work/Home: Q1?  ");
        assert_eq!(path_segment(&p).unwrap(), "Work-Home- Q1-");

        for bad in ["", "   ", ".", ".."] {
            let p = RemoteProject::root("9", bad);
            assert!(matches!(
                path_segment(&p),
                Err(TreeError::InvalidName { .. })
            ));
        }
    }
}
