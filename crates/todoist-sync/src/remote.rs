//! TodoistApi trait abstraction for the remote task service.
//!
//! Implementations:
//! - `InMemoryTodoist` - For testing
//! - `RestClient` (in todoist-sync-daemon) - Todoist REST API over reqwest

use crate::project::RemoteProject;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authentication rejected by remote service (HTTP {0})")]
    Unauthorized(u16),

    #[error("Remote service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Request body for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub content: String,
    pub project_id: String,
}

/// Task as returned by the remote service (fields we use).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[async_trait]
pub trait TodoistApi: Send + Sync {
    /// Fetch every project visible to the credential.
    async fn list_projects(&self) -> Result<Vec<RemoteProject>>;

    /// Create a task inside a project.
    async fn create_task(&self, task: &NewTask) -> Result<Task>;
}

#[async_trait]
impl<T: TodoistApi + ?Sized> TodoistApi for Arc<T> {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        (**self).list_projects().await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        (**self).create_task(task).await
    }
}

#[derive(Default)]
struct InMemoryState {
    projects: Vec<RemoteProject>,
    tasks: Vec<NewTask>,
    fail_list: Option<String>,
    fail_tasks: bool,
    list_calls: usize,
}

/// In-memory remote for testing. Cloning shares state.
#[derive(Clone, Default)]
pub struct InMemoryTodoist {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryTodoist {
    pub fn new(projects: Vec<RemoteProject>) -> Self {
        let remote = Self::default();
        remote.set_projects(projects);
        remote
    }

    /// Replace the remote project set.
    pub fn set_projects(&self, projects: Vec<RemoteProject>) {
        self.state.lock().unwrap().projects = projects;
    }

    /// Rename a project in place.
    pub fn rename(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(project) = state.projects.iter_mut().find(|p| p.id == id) {
            project.name = name.to_string();
        }
    }

    /// Make `list_projects` fail with a transport error (None to recover).
    pub fn fail_list_with(&self, message: Option<&str>) {
        self.state.lock().unwrap().fail_list = message.map(str::to_string);
    }

    /// Make `create_task` fail.
    pub fn fail_tasks(&self, fail: bool) {
        self.state.lock().unwrap().fail_tasks = fail;
    }

    /// Tasks created so far.
    pub fn created_tasks(&self) -> Vec<NewTask> {
        self.state.lock().unwrap().tasks.clone()
    }

    /// Number of `list_projects` calls so far.
    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

#[async_trait]
impl TodoistApi for InMemoryTodoist {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(message) = &state.fail_list {
            return Err(RemoteError::Transport(message.clone()));
        }
        Ok(state.projects.clone())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        let mut state = self.state.lock().unwrap();
        if state.fail_tasks {
            return Err(RemoteError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        state.tasks.push(task.clone());
        Ok(Task {
            id: format!("task-{}", state.tasks.len()),
            content: task.content.clone(),
            project_id: Some(task.project_id.clone()),
        })
    }
}
