//! Todoist REST client.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use todoist_sync::remote::{NewTask, RemoteError, Result, Task, TodoistApi};
use todoist_sync::RemoteProject;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Todoist REST API client authenticated with a bearer token.
pub struct RestClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("todoist-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TodoistApi for RestClient {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let response = self
            .http
            .get(self.url("projects"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let projects: Vec<RemoteProject> = Self::decode(response).await?;
        tracing::debug!("Fetched {} projects", projects.len());
        Ok(projects)
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        let response = self
            .http
            .post(self.url("tasks"))
            .bearer_auth(&self.token)
            .json(task)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Self::decode(response).await
    }
}
