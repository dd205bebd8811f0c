//! Minimal direct-HTTP GitLab tracker client (issues and merge requests).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Comment, TrackerError, TrackerTask};
use crate::domain::TaskKey;

const TRIGGER_LABEL: &str = "agent-queue";
const IN_PROGRESS_LABEL: &str = "agent-in-progress";

pub struct GitlabTracker {
    key: TaskKey,
    http: Client,
    token: String,
    base_url: String,
}

impl GitlabTracker {
    pub fn new(key: TaskKey, token: String) -> Self {
        Self {
            key,
            http: Client::new(),
            token,
            base_url: "https://gitlab.com/api/v4".to_string(),
        }
    }

    fn coords(&self) -> (u64, u64) {
        match &self.key {
            TaskKey::GitlabIssue { project_id, iid } | TaskKey::GitlabMergeRequest { project_id, iid } => {
                (*project_id, *iid)
            }
            _ => unreachable!("GitlabTracker constructed with a non-GitLab TaskKey"),
        }
    }

    fn resource_kind(&self) -> &'static str {
        match &self.key {
            TaskKey::GitlabIssue { .. } => "issues",
            TaskKey::GitlabMergeRequest { .. } => "merge_requests",
            _ => unreachable!("GitlabTracker constructed with a non-GitLab TaskKey"),
        }
    }

    fn resource_url(&self) -> String {
        let (project_id, iid) = self.coords();
        format!("{}/projects/{}/{}/{}", self.base_url, project_id, self.resource_kind(), iid)
    }

    async fn request(&self, method: reqwest::Method, url: &str, body: Option<serde_json::Value>) -> Result<reqwest::Response, TrackerError> {
        let mut req = self.http.request(method, url).header("PRIVATE-TOKEN", &self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api { status, message });
        }
        Ok(response)
    }

    async fn set_labels(&self, labels: &str) -> Result<(), TrackerError> {
        self.request(reqwest::Method::PUT, &self.resource_url(), Some(serde_json::json!({ "labels": labels })))
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct GitlabResource {
    title: String,
    description: Option<String>,
    labels: Vec<String>,
    assignees: Vec<GitlabUser>,
}

#[derive(Deserialize)]
struct GitlabUser {
    username: String,
}

#[derive(Deserialize)]
struct GitlabNote {
    id: u64,
    body: String,
    author: GitlabUser,
    created_at: String,
}

#[async_trait]
impl TrackerTask for GitlabTracker {
    fn key(&self) -> &TaskKey {
        &self.key
    }

    async fn comment(&self, text: &str) -> Result<String, TrackerError> {
        debug!(%text, "GitlabTracker::comment: called");
        let url = format!("{}/notes", self.resource_url());
        let response = self
            .request(reqwest::Method::POST, &url, Some(serde_json::json!({ "body": text })))
            .await?;
        let note: GitlabNote = response.json().await?;
        Ok(note.id.to_string())
    }

    async fn update_comment(&self, id: &str, text: &str) -> Result<(), TrackerError> {
        let url = format!("{}/notes/{id}", self.resource_url());
        self.request(reqwest::Method::PUT, &url, Some(serde_json::json!({ "body": text })))
            .await?;
        Ok(())
    }

    async fn get_comments(&self) -> Result<Vec<Comment>, TrackerError> {
        let url = format!("{}/notes", self.resource_url());
        let response = self.request(reqwest::Method::GET, &url, None).await?;
        let notes: Vec<GitlabNote> = response.json().await?;
        Ok(notes
            .into_iter()
            .map(|n| Comment {
                id: n.id.to_string(),
                author: n.author.username,
                body: n.body,
                created_at: chrono::DateTime::parse_from_rfc3339(&n.created_at)
                    .map(|d| d.timestamp())
                    .unwrap_or(0),
            })
            .collect())
    }

    async fn get_assignees(&self) -> Result<Vec<String>, TrackerError> {
        let response = self.request(reqwest::Method::GET, &self.resource_url(), None).await?;
        let resource: GitlabResource = response.json().await?;
        Ok(resource.assignees.into_iter().map(|u| u.username).collect())
    }

    async fn prepare(&self) -> Result<(), TrackerError> {
        let response = self.request(reqwest::Method::GET, &self.resource_url(), None).await?;
        let resource: GitlabResource = response.json().await?;
        let mut labels: Vec<String> = resource.labels.into_iter().filter(|l| l != TRIGGER_LABEL).collect();
        labels.push(IN_PROGRESS_LABEL.to_string());
        self.set_labels(&labels.join(",")).await
    }

    async fn finish(&self) -> Result<(), TrackerError> {
        self.flip_label("agent-done").await
    }

    async fn finish_stopped(&self) -> Result<(), TrackerError> {
        self.flip_label("agent-stopped").await
    }

    async fn finish_paused(&self) -> Result<(), TrackerError> {
        self.flip_label("agent-paused").await
    }

    async fn finish_failed(&self) -> Result<(), TrackerError> {
        self.flip_label("agent-failed").await
    }

    async fn get_prompt(&self) -> Result<String, TrackerError> {
        let response = self.request(reqwest::Method::GET, &self.resource_url(), None).await?;
        let resource: GitlabResource = response.json().await?;
        let comments = self.get_comments().await.unwrap_or_default();
        let mut prompt = format!("# {}\n\n{}", resource.title, resource.description.unwrap_or_default());
        for comment in comments {
            prompt.push_str(&format!("\n\n---\n{}: {}", comment.author, comment.body));
        }
        Ok(prompt)
    }
}

impl GitlabTracker {
    async fn flip_label(&self, label: &'static str) -> Result<(), TrackerError> {
        let response = self.request(reqwest::Method::GET, &self.resource_url(), None).await?;
        let resource: GitlabResource = response.json().await?;
        let mut labels: Vec<String> = resource.labels.into_iter().filter(|l| l != IN_PROGRESS_LABEL).collect();
        labels.push(label.to_string());
        self.set_labels(&labels.join(",")).await
    }
}

#[derive(Deserialize)]
struct GitlabSearchItem {
    iid: u64,
    author: GitlabUser,
}

/// List every open issue/MR in `project_id` still carrying the trigger
/// label, most-recently-updated first.
pub async fn list_trigger_items(project_id: u64, resource_kind: &str, token: &str) -> Result<Vec<(TaskKey, String)>, TrackerError> {
    let http = Client::new();
    let url = format!(
        "https://gitlab.com/api/v4/projects/{project_id}/{resource_kind}?labels={TRIGGER_LABEL}&state=opened&order_by=updated_at&sort=desc"
    );
    let response = http.get(&url).header("PRIVATE-TOKEN", token).send().await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(TrackerError::Api { status, message });
    }
    let items: Vec<GitlabSearchItem> = response.json().await?;
    Ok(items
        .into_iter()
        .map(|item| {
            let key = if resource_kind == "merge_requests" {
                TaskKey::GitlabMergeRequest { project_id, iid: item.iid }
            } else {
                TaskKey::GitlabIssue { project_id, iid: item.iid }
            };
            (key, item.author.username)
        })
        .collect())
}
