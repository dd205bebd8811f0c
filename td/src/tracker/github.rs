//! Minimal direct-HTTP GitHub tracker client (issues and pull requests).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Comment, TrackerError, TrackerTask};
use crate::domain::TaskKey;

const TRIGGER_LABEL: &str = "agent-queue";
const IN_PROGRESS_LABEL: &str = "agent-in-progress";

pub struct GithubTracker {
    key: TaskKey,
    http: Client,
    token: String,
}

impl GithubTracker {
    pub fn new(key: TaskKey, token: String) -> Self {
        Self {
            key,
            http: Client::new(),
            token,
        }
    }

    fn coords(&self) -> (String, String, u64) {
        match &self.key {
            TaskKey::GithubIssue { owner, repo, number } | TaskKey::GithubPullRequest { owner, repo, number } => {
                (owner.clone(), repo.clone(), *number)
            }
            _ => unreachable!("GithubTracker constructed with a non-GitHub TaskKey"),
        }
    }

    fn issues_url(&self) -> String {
        let (owner, repo, number) = self.coords();
        format!("https://api.github.com/repos/{owner}/{repo}/issues/{number}")
    }

    async fn request(&self, method: reqwest::Method, url: &str, body: Option<serde_json::Value>) -> Result<reqwest::Response, TrackerError> {
        let mut req = self
            .http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "agentd")
            .header("Accept", "application/vnd.github+json");
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
}

#[derive(Deserialize)]
struct GithubIssue {
    title: String,
    body: Option<String>,
}

#[derive(Deserialize)]
struct GithubComment {
    id: u64,
    body: Option<String>,
    user: GithubUser,
    created_at: String,
}

#[derive(Deserialize)]
struct GithubUser {
    login: String,
}

#[async_trait]
impl TrackerTask for GithubTracker {
    fn key(&self) -> &TaskKey {
        &self.key
    }

    async fn comment(&self, text: &str) -> Result<String, TrackerError> {
        debug!(%text, "GithubTracker::comment: called");
        let url = format!("{}/comments", self.issues_url());
        let response = self
            .request(reqwest::Method::POST, &url, Some(serde_json::json!({ "body": text })))
            .await?;
        let comment: GithubComment = response.json().await?;
        Ok(comment.id.to_string())
    }

    async fn update_comment(&self, id: &str, text: &str) -> Result<(), TrackerError> {
        let (owner, repo, _) = self.coords();
        let url = format!("https://api.github.com/repos/{owner}/{repo}/issues/comments/{id}");
        self.request(reqwest::Method::PATCH, &url, Some(serde_json::json!({ "body": text })))
            .await?;
        Ok(())
    }

    async fn get_comments(&self) -> Result<Vec<Comment>, TrackerError> {
        let url = format!("{}/comments", self.issues_url());
        let response = self.request(reqwest::Method::GET, &url, None).await?;
        let comments: Vec<GithubComment> = response.json().await?;
        Ok(comments
            .into_iter()
            .map(|c| Comment {
                id: c.id.to_string(),
                author: c.user.login,
                body: c.body.unwrap_or_default(),
                created_at: chrono::DateTime::parse_from_rfc3339(&c.created_at)
                    .map(|d| d.timestamp())
                    .unwrap_or(0),
            })
            .collect())
    }

    async fn get_assignees(&self) -> Result<Vec<String>, TrackerError> {
        let response = self.request(reqwest::Method::GET, &self.issues_url(), None).await?;
        let value: serde_json::Value = response.json().await?;
        let assignees = value["assignees"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|a| a["login"].as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(assignees)
    }

    async fn prepare(&self) -> Result<(), TrackerError> {
        let url = format!("{}/labels", self.issues_url());
        self.request(
            reqwest::Method::POST,
            &url,
            Some(serde_json::json!({ "labels": [IN_PROGRESS_LABEL] })),
        )
        .await?;
        let remove_url = format!("{}/labels/{TRIGGER_LABEL}", self.issues_url());
        let _ = self.request(reqwest::Method::DELETE, &remove_url, None).await;
        Ok(())
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
        let response = self.request(reqwest::Method::GET, &self.issues_url(), None).await?;
        let issue: GithubIssue = response.json().await?;
        let comments = self.get_comments().await.unwrap_or_default();
        let mut prompt = format!("# {}\n\n{}", issue.title, issue.body.unwrap_or_default());
        for comment in comments {
            prompt.push_str(&format!("\n\n---\n{}: {}", comment.author, comment.body));
        }
        Ok(prompt)
    }
}

impl GithubTracker {
    async fn flip_label(&self, label: &'static str) -> Result<(), TrackerError> {
        let remove_url = format!("{}/labels/{IN_PROGRESS_LABEL}", self.issues_url());
        let _ = self.request(reqwest::Method::DELETE, &remove_url, None).await;
        let add_url = format!("{}/labels", self.issues_url());
        self.request(reqwest::Method::POST, &add_url, Some(serde_json::json!({ "labels": [label] })))
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct GithubSearchResponse {
    items: Vec<GithubSearchItem>,
}

#[derive(Deserialize)]
struct GithubSearchItem {
    number: u64,
    user: GithubUser,
    pull_request: Option<serde_json::Value>,
}

/// List every open issue/PR in `owner/repo` still carrying the trigger
/// label, most-recently-updated first. Used by the producer loop; the
/// requester is the issue/PR author (GitHub search has no "assignee at
/// creation" concept to fall back to).
pub async fn list_trigger_items(owner: &str, repo: &str, token: &str) -> Result<Vec<(TaskKey, String)>, TrackerError> {
    let http = Client::new();
    let query = format!("repo:{owner}/{repo} label:{TRIGGER_LABEL} state:open");
    let url = format!("https://api.github.com/search/issues?q={}&sort=updated&order=desc", urlencoding_simple(&query));
    let response = http
        .get(&url)
        .header("Authorization", format!("Bearer {token}"))
        .header("User-Agent", "agentd")
        .header("Accept", "application/vnd.github+json")
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(TrackerError::Api { status, message });
    }
    let parsed: GithubSearchResponse = response.json().await?;
    Ok(parsed
        .items
        .into_iter()
        .map(|item| {
            let key = if item.pull_request.is_some() {
                TaskKey::GithubPullRequest {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    number: item.number,
                }
            } else {
                TaskKey::GithubIssue {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    number: item.number,
                }
            };
            (key, item.user.login)
        })
        .collect())
}

fn urlencoding_simple(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => "+".to_string(),
            c if c.is_alphanumeric() || c == ':' || c == '/' || c == '-' || c == '_' => c.to_string(),
            c => format!("%{:02X}", c as u32),
        })
        .collect()
}
