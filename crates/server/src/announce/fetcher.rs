//! GitHub GraphQL announcement fetching.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use relaymon_config::AnnouncementsConfig;

/// One published announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementItem {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Errors raised while pulling announcements.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("announcements repo not configured")]
    NotConfigured,

    #[error("github request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("github responded {0}")]
    Status(u16),

    #[error("unexpected github payload: {0}")]
    Decode(String),
}

/// Source of announcement items.
#[async_trait]
pub trait AnnouncementFetcher: Send + Sync {
    /// Pull the current announcement list, newest first.
    async fn fetch(&self) -> Result<Vec<AnnouncementItem>, FetchError>;
}

const DISCUSSIONS_QUERY: &str = "\
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    discussions(first: 50, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes { id number title url createdAt bodyText }
    }
  }
}";

/// Pulls announcements from a repository's discussions via the GitHub
/// GraphQL API.
pub struct GithubFetcher {
    client: reqwest::Client,
    config: AnnouncementsConfig,
}

impl GithubFetcher {
    /// Build a fetcher; the client honors `HTTPS_PROXY` from the
    /// environment.
    pub fn new(config: AnnouncementsConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("relaymon")
            .build()?;
        Ok(Self { client, config })
    }
}

/// Cap excerpts at 280 bytes on a char boundary.
fn truncate_excerpt(text: &str) -> String {
    const MAX: usize = 280;
    if text.len() <= MAX {
        return text.to_owned();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
}

#[derive(Deserialize)]
struct GraphqlData {
    repository: Option<GraphqlRepository>,
}

#[derive(Deserialize)]
struct GraphqlRepository {
    discussions: GraphqlDiscussions,
}

#[derive(Deserialize)]
struct GraphqlDiscussions {
    nodes: Vec<GraphqlDiscussion>,
}

#[derive(Deserialize)]
struct GraphqlDiscussion {
    id: String,
    number: u64,
    title: String,
    url: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "bodyText", default)]
    body_text: Option<String>,
}

#[async_trait]
impl AnnouncementFetcher for GithubFetcher {
    async fn fetch(&self) -> Result<Vec<AnnouncementItem>, FetchError> {
        let repo = self
            .config
            .repo
            .as_deref()
            .ok_or(FetchError::NotConfigured)?;
        let (owner, name) = repo
            .split_once('/')
            .ok_or_else(|| FetchError::Decode(format!("repo {repo:?} must be owner/name")))?;

        let mut request = self.client.post(&self.config.graphql_url).json(&serde_json::json!({
            "query": DISCUSSIONS_QUERY,
            "variables": { "owner": owner, "name": name },
        }));
        if let Some(ref token) = self.config.github_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let code = response.status().as_u16();
        if !(200..300).contains(&code) {
            return Err(FetchError::Status(code));
        }
        let payload: GraphqlResponse = response.json().await?;
        let nodes = payload
            .data
            .and_then(|d| d.repository)
            .map(|r| r.discussions.nodes)
            .ok_or_else(|| FetchError::Decode("missing repository data".into()))?;

        let horizon = Utc::now() - chrono::Duration::days(i64::from(self.config.window_days));
        Ok(nodes
            .into_iter()
            .filter(|n| n.created_at >= horizon)
            .map(|n| AnnouncementItem {
                id: n.id,
                number: n.number,
                title: n.title,
                url: n.url,
                created_at: n.created_at,
                excerpt: n.body_text.as_deref().map(truncate_excerpt),
            })
            .collect())
    }
}
