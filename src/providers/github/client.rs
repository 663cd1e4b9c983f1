use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::Token;
use crate::error::{DeployMindError, Result};
use crate::ingest::{RawPullRequest, RawRun};

const USER_AGENT: &str = concat!("DeployMind/", env!("CARGO_PKG_VERSION"));

pub struct GitHubClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    workflow_runs: Vec<RawRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DeployMindError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        // Keep any path prefix (GitHub Enterprise serves the API under /api/v3)
        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        let api_url = Url::parse(&base_url)
            .map_err(|e| DeployMindError::ConfigError(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| DeployMindError::ConfigError(format!("Invalid API URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fetch the most recent workflow runs of a repository, newest first.
    pub async fn fetch_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        per_page: u8,
    ) -> Result<Vec<RawRun>> {
        let url = self.endpoint(&["repos", owner, repo, "actions", "runs"])?;
        let request = self
            .client
            .get(url)
            .query(&[("per_page", per_page)]);

        let response = self.auth_request(request).send().await?.error_for_status()?;
        let page = response.json::<WorkflowRunsPage>().await?;
        Ok(page.workflow_runs)
    }

    /// Fetch open, closed and merged pull requests of a repository.
    pub async fn fetch_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        per_page: u8,
    ) -> Result<Vec<RawPullRequest>> {
        let url = self.endpoint(&["repos", owner, repo, "pulls"])?;
        let request = self
            .client
            .get(url)
            .query(&[("state", "all")])
            .query(&[("per_page", per_page)]);

        let response = self.auth_request(request).send().await?.error_for_status()?;
        let pull_requests = response.json::<Vec<RawPullRequest>>().await?;
        Ok(pull_requests)
    }

    /// Repositories of the authenticated user, most recently updated first.
    pub async fn fetch_user_repos(&self) -> Result<Vec<GitHubRepo>> {
        if self.token.is_none() {
            return Err(DeployMindError::ConfigError(
                "A GitHub token is required to list repositories".to_string(),
            ));
        }

        let url = self.endpoint(&["user", "repos"])?;
        let request = self
            .client
            .get(url)
            .query(&[("sort", "updated"), ("per_page", "100")]);

        let response = self.auth_request(request).send().await?.error_for_status()?;
        let repos = response.json::<Vec<GitHubRepo>>().await?;
        Ok(repos)
    }
}
