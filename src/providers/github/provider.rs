use async_trait::async_trait;
use log::{info, warn};

use super::client::GitHubClient;
use crate::auth::Token;
use crate::error::{DeployMindError, Result};
use crate::ingest::{convert_all, RepoEvents};
use crate::providers::Provider;

/// GitHub caps `per_page` at 100.
const MAX_PER_PAGE: usize = 100;

pub struct GitHubProvider {
    client: GitHubClient,
    per_page: u8,
}

impl GitHubProvider {
    pub fn new(base_url: &str, token: Option<Token>, limit: usize) -> Result<Self> {
        let client = GitHubClient::new(base_url, token)?;

        #[allow(clippy::cast_possible_truncation)]
        let per_page = limit.clamp(1, MAX_PER_PAGE) as u8;

        Ok(Self { client, per_page })
    }
}

/// Splits `owner/name` into its two parts.
pub fn split_repository(repository: &str) -> Result<(&str, &str)> {
    match repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(DeployMindError::ConfigError(format!(
            "Repository must be given as 'owner/name', got '{repository}'"
        ))),
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    async fn fetch_events(&self, repository: &str) -> Result<RepoEvents> {
        let (owner, name) = split_repository(repository)?;

        info!(
            "Fetching up to {} workflow runs and pull requests for {repository}...",
            self.per_page
        );

        let (raw_runs, raw_pull_requests) = futures::try_join!(
            self.client.fetch_workflow_runs(owner, name, self.per_page),
            self.client.fetch_pull_requests(owner, name, self.per_page),
        )?;

        let events = RepoEvents {
            runs: convert_all(raw_runs)?,
            pull_requests: convert_all(raw_pull_requests)?,
        };

        info!(
            "Fetched {} workflow runs and {} pull requests",
            events.runs.len(),
            events.pull_requests.len()
        );
        if events.runs.is_empty() {
            warn!("No workflow runs found for repository: {repository}");
        }

        Ok(events)
    }
}
