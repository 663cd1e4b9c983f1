pub mod github;

use async_trait::async_trait;

use crate::error::Result;
use crate::ingest::RepoEvents;

/// Source of CI runs and pull requests for a repository.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn fetch_events(&self, repository: &str) -> Result<RepoEvents>;
}
