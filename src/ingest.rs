use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{DeployMindError, Result};
use crate::models::{Conclusion, PullRequestRecord, RunRecord};

/// Workflow run as returned by the GitHub Actions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRun {
    pub created_at: Option<String>,
    #[serde(default)]
    pub run_started_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

/// Pull request as returned by the GitHub pulls API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPullRequest {
    pub created_at: Option<String>,
    #[serde(default)]
    pub merged_at: Option<String>,
}

/// Raw events for one repository. Also the input format of `compute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvents {
    #[serde(default)]
    pub workflow_runs: Vec<RawRun>,
    #[serde(default)]
    pub pull_requests: Vec<RawPullRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoEvents {
    pub runs: Vec<RunRecord>,
    pub pull_requests: Vec<PullRequestRecord>,
}

impl TryFrom<RawRun> for RunRecord {
    type Error = DeployMindError;

    fn try_from(raw: RawRun) -> Result<Self> {
        Ok(Self {
            created_at: required_timestamp("workflow run created_at", raw.created_at.as_deref())?,
            started_at: optional_timestamp("workflow run run_started_at", raw.run_started_at),
            updated_at: optional_timestamp("workflow run updated_at", raw.updated_at),
            conclusion: raw.conclusion.as_deref().map(Conclusion::from),
        })
    }
}

impl TryFrom<RawPullRequest> for PullRequestRecord {
    type Error = DeployMindError;

    fn try_from(raw: RawPullRequest) -> Result<Self> {
        Ok(Self {
            created_at: required_timestamp("pull request created_at", raw.created_at.as_deref())?,
            merged_at: optional_timestamp("pull request merged_at", raw.merged_at),
        })
    }
}

impl TryFrom<RawEvents> for RepoEvents {
    type Error = DeployMindError;

    fn try_from(raw: RawEvents) -> Result<Self> {
        Ok(Self {
            runs: convert_all(raw.workflow_runs)?,
            pull_requests: convert_all(raw.pull_requests)?,
        })
    }
}

pub fn convert_all<R, T>(raw: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = DeployMindError>,
{
    raw.into_iter().map(T::try_from).collect()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn required_timestamp(field: &str, value: Option<&str>) -> Result<DateTime<Utc>> {
    let value = value.ok_or_else(|| DeployMindError::InvalidDataError(format!("missing {field}")))?;

    parse_timestamp(value)
        .ok_or_else(|| DeployMindError::InvalidDataError(format!("unparseable {field}: '{value}'")))
}

// Optional timestamps that fail to parse only disqualify the record from
// timing statistics.
fn optional_timestamp(field: &str, value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    let parsed = parse_timestamp(&value);
    if parsed.is_none() {
        debug!("Ignoring unparseable {field}: '{value}'");
    }
    parsed
}
