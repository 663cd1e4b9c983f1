use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of a CI run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Other,
}

impl From<&str> for Conclusion {
    fn from(value: &str) -> Self {
        match value {
            "success" => Self::Success,
            "failure" | "timed_out" | "startup_failure" => Self::Failure,
            "cancelled" => Self::Cancelled,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// `None` while the run is still in progress.
    pub conclusion: Option<Conclusion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestRecord {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Runs per observed calendar week.
    pub deployment_frequency: f64,
    /// Percentage of runs that concluded successfully, in `[0, 100]`.
    pub success_rate: f64,
    /// Average duration of eligible runs, in minutes.
    pub avg_build_time: f64,
    /// Merged pull requests per observed calendar week.
    pub pr_merge_frequency: f64,
    pub health_score: u8,
    pub trends: Trends,
}

impl MetricsSnapshot {
    /// Pipelines below 70% success are flagged as high risk.
    pub fn is_high_risk(&self) -> bool {
        self.success_rate < 70.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trends {
    pub deployments: Vec<WeeklyCount>,
    pub build_durations: Vec<BuildDuration>,
    pub success_vs_failure: SuccessVsFailure,
    pub pr_activity: Vec<WeeklyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCount {
    /// Week key (`YYYY-MM-DD` of the week's first day).
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDuration {
    pub date: String,
    /// Whole minutes.
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessVsFailure {
    pub success: usize,
    pub failure: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub repository: String,
    pub collected_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    pub insights: Option<String>,
}
