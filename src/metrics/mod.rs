mod buckets;
mod score;

use chrono::{DateTime, Utc};

use crate::models::{
    BuildDuration, Conclusion, MetricsSnapshot, PullRequestRecord, RunRecord, SuccessVsFailure,
    Trends,
};

pub use score::HealthComponents;

/// Number of build durations kept in the trend series.
pub const BUILD_DURATION_TREND_LEN: usize = 10;

/// Computes the DevOps metrics snapshot for a set of runs and pull requests.
///
/// Frequencies are expressed per calendar week observed in the runs. The
/// week count is floored at one, so empty input never divides by zero and
/// pull request velocity shares the deployment observation window.
pub fn compute_metrics(runs: &[RunRecord], pull_requests: &[PullRequestRecord]) -> MetricsSnapshot {
    let runs_by_week = buckets::bucket_by_week(runs.iter().map(|r| r.created_at));
    let weeks = runs_by_week.len().max(1);

    let total_runs = runs.len();
    let successful_runs = runs
        .iter()
        .filter(|r| r.conclusion == Some(Conclusion::Success))
        .count();

    let deployment_frequency = per_week(total_runs, weeks);
    let success_rate = calculate_success_rate(successful_runs, total_runs);

    let timed_runs: Vec<_> = runs
        .iter()
        .filter_map(|run| build_duration_minutes(run).map(|minutes| (run.created_at, minutes)))
        .collect();
    let avg_build_time = calculate_avg_build_time(&timed_runs);

    let merged = pull_requests.iter().filter(|pr| pr.is_merged()).count();
    let pr_merge_frequency = per_week(merged, weeks);

    let health_score = HealthComponents::new(
        success_rate,
        deployment_frequency,
        avg_build_time,
        pr_merge_frequency,
    )
    .score();

    let prs_by_week = buckets::bucket_by_week(pull_requests.iter().map(|pr| pr.created_at));

    MetricsSnapshot {
        deployment_frequency,
        success_rate,
        avg_build_time,
        pr_merge_frequency,
        health_score,
        trends: Trends {
            deployments: buckets::into_series(runs_by_week),
            build_durations: recent_build_durations(timed_runs),
            success_vs_failure: SuccessVsFailure {
                success: successful_runs,
                failure: total_runs - successful_runs,
            },
            pr_activity: buckets::into_series(prs_by_week),
        },
    }
}

/// Whole minutes between start and last update, truncated toward zero.
/// Only concluded runs with a positive duration are eligible.
fn build_duration_minutes(run: &RunRecord) -> Option<i64> {
    run.conclusion?;
    let started_at = run.started_at?;
    let updated_at = run.updated_at?;

    let minutes = (updated_at - started_at).num_minutes();
    (minutes > 0).then_some(minutes)
}

fn per_week(count: usize, weeks: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let frequency = count as f64 / weeks.max(1) as f64;
    frequency
}

fn calculate_success_rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let rate = (successful as f64 / total as f64) * 100.0;
    rate
}

fn calculate_avg_build_time(timed_runs: &[(DateTime<Utc>, i64)]) -> f64 {
    if timed_runs.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let avg = timed_runs.iter().map(|(_, minutes)| *minutes as f64).sum::<f64>()
        / timed_runs.len() as f64;
    avg
}

/// Keeps the most recent eligible runs, oldest first. Runs created at the
/// same instant keep their input order.
fn recent_build_durations(mut timed_runs: Vec<(DateTime<Utc>, i64)>) -> Vec<BuildDuration> {
    timed_runs.sort_by_key(|(created_at, _)| *created_at);

    let start = timed_runs.len().saturating_sub(BUILD_DURATION_TREND_LEN);
    timed_runs
        .into_iter()
        .skip(start)
        .map(|(created_at, duration)| BuildDuration {
            date: created_at.format("%b %d").to_string(),
            duration,
        })
        .collect()
}
