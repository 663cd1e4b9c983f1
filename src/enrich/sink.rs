use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::auth::Token;
use crate::error::{DeployMindError, Result};
use crate::models::MetricsSnapshot;

/// Stores computed snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn save(&self, repository: &str, metrics: &MetricsSnapshot) -> Result<()>;
}

/// Persists a snapshot, logging instead of propagating failures.
pub async fn save_best_effort(sink: &dyn SnapshotSink, repository: &str, metrics: &MetricsSnapshot) {
    if let Err(e) = sink.save(repository, metrics).await {
        error!("Failed to save metrics snapshot for {repository}: {e}");
    }
}

#[derive(Debug, Serialize)]
struct RepoMetricsRow<'a> {
    repo_name: &'a str,
    success_rate: f64,
    avg_build_time: f64,
    deployment_frequency: f64,
}

struct SupabaseTarget {
    table_url: Url,
    key: Token,
}

/// Inserts snapshots into the `repo_metrics` table through PostgREST.
/// Without usable credentials the sink is disabled and `save` does nothing.
pub struct SupabaseSink {
    client: Client,
    target: Option<SupabaseTarget>,
}

fn table_url(url: &str) -> std::result::Result<Url, url::ParseError> {
    Url::parse(&format!("{}/", url.trim_end_matches('/')))?.join("rest/v1/repo_metrics")
}

impl SupabaseSink {
    pub fn new(url: Option<&str>, key: Option<Token>) -> Self {
        let target = match (url, key) {
            (Some(url), Some(key)) => match table_url(url) {
                Ok(table_url) => Some(SupabaseTarget { table_url, key }),
                Err(e) => {
                    warn!("Invalid Supabase URL {url:?}: {e}. Snapshots will not be persisted.");
                    None
                }
            },
            _ => {
                warn!("Supabase credentials missing. Snapshots will not be persisted.");
                None
            }
        };

        Self {
            client: Client::new(),
            target,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }
}

#[async_trait]
impl SnapshotSink for SupabaseSink {
    async fn save(&self, repository: &str, metrics: &MetricsSnapshot) -> Result<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };

        let rows = [RepoMetricsRow {
            repo_name: repository,
            success_rate: metrics.success_rate,
            avg_build_time: metrics.avg_build_time,
            deployment_frequency: metrics.deployment_frequency,
        }];

        let response = self
            .client
            .post(target.table_url.clone())
            .header("apikey", target.key.as_str())
            .bearer_auth(target.key.as_str())
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeployMindError::ApiError(format!(
                "Supabase insert failed: {status} - {body}"
            )));
        }

        info!("Saved metrics snapshot for {repository}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SuccessVsFailure, Trends};
    use mockito::Matcher;
    use serde_json::json;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            deployment_frequency: 3.5,
            success_rate: 90.0,
            avg_build_time: 6.25,
            pr_merge_frequency: 1.0,
            health_score: 71,
            trends: Trends {
                deployments: vec![],
                build_durations: vec![],
                success_vs_failure: SuccessVsFailure {
                    success: 9,
                    failure: 1,
                },
                pr_activity: vec![],
            },
        }
    }

    #[test]
    fn test_missing_credentials_disable_sink() {
        assert!(!SupabaseSink::new(None, None).is_enabled());
        assert!(!SupabaseSink::new(Some("https://x.supabase.co"), None).is_enabled());
        assert!(!SupabaseSink::new(None, Some(Token::from("key"))).is_enabled());
        assert!(
            SupabaseSink::new(Some("https://x.supabase.co"), Some(Token::from("key"))).is_enabled()
        );
    }

    #[tokio::test]
    async fn test_invalid_url_disables_sink() {
        for url in ["::nope", "project.supabase.co"] {
            let sink = SupabaseSink::new(Some(url), Some(Token::from("key")));

            assert!(!sink.is_enabled(), "{url} should disable persistence");
            assert!(sink.save("octo/app", &snapshot()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_disabled_sink_save_is_noop() {
        let sink = SupabaseSink::new(None, None);

        assert!(sink.save("octo/app", &snapshot()).await.is_ok());
    }

    #[tokio::test]
    async fn test_save_inserts_row() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/repo_metrics")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .match_header("prefer", "return=minimal")
            .match_body(Matcher::Json(json!([{
                "repo_name": "octo/app",
                "success_rate": 90.0,
                "avg_build_time": 6.25,
                "deployment_frequency": 3.5
            }])))
            .with_status(201)
            .create_async()
            .await;

        let sink = SupabaseSink::new(Some(&server.url()), Some(Token::from("anon-key")));
        sink.save("octo/app", &snapshot()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_save_reports_insert_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/v1/repo_metrics")
            .with_status(401)
            .with_body(r#"{"message": "Invalid API key"}"#)
            .create_async()
            .await;

        let sink = SupabaseSink::new(Some(&server.url()), Some(Token::from("bad")));
        let err = sink.save("octo/app", &snapshot()).await.unwrap_err();

        assert!(err.to_string().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_save_best_effort_swallows_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/repo_metrics")
            .with_status(500)
            .create_async()
            .await;

        let sink = SupabaseSink::new(Some(&server.url()), Some(Token::from("anon-key")));
        save_best_effort(&sink, "octo/app", &snapshot()).await;

        mock.assert_async().await;
    }
}
