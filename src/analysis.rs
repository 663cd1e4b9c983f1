use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::enrich::{save_best_effort, InsightGenerator, SnapshotSink};
use crate::error::DeployMindError;
use crate::metrics::compute_metrics;
use crate::models::MetricsSnapshot;
use crate::providers::Provider;

pub const ANALYSIS_FAILED_MESSAGE: &str = "Analysis failed. Please check repository permissions.";
const INSIGHTS_UNAVAILABLE: &str = "⚠️ **Insights unavailable**";

/// Identifies one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

/// Hands out strictly increasing tickets. Only the most recently issued
/// ticket is current.
#[derive(Debug, Default)]
pub struct RequestGate {
    latest: AtomicU64,
}

impl RequestGate {
    pub fn issue(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// What an observer of the analysis currently sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisView {
    pub repository: Option<String>,
    pub metrics: Option<MetricsSnapshot>,
    pub insights: Option<String>,
    pub error: Option<String>,
    pub loading: bool,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed,
    Failed(DeployMindError),
    /// A newer request was issued; nothing from this one became visible.
    Superseded,
}

pub struct Analyzer {
    provider: Box<dyn Provider>,
    insights: Box<dyn InsightGenerator>,
    sink: Box<dyn SnapshotSink>,
    gate: RequestGate,
    view: watch::Sender<AnalysisView>,
}

impl Analyzer {
    pub fn new(
        provider: Box<dyn Provider>,
        insights: Box<dyn InsightGenerator>,
        sink: Box<dyn SnapshotSink>,
    ) -> Self {
        let (view, _) = watch::channel(AnalysisView::default());

        Self {
            provider,
            insights,
            sink,
            gate: RequestGate::default(),
            view,
        }
    }

    pub fn view(&self) -> AnalysisView {
        self.view.borrow().clone()
    }

    /// Receives every published change to the view.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisView> {
        self.view.subscribe()
    }

    /// Fetches, scores and enriches `repository`. Results are published to
    /// the view only while this is the latest request.
    pub async fn analyze(&self, repository: &str) -> AnalysisOutcome {
        let ticket = self.dispatch(repository);
        let outcome = self.run(ticket, repository).await;
        self.commit(ticket, |view| view.loading = false);
        outcome
    }

    // Issuing the ticket under the view lock orders it against every commit.
    fn dispatch(&self, repository: &str) -> RequestTicket {
        let mut ticket = RequestTicket(0);
        self.view.send_modify(|view| {
            ticket = self.gate.issue();
            *view = AnalysisView {
                repository: Some(repository.to_string()),
                loading: true,
                ..AnalysisView::default()
            };
        });
        ticket
    }

    fn commit(&self, ticket: RequestTicket, update: impl FnOnce(&mut AnalysisView)) -> bool {
        self.view.send_if_modified(|view| {
            if !self.gate.is_current(ticket) {
                return false;
            }
            update(view);
            true
        })
    }

    async fn run(&self, ticket: RequestTicket, repository: &str) -> AnalysisOutcome {
        let events = match self.provider.fetch_events(repository).await {
            Ok(events) => events,
            Err(e) => {
                if !self.commit(ticket, |view| {
                    view.error = Some(ANALYSIS_FAILED_MESSAGE.to_string());
                }) {
                    debug!("Discarding failure of superseded analysis for {repository}");
                    return AnalysisOutcome::Superseded;
                }
                error!("Analysis of {repository} failed: {e}");
                return AnalysisOutcome::Failed(e);
            }
        };

        let metrics = compute_metrics(&events.runs, &events.pull_requests);
        info!(
            "Computed health score {}/100 for {repository} ({})",
            metrics.health_score,
            if metrics.is_high_risk() {
                "high risk"
            } else {
                "healthy"
            }
        );

        if !self.commit(ticket, |view| view.metrics = Some(metrics.clone())) {
            debug!("Discarding superseded metrics for {repository}");
            return AnalysisOutcome::Superseded;
        }

        let insights = match self.insights.generate(repository, &metrics).await {
            Ok(text) => text.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                warn!("Insight generation failed for {repository}: {e}");
                Some(format!("{INSIGHTS_UNAVAILABLE}: {e}"))
            }
        };

        if !self.commit(ticket, |view| view.insights = insights) {
            debug!("Discarding superseded insights for {repository}");
            return AnalysisOutcome::Superseded;
        }

        if !self.gate.is_current(ticket) {
            debug!("Skipping persistence of superseded analysis for {repository}");
            return AnalysisOutcome::Superseded;
        }
        save_best_effort(self.sink.as_ref(), repository, &metrics).await;

        AnalysisOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use tokio::sync::Notify;

    use crate::error::Result;
    use crate::ingest::RepoEvents;
    use crate::models::{Conclusion, RunRecord};

    fn events(successes: usize, failures: usize) -> RepoEvents {
        let created_at = DateTime::parse_from_rfc3339("2024-01-08T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let run = |conclusion| RunRecord {
            created_at,
            started_at: Some(created_at),
            updated_at: Some(created_at + Duration::minutes(4)),
            conclusion: Some(conclusion),
        };

        RepoEvents {
            runs: std::iter::repeat_with(|| run(Conclusion::Success))
                .take(successes)
                .chain(std::iter::repeat_with(|| run(Conclusion::Failure)).take(failures))
                .collect(),
            pull_requests: vec![],
        }
    }

    /// `octo/slow` blocks until released, `octo/broken` fails, anything
    /// else returns one successful run.
    #[derive(Default)]
    struct FakeProvider {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn fetch_events(&self, repository: &str) -> Result<RepoEvents> {
            match repository {
                "octo/slow" => {
                    self.release.notified().await;
                    Ok(events(0, 4))
                }
                "octo/broken" => Err(DeployMindError::ApiError("404 Not Found".to_string())),
                _ => Ok(events(1, 0)),
            }
        }
    }

    struct CannedInsights(Result<Option<String>>);

    #[async_trait]
    impl InsightGenerator for CannedInsights {
        async fn generate(&self, _: &str, _: &MetricsSnapshot) -> Result<Option<String>> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(DeployMindError::ApiError(e.to_string())),
            }
        }
    }

    #[derive(Default, Clone)]
    struct RecordingSink {
        saved: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl SnapshotSink for RecordingSink {
        async fn save(&self, repository: &str, _: &MetricsSnapshot) -> Result<()> {
            self.saved.lock().unwrap().push(repository.to_string());
            if self.fail {
                return Err(DeployMindError::ApiError("insert rejected".to_string()));
            }
            Ok(())
        }
    }

    fn analyzer(provider: FakeProvider, sink: RecordingSink) -> Analyzer {
        Analyzer::new(
            Box::new(provider),
            Box::new(CannedInsights(Ok(Some("## Healthy".to_string())))),
            Box::new(sink),
        )
    }

    #[test]
    fn test_gate_issues_increasing_tickets() {
        let gate = RequestGate::default();

        let first = gate.issue();
        let second = gate.issue();

        assert!(second > first);
        assert!(!gate.is_current(first));
        assert!(gate.is_current(second));
    }

    #[test]
    fn test_gate_shared_across_threads() {
        let gate = Arc::new(RequestGate::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || (0..100).map(|_| gate.issue()).collect::<Vec<_>>())
            })
            .collect();
        let mut tickets: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        tickets.sort();
        tickets.dedup();

        assert_eq!(tickets.len(), 400);
        assert!(gate.is_current(*tickets.last().unwrap()));
    }

    #[tokio::test]
    async fn test_analyze_publishes_metrics_and_insights() {
        let sink = RecordingSink::default();
        let analyzer = analyzer(FakeProvider::default(), sink.clone());

        let outcome = analyzer.analyze("octo/app").await;

        assert!(matches!(outcome, AnalysisOutcome::Completed));
        let view = analyzer.view();
        assert_eq!(view.repository.as_deref(), Some("octo/app"));
        assert_eq!(view.metrics.unwrap().success_rate, 100.0);
        assert_eq!(view.insights.as_deref(), Some("## Healthy"));
        assert!(view.error.is_none());
        assert!(!view.loading);
        assert_eq!(*sink.saved.lock().unwrap(), vec!["octo/app".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_failure_shows_generic_error() {
        let sink = RecordingSink::default();
        let analyzer = analyzer(FakeProvider::default(), sink.clone());

        let outcome = analyzer.analyze("octo/broken").await;

        assert!(matches!(outcome, AnalysisOutcome::Failed(DeployMindError::ApiError(_))));
        let view = analyzer.view();
        assert_eq!(view.error.as_deref(), Some(ANALYSIS_FAILED_MESSAGE));
        assert!(view.metrics.is_none());
        assert!(!view.loading);
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_request_clears_previous_error() {
        let analyzer = analyzer(FakeProvider::default(), RecordingSink::default());

        analyzer.analyze("octo/broken").await;
        analyzer.analyze("octo/app").await;

        let view = analyzer.view();
        assert!(view.error.is_none());
        assert!(view.metrics.is_some());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_results() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let analyzer = analyzer(FakeProvider::default(), sink.clone());

        let outcome = analyzer.analyze("octo/app").await;

        assert!(matches!(outcome, AnalysisOutcome::Completed));
        let view = analyzer.view();
        assert!(view.metrics.is_some());
        assert_eq!(view.insights.as_deref(), Some("## Healthy"));
        assert!(view.error.is_none());
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insight_failure_shows_placeholder() {
        let analyzer = Analyzer::new(
            Box::new(FakeProvider::default()),
            Box::new(CannedInsights(Err(DeployMindError::ApiError(
                "quota exceeded".to_string(),
            )))),
            Box::new(RecordingSink::default()),
        );

        let outcome = analyzer.analyze("octo/app").await;

        assert!(matches!(outcome, AnalysisOutcome::Completed));
        let view = analyzer.view();
        assert!(view.metrics.is_some());
        let insights = view.insights.unwrap();
        assert!(insights.starts_with(INSIGHTS_UNAVAILABLE));
        assert!(insights.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_blank_insights_are_omitted() {
        let analyzer = Analyzer::new(
            Box::new(FakeProvider::default()),
            Box::new(CannedInsights(Ok(Some("  \n".to_string())))),
            Box::new(RecordingSink::default()),
        );

        analyzer.analyze("octo/app").await;

        assert!(analyzer.view().insights.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_published_results() {
        let analyzer = analyzer(FakeProvider::default(), RecordingSink::default());
        let updates = analyzer.subscribe();
        assert!(!updates.borrow().loading);

        analyzer.analyze("octo/app").await;

        assert!(updates.has_changed().unwrap());
        let view = updates.borrow().clone();
        assert_eq!(view, analyzer.view());
        assert!(view.metrics.is_some());
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn test_superseded_request_is_discarded() {
        let provider = FakeProvider::default();
        let release = Arc::clone(&provider.release);
        let sink = RecordingSink::default();
        let analyzer = Arc::new(analyzer(provider, sink.clone()));
        let mut updates = analyzer.subscribe();

        let slow = tokio::spawn({
            let analyzer = Arc::clone(&analyzer);
            async move { analyzer.analyze("octo/slow").await }
        });
        updates
            .wait_for(|view| view.repository.as_deref() == Some("octo/slow"))
            .await
            .unwrap();

        let fast = analyzer.analyze("octo/fast").await;
        let before_release = analyzer.view();
        release.notify_one();
        let slow = slow.await.unwrap();

        assert!(matches!(fast, AnalysisOutcome::Completed));
        assert!(matches!(slow, AnalysisOutcome::Superseded));

        let view = analyzer.view();
        assert_eq!(view, before_release);
        assert_eq!(view.repository.as_deref(), Some("octo/fast"));
        // the slow repository only has failed runs
        assert_eq!(view.metrics.unwrap().success_rate, 100.0);
        assert!(!view.loading);
        assert_eq!(*sink.saved.lock().unwrap(), vec!["octo/fast".to_string()]);
    }
}
