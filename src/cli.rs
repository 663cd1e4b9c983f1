use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use serde::Serialize;

use crate::analysis::{AnalysisOutcome, Analyzer, ANALYSIS_FAILED_MESSAGE};
use crate::auth::Token;
use crate::enrich::{
    DisabledInsights, GeminiInsights, InsightGenerator, MisconfiguredInsights, SupabaseSink,
};
use crate::error::DeployMindError;
use crate::ingest::{RawEvents, RepoEvents};
use crate::metrics::compute_metrics;
use crate::models::AnalysisReport;
use crate::providers::github::{GitHubClient, GitHubProvider};

#[derive(Parser)]
#[command(name = "deploymind")]
#[command(author, version, about = "DevOps health scoring from CI/CD activity", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a GitHub repository from its workflow runs and pull requests
    Github {
        /// Repository as "owner/name"
        #[arg(short, long)]
        repo: String,

        /// GitHub API token (optional, required for private repositories)
        #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// GitHub API URL
        #[arg(short, long, default_value = "https://api.github.com")]
        url: String,

        /// Number of workflow runs and pull requests to fetch (max 100)
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[command(flatten)]
        insights: InsightArgs,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// List repositories of the authenticated GitHub user
    Repos {
        /// GitHub API token
        #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// GitHub API URL
        #[arg(short, long, default_value = "https://api.github.com")]
        url: String,
    },

    /// Score raw events read from a JSON file
    Compute {
        /// File with `workflow_runs` and `pull_requests` arrays
        #[arg(short, long)]
        input: PathBuf,

        /// Repository name recorded in the report
        #[arg(short, long, default_value = "local")]
        repo: String,
    },
}

#[derive(clap::Args)]
struct InsightArgs {
    /// Gemini API key used for AI insights
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Gemini model
    #[arg(long, default_value = crate::enrich::DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// Gemini API URL
    #[arg(long, default_value = crate::enrich::DEFAULT_GEMINI_URL)]
    gemini_url: String,

    /// Skip AI insights
    #[arg(long, default_value_t = false)]
    no_insights: bool,
}

#[derive(clap::Args)]
struct StorageArgs {
    /// Supabase project URL for snapshot persistence
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase API key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_key: Option<String>,
}

impl InsightArgs {
    fn generator(&self) -> Box<dyn InsightGenerator> {
        if self.no_insights {
            return Box::new(DisabledInsights);
        }

        let api_key = Token::from_optional(self.gemini_api_key.clone());
        match GeminiInsights::new(&self.gemini_url, &self.gemini_model, api_key) {
            Ok(insights) => Box::new(insights),
            Err(e) => {
                warn!("AI insights unavailable: {e}");
                let reason = match e {
                    DeployMindError::ConfigError(reason) => reason,
                    other => other.to_string(),
                };
                Box::new(MisconfiguredInsights::new(reason))
            }
        }
    }
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Github {
                repo,
                token,
                url,
                limit,
                insights,
                storage,
            } => {
                info!("Collecting GitHub activity for repository: {repo}");

                let token = Token::from_optional(token.clone());
                let provider = GitHubProvider::new(url, token, *limit)?;
                let sink = SupabaseSink::new(
                    storage.supabase_url.as_deref(),
                    Token::from_optional(storage.supabase_key.clone()),
                );
                debug!("Snapshot persistence enabled: {}", sink.is_enabled());

                let analyzer =
                    Analyzer::new(Box::new(provider), insights.generator(), Box::new(sink));

                match analyzer.analyze(repo).await {
                    AnalysisOutcome::Completed => {}
                    AnalysisOutcome::Failed(e) => {
                        let message = analyzer
                            .view()
                            .error
                            .unwrap_or_else(|| ANALYSIS_FAILED_MESSAGE.to_string());
                        return Err(anyhow::Error::new(e).context(message));
                    }
                    AnalysisOutcome::Superseded => {
                        return Err(anyhow!("Analysis of {repo} was superseded"));
                    }
                }

                let view = analyzer.view();
                let metrics = view
                    .metrics
                    .ok_or_else(|| anyhow!("Analysis of {repo} produced no metrics"))?;

                let report = AnalysisReport {
                    repository: repo.clone(),
                    collected_at: Utc::now(),
                    metrics,
                    insights: view.insights,
                };
                self.write_output(&report)
            }
            Commands::Repos { token, url } => {
                let client = GitHubClient::new(url, Token::from_optional(token.clone()))?;
                let repos = client.fetch_user_repos().await?;
                info!("Found {} repositories", repos.len());

                self.write_output(&repos)
            }
            Commands::Compute { input, repo } => {
                let events = read_events(input)?;
                let metrics = compute_metrics(&events.runs, &events.pull_requests);
                info!(
                    "Computed health score {}/100 from {} runs and {} pull requests",
                    metrics.health_score,
                    events.runs.len(),
                    events.pull_requests.len()
                );

                let report = AnalysisReport {
                    repository: repo.clone(),
                    collected_at: Utc::now(),
                    metrics,
                    insights: None,
                };
                self.write_output(&report)
            }
        }
    }

    fn write_output<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Results written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}

fn read_events(path: &Path) -> Result<RepoEvents> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: RawEvents = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse events in {}", path.display()))?;
    let events = RepoEvents::try_from(raw)
        .with_context(|| format!("Invalid events in {}", path.display()))?;
    Ok(events)
}
