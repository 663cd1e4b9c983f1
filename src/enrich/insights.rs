use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::Token;
use crate::error::{DeployMindError, Result};
use crate::models::MetricsSnapshot;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

const MISSING_KEY_MESSAGE: &str = "⚠️ **Configuration Error**: `GEMINI_API_KEY` is not set. \
     Please set it to generate AI insights.";
const EMPTY_RESPONSE_MESSAGE: &str = "No insights generated.";

/// Turns a metrics snapshot into markdown prose.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    /// `Ok(None)` means the generator has nothing to show.
    async fn generate(&self, repository: &str, metrics: &MetricsSnapshot)
        -> Result<Option<String>>;
}

/// Used when insights are switched off.
pub struct DisabledInsights;

#[async_trait]
impl InsightGenerator for DisabledInsights {
    async fn generate(&self, _: &str, _: &MetricsSnapshot) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Stands in for a generator that could not be configured. Every request
/// fails with the configuration problem, which the analysis shows as a
/// placeholder.
pub struct MisconfiguredInsights {
    reason: String,
}

impl MisconfiguredInsights {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl InsightGenerator for MisconfiguredInsights {
    async fn generate(&self, _: &str, _: &MetricsSnapshot) -> Result<Option<String>> {
        Err(DeployMindError::ConfigError(self.reason.clone()))
    }
}

pub fn build_prompt(repository: &str, metrics: &MetricsSnapshot) -> String {
    format!(
        "As a Senior DevOps Architect, analyze the following metrics for the repository \
         \"{repository}\" and provide a professional DevOps health summary.\n\
         \n\
         Metrics:\n\
         - Deployment Frequency: {:.2} runs/week\n\
         - Success Rate: {:.1}%\n\
         - Average Build Time: {:.1} minutes\n\
         - PR Merge Frequency: {:.2} PRs/week\n\
         - Overall Health Score: {}/100\n\
         \n\
         1. A concise summary of the current DevOps state.\n\
         2. Risk detection (e.g., high failure rates, slow builds).\n\
         3. Actionable recommendations for improvement.\n\
         \n\
         Format the output in professional, STRICT Markdown only. Do not output any HTML tags.",
        metrics.deployment_frequency,
        metrics.success_rate,
        metrics.avg_build_time,
        metrics.pr_merge_frequency,
        metrics.health_score,
    )
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Insight generation through the Gemini `generateContent` REST endpoint.
pub struct GeminiInsights {
    client: Client,
    endpoint: Url,
    api_key: Option<Token>,
}

impl GeminiInsights {
    pub fn new(base_url: &str, model: &str, api_key: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DeployMindError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        let endpoint = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .and_then(|url| url.join(&format!("v1beta/models/{model}:generateContent")))
            .map_err(|e| DeployMindError::ConfigError(format!("Invalid Gemini URL: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl InsightGenerator for GeminiInsights {
    async fn generate(
        &self,
        repository: &str,
        metrics: &MetricsSnapshot,
    ) -> Result<Option<String>> {
        let Some(api_key) = &self.api_key else {
            return Ok(Some(MISSING_KEY_MESSAGE.to_string()));
        };

        let prompt = build_prompt(repository, metrics);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: &prompt }],
            }],
        };

        info!("Requesting insights for {repository}...");
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", api_key.as_str())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeployMindError::ApiError(format!(
                "Insight generation failed: {status} - {body}"
            )));
        }

        let text = response.json::<GenerateResponse>().await?.text();
        if text.trim().is_empty() {
            return Ok(Some(EMPTY_RESPONSE_MESSAGE.to_string()));
        }
        Ok(Some(text))
    }
}
