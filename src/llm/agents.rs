//! Model-backed collaborators
//!
//! - [`SchemaArchitect`] proposes a [`SchemaPlan`] for flat headers
//! - [`ReportAnalyst`] proposes [`ReportSuggestion`]s for a stored plan
//! - [`Summarizer`] writes a narrative over report rows
//!
//! All three share one retry loop: transport failures and unparseable
//! answers are retried up to `max_retries` times with a fixed pause.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::LlmClient;
use super::config::LlmConfig;
use super::error::{LlmError, LlmResult};
use super::prompt::{
    analyst_prompt, architect_prompt, extract_json, parse_json_response, summary_prompt,
};
use crate::models::{ReportSuggestion, Row, SchemaPlan};
use crate::validation::SchemaPlanError;

/// Source of schema plans for a set of flat headers
#[async_trait]
pub trait SchemaProposer: Send + Sync {
    async fn propose(&self, headers: &[String]) -> Result<SchemaPlan, SchemaPlanError>;
}

/// A proposer that always answers with the same plan
#[derive(Debug, Clone)]
pub struct FixedPlanProposer {
    plan: SchemaPlan,
}

impl FixedPlanProposer {
    pub fn new(plan: SchemaPlan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl SchemaProposer for FixedPlanProposer {
    async fn propose(&self, _headers: &[String]) -> Result<SchemaPlan, SchemaPlanError> {
        Ok(self.plan.clone())
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: usize,
    delay: Duration,
}

impl From<&LlmConfig> for RetryPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&LlmConfig::default()).into()
    }
}

/// Complete `prompt` and parse the answer, retrying retryable failures
async fn complete_with_retries<T, F>(
    client: &dyn LlmClient,
    prompt: &str,
    policy: RetryPolicy,
    agent: &str,
    parse: F,
) -> LlmResult<T>
where
    F: Fn(&str) -> LlmResult<T>,
{
    let mut retries = 0;
    let mut last_error = None;

    while retries <= policy.max_retries {
        let attempt = match client.complete(prompt).await {
            Ok(text) => parse(&text),
            Err(e) => Err(e),
        };

        match attempt {
            Ok(value) => {
                debug!(agent, model = client.model_name(), retries, "Model answer accepted");
                return Ok(value);
            }
            Err(e) if e.is_retryable() => {
                retries += 1;
                if retries <= policy.max_retries {
                    warn!(agent, error = %e, "Attempt {} failed, retrying...", retries);
                    let wait = e
                        .retry_after()
                        .filter(|_| matches!(e, LlmError::RateLimited(_)))
                        .map(Duration::from_secs)
                        .unwrap_or(policy.delay);
                    tokio::time::sleep(wait).await;
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or(LlmError::MaxRetriesExceeded(policy.max_retries)))
}

/// Proposes normalized schema plans from flat headers
#[derive(Clone)]
pub struct SchemaArchitect {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl SchemaArchitect {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    /// Take retry settings from `config`
    pub fn with_config(mut self, config: &LlmConfig) -> Self {
        self.policy = config.into();
        self
    }

    /// Ask the model for a plan, surfacing model failures as [`LlmError`]
    pub async fn propose_plan(&self, headers: &[String]) -> LlmResult<SchemaPlan> {
        let prompt = architect_prompt(headers);
        complete_with_retries(
            self.client.as_ref(),
            &prompt,
            self.policy,
            "schema_architect",
            |text| {
                SchemaPlan::from_json(&extract_json(text))
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            },
        )
        .await
    }
}

#[async_trait]
impl SchemaProposer for SchemaArchitect {
    async fn propose(&self, headers: &[String]) -> Result<SchemaPlan, SchemaPlanError> {
        self.propose_plan(headers)
            .await
            .map_err(|e| SchemaPlanError::ProposalFailed(e.to_string()))
    }
}

/// Proposes reports over a stored schema plan
#[derive(Clone)]
pub struct ReportAnalyst {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl ReportAnalyst {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: &LlmConfig) -> Self {
        self.policy = config.into();
        self
    }

    pub async fn suggest(&self, plan: &SchemaPlan) -> LlmResult<Vec<ReportSuggestion>> {
        let prompt = analyst_prompt(plan);
        complete_with_retries(
            self.client.as_ref(),
            &prompt,
            self.policy,
            "report_analyst",
            |text| {
                let json = extract_json(text);
                // A single suggestion object is accepted as a one-element list
                if json.trim_start().starts_with('{') {
                    let suggestion: ReportSuggestion = parse_json_response(&json)?;
                    return Ok(vec![suggestion]);
                }
                Ok(parse_json_response(&json)?)
            },
        )
        .await
    }
}

/// Writes a short narrative for a report
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl Summarizer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: &LlmConfig) -> Self {
        self.policy = config.into();
        self
    }

    pub async fn summarize(
        &self,
        title: &str,
        description: &str,
        rows: &[Row],
    ) -> LlmResult<String> {
        let prompt = summary_prompt(title, description, rows);
        complete_with_retries(self.client.as_ref(), &prompt, self.policy, "summarizer", |text| {
            let text = text.trim();
            if text.is_empty() {
                Err(LlmError::InvalidResponse("empty summary".to_string()))
            } else {
                Ok(text.to_string())
            }
        })
        .await
    }
}
