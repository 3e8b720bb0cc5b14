use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;
use crate::models::SchedulingRequest;
use crate::proposal::SolverResponse;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// How the solver should answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseConfig {
    pub callback_url: Option<String>,
    pub expected_response: String,
    pub timeout_seconds: u64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            expected_response: "planning_proposal".to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Document POSTed to the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverEnvelope {
    pub request: SchedulingRequest,
    pub response_config: ResponseConfig,
}

/// Anything able to turn a scheduling request into a proposal.
#[async_trait]
pub trait Solver: Send + Sync {
    async fn solve(&self, envelope: &SolverEnvelope) -> Result<SolverResponse, SubmissionError>;
}

/// Solver reached over HTTP. One POST per call, never retried.
pub struct HttpSolver {
    client: Client,
    url: String,
}

impl HttpSolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Solver for HttpSolver {
    async fn solve(&self, envelope: &SolverEnvelope) -> Result<SolverResponse, SubmissionError> {
        tracing::debug!(
            url = %self.url,
            code_formation = %envelope.request.code_formation,
            timeout_seconds = envelope.response_config.timeout_seconds,
            "posting scheduling request"
        );

        let response = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(envelope.response_config.timeout_seconds))
            .json(envelope)
            .send()
            .await
            .map_err(|err| SubmissionError::Unreachable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SubmissionError::Unreachable(err.to_string()))?;

        if !status.is_success() {
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| SubmissionError::malformed(err.to_string()))
    }
}
