//! services/api/src/adapters/gateway.rs
//!
//! The concrete implementation of the `SubmissionGateway` port, posting viewing
//! results to the remote point API over HTTPS using `reqwest`.

use ambassador_core::{PortError, PortResult, Submission, SubmissionAck, SubmissionGateway};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// The JSON body the point API expects for a viewing award.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ViewPointRequest<'a> {
    customer_id: &'a str,
    document_id: &'a str,
    watch_duration: u32,
    time_rate: f64,
    base_points: u32,
    points: u32,
}

impl<'a> From<&'a Submission> for ViewPointRequest<'a> {
    fn from(submission: &'a Submission) -> Self {
        Self {
            customer_id: &submission.customer_id,
            document_id: &submission.document_id,
            watch_duration: submission.elapsed_seconds,
            time_rate: submission.time_rate.as_f64(),
            base_points: submission.base_points,
            points: submission.effective_points,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ViewPointResponse {
    #[serde(default)]
    reference: Option<String>,
}

/// Posts submissions to `{base_url}/points/view`.
#[derive(Clone)]
pub struct HttpPointGateway {
    client: Client,
    endpoint: String,
}

impl HttpPointGateway {
    /// Creates a gateway whose requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/points/view", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SubmissionGateway for HttpPointGateway {
    async fn submit_viewing(&self, submission: &Submission) -> PortResult<SubmissionAck> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ViewPointRequest::from(submission))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Point API unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Rejected(format!("{}: {}", status, body.trim())));
        }

        // An empty or non-JSON success body is still an acknowledgement.
        let body = response.bytes().await.unwrap_or_default();
        let parsed: ViewPointResponse = serde_json::from_slice(&body).unwrap_or_default();
        info!(
            "Point API accepted document {} for customer {}",
            submission.document_id, submission.customer_id
        );
        Ok(SubmissionAck {
            reference: parsed.reference,
        })
    }
}
