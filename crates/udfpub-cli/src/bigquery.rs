//! BigQuery REST client used as the publish [`Warehouse`]

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use udfpub_core::{RemoteError, Warehouse};

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Server-side wait per request while a job is running
const POLL_TIMEOUT_MS: u64 = 10_000;
const MAX_POLLS: usize = 60;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryResponse {
    job_complete: bool,
    job_reference: Option<JobReference>,
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Runs each statement as a standard-SQL query job in one project
pub struct BigQueryClient {
    http: Client,
    endpoint: String,
    project_id: String,
    token: String,
}

impl BigQueryClient {
    pub fn new(project_id: impl Into<String>, token: impl Into<String>) -> Result<Self, RemoteError> {
        Ok(Self {
            http: http_client()?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: project_id.into(),
            token: token.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.endpoint, self.project_id)
    }

    fn wait_for(&self, job: &JobReference) -> Result<(), RemoteError> {
        let url = format!("{}/{}", self.queries_url(), job.job_id);
        let timeout = POLL_TIMEOUT_MS.to_string();

        for _ in 0..MAX_POLLS {
            debug!("Waiting for job {}", job.job_id);
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("timeoutMs", timeout.as_str())]);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location.as_str())]);
            }

            let response = parse(request.send().map_err(network)?)?;
            if response.job_complete {
                return Ok(());
            }
        }

        Err(RemoteError::Rejected(format!(
            "job {} did not complete after {} polls",
            job.job_id, MAX_POLLS
        )))
    }
}

impl Warehouse for BigQueryClient {
    fn submit(&mut self, statement: &str) -> Result<(), RemoteError> {
        let body = QueryRequest {
            query: statement,
            use_legacy_sql: false,
            timeout_ms: POLL_TIMEOUT_MS,
        };
        let response = self
            .http
            .post(self.queries_url())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(network)?;

        let response = parse(response)?;
        for error in &response.errors {
            warn!("{}: {}", error.reason, error.message);
        }

        match (response.job_complete, &response.job_reference) {
            (true, _) => Ok(()),
            (false, Some(job)) => self.wait_for(job),
            (false, None) => Err(RemoteError::Rejected(
                "incomplete query without a job reference".to_string(),
            )),
        }
    }
}

pub(crate) fn http_client() -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("udfpub/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(network)
}

pub(crate) fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

/// Turn a non-success response into [`RemoteError::Rejected`] carrying the API message.
pub(crate) fn rejection(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    RemoteError::Rejected(format!("{}: {}", status, message))
}

fn parse(response: Response) -> Result<QueryResponse, RemoteError> {
    if !response.status().is_success() {
        return Err(rejection(response));
    }
    response.json().map_err(network)
}
