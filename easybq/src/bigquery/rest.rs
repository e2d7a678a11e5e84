//! Multipart job upload, the one BigQuery REST call the client library does not wrap.

use std::fmt;

use reqwest::StatusCode;
use tracing::debug;

use crate::bigquery::auth::TokenSource;
use crate::bigquery::model::{ErrorResponse, Job};
use crate::bq_error;
use crate::error::{BqError, BqResult, ErrorKind};

const UPLOAD_BASE_URL: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";

/// HTTP client paired with a token source for BigQuery upload requests.
#[derive(Clone)]
pub struct RestTransport {
    http: reqwest::Client,
    tokens: TokenSource,
}

impl RestTransport {
    pub fn new(tokens: TokenSource) -> BqResult<Self> {
        let http = reqwest::Client::builder().build().map_err(|err| {
            bq_error!(
                ErrorKind::RemoteIoError,
                "Failed to build the BigQuery HTTP client",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self { http, tokens })
    }

    /// Inserts a job in `project_id` with a multipart upload carrying its data.
    pub async fn upload_job(
        &self,
        project_id: &str,
        body: Vec<u8>,
        content_type: String,
    ) -> BqResult<Job> {
        let token = self.tokens.token().await?;

        let response = self
            .http
            .post(format!("{UPLOAD_BASE_URL}/projects/{project_id}/jobs"))
            .query(&[("uploadType", "multipart")])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .bearer_auth(token)
            .body(body)
            .send()
            .await
            .map_err(reqwest_error_to_bq_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(reqwest_error_to_bq_error)?;

        if !status.is_success() {
            return Err(response_error(status, &body, ErrorKind::LoadJobFailed));
        }

        debug!(%status, "load job upload accepted");

        Ok(serde_json::from_slice(&body)?)
    }
}

impl fmt::Debug for RestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestTransport").finish_non_exhaustive()
    }
}

/// Converts a non-success REST response into a [`BqError`].
///
/// Authorization failures map to [`ErrorKind::AuthenticationError`]; every other status maps
/// to `failure_kind`. The envelope's message becomes the detail and its per-error entries the
/// job errors.
pub fn response_error(status: StatusCode, body: &[u8], failure_kind: ErrorKind) -> BqError {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthenticationError,
        _ => failure_kind,
    };

    let (message, errors) = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.errors),
        Err(_) => (String::from_utf8_lossy(body).into_owned(), Vec::new()),
    };

    bq_error!(
        kind,
        "BigQuery request returned an error status",
        format!("{status}: {message}")
    )
    .with_job_errors(errors)
}

fn reqwest_error_to_bq_error(err: reqwest::Error) -> BqError {
    let description = if err.is_timeout() {
        "BigQuery request timed out"
    } else if err.is_connect() {
        "Failed to connect to BigQuery"
    } else {
        "BigQuery request failed"
    };

    bq_error!(
        ErrorKind::RemoteIoError,
        description,
        err.to_string(),
        source: err
    )
}
