//! HTTP transport for the document-QA backend.
//!
//! One `reqwest::Client` behind a base URL, with typed helpers for the four
//! backend operations: file upload, start-processing, status poll, and the
//! streaming query request. The backend pipeline itself is a black box.

use crate::error::{Error, Result};
use crate::models::{FileSubmission, JobStatus, ProcessAck};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// How much of an error response body is kept for the error message
const ERROR_BODY_SNIPPET: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    collection_id: &'a str,
    filename: &'a str,
    vision_model: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    collection_id: &'a str,
    question: &'a str,
}

/// Client for the backend HTTP API.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    upload_timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, request_timeout: Duration, upload_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url,
            upload_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid backend URL: {}", e)))
    }

    /// Map non-2xx responses to a typed error carrying a body snippet.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(ERROR_BODY_SNIPPET);
        Err(Error::Backend { status, body })
    }

    /// Transmit file bytes to the upload endpoint.
    ///
    /// Uses the longer upload timeout; large PDFs over slow links routinely
    /// exceed the default request timeout.
    pub async fn upload_file(&self, file: &FileSubmission) -> Result<()> {
        let url = self.endpoint("/upload")?;
        debug!("Uploading {} ({} bytes)", file.name, file.bytes.len());

        let mime = mime_guess::from_path(&file.name).first_or_octet_stream();
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(mime.essence_str())
            .map_err(|e| Error::Config(format!("Invalid MIME type for '{}': {}", file.name, e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Register an uploaded file for pipeline processing.
    pub async fn start_processing(
        &self,
        collection_id: &str,
        filename: &str,
        vision_model: &str,
    ) -> Result<ProcessAck> {
        let url = self.endpoint("/process")?;
        let request = ProcessRequest {
            collection_id,
            filename,
            vision_model,
        };
        let response = self.client.post(url).json(&request).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<ProcessAck>().await?)
    }

    /// Fetch the current status of a pipeline run.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let url = self.endpoint(&format!("/status/{}", job_id))?;
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::JobNotFound(job_id.to_string()));
        }
        let response = Self::check(response).await?;
        Ok(response.json::<JobStatus>().await?)
    }

    /// Issue a streaming query request and return the raw response.
    ///
    /// The body is a chunked NDJSON stream; decoding lives in the stream
    /// module. No timeout is set on this request, the stream stays open for
    /// the duration of the answer.
    pub async fn send_query(&self, collection_id: &str, question: &str) -> Result<Response> {
        let url = self.endpoint("/query")?;
        let request = QueryRequest {
            collection_id,
            question,
        };
        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(24 * 60 * 60))
            .json(&request)
            .send()
            .await?;
        Self::check(response).await
    }
}
