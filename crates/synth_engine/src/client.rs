use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use synth_core::{BatchStatusSnapshot, BatchSubmission, IngestOptions, UploadFile};
use synth_logging::synth_debug;

use crate::{ApiError, ClientSettings, FailureKind, FieldError};

/// Batch endpoints of the ingestion backend.
#[async_trait::async_trait]
pub trait BatchApi: Send + Sync {
    async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
        options: &IngestOptions,
    ) -> Result<BatchSubmission, ApiError>;

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatusSnapshot, ApiError>;

    async fn cancel_batch(&self, batch_id: &str) -> Result<(), ApiError>;

    /// Returns how many failed jobs the backend requeued.
    async fn retry_failed(&self, batch_id: &str) -> Result<u32, ApiError>;
}

#[derive(Debug, Deserialize)]
struct RetryResponse {
    #[serde(default)]
    retry_count: u32,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    settings: ClientSettings,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        // No client-wide timeout: streams run until the server or the caller ends them.
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub(crate) fn url(&self, path: &str, id: Option<&str>) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.settings.base_url.trim_end_matches('/'), path);
        let mut url = Url::parse(&raw)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, format!("{raw}: {err}")))?;
        if let Some(id) = id {
            url.path_segments_mut()
                .map_err(|_| ApiError::new(FailureKind::InvalidUrl, raw.clone()))?
                .pop_if_empty()
                .push(id);
        }
        Ok(url)
    }

    /// Request for an SSE endpoint. Carries no timeout.
    pub(crate) fn stream_request(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = self.url(path, None)?;
        Ok(self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(body))
    }
}

#[async_trait::async_trait]
impl BatchApi for HttpClient {
    async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
        options: &IngestOptions,
    ) -> Result<BatchSubmission, ApiError> {
        let url = self.url(&self.settings.endpoints.ingest_batch, None)?;
        let form = build_form(files, options)?;
        let response = self
            .http
            .post(url)
            .timeout(self.settings.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatusSnapshot, ApiError> {
        let url = self.url(&self.settings.endpoints.batch_status, Some(batch_id))?;
        let response = self
            .http
            .get(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn cancel_batch(&self, batch_id: &str) -> Result<(), ApiError> {
        let url = self.url(&self.settings.endpoints.batch_cancel, Some(batch_id))?;
        let response = self
            .http
            .post(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn retry_failed(&self, batch_id: &str) -> Result<u32, ApiError> {
        let url = self.url(&self.settings.endpoints.batch_retry, Some(batch_id))?;
        let response = self
            .http
            .post(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: RetryResponse = read_json(response).await?;
        Ok(body.retry_count)
    }
}

fn build_form(files: Vec<UploadFile>, options: &IngestOptions) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for file in files {
        let mut part = Part::bytes(file.bytes).file_name(file.filename);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|err| ApiError::new(FailureKind::InvalidRequest, err.to_string()))?;
        }
        form = form.part("files", part);
    }
    if let Some(prefix) = options.title_prefix.as_deref() {
        form = form.text("title_prefix", prefix.to_string());
    }
    Ok(form
        .text("extract_images", options.extract_images.to_string())
        .text("extract_tables", options.extract_tables.to_string())
        .text("detect_sections", options.detect_sections.to_string())
        .text("generate_embeddings", options.generate_embeddings.to_string())
        .text("vlm_captioning", options.vlm_captioning.to_string())
        .text("chunk_size", options.chunk_size.to_string())
        .text("chunk_overlap", options.chunk_overlap.to_string()))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    let body = response.bytes().await.map_err(map_body_read_error)?;
    serde_json::from_slice(&body).map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))
}

/// Turns a non-success response into an `ApiError`, reading its body for details.
pub(crate) async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    synth_debug!("Backend returned {} with {} byte body", status, body.len());
    error_from_body(status, &body)
}

/// Decodes an error body. 422 responses carrying a `detail` list become
/// `FailureKind::Validation`; otherwise `detail` or `message` is used as text.
pub fn error_from_body(status: StatusCode, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|value| value.get("detail"));

    if status == StatusCode::UNPROCESSABLE_ENTITY {
        if let Some(items) = detail.and_then(Value::as_array) {
            let fields: Vec<FieldError> = items.iter().map(field_error).collect();
            let message = fields
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return ApiError::new(FailureKind::Validation(fields), message);
        }
    }

    let message = detail
        .and_then(Value::as_str)
        .or_else(|| {
            parsed
                .as_ref()
                .and_then(|value| value.get("message"))
                .and_then(Value::as_str)
        })
        .map(ToString::to_string)
        .unwrap_or_else(|| status.to_string());
    ApiError::new(FailureKind::HttpStatus(status.as_u16()), message)
}

fn field_error(item: &Value) -> FieldError {
    let loc = item
        .get("loc")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|part| match part {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    let text = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    FieldError {
        loc,
        message: text("msg"),
        kind: text("type"),
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_body() {
        return ApiError::new(FailureKind::Network, err.to_string());
    }
    if err.is_decode() {
        return ApiError::new(FailureKind::Decode, err.to_string());
    }
    if err.is_builder() {
        return ApiError::new(FailureKind::InvalidRequest, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}

/// Maps a failure while reading a response body. Nothing is decoded at this
/// point, so reqwest's decode errors here mean the connection broke.
pub(crate) fn map_body_read_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
