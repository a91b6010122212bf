use serde::{Deserialize, Serialize};

pub type BatchId = String;

/// Per-file status as reported by the ingestion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One file within a batch. Replaced wholesale by every status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchJob {
    pub fn pending(job_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: JobStatus::Pending,
            progress: 0,
            current_stage: None,
            error: None,
        }
    }
}

/// Batch status as the backend reports it in a status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
    Cancelled,
}

impl RemoteBatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RemoteBatchStatus::Completed
                | RemoteBatchStatus::Failed
                | RemoteBatchStatus::Partial
                | RemoteBatchStatus::Cancelled
        )
    }
}

/// Response of the batch upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub batch_id: BatchId,
    #[serde(default)]
    pub jobs: Vec<BatchJob>,
}

/// Response of the batch status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatusSnapshot {
    pub status: RemoteBatchStatus,
    #[serde(default)]
    pub jobs: Vec<BatchJob>,
    #[serde(default)]
    pub current_file_index: usize,
    #[serde(default)]
    pub current_file_name: Option<String>,
    #[serde(default)]
    pub elapsed_seconds: f64,
}

/// Processing options submitted alongside the files of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub title_prefix: Option<String>,
    pub extract_images: bool,
    pub extract_tables: bool,
    pub detect_sections: bool,
    pub generate_embeddings: bool,
    pub vlm_captioning: bool,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            title_prefix: None,
            extract_images: true,
            extract_tables: true,
            detect_sections: true,
            generate_embeddings: true,
            vlm_captioning: false,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// A file queued for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

// File contents are elided to keep logs readable.
impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
