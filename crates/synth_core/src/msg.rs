use std::time::Instant;

use crate::{BatchStatusSnapshot, BatchSubmission, IngestOptions, UploadFile};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Caller asked to upload a new batch.
    UploadRequested {
        files: Vec<UploadFile>,
        options: IngestOptions,
    },
    /// Backend accepted the upload identified by `ticket`.
    UploadSucceeded {
        ticket: u64,
        submission: BatchSubmission,
        started_at: Instant,
    },
    /// Upload request failed outright.
    UploadFailed { ticket: u64, message: String },
    /// A status poll returned a snapshot.
    PollSucceeded {
        batch_id: String,
        snapshot: BatchStatusSnapshot,
    },
    /// A status poll failed; polling continues.
    PollFailed { batch_id: String, message: String },
    /// Caller asked to cancel the active batch.
    CancelRequested,
    /// Backend acknowledged the cancellation.
    CancelAcknowledged { batch_id: String },
    CancelFailed { batch_id: String, message: String },
    /// Caller asked to retry the failed subset.
    RetryRequested,
    RetryAcknowledged { batch_id: String, retry_count: u32 },
    RetryFailed { batch_id: String, message: String },
    /// Drop everything and return to idle.
    ResetRequested,
    /// Fallback for placeholder wiring.
    NoOp,
}
