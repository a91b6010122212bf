use std::time::Duration;

use crate::{BatchJob, BatchStatusSnapshot, IngestOptions, UploadFile};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SubmitUpload {
        ticket: u64,
        files: Vec<UploadFile>,
        options: IngestOptions,
    },
    /// Poll now, then every `interval`.
    StartPolling { batch_id: String, interval: Duration },
    /// Replace the running timer; the next poll fires after `interval`.
    ReschedulePolling { batch_id: String, interval: Duration },
    StopPolling,
    RequestCancel { batch_id: String },
    RequestRetry { batch_id: String },
    NotifyFileComplete(BatchJob),
    NotifyComplete(BatchStatusSnapshot),
    NotifyError(String),
}

impl Effect {
    /// Effects that need a round trip to the backend.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Effect::SubmitUpload { .. } | Effect::RequestCancel { .. } | Effect::RequestRetry { .. }
        )
    }
}
