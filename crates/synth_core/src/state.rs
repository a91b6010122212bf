use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::types::{BatchJob, BatchStatusSnapshot, JobStatus, RemoteBatchStatus};
use crate::view_model::{BatchViewModel, JobCounts};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const SLOW_STAGE_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Client-side batch status. Derived from the job list and the transport state,
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    #[default]
    Idle,
    Uploading,
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
    Cancelled,
}

impl BatchStatus {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            BatchStatus::Uploading | BatchStatus::Pending | BatchStatus::Processing
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Partial
                | BatchStatus::Cancelled
        )
    }

    pub fn can_retry(self) -> bool {
        matches!(self, BatchStatus::Partial | BatchStatus::Failed)
    }
}

impl From<RemoteBatchStatus> for BatchStatus {
    fn from(status: RemoteBatchStatus) -> Self {
        match status {
            RemoteBatchStatus::Pending => BatchStatus::Pending,
            RemoteBatchStatus::Processing => BatchStatus::Processing,
            RemoteBatchStatus::Completed => BatchStatus::Completed,
            RemoteBatchStatus::Failed => BatchStatus::Failed,
            RemoteBatchStatus::Partial => BatchStatus::Partial,
            RemoteBatchStatus::Cancelled => BatchStatus::Cancelled,
        }
    }
}

/// Polling cadence for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub poll_interval: Duration,
    /// Used while the processing job sits in a VLM captioning stage.
    pub slow_stage_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            slow_stage_interval: SLOW_STAGE_POLL_INTERVAL,
        }
    }
}

impl BatchConfig {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::default()
        }
    }
}

/// Where the batch is from the transport's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Transport {
    #[default]
    Idle,
    Uploading,
    UploadFailed,
    Tracking,
    /// Retry acknowledged, waiting for the first fresh snapshot.
    Retrying,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchState {
    config: BatchConfig,
    transport: Transport,
    upload_ticket: u64,
    batch_id: Option<String>,
    jobs: Vec<BatchJob>,
    server_status: Option<RemoteBatchStatus>,
    user_requested_cancel: bool,
    current_file_index: usize,
    current_file_name: Option<String>,
    elapsed_seconds: f64,
    started_at: Option<Instant>,
    error: Option<String>,
    reported_complete: BTreeSet<String>,
    current_interval: Option<Duration>,
    dirty: bool,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BatchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn jobs(&self) -> &[BatchJob] {
        &self.jobs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn current_interval(&self) -> Option<Duration> {
        self.current_interval
    }

    pub fn user_requested_cancel(&self) -> bool {
        self.user_requested_cancel
    }

    pub fn server_status(&self) -> Option<RemoteBatchStatus> {
        self.server_status
    }

    pub fn upload_ticket(&self) -> u64 {
        self.upload_ticket
    }

    pub fn counts(&self) -> JobCounts {
        JobCounts::from_jobs(&self.jobs)
    }

    /// Status precedence: user cancel, then transport, then server cancel,
    /// then the job list itself.
    pub fn status(&self) -> BatchStatus {
        if self.user_requested_cancel {
            return BatchStatus::Cancelled;
        }
        match self.transport {
            Transport::Idle => return BatchStatus::Idle,
            Transport::Uploading => return BatchStatus::Uploading,
            Transport::UploadFailed => return BatchStatus::Failed,
            Transport::Retrying => return BatchStatus::Processing,
            Transport::Tracking => {}
        }
        if self.server_status == Some(RemoteBatchStatus::Cancelled) {
            return BatchStatus::Cancelled;
        }

        let derived = derive_from_jobs(&self.counts());
        match self.server_status {
            Some(remote) if remote.is_terminal() && !derived.is_terminal() => remote.into(),
            _ => derived,
        }
    }

    pub fn view(&self) -> BatchViewModel {
        let status = self.status();
        let counts = self.counts();
        BatchViewModel {
            status,
            batch_id: self.batch_id.clone(),
            jobs: self.jobs.clone(),
            counts,
            percent: counts.percent(),
            is_active: status.is_active(),
            can_retry: status.can_retry(),
            current_file_index: self.current_file_index,
            current_file_name: self.current_file_name.clone(),
            elapsed_seconds: self.elapsed_seconds,
            error: self.error.clone(),
            dirty: self.dirty,
        }
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn transport(&self) -> Transport {
        self.transport
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.dirty = true;
    }

    /// Clears everything tracked for the previous batch and hands out a new
    /// upload ticket.
    pub(crate) fn begin_upload(&mut self) -> u64 {
        let ticket = self.upload_ticket + 1;
        *self = Self {
            config: self.config.clone(),
            transport: Transport::Uploading,
            upload_ticket: ticket,
            dirty: true,
            ..Self::default()
        };
        ticket
    }

    pub(crate) fn upload_accepted(&mut self, batch_id: String, jobs: Vec<BatchJob>, started_at: Instant) {
        self.transport = Transport::Tracking;
        self.batch_id = Some(batch_id);
        self.jobs = jobs;
        self.started_at = Some(started_at);
        self.current_interval = Some(self.config.poll_interval);
        self.dirty = true;
    }

    pub(crate) fn upload_failed(&mut self, message: String) {
        self.transport = Transport::UploadFailed;
        self.error = Some(message);
        self.dirty = true;
    }

    /// Replaces the tracked jobs with a fresh snapshot and returns the jobs
    /// that completed since the last report.
    pub(crate) fn apply_snapshot(&mut self, snapshot: &BatchStatusSnapshot) -> Vec<BatchJob> {
        self.transport = Transport::Tracking;
        self.jobs = snapshot.jobs.clone();
        self.server_status = Some(snapshot.status);
        self.current_file_index = snapshot.current_file_index;
        self.current_file_name = snapshot.current_file_name.clone();
        self.elapsed_seconds = snapshot.elapsed_seconds;
        self.dirty = true;

        let mut newly_completed = Vec::new();
        for job in &self.jobs {
            if job.status == JobStatus::Completed && self.reported_complete.insert(job.job_id.clone())
            {
                newly_completed.push(job.clone());
            }
        }
        newly_completed
    }

    pub(crate) fn confirm_cancel(&mut self) {
        self.user_requested_cancel = true;
        self.current_interval = None;
        self.dirty = true;
    }

    pub(crate) fn begin_retry(&mut self) -> Duration {
        self.transport = Transport::Retrying;
        self.server_status = None;
        self.error = None;
        self.current_interval = Some(self.config.poll_interval);
        self.dirty = true;
        self.config.poll_interval
    }

    pub(crate) fn stop_polling(&mut self) {
        self.current_interval = None;
    }

    /// Records the interval the next poll should use. Returns true when it
    /// differs from the active one.
    pub(crate) fn set_interval(&mut self, interval: Duration) -> bool {
        if self.current_interval == Some(interval) {
            return false;
        }
        self.current_interval = Some(interval);
        true
    }

    pub(crate) fn reset(&mut self) {
        *self = Self {
            config: self.config.clone(),
            upload_ticket: self.upload_ticket,
            dirty: true,
            ..Self::default()
        };
    }
}

fn derive_from_jobs(counts: &JobCounts) -> BatchStatus {
    if counts.total == 0 {
        return BatchStatus::Pending;
    }
    if counts.processing > 0 {
        return BatchStatus::Processing;
    }
    if counts.pending > 0 {
        return if counts.completed + counts.failed > 0 {
            BatchStatus::Processing
        } else {
            BatchStatus::Pending
        };
    }
    if counts.failed == 0 {
        BatchStatus::Completed
    } else if counts.failed == counts.total {
        BatchStatus::Failed
    } else {
        BatchStatus::Partial
    }
}

/// True for stage labels of the VLM captioning phase, the slowest step of
/// the ingestion pipeline.
pub fn is_slow_stage(stage: &str) -> bool {
    let stage = stage.trim().to_ascii_lowercase();
    stage.starts_with("vlm") || stage.contains("caption")
}

/// Interval for the next poll: widened while the processing job is captioning.
pub fn next_poll_interval(jobs: &[BatchJob], config: &BatchConfig) -> Duration {
    let captioning = jobs
        .iter()
        .find(|job| job.status == JobStatus::Processing)
        .and_then(|job| job.current_stage.as_deref())
        .is_some_and(is_slow_stage);
    if captioning {
        config.slow_stage_interval
    } else {
        config.poll_interval
    }
}
