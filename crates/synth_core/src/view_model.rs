use crate::{BatchJob, BatchStatus, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl JobCounts {
    pub fn from_jobs(jobs: &[BatchJob]) -> Self {
        let mut counts = Self {
            total: jobs.len(),
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Share of finished jobs, rounded to the nearest whole percent.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let finished = (self.completed + self.failed) as f64;
        (finished / self.total as f64 * 100.0).round() as u8
    }
}

/// Everything a UI needs to render a batch. Rebuilt from `BatchState` on demand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchViewModel {
    pub status: BatchStatus,
    pub batch_id: Option<String>,
    pub jobs: Vec<BatchJob>,
    pub counts: JobCounts,
    pub percent: u8,
    pub is_active: bool,
    pub can_retry: bool,
    pub current_file_index: usize,
    pub current_file_name: Option<String>,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
    pub dirty: bool,
}
