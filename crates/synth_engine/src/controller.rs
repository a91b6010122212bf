use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use synth_core::{
    update, BatchConfig, BatchJob, BatchState, BatchStatusSnapshot, BatchSubmission,
    BatchViewModel, Effect, IngestOptions, Msg, UploadFile,
};
use synth_logging::{synth_debug, synth_error, synth_info, synth_trace, synth_warn};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::BatchApi;

/// Receives batch notifications. Every method defaults to a no-op.
pub trait BatchObserver: Send + Sync {
    /// Batch settled as completed; receives the final snapshot.
    fn on_complete(&self, _snapshot: &BatchStatusSnapshot) {}
    fn on_error(&self, _message: &str) {}
    /// Fires once per job id.
    fn on_file_complete(&self, _job: &BatchJob) {}
    fn on_state_changed(&self, _view: &BatchViewModel) {}
}

pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Drives one batch at a time: executes the effects of the `synth_core`
/// state machine against a `BatchApi` and owns the polling timer.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct BatchController {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn BatchApi>,
    observer: Arc<dyn BatchObserver>,
    state: Mutex<BatchState>,
    timer: Mutex<Option<CancellationToken>>,
    alive: AtomicBool,
}

impl BatchController {
    pub fn new(
        api: Arc<dyn BatchApi>,
        config: BatchConfig,
        observer: Arc<dyn BatchObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                observer,
                state: Mutex::new(BatchState::with_config(config)),
                timer: Mutex::new(None),
                alive: AtomicBool::new(true),
            }),
        }
    }

    pub fn view(&self) -> BatchViewModel {
        self.inner.lock_state().view()
    }

    pub fn state(&self) -> BatchState {
        self.inner.lock_state().clone()
    }

    /// Interval of the running poll timer, if any.
    pub fn current_interval(&self) -> Option<Duration> {
        self.inner.lock_state().current_interval()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Uploads `files` as a new batch and starts polling it. Returns `None`
    /// when there is nothing to upload, the upload failed, or the controller
    /// was reset or shut down meanwhile; the reason is in `view().error`.
    pub async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
        options: IngestOptions,
    ) -> Option<BatchSubmission> {
        let mut accepted = None;
        for effect in self.inner.dispatch(Msg::UploadRequested { files, options }) {
            let (ticket, files, options) = match effect {
                Effect::SubmitUpload {
                    ticket,
                    files,
                    options,
                } => (ticket, files, options),
                other => {
                    synth_warn!("Unexpected request effect during upload: {:?}", other);
                    continue;
                }
            };
            synth_info!("Uploading {} files (ticket {})", files.len(), ticket);
            let msg = match self.inner.api.upload_batch(files, &options).await {
                Ok(submission) => {
                    accepted = Some(submission.clone());
                    Msg::UploadSucceeded {
                        ticket,
                        submission,
                        started_at: std::time::Instant::now(),
                    }
                }
                Err(err) => {
                    synth_error!("Batch upload failed: {}", err);
                    Msg::UploadFailed {
                        ticket,
                        message: err.to_string(),
                    }
                }
            };
            self.inner.dispatch(msg);
        }

        let current = self.inner.lock_state().batch_id().map(str::to_string);
        accepted.filter(|submission| current.as_deref() == Some(submission.batch_id.as_str()))
    }

    /// Asks the backend to cancel the active batch. On acknowledgement the
    /// batch is `Cancelled` and polling stops immediately.
    pub async fn cancel_batch(&self) -> bool {
        let mut acknowledged = false;
        for effect in self.inner.dispatch(Msg::CancelRequested) {
            let batch_id = match effect {
                Effect::RequestCancel { batch_id } => batch_id,
                other => {
                    synth_warn!("Unexpected request effect during cancel: {:?}", other);
                    continue;
                }
            };
            let msg = match self.inner.api.cancel_batch(&batch_id).await {
                Ok(()) => {
                    acknowledged = true;
                    Msg::CancelAcknowledged { batch_id }
                }
                Err(err) => {
                    synth_error!("Cancelling batch {} failed: {}", batch_id, err);
                    Msg::CancelFailed {
                        batch_id,
                        message: err.to_string(),
                    }
                }
            };
            self.inner.dispatch(msg);
        }
        acknowledged
    }

    /// Asks the backend to requeue the failed jobs of a `Partial` or `Failed`
    /// batch. Returns the number of requeued jobs; polling resumes when it is
    /// non-zero.
    pub async fn retry_failed(&self) -> u32 {
        let mut requeued = 0;
        for effect in self.inner.dispatch(Msg::RetryRequested) {
            let batch_id = match effect {
                Effect::RequestRetry { batch_id } => batch_id,
                other => {
                    synth_warn!("Unexpected request effect during retry: {:?}", other);
                    continue;
                }
            };
            let msg = match self.inner.api.retry_failed(&batch_id).await {
                Ok(retry_count) => {
                    requeued = retry_count;
                    Msg::RetryAcknowledged {
                        batch_id,
                        retry_count,
                    }
                }
                Err(err) => {
                    synth_error!("Retrying batch {} failed: {}", batch_id, err);
                    Msg::RetryFailed {
                        batch_id,
                        message: err.to_string(),
                    }
                }
            };
            self.inner.dispatch(msg);
        }
        requeued
    }

    /// Stops polling and returns to `Idle`, forgetting the current batch.
    pub fn reset(&self) {
        self.inner.dispatch(Msg::ResetRequested);
        // The timer may belong to a batch the state no longer tracks.
        self.inner.stop_timer();
    }

    /// Detaches the controller: polling stops and late responses are dropped.
    pub fn shutdown(&self) {
        if self.inner.alive.swap(false, Ordering::SeqCst) {
            synth_debug!("Batch controller shut down");
        }
        self.inner.stop_timer();
    }
}

impl Inner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        lock(&self.state)
    }

    /// Applies `msg`, runs local effects and returns the ones that need a
    /// backend request.
    fn dispatch(self: &Arc<Self>, msg: Msg) -> Vec<Effect> {
        let effects = self.apply(msg);
        self.perform(effects)
    }

    fn apply(&self, msg: Msg) -> Vec<Effect> {
        if !self.is_alive() {
            synth_trace!("Dropping message after shutdown");
            return Vec::new();
        }
        let (effects, changed) = {
            let mut guard = self.lock_state();
            let state = std::mem::take(&mut *guard);
            let (mut state, effects) = update(state, msg);
            let changed = state.consume_dirty().then(|| state.view());
            *guard = state;
            (effects, changed)
        };
        if let Some(view) = changed {
            self.observer.on_state_changed(&view);
        }
        effects
    }

    fn perform(self: &Arc<Self>, effects: Vec<Effect>) -> Vec<Effect> {
        let (requests, local): (Vec<_>, Vec<_>) = effects.into_iter().partition(Effect::is_request);
        for effect in local {
            if !self.is_alive() {
                break;
            }
            match effect {
                Effect::StartPolling { batch_id, interval } => {
                    self.start_timer(batch_id, interval, true);
                }
                Effect::ReschedulePolling { batch_id, interval } => {
                    self.start_timer(batch_id, interval, false);
                }
                Effect::StopPolling => self.stop_timer(),
                Effect::NotifyFileComplete(job) => {
                    synth_info!("File {} ({}) completed", job.filename, job.job_id);
                    self.observer.on_file_complete(&job);
                }
                Effect::NotifyComplete(snapshot) => {
                    let took = self.lock_state().started_at().map(|at| at.elapsed());
                    synth_info!(
                        "Batch completed: {} files in {:?}",
                        snapshot.jobs.len(),
                        took
                    );
                    self.observer.on_complete(&snapshot);
                }
                Effect::NotifyError(message) => self.observer.on_error(&message),
                // Partitioned out above.
                Effect::SubmitUpload { .. }
                | Effect::RequestCancel { .. }
                | Effect::RequestRetry { .. } => {}
            }
        }
        if !self.is_alive() {
            return Vec::new();
        }
        requests
    }

    fn start_timer(self: &Arc<Self>, batch_id: String, interval: Duration, immediate: bool) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.timer).replace(token.clone()) {
            previous.cancel();
        }
        synth_debug!(
            "Polling batch {} every {:?} (immediate: {})",
            batch_id,
            interval,
            immediate
        );
        tokio::spawn(poll_loop(
            Arc::downgrade(self),
            batch_id,
            interval,
            immediate,
            token,
        ));
    }

    fn stop_timer(&self) {
        if let Some(token) = lock(&self.timer).take() {
            token.cancel();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

async fn poll_loop(
    inner: Weak<Inner>,
    batch_id: String,
    period: Duration,
    immediate: bool,
    token: CancellationToken,
) {
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_alive() {
            break;
        }

        let api = Arc::clone(&inner.api);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = api.batch_status(&batch_id) => result,
        };
        if token.is_cancelled() {
            break;
        }

        let msg = match result {
            Ok(snapshot) => Msg::PollSucceeded {
                batch_id: batch_id.clone(),
                snapshot,
            },
            Err(err) => Msg::PollFailed {
                batch_id: batch_id.clone(),
                message: err.to_string(),
            },
        };
        let leftover = inner.dispatch(msg);
        if !leftover.is_empty() {
            synth_warn!("Poll produced unexpected requests: {:?}", leftover);
        }
    }
    synth_trace!("Poll loop for batch {} stopped", batch_id);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
