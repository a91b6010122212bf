use synth_logging::{synth_debug, synth_info, synth_warn};

use crate::state::{next_poll_interval, Transport};
use crate::{BatchState, BatchStatus, BatchStatusSnapshot, Effect, Msg};

pub const NO_FILES_ERROR: &str = "No files selected for upload";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: BatchState, msg: Msg) -> (BatchState, Vec<Effect>) {
    let effects = match msg {
        Msg::UploadRequested { files, options } => {
            if files.is_empty() {
                state.set_error(NO_FILES_ERROR);
                return (state, Vec::new());
            }
            let was_polling = state.current_interval().is_some();
            let ticket = state.begin_upload();
            let mut effects = Vec::with_capacity(2);
            if was_polling {
                effects.push(Effect::StopPolling);
            }
            effects.push(Effect::SubmitUpload {
                ticket,
                files,
                options,
            });
            effects
        }
        Msg::UploadSucceeded {
            ticket,
            submission,
            started_at,
        } => {
            if !is_current_upload(&state, ticket) {
                synth_debug!("Dropping stale upload response ticket={}", ticket);
                return (state, Vec::new());
            }
            let batch_id = submission.batch_id;
            let interval = state.config().poll_interval;
            synth_info!(
                "Batch {} accepted with {} jobs",
                batch_id,
                submission.jobs.len()
            );
            state.upload_accepted(batch_id.clone(), submission.jobs, started_at);
            vec![Effect::StartPolling { batch_id, interval }]
        }
        Msg::UploadFailed { ticket, message } => {
            if !is_current_upload(&state, ticket) {
                synth_debug!("Dropping stale upload failure ticket={}", ticket);
                return (state, Vec::new());
            }
            state.upload_failed(message.clone());
            vec![Effect::NotifyError(message)]
        }
        Msg::PollSucceeded { batch_id, snapshot } => apply_poll(&mut state, &batch_id, snapshot),
        Msg::PollFailed { batch_id, message } => {
            if is_current_batch(&state, &batch_id) {
                synth_warn!("Poll for batch {} failed: {}", batch_id, message);
            }
            Vec::new()
        }
        Msg::CancelRequested => match state.batch_id() {
            Some(batch_id) if state.status().is_active() => vec![Effect::RequestCancel {
                batch_id: batch_id.to_string(),
            }],
            _ => Vec::new(),
        },
        Msg::CancelAcknowledged { batch_id } => {
            if !is_current_batch(&state, &batch_id) {
                return (state, Vec::new());
            }
            synth_info!("Batch {} cancelled by user", batch_id);
            state.confirm_cancel();
            vec![Effect::StopPolling]
        }
        Msg::CancelFailed { batch_id, message }
        | Msg::RetryFailed { batch_id, message } => {
            if !is_current_batch(&state, &batch_id) {
                return (state, Vec::new());
            }
            state.set_error(message.clone());
            vec![Effect::NotifyError(message)]
        }
        Msg::RetryRequested => match state.batch_id() {
            Some(batch_id) if state.status().can_retry() => vec![Effect::RequestRetry {
                batch_id: batch_id.to_string(),
            }],
            _ => Vec::new(),
        },
        Msg::RetryAcknowledged {
            batch_id,
            retry_count,
        } => {
            if !is_current_batch(&state, &batch_id) || !state.status().can_retry() {
                return (state, Vec::new());
            }
            if retry_count == 0 {
                synth_info!("Batch {}: backend requeued no jobs", batch_id);
                return (state, Vec::new());
            }
            synth_info!("Batch {}: {} jobs requeued", batch_id, retry_count);
            let interval = state.begin_retry();
            vec![Effect::StartPolling { batch_id, interval }]
        }
        Msg::ResetRequested => {
            let was_polling = state.current_interval().is_some();
            state.reset();
            if was_polling {
                vec![Effect::StopPolling]
            } else {
                Vec::new()
            }
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn is_current_upload(state: &BatchState, ticket: u64) -> bool {
    state.upload_ticket() == ticket && state.transport() == Transport::Uploading
}

fn is_current_batch(state: &BatchState, batch_id: &str) -> bool {
    state.batch_id() == Some(batch_id)
}

fn apply_poll(state: &mut BatchState, batch_id: &str, snapshot: BatchStatusSnapshot) -> Vec<Effect> {
    if !is_current_batch(state, batch_id) {
        synth_debug!("Ignoring snapshot for inactive batch {}", batch_id);
        return Vec::new();
    }
    if state.user_requested_cancel() {
        if !snapshot.status.is_terminal() {
            synth_warn!(
                "Batch {} cancelled locally but backend still reports {:?}",
                batch_id,
                snapshot.status
            );
        }
        return Vec::new();
    }
    if !matches!(state.transport(), Transport::Tracking | Transport::Retrying) {
        return Vec::new();
    }

    let mut effects: Vec<Effect> = state
        .apply_snapshot(&snapshot)
        .into_iter()
        .map(Effect::NotifyFileComplete)
        .collect();

    let status = state.status();
    if status.is_terminal() {
        let counts = state.counts();
        synth_info!(
            "Batch {} finished as {:?} ({} completed, {} failed)",
            batch_id,
            status,
            counts.completed,
            counts.failed
        );
        state.stop_polling();
        effects.push(Effect::StopPolling);
        match status {
            BatchStatus::Completed => effects.push(Effect::NotifyComplete(snapshot)),
            BatchStatus::Failed => {
                let message = failure_message(state);
                state.set_error(message.clone());
                effects.push(Effect::NotifyError(message));
            }
            _ => {}
        }
        return effects;
    }

    let interval = next_poll_interval(state.jobs(), state.config());
    if state.set_interval(interval) {
        synth_debug!("Batch {}: poll interval now {:?}", batch_id, interval);
        effects.push(Effect::ReschedulePolling {
            batch_id: batch_id.to_string(),
            interval,
        });
    }
    effects
}

fn failure_message(state: &BatchState) -> String {
    let counts = state.counts();
    let first_error = state.jobs().iter().find_map(|job| job.error.as_deref());
    match first_error {
        Some(error) => format!(
            "Batch failed: {} of {} files failed ({})",
            counts.failed, counts.total, error
        ),
        None => format!(
            "Batch failed: {} of {} files failed",
            counts.failed, counts.total
        ),
    }
}
