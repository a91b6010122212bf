//! Streaming sessions over Server-Sent Events.
//!
//! A session owns one HTTP response. Events are decoded with
//! [`synth_core::SseDecoder`] and handed to a [`StreamHandlers`] implementation
//! in arrival order. At most one of `on_done`, `on_error` or `on_abort` fires
//! per session. A `done` event ends the session: the rest of the body is not
//! read, `on_complete` follows and a later cancel does nothing. A body that
//! ends without `done` gets only `on_complete`.

use std::ops::ControlFlow;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use synth_core::{Payload, SseDecoder, StreamEvent};
use synth_logging::{synth_debug, synth_trace, synth_warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{error_from_response, map_body_read_error, map_reqwest_error};
use crate::{ApiError, FailureKind, HttpClient, StreamError};

/// Callbacks for one streaming session. Every method defaults to a no-op.
pub trait StreamHandlers: Send + 'static {
    fn on_token(&mut self, _token: String) {}
    fn on_citation(&mut self, _citation: Value) {}
    fn on_image(&mut self, _image: Value) {}
    fn on_stage(&mut self, _stage: Value) {}
    fn on_section(&mut self, _section: Value) {}
    fn on_progress(&mut self, _progress: Value) {}
    fn on_done(&mut self, _payload: Value) {}
    fn on_error(&mut self, _error: StreamError) {}
    /// Unrecognised event names and payloads that were not JSON.
    fn on_data(&mut self, _event: String, _payload: Payload) {}
    fn on_complete(&mut self) {}
    fn on_abort(&mut self) {}
}

/// Routes one decoded event. Breaks on a server `error` event, which ends the session.
pub fn dispatch<H: StreamHandlers + ?Sized>(handlers: &mut H, event: StreamEvent) -> ControlFlow<()> {
    match event {
        StreamEvent::Token(token) => handlers.on_token(token),
        StreamEvent::Citation(citation) => handlers.on_citation(citation),
        StreamEvent::Image(image) => handlers.on_image(image),
        StreamEvent::Stage(stage) => handlers.on_stage(stage),
        StreamEvent::Section(section) => handlers.on_section(section),
        StreamEvent::Progress(progress) => handlers.on_progress(progress),
        StreamEvent::Done(payload) => handlers.on_done(payload),
        StreamEvent::Error { message } => {
            handlers.on_error(StreamError::Server { message });
            return ControlFlow::Break(());
        }
        StreamEvent::Data { event, payload } => handlers.on_data(event, payload),
    }
    ControlFlow::Continue(())
}

enum Outcome {
    Completed,
    /// The `done` event was delivered.
    Finished,
    Failed(StreamError),
    /// The server's `error` event was already delivered.
    ServerError,
    Aborted,
}

/// Cloneable cancel switch for a session.
#[derive(Debug, Clone)]
pub struct StreamCanceller {
    token: CancellationToken,
}

impl StreamCanceller {
    /// Aborts the session. Idempotent; `on_abort` fires at most once.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            synth_debug!("Stream cancelled by caller");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct StreamHandle {
    canceller: StreamCanceller,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> StreamCanceller {
        self.canceller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the session has delivered its terminal callback.
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            synth_warn!("Stream task ended abnormally: {}", err);
        }
    }
}

/// Opens a streaming session: POSTs `body` as JSON to `path` and feeds the
/// response through the SSE decoder on a spawned task.
///
/// Must be called from within a tokio runtime.
pub fn open_stream<B, H>(client: &HttpClient, path: &str, body: &B, handlers: H) -> StreamHandle
where
    B: Serialize + ?Sized,
    H: StreamHandlers,
{
    let request = serde_json::to_value(body)
        .map_err(|err| ApiError::new(FailureKind::InvalidRequest, err.to_string()))
        .and_then(|body| client.stream_request(path, &body));
    let token = CancellationToken::new();
    let task = tokio::spawn(run_session(request, handlers, token.clone()));
    StreamHandle {
        canceller: StreamCanceller { token },
        task,
    }
}

async fn run_session<H: StreamHandlers>(
    request: Result<reqwest::RequestBuilder, ApiError>,
    mut handlers: H,
    token: CancellationToken,
) {
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::Aborted,
        outcome = drive(request, &mut handlers, &token) => outcome,
    };
    let outcome = match outcome {
        Outcome::Completed | Outcome::Failed(StreamError::Read(_)) if token.is_cancelled() => {
            Outcome::Aborted
        }
        other => other,
    };

    match outcome {
        Outcome::Completed | Outcome::Finished => {
            synth_debug!("Stream completed");
            handlers.on_complete();
        }
        Outcome::Failed(err) => {
            synth_warn!("Stream failed: {}", err);
            handlers.on_error(err);
        }
        Outcome::ServerError => {}
        Outcome::Aborted => handlers.on_abort(),
    }
}

async fn drive<H: StreamHandlers>(
    request: Result<reqwest::RequestBuilder, ApiError>,
    handlers: &mut H,
    token: &CancellationToken,
) -> Outcome {
    let request = match request {
        Ok(request) => request,
        Err(err) => return Outcome::Failed(StreamError::Transport(err)),
    };
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => return Outcome::Failed(StreamError::Transport(map_reqwest_error(err))),
    };
    if !response.status().is_success() {
        return Outcome::Failed(StreamError::Transport(error_from_response(response).await));
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => return Outcome::Failed(StreamError::Read(map_body_read_error(err))),
        };
        synth_trace!("Stream chunk of {} bytes", chunk.len());
        if let Some(outcome) = deliver(decoder.feed(&chunk), handlers, token) {
            return outcome;
        }
    }
    if let Some(outcome) = deliver(decoder.finish(), handlers, token) {
        return outcome;
    }
    Outcome::Completed
}

fn deliver<H: StreamHandlers>(
    events: Vec<StreamEvent>,
    handlers: &mut H,
    token: &CancellationToken,
) -> Option<Outcome> {
    for event in events {
        if token.is_cancelled() {
            return Some(Outcome::Aborted);
        }
        let is_done = matches!(event, StreamEvent::Done(_));
        if dispatch(handlers, event).is_break() {
            return Some(Outcome::ServerError);
        }
        if is_done {
            return Some(Outcome::Finished);
        }
    }
    None
}
