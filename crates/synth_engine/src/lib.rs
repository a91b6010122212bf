//! NeuroSynth client engine: HTTP transport, SSE sessions and the batch controller.
mod client;
mod controller;
mod settings;
mod stream;
mod types;

pub use client::{error_from_body, BatchApi, HttpClient};
pub use controller::{BatchController, BatchObserver, NoopObserver};
pub use settings::{load_settings, ClientSettings, Endpoints, SettingsError};
pub use stream::{dispatch, open_stream, StreamCanceller, StreamHandle, StreamHandlers};
pub use types::{ApiError, FailureKind, FieldError, StreamError};
