//! NeuroSynth client core: pure batch state machine, view model and SSE framing.
mod effect;
mod msg;
mod sse;
mod state;
mod stream_event;
mod types;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use sse::{SseDecoder, DEFAULT_EVENT_NAME};
pub use state::{
    is_slow_stage, next_poll_interval, BatchConfig, BatchState, BatchStatus,
    DEFAULT_POLL_INTERVAL, SLOW_STAGE_POLL_INTERVAL,
};
pub use stream_event::{Payload, StreamEvent, DEFAULT_STREAM_ERROR};
pub use types::{
    BatchId, BatchJob, BatchStatusSnapshot, BatchSubmission, IngestOptions, JobStatus,
    RemoteBatchStatus, UploadFile,
};
pub use update::{update, NO_FILES_ERROR};
pub use view_model::{BatchViewModel, JobCounts};
