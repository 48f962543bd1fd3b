use async_trait::async_trait;
use serde_json::Value;
use sumie_core::ImageCollection;
use thiserror::Error;

use crate::workflow::WorkDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Progress,
    Finished,
    Interrupted,
    Error,
}

/// One asynchronous notification from the generation server about a
/// submitted job.
#[derive(Debug, Clone)]
pub struct ClientMessage {
    pub event: ClientEvent,
    pub job_id: String,
    /// Completion fraction in [0, 1]; only meaningful for progress events.
    pub progress: f32,
    /// Output images; empty unless the job finished with a pixel payload.
    pub images: ImageCollection,
    /// Decoded structured result (e.g. a pose graph), if the server
    /// produced one.
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ClientMessage {
    pub fn progress(job_id: impl Into<String>, progress: f32) -> Self {
        Self {
            event: ClientEvent::Progress,
            job_id: job_id.into(),
            progress,
            images: ImageCollection::new(),
            result: None,
            error: None,
        }
    }

    pub fn finished(job_id: impl Into<String>, images: ImageCollection, result: Option<Value>) -> Self {
        Self {
            event: ClientEvent::Finished,
            job_id: job_id.into(),
            progress: 1.0,
            images,
            result,
            error: None,
        }
    }

    pub fn interrupted(job_id: impl Into<String>) -> Self {
        Self {
            event: ClientEvent::Interrupted,
            job_id: job_id.into(),
            progress: 0.0,
            images: ImageCollection::new(),
            result: None,
            error: None,
        }
    }

    pub fn error(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: ClientEvent::Error,
            job_id: job_id.into(),
            progress: 0.0,
            images: ImageCollection::new(),
            result: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// The server rejected or failed a request.
    #[error("{message} [url={url}, code={code}]")]
    Request {
        message: String,
        url: String,
        code: u16,
    },
    /// The server could not be reached at all.
    #[error("could not connect to server: {0}")]
    Connection(String),
}

/// Connection to the remote generation server.
///
/// Work is submitted as opaque descriptors; execution feedback arrives
/// separately as [`ClientMessage`]s which the host routes to
/// [`Generator::handle_message`](crate::generator::Generator::handle_message).
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Submit a work descriptor. Suspends until the server accepts it and
    /// returns the identifier it assigned to the job.
    async fn enqueue(&self, work: WorkDescriptor) -> Result<String, NetworkError>;

    /// Ask the server to interrupt whatever is currently executing.
    async fn interrupt(&self) -> Result<(), NetworkError>;

    /// Ask the server to drop everything still waiting in its queue.
    async fn clear_queue(&self) -> Result<(), NetworkError>;

    /// Upscaler model to use when the user has not picked one.
    fn default_upscaler(&self) -> String;
}
