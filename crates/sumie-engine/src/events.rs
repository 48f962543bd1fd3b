use sumie_core::{Bounds, Extent};

use crate::generator::Workspace;
use crate::job::JobHandle;

/// Events flowing over a document's event channel.
///
/// Spawned submission tasks and the job queue publish these; the host pumps
/// the receiving end and feeds every event back into
/// [`Generator::handle_event`](crate::generator::Generator::handle_event),
/// which keeps all queue mutation on one scheduling context per document.
#[derive(Debug, Clone)]
pub enum GenEvent {
    /// The server accepted a standard generation; record it in the queue.
    DiffusionEnqueued {
        id: String,
        prompt: String,
        bounds: Bounds,
    },
    /// The server accepted a job that was enqueued locally before
    /// submission; attach the identifier it assigned.
    JobAssigned { job: JobHandle, id: String },
    /// The server accepted an upscale; the document grows to the target
    /// extent right away, not when the job completes.
    UpscaleEnqueued {
        job: JobHandle,
        id: String,
        target: Extent,
    },
    /// Submission failed before a job was accepted.
    SubmissionFailed { message: String },
    /// Observable state changed; nothing to apply, for the host's UI.
    Notification(Notification),
}

#[derive(Debug, Clone)]
pub enum Notification {
    ProgressChanged(f32),
    ErrorChanged(String),
    HasErrorChanged(bool),
    JobFinished { id: String },
    SelectionChanged,
    QueueChanged,
    WorkspaceChanged(Workspace),
}
