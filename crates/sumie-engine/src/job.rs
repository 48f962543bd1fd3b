use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sumie_core::{Bounds, ImageCollection};

use crate::control::{ControlId, ControlMode};

/// Queue-local job identity, assigned at insertion. Stays valid for the
/// whole lifetime of the job record, unlike the server identifier which may
/// not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Diffusion,
    ControlLayer,
    Upscaling,
    LivePreview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Executing,
    Finished,
    Cancelled,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Executing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Link from a control-layer job back to the control input it was extracted
/// for. The mode rides along so the job can still complete after the user
/// removed the control input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRef {
    pub id: ControlId,
    pub mode: ControlMode,
}

/// One requested unit of generation work and its eventual outputs.
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) handle: JobHandle,
    pub id: Option<String>,
    pub kind: JobKind,
    pub state: JobState,
    pub prompt: String,
    pub bounds: Bounds,
    pub control: Option<ControlRef>,
    pub timestamp: DateTime<Utc>,
    pub(crate) results: ImageCollection,
}

impl Job {
    pub(crate) fn new(
        handle: JobHandle,
        id: Option<String>,
        kind: JobKind,
        prompt: String,
        bounds: Bounds,
    ) -> Self {
        Self {
            handle,
            id,
            kind,
            state: JobState::Queued,
            prompt,
            bounds,
            control: None,
            timestamp: Utc::now(),
            results: ImageCollection::new(),
        }
    }

    pub fn handle(&self) -> JobHandle {
        self.handle
    }

    pub fn results(&self) -> &ImageCollection {
        &self.results
    }
}
