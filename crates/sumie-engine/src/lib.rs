//! Per-document orchestration of asynchronous image-generation jobs.
//!
//! An interactive editor submits generation work (full generation, masked
//! inpainting, refinement, control-image extraction, upscaling, live
//! preview) through a [`Generator`]; the engine builds work descriptors,
//! submits them to a [`GenerationClient`], tracks every job in a
//! memory-bounded [`JobQueue`], and applies results back into the host
//! [`Document`] — including a single reusable preview layer for browsing
//! finished results.

pub mod client;
pub mod control;
pub mod document;
pub mod events;
pub mod generator;
pub mod job;
pub mod queue;
pub mod settings;
pub mod workflow;

pub use client::{ClientEvent, ClientMessage, GenerationClient, NetworkError};
pub use control::{ControlId, ControlLayer, ControlMode};
pub use document::{Document, LayerId};
pub use events::{GenEvent, Notification};
pub use generator::{Generator, UpscaleParams, Workspace};
pub use job::{ControlRef, Job, JobHandle, JobKind, JobState};
pub use queue::{JobQueue, JobSelection};
pub use settings::Settings;
pub use workflow::{
    Conditioning, ControlInput, LiveParams, WorkDescriptor, WorkflowBuilder, compute_bounds,
};
