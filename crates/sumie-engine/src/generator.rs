use std::future::Future;
use std::sync::Arc;

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sumie_core::{Bounds, Extent, Image, Mask, Style};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::client::{ClientEvent, ClientMessage, GenerationClient, NetworkError};
use crate::control::{ControlId, ControlLayer, ControlMode};
use crate::document::{Document, LayerId};
use crate::events::{GenEvent, Notification};
use crate::job::{Job, JobHandle, JobKind, JobState};
use crate::queue::{JobQueue, JobSelection};
use crate::settings::Settings;
use crate::workflow::{self, Conditioning, ControlInput, LiveParams, WorkDescriptor, WorkflowBuilder};

/// Which generation mode the user is working in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workspace {
    #[default]
    Generation,
    Upscaling,
    Live,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleParams {
    /// Upscaler model name; empty means the client's default.
    pub upscaler: String,
    pub factor: f32,
    /// Run a tiled diffusion pass on top of the upscaler model.
    pub use_diffusion: bool,
    pub strength: f32,
}

impl Default for UpscaleParams {
    fn default() -> Self {
        Self {
            upscaler: String::new(),
            factor: 2.0,
            use_diffusion: true,
            strength: 0.3,
        }
    }
}

impl UpscaleParams {
    pub fn target_extent(&self, document: Extent) -> Extent {
        document.scaled(self.factor)
    }
}

/// Per-document generation coordinator. Stores all inputs related to image
/// generation, launches generation jobs, reconciles server messages with
/// the job queue, and maintains the preview layer.
///
/// All mutation happens on the host's event-pumping context: spawned
/// submission tasks only talk to the client and report back through the
/// event channel.
pub struct Generator {
    doc: Box<dyn Document>,
    client: Arc<dyn GenerationClient>,
    workflows: Arc<dyn WorkflowBuilder>,
    settings: Settings,
    events: UnboundedSender<GenEvent>,

    workspace: Workspace,
    pub style: Style,
    pub prompt: String,
    pub negative_prompt: String,
    pub strength: f32,
    pub control: Vec<ControlLayer>,
    pub upscale: UpscaleParams,
    pub live: LiveParams,
    pub jobs: JobQueue,

    progress: f32,
    error: String,
    layer: Option<LayerId>,
    live_result: Option<Image>,

    /// Handle of the most recently spawned submission task. Advisory: a
    /// new submission replaces it without cancelling the previous one.
    pub task: Option<JoinHandle<()>>,
}

impl Generator {
    pub fn new(
        doc: Box<dyn Document>,
        client: Arc<dyn GenerationClient>,
        workflows: Arc<dyn WorkflowBuilder>,
        settings: Settings,
        events: UnboundedSender<GenEvent>,
    ) -> Self {
        let jobs = JobQueue::new(settings.history_bytes(), events.clone());
        let upscale = UpscaleParams {
            upscaler: client.default_upscaler(),
            ..UpscaleParams::default()
        };
        Self {
            doc,
            client,
            workflows,
            settings,
            events,
            workspace: Workspace::default(),
            style: Style::default(),
            prompt: String::new(),
            negative_prompt: String::new(),
            strength: 1.0,
            control: Vec::new(),
            upscale,
            live: LiveParams::default(),
            jobs,
            progress: 0.0,
            error: String::new(),
            layer: None,
            live_result: None,
            task: None,
        }
    }

    /// Enqueue image generation for the current setup.
    pub fn generate(&mut self) {
        if let Err(message) = self.doc.check_color_mode() {
            self.report_error(&message);
            return;
        }

        let extent = self.doc.extent();
        let selection = self.doc.create_mask_from_selection(
            self.settings.selection_grow as f32 / 100.0,
            self.settings.selection_feather as f32 / 100.0,
            self.settings.selection_padding as f32 / 100.0,
        );
        let (mask, selection_bounds) = match selection {
            Some((mask, bounds)) => (Some(mask), Some(bounds)),
            None => (None, None),
        };

        let image_bounds = workflow::compute_bounds(extent, mask.as_ref().map(|m| m.bounds));
        let image = (mask.is_some() || self.strength < 1.0)
            .then(|| self.get_current_image(image_bounds));

        let control = self
            .control
            .iter()
            .map(|c| self.get_control_image(c, image_bounds))
            .collect();
        let mut conditioning = Conditioning::new(&self.prompt, &self.negative_prompt, control);
        if self.strength == 1.0 {
            conditioning.area = selection_bounds
                .map(|bounds| bounds.clamped(image_bounds).minimum_size(64, image_bounds));
        }

        if !self.jobs.any_executing() {
            self.report_progress(0.0);
        }
        self.clear_error();

        let client = self.client.clone();
        let workflows = self.workflows.clone();
        let style = self.style.clone();
        let strength = self.strength;
        let events = self.events.clone();
        self.task = Some(tokio::spawn(report_errors(self.events.clone(), async move {
            let (work, bounds) = build_generation_work(
                &*workflows,
                &style,
                image_bounds,
                &conditioning,
                image,
                mask,
                strength,
            );
            let id = client.enqueue(work).await?;
            let _ = events.send(GenEvent::DiffusionEnqueued {
                id,
                prompt: conditioning.prompt,
                bounds,
            });
            Ok(())
        })));
    }

    /// Upscale the whole document. The job shows up in the queue right
    /// away; the document is resized as soon as the server accepts the
    /// work.
    pub fn upscale_image(&mut self) {
        let extent = self.doc.extent();
        let image = self.doc.get_image(Bounds::from_extent(extent), &[]);
        let target = self.upscale.target_extent(extent);
        let job = self.jobs.add_upscale(Bounds::from_extent(target));
        self.clear_error();

        let client = self.client.clone();
        let workflows = self.workflows.clone();
        let style = self.style.clone();
        let params = self.upscale.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(report_errors(self.events.clone(), async move {
            let mut params = params;
            if params.upscaler.is_empty() {
                params.upscaler = client.default_upscaler();
            }
            let work = if params.use_diffusion {
                workflows.upscale_tiled(&image, &params.upscaler, params.factor, &style, params.strength)
            } else {
                workflows.upscale_simple(&image, &params.upscaler, params.factor)
            };
            let id = client.enqueue(work).await?;
            let _ = events.send(GenEvent::UpscaleEnqueued { job, id, target });
            Ok(())
        })));
    }

    /// Enqueue a single live-preview generation pass.
    pub fn generate_live(&mut self) {
        let bounds = Bounds::from_extent(self.doc.extent());
        let image = (self.live.strength < 1.0).then(|| self.get_current_image(bounds));
        let control = self
            .control
            .iter()
            .map(|c| self.get_control_image(c, bounds))
            .collect();
        let conditioning = Conditioning::new(&self.prompt, &self.negative_prompt, control);
        let job = self.jobs.add_live(&self.prompt, bounds);
        self.clear_error();

        let client = self.client.clone();
        let workflows = self.workflows.clone();
        let style = self.style.clone();
        let live = self.live.clone();
        let extent = bounds.extent();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(report_errors(self.events.clone(), async move {
            let work = match &image {
                Some(image) => workflows.refine(&style, image, &conditioning, live.strength, Some(&live)),
                None => workflows.generate(&style, extent, &conditioning, Some(&live)),
            };
            let id = client.enqueue(work).await?;
            let _ = events.send(GenEvent::JobAssigned { job, id });
            Ok(())
        })));
    }

    /// Extract a control image (lines, depth, pose, ...) from the current
    /// document content for the given control input.
    pub fn generate_control_layer(&mut self, control: ControlId) {
        if let Err(message) = self.doc.check_color_mode() {
            self.report_error(&message);
            return;
        }
        let Some(entry) = self.control.iter().find(|c| c.id == control) else {
            error!("cannot extract a control image, the control input no longer exists");
            return;
        };
        let mode = entry.mode;

        let extent = self.doc.extent();
        let image = self.doc.get_image(Bounds::from_extent(extent), &[]);
        let job = self.jobs.add_control(entry, Bounds::from_extent(image.extent()));
        self.clear_error();

        let client = self.client.clone();
        let workflows = self.workflows.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(report_errors(self.events.clone(), async move {
            let work = workflows.create_control_image(&image, mode);
            let id = client.enqueue(work).await?;
            let _ = events.send(GenEvent::JobAssigned { job, id });
            Ok(())
        })));
    }

    pub fn remove_control_layer(&mut self, control: ControlId) {
        self.control.retain(|c| c.id != control);
    }

    /// Forward an interrupt for the currently executing job, if any.
    pub fn cancel_active(&mut self) {
        if !self.jobs.any_executing() {
            return;
        }
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.interrupt().await {
                warn!("interrupt request failed: {err}");
            }
        });
    }

    /// Drop all locally queued jobs and ask the server to clear its queue.
    /// Fire-and-forget: local removal does not wait for the server.
    pub fn cancel_queued(&mut self) {
        let queued: Vec<JobHandle> = self
            .jobs
            .iter()
            .filter(|j| j.state == JobState::Queued)
            .map(Job::handle)
            .collect();
        if queued.is_empty() {
            return;
        }
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.clear_queue().await {
                warn!("queue clear request failed: {err}");
            }
        });
        for handle in queued {
            self.jobs.remove(handle);
        }
    }

    /// Apply one event from the document's event channel.
    pub fn handle_event(&mut self, event: GenEvent) {
        match event {
            GenEvent::DiffusionEnqueued { id, prompt, bounds } => {
                self.jobs.add(id, prompt, bounds);
            }
            GenEvent::JobAssigned { job, id } => self.assign_job_id(job, id),
            GenEvent::UpscaleEnqueued { job, id, target } => {
                self.assign_job_id(job, id);
                self.doc.resize(target);
            }
            GenEvent::SubmissionFailed { message } => self.report_error(&message),
            GenEvent::Notification(_) => {} // host-facing, nothing to apply
        }
    }

    fn assign_job_id(&mut self, handle: JobHandle, id: String) {
        match self.jobs.get_mut(handle) {
            Some(job) => job.id = Some(id),
            // The job was cancelled locally before the server acknowledged
            // it; the acknowledgement is stale.
            None => debug!("dropping acknowledgement {id} for a removed job"),
        }
    }

    /// Route a server notification to the job it belongs to.
    pub fn handle_message(&mut self, message: ClientMessage) {
        let Some(handle) = self.jobs.find(&message.job_id).map(Job::handle) else {
            error!(
                "received {:?} notification for unknown job {}",
                message.event, message.job_id
            );
            return;
        };

        match message.event {
            ClientEvent::Progress => {
                if let Some(job) = self.jobs.get_mut(handle) {
                    job.state = JobState::Executing;
                }
                self.report_progress(message.progress);
            }
            ClientEvent::Finished => self.finish_job(handle, message),
            ClientEvent::Interrupted => {
                if let Some(job) = self.jobs.get_mut(handle) {
                    job.state = JobState::Cancelled;
                }
                self.report_progress(0.0);
            }
            ClientEvent::Error => {
                if let Some(job) = self.jobs.get_mut(handle) {
                    job.state = JobState::Cancelled;
                }
                let details = message.error.unwrap_or_else(|| "unknown error".to_string());
                self.report_error(&format!("server execution error: {details}"));
            }
        }
    }

    fn finish_job(&mut self, handle: JobHandle, message: ClientMessage) {
        let ClientMessage {
            job_id,
            images,
            result,
            ..
        } = message;

        let kind = self.jobs.get(handle).expect("job was just looked up").kind;
        if let Some(job) = self.jobs.get_mut(handle) {
            job.state = JobState::Finished;
        }
        self.report_progress(1.0);
        if !images.is_empty() {
            self.jobs.set_results(handle, images);
        }

        match kind {
            JobKind::Diffusion => {}
            JobKind::ControlLayer => self.add_control_layer(handle, result.as_ref()),
            JobKind::Upscaling => self.add_upscale_layer(handle),
            JobKind::LivePreview => {
                let image = self
                    .jobs
                    .get(handle)
                    .and_then(|j| j.results().first().cloned());
                if let Some(image) = image {
                    self.live_result = Some(image);
                }
            }
        }
        // Only diffusion jobs are kept as history.
        if kind != JobKind::Diffusion {
            self.jobs.remove(handle);
        }

        self.notify(Notification::JobFinished {
            id: job_id.clone(),
        });
        if kind == JobKind::Diffusion && self.layer.is_none() {
            self.jobs.select(job_id, 0);
        }
        self.update_preview();
    }

    /// Turn a finished control job's result into a document layer and hand
    /// it back to the control input, unless the user removed that input in
    /// the meantime.
    fn add_control_layer(&mut self, handle: JobHandle, result: Option<&Value>) {
        let job = self.jobs.get(handle).expect("job is still in the queue");
        let control = job
            .control
            .expect("control jobs reference their control input");
        assert!(job.kind == JobKind::ControlLayer, "job is not a control-image job");

        let svg = match (control.mode, result) {
            (ControlMode::Pose, Some(result)) => {
                self.workflows.pose_to_svg(result, job.bounds.extent())
            }
            _ => None,
        };
        let layer = if let Some(svg) = svg {
            self.doc.insert_vector_layer(&job.prompt, &svg, self.layer)
        } else if let Some(image) = job.results().first() {
            self.doc.insert_layer(&job.prompt, image, job.bounds, self.layer)
        } else {
            // Execution was cached server-side and no image was produced.
            self.doc.active_layer()
        };

        if let Some(entry) = self.control.iter_mut().find(|c| c.id == control.id) {
            entry.layer = layer;
        }
    }

    fn add_upscale_layer(&mut self, handle: JobHandle) {
        let job = self.jobs.get(handle).expect("job is still in the queue");
        assert!(job.kind == JobKind::Upscaling, "job is not an upscale");
        let image = job
            .results()
            .first()
            .expect("upscaling job did not produce an image");
        if let Some(layer) = self.layer.take() {
            self.doc.remove_layer(layer);
        }
        self.doc.insert_layer(&job.prompt, image, job.bounds, None);
    }

    /// Insert the latest live result as a permanent layer.
    pub fn add_live_layer(&mut self) {
        let image = self
            .live_result
            .as_ref()
            .expect("no live result available");
        let bounds = Bounds::from_extent(self.doc.extent());
        let name = format!("[Live] {}", self.prompt);
        self.doc.insert_layer(&name, image, bounds, None);
    }

    /// Change which job output is previewed.
    pub fn select_result(&mut self, selection: Option<JobSelection>) {
        self.jobs.set_selection(selection);
        self.update_preview();
    }

    /// Reconcile the preview layer with the current selection: show the
    /// selected result, or hide the layer when the selection does not
    /// resolve to one.
    pub fn update_preview(&mut self) {
        match self.jobs.selection().cloned() {
            Some(selection) => self.show_preview(&selection.job, selection.image),
            None => self.hide_preview(),
        }
    }

    fn show_preview(&mut self, job_id: &str, index: usize) {
        let resolved = self
            .jobs
            .find(job_id)
            .filter(|job| index < job.results().len())
            .map(Job::handle);
        let Some(handle) = resolved else {
            // The selected job (or its result) is gone: no preview.
            self.hide_preview();
            return;
        };

        if let Some(layer) = self.layer {
            if !self.doc.is_layer_attached(layer) {
                // The document deleted the layer behind our back.
                self.layer = None;
            }
        }

        let job = self.jobs.get(handle).expect("resolved above");
        let name = format!("[Preview] {}", job.prompt);
        let image = &job.results()[index];
        match self.layer {
            Some(layer) => {
                self.doc.set_layer_name(layer, &name);
                self.doc.set_layer_content(layer, image, job.bounds);
            }
            None => {
                let layer = self.doc.insert_layer(&name, image, job.bounds, None);
                self.doc.set_layer_locked(layer, true);
                self.layer = Some(layer);
            }
        }
    }

    fn hide_preview(&mut self) {
        if let Some(layer) = self.layer {
            self.doc.hide_layer(layer);
        }
    }

    /// Promote the preview layer to a user layer.
    pub fn apply_current_result(&mut self) {
        assert!(
            self.can_apply_result(),
            "no visible preview layer to apply"
        );
        let layer = self.layer.take().expect("checked above");
        self.doc.set_layer_locked(layer, false);
        let name = self.doc.layer_name(layer).replace("[Preview]", "[Generated]");
        self.doc.set_layer_name(layer, &name);
    }

    pub fn can_apply_result(&self) -> bool {
        self.layer
            .is_some_and(|layer| self.doc.is_layer_visible(layer))
    }

    fn get_current_image(&self, bounds: Bounds) -> Image {
        // Exclude control layers from the projection, except those that
        // feed document pixels back in.
        let mut exclude: Vec<LayerId> = self
            .control
            .iter()
            .filter(|c| !matches!(c.mode, ControlMode::Image | ControlMode::Blur))
            .map(|c| c.layer)
            .collect();
        if let Some(layer) = self.layer {
            exclude.push(layer);
        }
        self.doc.get_image(bounds, &exclude)
    }

    fn get_control_image(&self, control: &ControlLayer, bounds: Bounds) -> ControlInput {
        let mut bounds = Some(bounds);
        if control.mode == ControlMode::Image && !self.doc.layer_bounds(control.layer).is_empty() {
            // The user placed a distinct image region; it wins over the
            // generation bounds.
            bounds = None;
        }
        let mut image = self.doc.get_layer_image(control.layer, bounds);
        if control.mode.is_lines() || control.mode == ControlMode::Stencil {
            image.make_opaque([255, 255, 255]);
        }
        ControlInput {
            mode: control.mode,
            image,
            strength: control.strength,
            end: control.end,
        }
    }

    pub fn workspace(&self) -> Workspace {
        self.workspace
    }

    pub fn set_workspace(&mut self, workspace: Workspace) {
        if self.workspace == Workspace::Live {
            self.live.is_active = false;
        }
        self.workspace = workspace;
        self.notify(Notification::WorkspaceChanged(workspace));
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    fn report_progress(&mut self, value: f32) {
        self.progress = value;
        self.notify(Notification::ProgressChanged(value));
    }

    pub fn report_error(&mut self, message: &str) {
        error!("{message}");
        self.live.is_active = false;
        self.set_error(message.to_string());
    }

    pub fn clear_error(&mut self) {
        if !self.error.is_empty() {
            self.set_error(String::new());
        }
    }

    // All error mutation funnels through here so the derived "has error"
    // notification cannot get out of sync.
    fn set_error(&mut self, message: String) {
        let had_error = self.has_error();
        self.error = message;
        self.notify(Notification::ErrorChanged(self.error.clone()));
        if had_error != self.has_error() {
            self.notify(Notification::HasErrorChanged(self.has_error()));
        }
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// Finished jobs, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.state == JobState::Finished)
    }

    pub fn live_result(&self) -> Option<&Image> {
        self.live_result.as_ref()
    }

    pub fn has_live_result(&self) -> bool {
        self.live_result.is_some()
    }

    pub fn document(&self) -> &dyn Document {
        &*self.doc
    }

    pub fn is_active(&self) -> bool {
        self.doc.is_active()
    }

    pub fn is_valid(&self) -> bool {
        self.doc.is_valid()
    }

    fn notify(&self, notification: Notification) {
        let _ = self.events.send(GenEvent::Notification(notification));
    }
}

/// Run a submission to completion and turn any failure into a single
/// reported error instead of propagating to the caller of `generate*`.
async fn report_errors(
    events: UnboundedSender<GenEvent>,
    submit: impl Future<Output = Result<(), NetworkError>>,
) {
    if let Err(err) = submit.await {
        error!("generation request failed: {err}");
        let _ = events.send(GenEvent::SubmissionFailed {
            message: err.to_string(),
        });
    }
}

/// Pick the workflow for a standard generation from what is available:
/// a source image, a mask, and the denoising strength.
///
/// When a mask is present the job bounds become the mask's absolute
/// document bounds (where the result is inserted), while the mask itself is
/// rewritten relative to the cropped working image sent to the server.
/// Returns the descriptor together with the bounds the job applies to.
fn build_generation_work(
    workflows: &dyn WorkflowBuilder,
    style: &Style,
    bounds: Bounds,
    conditioning: &Conditioning,
    image: Option<Image>,
    mask: Option<Mask>,
    strength: f32,
) -> (WorkDescriptor, Bounds) {
    let mut bounds = bounds;
    let mask = mask.map(|mut mask| {
        let relative = mask.bounds.relative_to(bounds);
        bounds = mask.bounds;
        mask.bounds = relative;
        mask
    });

    let work = match (&image, &mask) {
        (None, None) => {
            assert!(
                strength == 1.0,
                "generation without a source image requires full strength"
            );
            workflows.generate(style, bounds.extent(), conditioning, None)
        }
        (Some(image), None) => {
            assert!(
                strength < 1.0,
                "refining an unmasked image requires strength below 1"
            );
            workflows.refine(style, image, conditioning, strength, None)
        }
        (Some(image), Some(mask)) if strength == 1.0 => {
            workflows.inpaint(style, image, mask, conditioning)
        }
        (Some(image), Some(mask)) => {
            workflows.refine_region(style, image, mask, conditioning, strength)
        }
        (None, Some(_)) => unreachable!("masked generation requires a captured source image"),
    };
    (work, bounds)
}
