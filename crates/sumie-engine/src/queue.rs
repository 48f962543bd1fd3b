use std::collections::VecDeque;

use sumie_core::{Bounds, ImageCollection};
use tokio::sync::mpsc::UnboundedSender;

use crate::control::{ControlId, ControlLayer};
use crate::events::{GenEvent, Notification};
use crate::job::{ControlRef, Job, JobHandle, JobKind, JobState};

/// Which job output is currently shown as the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSelection {
    /// Server identifier of the selected job.
    pub job: String,
    /// Index into the job's result collection.
    pub image: usize,
}

/// Queue of waiting, ongoing and finished jobs for one document.
///
/// Finished diffusion jobs stay around as history until the memory budget
/// pushes them out; all other kinds are removed as soon as they complete.
pub struct JobQueue {
    entries: VecDeque<Job>,
    selection: Option<JobSelection>,
    memory_usage: u64,
    history_limit: u64,
    next_handle: u64,
    events: UnboundedSender<GenEvent>,
}

impl JobQueue {
    pub fn new(history_limit: u64, events: UnboundedSender<GenEvent>) -> Self {
        Self {
            entries: VecDeque::new(),
            selection: None,
            memory_usage: 0,
            history_limit,
            next_handle: 0,
            events,
        }
    }

    fn push(&mut self, job: Job) -> JobHandle {
        let handle = job.handle;
        self.entries.push_back(job);
        self.notify(Notification::QueueChanged);
        handle
    }

    fn next_handle(&mut self) -> JobHandle {
        self.next_handle += 1;
        JobHandle(self.next_handle)
    }

    /// Append a diffusion job that the server has already accepted.
    pub fn add(
        &mut self,
        id: impl Into<String>,
        prompt: impl Into<String>,
        bounds: Bounds,
    ) -> JobHandle {
        let handle = self.next_handle();
        self.push(Job::new(
            handle,
            Some(id.into()),
            JobKind::Diffusion,
            prompt.into(),
            bounds,
        ))
    }

    /// Append a control-image extraction job; the server identifier is
    /// attached once the submission is acknowledged.
    pub fn add_control(&mut self, control: &ControlLayer, bounds: Bounds) -> JobHandle {
        let handle = self.next_handle();
        let mut job = Job::new(
            handle,
            None,
            JobKind::ControlLayer,
            format!("[Control] {}", control.mode.text()),
            bounds,
        );
        job.control = Some(ControlRef {
            id: control.id,
            mode: control.mode,
        });
        self.push(job)
    }

    pub fn add_upscale(&mut self, bounds: Bounds) -> JobHandle {
        let handle = self.next_handle();
        self.push(Job::new(
            handle,
            None,
            JobKind::Upscaling,
            format!("[Upscale] {}", bounds.extent()),
            bounds,
        ))
    }

    pub fn add_live(&mut self, prompt: impl Into<String>, bounds: Bounds) -> JobHandle {
        let handle = self.next_handle();
        self.push(Job::new(
            handle,
            None,
            JobKind::LivePreview,
            prompt.into(),
            bounds,
        ))
    }

    /// Remove a job. Diffusion jobs give their result memory back to the
    /// budget; other kinds never counted against it.
    pub fn remove(&mut self, handle: JobHandle) -> Option<Job> {
        let index = self.entries.iter().position(|j| j.handle == handle)?;
        let job = self.entries.remove(index)?;
        if job.kind == JobKind::Diffusion {
            self.memory_usage = self.memory_usage.saturating_sub(job.results.size());
        }
        self.notify(Notification::QueueChanged);
        Some(job)
    }

    /// Find a job by its server identifier.
    pub fn find(&self, id: &str) -> Option<&Job> {
        self.entries.iter().find(|j| j.id.as_deref() == Some(id))
    }

    /// Find the control-layer job extracting an image for `control`.
    pub fn find_control(&self, control: ControlId) -> Option<&Job> {
        self.entries
            .iter()
            .find(|j| j.control.is_some_and(|c| c.id == control))
    }

    pub fn get(&self, handle: JobHandle) -> Option<&Job> {
        self.entries.iter().find(|j| j.handle == handle)
    }

    pub(crate) fn get_mut(&mut self, handle: JobHandle) -> Option<&mut Job> {
        self.entries.iter_mut().find(|j| j.handle == handle)
    }

    pub fn count(&self, state: JobState) -> usize {
        self.entries.iter().filter(|j| j.state == state).count()
    }

    pub fn any_executing(&self) -> bool {
        self.entries.iter().any(|j| j.state == JobState::Executing)
    }

    /// Attach a completed job's outputs. Diffusion results count against
    /// the history budget and trigger an eviction pass that spares the job
    /// itself.
    pub(crate) fn set_results(&mut self, handle: JobHandle, results: ImageCollection) {
        let size = results.size();
        let job = self.get_mut(handle).expect("job is still in the queue");
        assert!(job.results.is_empty(), "job results are assigned only once");
        let kind = job.kind;
        job.results = results;
        if kind == JobKind::Diffusion {
            self.memory_usage += size;
            self.prune(handle);
        }
    }

    /// Discard the oldest unprotected history entries until the memory
    /// budget is met. Protected entries are the `keep` job, the selected
    /// job, and anything still waiting or executing; the budget is soft,
    /// so protected entries may leave it exceeded.
    fn prune(&mut self, keep: JobHandle) {
        let mut index = 0;
        let mut changed = false;
        while self.memory_usage > self.history_limit && index < self.entries.len() {
            let job = &self.entries[index];
            let selected = matches!(
                (&self.selection, &job.id),
                (Some(selection), Some(id)) if selection.job == *id
            );
            if job.handle == keep || job.state.is_active() || selected {
                index += 1;
                continue;
            }
            let discarded = self.entries.remove(index).expect("index is in range");
            if discarded.kind == JobKind::Diffusion {
                self.memory_usage = self.memory_usage.saturating_sub(discarded.results.size());
            }
            changed = true;
        }
        if changed {
            self.notify(Notification::QueueChanged);
        }
    }

    pub fn select(&mut self, job: impl Into<String>, image: usize) {
        self.set_selection(Some(JobSelection {
            job: job.into(),
            image,
        }));
    }

    /// Replace the selection. Not validated against the queue contents;
    /// consumers resolve it lazily and treat a missing job as "no preview".
    pub fn set_selection(&mut self, selection: Option<JobSelection>) {
        self.selection = selection;
        self.notify(Notification::SelectionChanged);
    }

    pub fn selection(&self) -> Option<&JobSelection> {
        self.selection.as_ref()
    }

    /// Bytes of diffusion results currently retained.
    pub fn memory_usage(&self) -> u64 {
        self.memory_usage
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter()
    }

    fn notify(&self, notification: Notification) {
        let _ = self.events.send(GenEvent::Notification(notification));
    }
}
