#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};
use sumie_core::{Bounds, Extent, Image, Mask, Style};
use sumie_engine::{
    ClientMessage, Conditioning, ControlMode, Document, GenEvent, GenerationClient, Generator,
    LayerId, LiveParams, NetworkError, Settings, WorkDescriptor, WorkflowBuilder,
};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

pub const DEFAULT_UPSCALER: &str = "4x_default";

#[derive(Debug, Clone)]
pub struct MockLayer {
    pub name: String,
    pub bounds: Option<Bounds>,
    pub locked: bool,
    pub visible: bool,
    pub attached: bool,
    pub svg: Option<String>,
    pub content_updates: usize,
}

pub struct DocState {
    pub extent: Extent,
    pub selection: Option<Bounds>,
    pub color_mode_error: Option<String>,
    pub layers: Vec<(LayerId, MockLayer)>,
    pub active: LayerId,
    pub resized_to: Option<Extent>,
    /// `bounds` argument of every `get_layer_image` call.
    pub layer_image_requests: Vec<Option<Bounds>>,
    /// `(bounds, excluded layer count)` of every `get_image` call.
    pub image_requests: Vec<(Bounds, usize)>,
    /// Returned by `layer_bounds` for any layer.
    pub control_layer_bounds: Bounds,
    /// Pixel value of images returned by `get_layer_image`.
    pub layer_pixel: [u8; 4],
    pub mask_params: Option<(f32, f32, f32)>,
}

/// Shared-state document mock: tests keep a clone and inspect the state
/// after the generator (which owns a boxed clone) has acted on it.
#[derive(Clone)]
pub struct MockDocument {
    state: Arc<Mutex<DocState>>,
}

impl MockDocument {
    pub fn new(extent: Extent) -> Self {
        let background = LayerId::new();
        let state = DocState {
            extent,
            selection: None,
            color_mode_error: None,
            layers: vec![(
                background,
                MockLayer {
                    name: "Background".to_string(),
                    bounds: Some(Bounds::from_extent(extent)),
                    locked: false,
                    visible: true,
                    attached: true,
                    svg: None,
                    content_updates: 0,
                },
            )],
            active: background,
            resized_to: None,
            layer_image_requests: Vec::new(),
            image_requests: Vec::new(),
            control_layer_bounds: Bounds::new(0, 0, 0, 0),
            layer_pixel: [0, 0, 0, 128],
            mask_params: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DocState> {
        self.state.lock().unwrap()
    }

    /// First layer whose name contains `fragment`.
    pub fn layer_named(&self, fragment: &str) -> Option<(LayerId, MockLayer)> {
        self.lock()
            .layers
            .iter()
            .find(|(_, layer)| layer.name.contains(fragment))
            .cloned()
    }

    pub fn layer(&self, id: LayerId) -> MockLayer {
        self.lock()
            .layers
            .iter()
            .find(|(layer_id, _)| *layer_id == id)
            .map(|(_, layer)| layer.clone())
            .expect("layer exists")
    }

    fn with_layer(&self, id: LayerId, update: impl FnOnce(&mut MockLayer)) {
        let mut state = self.lock();
        if let Some((_, layer)) = state.layers.iter_mut().find(|(layer_id, _)| *layer_id == id) {
            update(layer);
        }
    }

    fn add_layer(&self, layer: MockLayer) -> LayerId {
        let id = LayerId::new();
        self.lock().layers.push((id, layer));
        id
    }
}

impl Document for MockDocument {
    fn check_color_mode(&self) -> Result<(), String> {
        match &self.lock().color_mode_error {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn extent(&self) -> Extent {
        self.lock().extent
    }

    fn create_mask_from_selection(
        &self,
        grow: f32,
        feather: f32,
        padding: f32,
    ) -> Option<(Mask, Bounds)> {
        let mut state = self.lock();
        state.mask_params = Some((grow, feather, padding));
        state
            .selection
            .map(|bounds| (Mask::rectangle(bounds), bounds))
    }

    fn get_image(&self, bounds: Bounds, exclude_layers: &[LayerId]) -> Image {
        self.lock()
            .image_requests
            .push((bounds, exclude_layers.len()));
        Image::filled(bounds.extent(), [128, 128, 128, 255])
    }

    fn get_layer_image(&self, _layer: LayerId, bounds: Option<Bounds>) -> Image {
        let mut state = self.lock();
        state.layer_image_requests.push(bounds);
        let extent = bounds
            .map(|b| b.extent())
            .unwrap_or(state.control_layer_bounds.extent());
        Image::filled(extent, state.layer_pixel)
    }

    fn layer_bounds(&self, _layer: LayerId) -> Bounds {
        self.lock().control_layer_bounds
    }

    fn insert_layer(
        &mut self,
        name: &str,
        _image: &Image,
        bounds: Bounds,
        _below: Option<LayerId>,
    ) -> LayerId {
        self.add_layer(MockLayer {
            name: name.to_string(),
            bounds: Some(bounds),
            locked: false,
            visible: true,
            attached: true,
            svg: None,
            content_updates: 0,
        })
    }

    fn insert_vector_layer(&mut self, name: &str, svg: &str, _below: Option<LayerId>) -> LayerId {
        self.add_layer(MockLayer {
            name: name.to_string(),
            bounds: None,
            locked: false,
            visible: true,
            attached: true,
            svg: Some(svg.to_string()),
            content_updates: 0,
        })
    }

    fn set_layer_content(&mut self, layer: LayerId, _image: &Image, bounds: Bounds) {
        self.with_layer(layer, |layer| {
            layer.bounds = Some(bounds);
            layer.content_updates += 1;
        });
    }

    fn layer_name(&self, layer: LayerId) -> String {
        self.layer(layer).name
    }

    fn set_layer_name(&mut self, layer: LayerId, name: &str) {
        self.with_layer(layer, |layer| layer.name = name.to_string());
    }

    fn set_layer_locked(&mut self, layer: LayerId, locked: bool) {
        self.with_layer(layer, |layer| layer.locked = locked);
    }

    fn is_layer_visible(&self, layer: LayerId) -> bool {
        self.layer(layer).visible
    }

    fn is_layer_attached(&self, layer: LayerId) -> bool {
        // A layer the host already deleted is simply not attached.
        self.lock()
            .layers
            .iter()
            .find(|(id, _)| *id == layer)
            .is_some_and(|(_, l)| l.attached)
    }

    fn hide_layer(&mut self, layer: LayerId) {
        self.with_layer(layer, |layer| layer.visible = false);
    }

    fn remove_layer(&mut self, layer: LayerId) {
        self.with_layer(layer, |layer| {
            layer.attached = false;
            layer.visible = false;
        });
    }

    fn active_layer(&self) -> LayerId {
        self.lock().active
    }

    fn resize(&mut self, extent: Extent) {
        let mut state = self.lock();
        state.extent = extent;
        state.resized_to = Some(extent);
    }

    fn is_active(&self) -> bool {
        true
    }

    fn is_valid(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct MockClient {
    pub enqueued: Mutex<Vec<Value>>,
    pub fail_next: Mutex<Option<NetworkError>>,
    pub interrupts: AtomicUsize,
    pub queue_clears: AtomicUsize,
    next_id: AtomicUsize,
}

#[async_trait]
impl GenerationClient for MockClient {
    async fn enqueue(&self, work: WorkDescriptor) -> Result<String, NetworkError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        self.enqueued.lock().unwrap().push(work.into_payload());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{n}"))
    }

    async fn interrupt(&self) -> Result<(), NetworkError> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_queue(&self) -> Result<(), NetworkError> {
        self.queue_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn default_upscaler(&self) -> String {
        DEFAULT_UPSCALER.to_string()
    }
}

/// Records which workflow was built with which inputs; descriptors carry
/// the workflow name so tests can assert on what reached the client.
#[derive(Default)]
pub struct MockWorkflows {
    pub calls: Mutex<Vec<String>>,
    /// `(mode, first pixel, extent)` of every control input seen.
    pub control_images: Mutex<Vec<(ControlMode, [u8; 4], Extent)>>,
    pub upscalers: Mutex<Vec<String>>,
    pub live_passes: Mutex<Vec<bool>>,
    pub areas: Mutex<Vec<Option<Bounds>>>,
}

impl MockWorkflows {
    fn record(&self, name: &str, conditioning: Option<&Conditioning>) -> WorkDescriptor {
        self.calls.lock().unwrap().push(name.to_string());
        if let Some(conditioning) = conditioning {
            let mut control = self.control_images.lock().unwrap();
            for input in &conditioning.control {
                control.push((input.mode, input.image.pixel(0, 0), input.image.extent()));
            }
            self.areas.lock().unwrap().push(conditioning.area);
        }
        WorkDescriptor::new(json!({ "workflow": name }))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl WorkflowBuilder for MockWorkflows {
    fn generate(
        &self,
        _style: &Style,
        _extent: Extent,
        conditioning: &Conditioning,
        live: Option<&LiveParams>,
    ) -> WorkDescriptor {
        self.live_passes.lock().unwrap().push(live.is_some());
        self.record("generate", Some(conditioning))
    }

    fn refine(
        &self,
        _style: &Style,
        _image: &Image,
        conditioning: &Conditioning,
        _strength: f32,
        live: Option<&LiveParams>,
    ) -> WorkDescriptor {
        self.live_passes.lock().unwrap().push(live.is_some());
        self.record("refine", Some(conditioning))
    }

    fn inpaint(
        &self,
        _style: &Style,
        _image: &Image,
        _mask: &Mask,
        conditioning: &Conditioning,
    ) -> WorkDescriptor {
        self.record("inpaint", Some(conditioning))
    }

    fn refine_region(
        &self,
        _style: &Style,
        _image: &Image,
        _mask: &Mask,
        conditioning: &Conditioning,
        _strength: f32,
    ) -> WorkDescriptor {
        self.record("refine_region", Some(conditioning))
    }

    fn upscale_tiled(
        &self,
        _image: &Image,
        upscaler: &str,
        _factor: f32,
        _style: &Style,
        _strength: f32,
    ) -> WorkDescriptor {
        self.upscalers.lock().unwrap().push(upscaler.to_string());
        self.record("upscale_tiled", None)
    }

    fn upscale_simple(&self, _image: &Image, upscaler: &str, _factor: f32) -> WorkDescriptor {
        self.upscalers.lock().unwrap().push(upscaler.to_string());
        self.record("upscale_simple", None)
    }

    fn create_control_image(&self, _image: &Image, mode: ControlMode) -> WorkDescriptor {
        self.record(&format!("create_control_image:{}", mode.text()), None)
    }

    fn pose_to_svg(&self, _result: &Value, extent: Extent) -> Option<String> {
        Some(format!("<svg viewBox=\"0 0 {} {}\"/>", extent.width, extent.height))
    }
}

pub struct TestContext {
    pub generator: Generator,
    pub events: UnboundedReceiver<GenEvent>,
    pub doc: MockDocument,
    pub client: Arc<MockClient>,
    pub workflows: Arc<MockWorkflows>,
}

impl TestContext {
    /// Wait for the in-flight submission task and apply everything it put
    /// on the event channel.
    pub async fn run_submission(&mut self) {
        if let Some(task) = self.generator.task.take() {
            task.await.unwrap();
        }
        self.pump();
    }

    /// Feed pending events back into the generator, the way a host's
    /// event loop would.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.generator.handle_event(event);
        }
    }

    /// Deliver a server notification and apply the fallout.
    pub fn deliver(&mut self, message: ClientMessage) {
        self.generator.handle_message(message);
        self.pump();
    }

    pub fn finish_with_images(&mut self, job_id: &str, count: usize) {
        let images: Vec<Image> =
            std::iter::repeat_with(|| Image::filled(Extent::new(64, 64), [10, 20, 30, 255]))
                .take(count)
                .collect();
        self.deliver(ClientMessage::finished(job_id, images.into(), None));
    }
}

pub fn context() -> TestContext {
    let _ = env_logger::builder().is_test(true).try_init();
    let doc = MockDocument::new(Extent::new(512, 512));
    let client = Arc::new(MockClient::default());
    let workflows = Arc::new(MockWorkflows::default());
    let (events, receiver) = unbounded_channel();
    let generator = Generator::new(
        Box::new(doc.clone()),
        client.clone(),
        workflows.clone(),
        Settings::default(),
        events,
    );
    TestContext {
        generator,
        events: receiver,
        doc,
        client,
        workflows,
    }
}

pub fn progress(job_id: &str, value: f32) -> ClientMessage {
    ClientMessage::progress(job_id, value)
}

pub fn interrupted(job_id: &str) -> ClientMessage {
    ClientMessage::interrupted(job_id)
}

pub fn server_error(job_id: &str, message: &str) -> ClientMessage {
    ClientMessage::error(job_id, message)
}
