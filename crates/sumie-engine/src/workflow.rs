use serde::{Deserialize, Serialize};
use serde_json::Value;
use sumie_core::{Bounds, Extent, Image, Mask, Style};

use crate::control::ControlMode;

/// Opaque unit of work accepted by the generation server. Built by a
/// [`WorkflowBuilder`], passed through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkDescriptor(Value);

impl WorkDescriptor {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn into_payload(self) -> Value {
        self.0
    }
}

/// A resolved control input: the captured image together with how strongly
/// and for how long it steers generation.
#[derive(Debug, Clone)]
pub struct ControlInput {
    pub mode: ControlMode,
    pub image: Image,
    pub strength: f32,
    pub end: f32,
}

/// Everything that conditions a generation besides the source pixels.
#[derive(Debug, Clone)]
pub struct Conditioning {
    pub prompt: String,
    pub negative_prompt: String,
    pub control: Vec<ControlInput>,
    /// Region the prompt applies to, when generation should focus on a
    /// selection rather than the whole working image.
    pub area: Option<Bounds>,
}

impl Conditioning {
    pub fn new(
        prompt: impl Into<String>,
        negative_prompt: impl Into<String>,
        control: Vec<ControlInput>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: negative_prompt.into(),
            control,
            area: None,
        }
    }
}

/// Parameters for live preview generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveParams {
    pub is_active: bool,
    pub strength: f32,
}

impl Default for LiveParams {
    fn default() -> Self {
        Self {
            is_active: false,
            strength: 0.3,
        }
    }
}

/// Builds server work descriptors from generation inputs.
///
/// Implementations know the server's workflow format; the engine never
/// looks inside the descriptors it gets back.
pub trait WorkflowBuilder: Send + Sync {
    /// Generate from scratch over the given extent.
    fn generate(
        &self,
        style: &Style,
        extent: Extent,
        conditioning: &Conditioning,
        live: Option<&LiveParams>,
    ) -> WorkDescriptor;

    /// Denoise an existing image, no mask.
    fn refine(
        &self,
        style: &Style,
        image: &Image,
        conditioning: &Conditioning,
        strength: f32,
        live: Option<&LiveParams>,
    ) -> WorkDescriptor;

    /// Replace the masked region of an image entirely.
    fn inpaint(
        &self,
        style: &Style,
        image: &Image,
        mask: &Mask,
        conditioning: &Conditioning,
    ) -> WorkDescriptor;

    /// Denoise only the masked region of an image.
    fn refine_region(
        &self,
        style: &Style,
        image: &Image,
        mask: &Mask,
        conditioning: &Conditioning,
        strength: f32,
    ) -> WorkDescriptor;

    /// Upscale with a diffusion pass over tiles.
    fn upscale_tiled(
        &self,
        image: &Image,
        upscaler: &str,
        factor: f32,
        style: &Style,
        strength: f32,
    ) -> WorkDescriptor;

    /// Plain upscaler model pass, no diffusion.
    fn upscale_simple(&self, image: &Image, upscaler: &str, factor: f32) -> WorkDescriptor;

    /// Extract a control image (lines, depth, pose, ...) from document
    /// pixels.
    fn create_control_image(&self, image: &Image, mode: ControlMode) -> WorkDescriptor;

    /// Render a decoded pose result as SVG scaled to `extent`, if the
    /// payload is a pose graph.
    fn pose_to_svg(&self, result: &Value, extent: Extent) -> Option<String>;
}

/// Visible context kept around a masked working region.
const SURROUNDING_CONTEXT: u32 = 32;

/// The document region a generation works on: the whole document, or the
/// masked region with some surrounding context for coherent results.
pub fn compute_bounds(extent: Extent, mask_bounds: Option<Bounds>) -> Bounds {
    match mask_bounds {
        Some(bounds) => bounds
            .padded(SURROUNDING_CONTEXT)
            .clamped(Bounds::from_extent(extent)),
        None => Bounds::from_extent(extent),
    }
}
