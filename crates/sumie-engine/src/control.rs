use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::LayerId;

/// Stable identity of a control input, independent of its position in the
/// generator's control list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlId(Uuid);

impl ControlId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControlId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a control image steers generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Image,
    Blur,
    Scribble,
    LineArt,
    SoftEdge,
    CannyEdge,
    Depth,
    Normal,
    Pose,
    Segmentation,
    Stencil,
}

impl ControlMode {
    /// Display label for job descriptions and layer names.
    pub fn text(&self) -> &str {
        match self {
            Self::Image => "Image",
            Self::Blur => "Blur",
            Self::Scribble => "Scribble",
            Self::LineArt => "Line Art",
            Self::SoftEdge => "Soft Edge",
            Self::CannyEdge => "Canny Edge",
            Self::Depth => "Depth",
            Self::Normal => "Normal",
            Self::Pose => "Pose",
            Self::Segmentation => "Segmentation",
            Self::Stencil => "Stencil",
        }
    }

    /// Modes whose control images are line drawings. The server expects
    /// these on a solid background.
    pub fn is_lines(&self) -> bool {
        matches!(
            self,
            Self::Scribble | Self::LineArt | Self::SoftEdge | Self::CannyEdge
        )
    }
}

/// A user-managed control input: a document layer interpreted in one of the
/// control modes.
#[derive(Debug, Clone)]
pub struct ControlLayer {
    pub id: ControlId,
    pub mode: ControlMode,
    pub layer: LayerId,
    pub strength: f32,
    pub end: f32,
}

impl ControlLayer {
    pub fn new(mode: ControlMode, layer: LayerId) -> Self {
        Self {
            id: ControlId::new(),
            mode,
            layer,
            strength: 1.0,
            end: 1.0,
        }
    }
}
