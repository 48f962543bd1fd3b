use sumie_core::{Bounds, Extent, Image, Mask};
use uuid::Uuid;

/// Handle to a layer owned by the host document.
///
/// This is not an owning reference: the document may delete the layer at
/// any time. Consumers check [`Document::is_layer_attached`] before use and
/// treat a dead handle as "no layer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

/// The host editor's document, as far as generation is concerned.
pub trait Document {
    /// Whether the document's color mode is supported for generation;
    /// returns a user-facing message when it is not.
    fn check_color_mode(&self) -> Result<(), String>;

    fn extent(&self) -> Extent;

    /// Convert the active selection into a mask, grown, feathered and
    /// padded by the given fractions of the selection size. Returns the
    /// mask together with the raw selection bounds, or `None` when nothing
    /// is selected.
    fn create_mask_from_selection(
        &self,
        grow: f32,
        feather: f32,
        padding: f32,
    ) -> Option<(Mask, Bounds)>;

    /// Flattened image of the given region, with `exclude_layers` hidden.
    fn get_image(&self, bounds: Bounds, exclude_layers: &[LayerId]) -> Image;

    /// Image of a single layer; the whole layer when `bounds` is `None`.
    fn get_layer_image(&self, layer: LayerId, bounds: Option<Bounds>) -> Image;

    fn layer_bounds(&self, layer: LayerId) -> Bounds;

    fn insert_layer(
        &mut self,
        name: &str,
        image: &Image,
        bounds: Bounds,
        below: Option<LayerId>,
    ) -> LayerId;

    fn insert_vector_layer(&mut self, name: &str, svg: &str, below: Option<LayerId>) -> LayerId;

    fn set_layer_content(&mut self, layer: LayerId, image: &Image, bounds: Bounds);

    fn layer_name(&self, layer: LayerId) -> String;

    fn set_layer_name(&mut self, layer: LayerId, name: &str);

    fn set_layer_locked(&mut self, layer: LayerId, locked: bool);

    fn is_layer_visible(&self, layer: LayerId) -> bool;

    /// Whether the layer still exists in the document's layer tree.
    fn is_layer_attached(&self, layer: LayerId) -> bool;

    fn hide_layer(&mut self, layer: LayerId);

    fn remove_layer(&mut self, layer: LayerId);

    fn active_layer(&self) -> LayerId;

    fn resize(&mut self, extent: Extent);

    fn is_active(&self) -> bool;

    fn is_valid(&self) -> bool;
}
