use image::GrayImage;

use crate::bounds::Bounds;

/// Selection coverage raster for inpainting and masked refinement.
///
/// `bounds` places the coverage data in document coordinates. During
/// submission the owning job rewrites it to be relative to the cropped
/// working image so the data lines up with what the server receives.
#[derive(Debug, Clone)]
pub struct Mask {
    pub bounds: Bounds,
    data: GrayImage,
}

impl Mask {
    pub fn new(bounds: Bounds, data: GrayImage) -> Self {
        Self { bounds, data }
    }

    /// Fully selected rectangular mask.
    pub fn rectangle(bounds: Bounds) -> Self {
        let data = GrayImage::from_pixel(bounds.width, bounds.height, image::Luma([255]));
        Self { bounds, data }
    }

    pub fn data(&self) -> &GrayImage {
        &self.data
    }
}
