pub mod bounds;
pub mod image;
pub mod mask;
pub mod style;

pub use crate::bounds::{Bounds, Extent};
pub use crate::image::{Image, ImageCollection};
pub use crate::mask::Mask;
pub use crate::style::Style;
