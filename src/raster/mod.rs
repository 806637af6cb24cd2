//! In-memory raster layer: masked bands, georeferenced images and ordered
//! image collections.

pub mod band;
pub mod collection;
pub mod grid;
pub mod image;
pub mod region;

pub use band::Band;
pub use collection::{DateRange, ImageCollection};
pub use grid::{GeoTransform, GridSpec};
pub use image::Image;
pub use region::Region;
