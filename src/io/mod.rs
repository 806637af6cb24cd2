//! Raster archive input and product output.

pub mod geotiff;
pub mod npy;
pub mod scan;

pub use geotiff::{read_geotiff, write_band, GeoRaster, NODATA};
pub use npy::write_band_npy;
pub use scan::{DirectorySource, MemorySource, SceneFiles, SceneSource};
