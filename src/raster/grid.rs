//! Georeferenced pixel grids.

use geo::{Coord, Rect};

/// North-up affine transform: `origin` is the upper-left corner, rows grow
/// southwards by `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }
}

/// Grid shared by every band of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// Authority code, e.g. `EPSG:4326`.
    pub crs: String,
}

impl GridSpec {
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: impl Into<String>,
    ) -> Self {
        GridSpec {
            width,
            height,
            transform,
            crs: crs.into(),
        }
    }

    /// (width, height) in pixels of a grid over `bounds` at `scale`, before
    /// any integer cast. Callers check this against a pixel ceiling.
    pub fn shape_for(bounds: &Rect<f64>, scale: f64) -> (f64, f64) {
        let width = (bounds.width() / scale).ceil().max(1.0);
        let height = (bounds.height() / scale).ceil().max(1.0);
        (width, height)
    }

    /// Grid covering `bounds` with square pixels of size `scale`.
    pub fn from_bounds(bounds: &Rect<f64>, scale: f64, crs: impl Into<String>) -> Self {
        let (width, height) = Self::shape_for(bounds, scale);
        let (width, height) = (width as usize, height as usize);
        GridSpec::new(
            width,
            height,
            GeoTransform::new(bounds.min().x, bounds.max().y, scale, scale),
            crs,
        )
    }

    /// (rows, cols), matching ndarray's `dim()`.
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_count(&self) -> u64 {
        (self.width as u64).saturating_mul(self.height as u64)
    }

    pub fn bounds(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            Coord {
                x: t.origin_x,
                y: t.origin_y - t.pixel_height * self.height as f64,
            },
            Coord {
                x: t.origin_x + t.pixel_width * self.width as f64,
                y: t.origin_y,
            },
        )
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        let t = &self.transform;
        Coord {
            x: t.origin_x + (col as f64 + 0.5) * t.pixel_width,
            y: t.origin_y - (row as f64 + 0.5) * t.pixel_height,
        }
    }

    /// Pixel containing a map coordinate.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let t = &self.transform;
        let col = ((x - t.origin_x) / t.pixel_width).floor();
        let row = ((t.origin_y - y) / t.pixel_height).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }
}
