//! Study-region polygon used for bounds filtering and clipping.

use geo::{BoundingRect, Contains, Coord, Intersects, LineString, Point, Polygon, Rect};
use ndarray::Array2;
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::raster::grid::GridSpec;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>")]
pub struct Region {
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
}

impl Region {
    /// Build a region from an exterior ring of `[x, y]` vertices. The ring is
    /// closed automatically.
    pub fn from_vertices(vertices: &[[f64; 2]]) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PipelineError::config(format!(
                "region needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PipelineError::config("region vertices must be finite"));
        }
        let ring: LineString<f64> = vertices.iter().map(|&[x, y]| Coord { x, y }).collect();
        let polygon = Polygon::new(ring, vec![]);
        let bounds = polygon
            .bounding_rect()
            .ok_or_else(|| PipelineError::config("region has no extent"))?;
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(PipelineError::config("region is degenerate"));
        }
        Ok(Region { polygon, bounds })
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    /// Whether a footprint touches the region.
    pub fn intersects(&self, footprint: &Rect<f64>) -> bool {
        self.polygon.intersects(footprint)
    }

    /// Pixels of `grid` whose centre lies inside the region.
    pub fn mask(&self, grid: &GridSpec) -> Array2<bool> {
        Array2::from_shape_fn(grid.dim(), |(row, col)| {
            let c = grid.pixel_center(row, col);
            self.contains(c.x, c.y)
        })
    }
}

impl TryFrom<Vec<[f64; 2]>> for Region {
    type Error = PipelineError;

    fn try_from(vertices: Vec<[f64; 2]>) -> Result<Self> {
        Region::from_vertices(&vertices)
    }
}
