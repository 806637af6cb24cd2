use std::collections::BTreeMap;

use chrono::NaiveDate;
use geo::Rect;
use ndarray::Array2;

use crate::error::{PipelineError, Result};
use crate::raster::band::Band;
use crate::raster::grid::GridSpec;
use crate::raster::region::Region;

/// A dated, georeferenced stack of named bands on one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    id: String,
    date: NaiveDate,
    grid: GridSpec,
    bands: BTreeMap<String, Band>,
}

impl Image {
    pub fn new(id: impl Into<String>, date: NaiveDate, grid: GridSpec) -> Self {
        Image {
            id: id.into(),
            date,
            grid,
            bands: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn footprint(&self) -> Rect<f64> {
        self.grid.bounds()
    }

    /// Builder form of [`Image::insert_band`].
    pub fn with_band(mut self, name: impl Into<String>, band: Band) -> Result<Self> {
        self.insert_band(name, band)?;
        Ok(self)
    }

    /// Add or replace a band. The band must match the image grid.
    pub fn insert_band(&mut self, name: impl Into<String>, band: Band) -> Result<()> {
        if band.dim() != self.grid.dim() {
            return Err(PipelineError::ShapeMismatch {
                expected: self.grid.dim(),
                actual: band.dim(),
            });
        }
        self.bands.insert(name.into(), band);
        Ok(())
    }

    pub fn band(&self, name: &str) -> Result<&Band> {
        self.bands
            .get(name)
            .ok_or_else(|| PipelineError::missing_band(&self.id, name))
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    /// Keep only the named bands.
    pub fn select(&self, names: &[&str]) -> Result<Image> {
        let mut out = Image::new(&self.id, self.date, self.grid.clone());
        for name in names {
            out.bands.insert(name.to_string(), self.band(name)?.clone());
        }
        Ok(out)
    }

    /// Rename bands `(from, to)`; every `from` must exist. Bands not listed
    /// are dropped.
    pub fn rename(&self, mapping: &[(&str, &str)]) -> Result<Image> {
        let mut out = Image::new(&self.id, self.date, self.grid.clone());
        for (from, to) in mapping {
            out.bands.insert(to.to_string(), self.band(from)?.clone());
        }
        Ok(out)
    }

    /// Mask every band where `keep` is false.
    pub fn update_mask(&self, keep: &Array2<bool>) -> Result<Image> {
        let mut out = Image::new(&self.id, self.date, self.grid.clone());
        for (name, band) in &self.bands {
            out.bands.insert(name.clone(), band.update_mask(keep)?);
        }
        Ok(out)
    }

    /// Nearest-neighbour resample of every band onto `grid`.
    pub fn resample(&self, grid: &GridSpec) -> Result<Image> {
        let mut out = Image::new(&self.id, self.date, grid.clone());
        for (name, band) in &self.bands {
            out.bands.insert(name.clone(), band.resample_nearest(&self.grid, grid)?);
        }
        Ok(out)
    }

    /// Mask pixels whose centre lies outside `region`.
    pub fn clip(&self, region: &Region) -> Result<Image> {
        self.update_mask(&region.mask(&self.grid))
    }
}
