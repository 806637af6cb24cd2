//! Temporal-mean products and their export.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use serde::Deserialize;

use crate::error::{ExportError, PipelineError, Result};
use crate::io::{write_band, write_band_npy};
use crate::raster::{Band, GridSpec, ImageCollection, Region};

/// 30 m expressed in degrees at the equator.
pub const DEFAULT_SCALE: f64 = 0.000269494585235856;
pub const DEFAULT_MAX_PIXELS: u64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Single-band float GeoTIFF with nodata -9999.
    #[default]
    GeoTiff,
    /// `<name>.npy` values plus `<name>_mask.npy`.
    Npy,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::GeoTiff => "tif",
            ExportFormat::Npy => "npy",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geotiff" | "tif" | "tiff" => Ok(ExportFormat::GeoTiff),
            "npy" => Ok(ExportFormat::Npy),
            other => Err(format!("unknown export format '{}' (expected geotiff or npy)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Pixel size in CRS units.
    pub scale: f64,
    pub crs: String,
    /// Ceiling on exported pixels.
    pub max_pixels: u64,
    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            scale: DEFAULT_SCALE,
            crs: "EPSG:4326".to_string(),
            max_pixels: DEFAULT_MAX_PIXELS,
            format: ExportFormat::default(),
        }
    }
}

impl ExportConfig {
    /// Target grid over the region bounds, checked against the pixel ceiling.
    pub fn target_grid(&self, region: &Region) -> std::result::Result<GridSpec, ExportError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ExportError::InvalidScale(self.scale));
        }
        let bounds = region.bounds();
        let (width, height) = GridSpec::shape_for(&bounds, self.scale);
        let pixels = width * height;
        if pixels > self.max_pixels as f64 {
            return Err(ExportError::TooManyPixels {
                // saturating float-to-int cast
                pixels: pixels as u64,
                max_pixels: self.max_pixels,
            });
        }
        Ok(GridSpec::from_bounds(&bounds, self.scale, self.crs.as_str()))
    }
}

/// Per-pixel temporal mean of `band`, ignoring masked pixels.
pub fn temporal_mean(collection: &ImageCollection, band: &str) -> Result<Band> {
    collection.mean(band)
}

/// Writes products into one output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    out_dir: PathBuf,
    config: ExportConfig,
    grid: GridSpec,
}

impl Exporter {
    pub fn new(out_dir: impl Into<PathBuf>, config: ExportConfig, region: &Region) -> Result<Self> {
        let grid = config.target_grid(region)?;
        Ok(Exporter {
            out_dir: out_dir.into(),
            config,
            grid,
        })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Materialise `band` (on `data_grid`) onto the export grid and write it.
    /// Returns the path of the main output file.
    pub fn export(&self, name: &str, band: &Band, data_grid: &GridSpec) -> Result<PathBuf> {
        if data_grid.crs != self.config.crs {
            return Err(ExportError::CrsMismatch {
                requested: self.config.crs.clone(),
                data: data_grid.crs.clone(),
            }
            .into());
        }
        let band = band.resample_nearest(data_grid, &self.grid)?;
        fs::create_dir_all(&self.out_dir).map_err(|e| self.write_error(&self.out_dir, e))?;

        let path = self
            .out_dir
            .join(format!("{}.{}", name, self.config.format.extension()));
        let written = match self.config.format {
            ExportFormat::GeoTiff => write_band(&path, &self.grid, &band),
            ExportFormat::Npy => write_band_npy(&self.out_dir, name, &band),
        };
        written.map_err(|e| self.write_error(&path, e))?;

        info!(
            "Exported {} to {:?} ({} of {} pixels valid)",
            name,
            path,
            band.valid_count(),
            self.grid.pixel_count()
        );
        Ok(path)
    }

    /// Temporal mean of `band` in `collection`, exported under `band`'s name.
    pub fn export_mean(&self, collection: &ImageCollection, band: &str) -> Result<(PathBuf, Band)> {
        let mean = temporal_mean(collection, band)?;
        let data_grid = collection
            .images()
            .first()
            .map(|image| image.grid().clone())
            .ok_or_else(|| PipelineError::EmptyCollection(collection.name().to_string()))?;
        let path = self.export(band, &mean, &data_grid)?;
        Ok((path, mean))
    }

    fn write_error(&self, path: &Path, err: impl ToString) -> PipelineError {
        ExportError::Write {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
        .into()
    }
}

/// Contents of `processing_info.txt`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingInfo {
    pub year: i32,
    pub scenes: Vec<(String, usize)>,
    pub harmonized_images: usize,
    pub fully_masked_images: usize,
    pub climate_images: usize,
    pub stress_images: usize,
    /// Product name and valid pixel fraction.
    pub products: Vec<(String, f64)>,
    pub elapsed_secs: f64,
}

impl ProcessingInfo {
    pub fn render(&self) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = writeln!(out, "Study year: {}", self.year);
        for (sensor, count) in &self.scenes {
            let _ = writeln!(out, "{} scenes: {}", sensor, count);
        }
        let _ = writeln!(out, "Harmonized images: {}", self.harmonized_images);
        let _ = writeln!(out, "Fully masked images: {}", self.fully_masked_images);
        let _ = writeln!(out, "Climate images: {}", self.climate_images);
        let _ = writeln!(out, "Stress images: {}", self.stress_images);
        for (name, fraction) in &self.products {
            let _ = writeln!(out, "{} valid fraction: {:.4}", name, fraction);
        }
        let _ = writeln!(out, "Elapsed seconds: {:.2}", self.elapsed_secs);
        out
    }

    pub fn write(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join("processing_info.txt");
        fs::write(&path, self.render()).map_err(|e| ExportError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }
}

/// Share of valid pixels in a band.
pub fn valid_fraction(band: &Band) -> f64 {
    let (rows, cols) = band.dim();
    let total = rows * cols;
    if total == 0 {
        return 0.0;
    }
    band.valid_count() as f64 / total as f64
}
