//! Sensor harmonization: Landsat 9/8/7 and Sentinel-2 scenes become one
//! time-ordered `{red, nir}` collection on the analysis grid.

pub mod landsat;
pub mod sentinel2;

use std::collections::BTreeMap;
use std::fmt;

use log::{info, warn};
use serde::Deserialize;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::io::SceneSource;
use crate::raster::{GridSpec, Image, ImageCollection};

pub const QA_PIXEL: &str = "QA_PIXEL";

/// Reflectance bands of the common schema.
pub const OPTICAL_BANDS: [&str; 6] = ["blue", "green", "red", "nir", "swir1", "swir2"];

/// Bands every sensor contributes to the merged collection.
pub const MERGED_BANDS: [&str; 2] = ["red", "nir"];

/// How the Landsat blue brightness test is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessTest {
    /// Keep pixels whose blue reflectance is not above the threshold.
    #[default]
    Complement,
    /// Keep pixels whose blue reflectance is above the threshold.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CloudMaskConfig {
    pub landsat_blue_max: f32,
    pub brightness_test: BrightnessTest,
    pub s2_cloud_probability_max: f32,
}

impl Default for CloudMaskConfig {
    fn default() -> Self {
        CloudMaskConfig {
            landsat_blue_max: 0.2,
            brightness_test: BrightnessTest::Complement,
            s2_cloud_probability_max: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sensor {
    Landsat9,
    Landsat8,
    Landsat7,
    Sentinel2,
}

impl Sensor {
    /// Concatenation order of the merged collection.
    pub const MERGE_ORDER: [Sensor; 4] = [
        Sensor::Landsat9,
        Sensor::Landsat8,
        Sensor::Landsat7,
        Sensor::Sentinel2,
    ];

    /// Archive directory of the sensor.
    pub fn collection(self) -> &'static str {
        match self {
            Sensor::Landsat9 => "landsat9",
            Sensor::Landsat8 => "landsat8",
            Sensor::Landsat7 => "landsat7",
            Sensor::Sentinel2 => "sentinel2",
        }
    }

    /// Native band name to schema name.
    pub fn band_mapping(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Sensor::Landsat9 | Sensor::Landsat8 => &landsat::OLI_BANDS,
            Sensor::Landsat7 => &landsat::ETM_BANDS,
            Sensor::Sentinel2 => &sentinel2::BANDS,
        }
    }

    pub fn native_bands(self) -> Vec<&'static str> {
        self.band_mapping().iter().map(|(native, _)| *native).collect()
    }

    /// Rename, scale and cloud-mask one native scene.
    pub fn prepare(self, image: &Image, config: &CloudMaskConfig) -> Result<Image> {
        match self {
            Sensor::Sentinel2 => sentinel2::prepare(image, config),
            _ => landsat::prepare(image, self.band_mapping(), config),
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::Landsat9 => "Landsat 9",
            Sensor::Landsat8 => "Landsat 8",
            Sensor::Landsat7 => "Landsat 7",
            Sensor::Sentinel2 => "Sentinel-2",
        };
        f.write_str(name)
    }
}

/// Scene counts of a harmonization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonizeSummary {
    pub scenes: BTreeMap<Sensor, usize>,
    /// Images left with no valid pixel after masking and clipping.
    pub fully_masked: usize,
}

impl HarmonizeSummary {
    pub fn total(&self) -> usize {
        self.scenes.values().sum()
    }
}

/// Load, prepare and merge every sensor for the study year.
pub fn harmonize<S>(
    source: &S,
    config: &PipelineConfig,
    grid: &GridSpec,
) -> Result<(ImageCollection, HarmonizeSummary)>
where
    S: SceneSource + ?Sized,
{
    let range = config.study_range()?;
    let region = &config.region;
    let mut summary = HarmonizeSummary::default();
    let mut merged = ImageCollection::new("harmonized reflectance");

    for sensor in Sensor::MERGE_ORDER {
        let raw = source
            .load(sensor.collection(), &sensor.native_bands(), &range)?
            .filter_bounds(region);
        if raw.is_empty() {
            warn!("No {} scenes intersect the region in {}", sensor, config.year);
        } else {
            info!("{} scenes for {}: {}", sensor, config.year, raw.len());
        }
        summary.scenes.insert(sensor, raw.len());

        let prepared = raw.map(|image| {
            sensor
                .prepare(image, &config.cloud)?
                .select(&MERGED_BANDS)?
                .resample(grid)?
                .clip(region)
        })?;
        merged = merged.merge(prepared);
    }

    if merged.is_empty() {
        return Err(PipelineError::EmptyCollection(merged.name().to_string()));
    }
    merged.sort_by_time();

    summary.fully_masked = merged
        .iter()
        .filter(|image| image.band("red").map(|b| b.is_fully_masked()).unwrap_or(true))
        .count();
    if summary.fully_masked > 0 {
        warn!("{} harmonized images have no valid pixels", summary.fully_masked);
    }
    info!("Harmonized collection: {} images", merged.len());
    Ok((merged, summary))
}
