//! Run configuration, loaded from YAML.
//!
//! ```yaml
//! year: 2020
//! region: [[113.7, 34.6], [114.0, 34.6], [114.0, 34.9], [113.7, 34.9]]
//! join: enclosing
//! export:
//!   scale: 0.000269494585235856
//!   crs: EPSG:4326
//!   max_pixels: 10000000000
//! ```
//!
//! Everything except `year` and `region` has a default matching the
//! published method.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::export::ExportConfig;
use crate::harmonize::CloudMaskConfig;
use crate::join::JoinPolicy;
use crate::landcover::UnmappedClassPolicy;
use crate::raster::{DateRange, Region};

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Study year; reflectance scenes are filtered to this calendar year.
    pub year: i32,
    /// Study region in the export CRS.
    pub region: Region,
    /// Climate date range; defaults to the study year.
    #[serde(default)]
    pub climate_range: Option<DateRange>,
    #[serde(default)]
    pub cloud: CloudMaskConfig,
    #[serde(default)]
    pub unmapped_classes: UnmappedClassPolicy,
    #[serde(default)]
    pub join: JoinPolicy,
    #[serde(default)]
    pub export: ExportConfig,
}

impl PipelineConfig {
    pub fn new(year: i32, region: Region) -> Self {
        PipelineConfig {
            year,
            region,
            climate_range: None,
            cloud: CloudMaskConfig::default(),
            unmapped_classes: UnmappedClassPolicy::default(),
            join: JoinPolicy::default(),
            export: ExportConfig::default(),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.study_range()?;
        if !(self.export.scale.is_finite() && self.export.scale > 0.0) {
            return Err(PipelineError::config(format!(
                "export scale must be positive, got {}",
                self.export.scale
            )));
        }
        if self.export.max_pixels == 0 {
            return Err(PipelineError::config("export max_pixels must be positive"));
        }
        if !(0.0..=100.0).contains(&self.cloud.s2_cloud_probability_max) {
            return Err(PipelineError::config(format!(
                "cloud probability threshold {} outside 0-100",
                self.cloud.s2_cloud_probability_max
            )));
        }
        Ok(())
    }

    /// Calendar year of reflectance scenes.
    pub fn study_range(&self) -> Result<DateRange> {
        DateRange::year(self.year)
    }

    pub fn climate_range(&self) -> Result<DateRange> {
        match self.climate_range {
            Some(range) => Ok(range),
            None => self.study_range(),
        }
    }
}
