//! Land-cover parameter rasters from IGBP class codes.

use log::{info, warn};
use serde::Deserialize;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::io::SceneSource;
use crate::raster::{Band, GridSpec};

pub const COLLECTION: &str = "landcover";
pub const CLASS_BAND: &str = "LC_Type1";

pub const NDVI_MIN: f32 = 0.023;
pub const SR_MIN: f32 = 1.05;

/// Maximum light use efficiency (gC/MJ) for IGBP classes 1-17.
const LUE: [f32; 17] = [
    0.389, 0.985, 0.485, 0.692, 0.475, 0.429, 0.429, 0.768, 0.768, 0.542, 0.542, 0.542, 0.296,
    0.542, 0.296, 0.296, 0.296,
];

/// NDVI 95th percentile for classes 1-12.
const NDVI_MAX: [f32; 12] = [
    0.647, 0.676, 0.738, 0.747, 0.702, 0.636, 0.636, 0.702, 0.702, 0.634, 0.634, 0.634,
];

/// `(1 + NDVI_max) / (1 - NDVI_max)` for classes 1-12.
const SR_MAX: [f32; 12] = [
    4.67, 5.17, 6.63, 6.91, 5.71, 4.49, 4.49, 5.71, 5.71, 4.46, 4.46, 4.46,
];

/// What to do with pixels whose class has no table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedClassPolicy {
    /// Use the class code itself as the parameter value.
    #[default]
    RetainCode,
    Mask,
}

/// One parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Lue,
    NdviMin,
    NdviMax,
    SrMin,
    SrMax,
}

impl Parameter {
    /// Table value for a class code, `None` when unmapped.
    ///
    /// The NDVI/SR minima share the coverage of the maxima (classes 1-12),
    /// so an unmapped class retains its code on both ends of the range and
    /// the FPAR range collapses to zero.
    pub fn lookup(self, class: i32) -> Option<f32> {
        let idx = usize::try_from(class).ok()?.checked_sub(1)?;
        match self {
            Parameter::Lue => LUE.get(idx).copied(),
            Parameter::NdviMax => NDVI_MAX.get(idx).copied(),
            Parameter::SrMax => SR_MAX.get(idx).copied(),
            Parameter::NdviMin => NDVI_MAX.get(idx).map(|_| NDVI_MIN),
            Parameter::SrMin => SR_MAX.get(idx).map(|_| SR_MIN),
        }
    }

    /// Map every valid class pixel through the table.
    pub fn apply(self, classes: &Band, policy: UnmappedClassPolicy) -> Band {
        // NaN masks the pixel
        classes.map(|c| match (self.lookup(c.round() as i32), policy) {
            (Some(v), _) => v,
            (None, UnmappedClassPolicy::RetainCode) => c,
            (None, UnmappedClassPolicy::Mask) => f32::NAN,
        })
    }
}

/// The five per-pixel parameters used by the FPAR and NPP models.
#[derive(Debug, Clone, PartialEq)]
pub struct LandCoverParameters {
    pub lue: Band,
    pub ndvi_min: Band,
    pub ndvi_max: Band,
    pub sr_min: Band,
    pub sr_max: Band,
}

pub fn derive_parameters(classes: &Band, policy: UnmappedClassPolicy) -> LandCoverParameters {
    let unmapped = classes
        .test(|c| Parameter::NdviMax.lookup(c.round() as i32).is_none())
        .iter()
        .filter(|&&u| u)
        .count();
    if unmapped > 0 {
        warn!("{} land-cover pixels have no NDVI/SR table entry ({:?})", unmapped, policy);
    }
    LandCoverParameters {
        lue: Parameter::Lue.apply(classes, policy),
        ndvi_min: Parameter::NdviMin.apply(classes, policy),
        ndvi_max: Parameter::NdviMax.apply(classes, policy),
        sr_min: Parameter::SrMin.apply(classes, policy),
        sr_max: Parameter::SrMax.apply(classes, policy),
    }
}

/// Land-cover classes for the study year on the analysis grid. The earliest
/// image of the year is used.
pub fn load_classes<S>(source: &S, config: &PipelineConfig, grid: &GridSpec) -> Result<Band>
where
    S: SceneSource + ?Sized,
{
    let mut collection = source
        .load(COLLECTION, &[CLASS_BAND], &config.study_range()?)?
        .filter_bounds(&config.region);
    collection.sort_by_time();
    let image = collection
        .images()
        .first()
        .ok_or_else(|| PipelineError::EmptyCollection(COLLECTION.to_string()))?;
    if collection.len() > 1 {
        warn!(
            "{} land-cover images for {}; using {}",
            collection.len(),
            config.year,
            image.id()
        );
    }
    info!("Land cover from {}", image.id());
    image.band(CLASS_BAND)?.resample_nearest(image.grid(), grid)
}
