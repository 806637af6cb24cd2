//! CASA light-use-efficiency model: APAR, NPP and NCEI per reflectance date.

use log::{info, warn};

use crate::climate::{RH, SOLAR_RADIATION};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::indices::{fpar, ndvi, simple_ratio};
use crate::io::SceneSource;
use crate::join::{JoinPolicy, TemporalJoin};
use crate::landcover::LandCoverParameters;
use crate::raster::{Band, GridSpec, Image, ImageCollection};

pub const STRESS_COLLECTION: &str = "stress";
pub const WSTRESS: &str = "wstress";
pub const TSTRESS1: &str = "tstress1";
pub const TSTRESS2: &str = "tstress2";
pub const STRESS_BANDS: [&str; 3] = [WSTRESS, TSTRESS1, TSTRESS2];

pub const NDVI: &str = "NDVI";
pub const FPAR: &str = "FPAR";
pub const APAR: &str = "APAR";
pub const NPP: &str = "NPP";
pub const NCEI: &str = "NCEI";

/// Fraction of shortwave radiation that is photosynthetically active.
const PAR_FRACTION: f32 = 0.5;

pub fn apar(fpar: &Band, solar_radiation: &Band) -> Result<Band> {
    Ok(fpar.mul(solar_radiation)?.scale(PAR_FRACTION, 0.0))
}

pub fn npp(
    apar: &Band,
    lue: &Band,
    wstress: &Band,
    tstress1: &Band,
    tstress2: &Band,
) -> Result<Band> {
    apar.mul(lue)?.mul(wstress)?.mul(tstress1)?.mul(tstress2)
}

pub fn ncei(npp: &Band, rh: &Band) -> Result<Band> {
    npp.sub(rh)
}

/// Stress coefficients for the study year on the analysis grid. A missing
/// archive is an empty collection.
pub fn load_stress<S>(
    source: &S,
    config: &PipelineConfig,
    grid: &GridSpec,
) -> Result<ImageCollection>
where
    S: SceneSource + ?Sized,
{
    let mut stress = source
        .load(STRESS_COLLECTION, &STRESS_BANDS, &config.climate_range()?)?
        .filter_bounds(&config.region);
    stress.sort_by_time();
    if stress.is_empty() {
        warn!("No stress coefficient images; NPP will be fully masked");
    }
    stress.map(|image| image.resample(grid))
}

/// Joins climate and stress data to reflectance dates.
pub struct Estimator<'a> {
    params: &'a LandCoverParameters,
    climate: TemporalJoin<'a>,
    stress: TemporalJoin<'a>,
}

impl<'a> Estimator<'a> {
    pub fn new(
        params: &'a LandCoverParameters,
        climate: &'a ImageCollection,
        stress: &'a ImageCollection,
        policy: JoinPolicy,
    ) -> Result<Self> {
        Ok(Estimator {
            params,
            climate: TemporalJoin::new(climate, policy, &[SOLAR_RADIATION, RH])?,
            stress: TemporalJoin::new(stress, policy, &STRESS_BANDS)?,
        })
    }

    /// Compute `NDVI, FPAR, APAR, NPP, NCEI` for one `{red, nir}` image.
    pub fn estimate_image(&self, image: &Image) -> Result<Image> {
        let date = image.date();
        let dim = image.grid().dim();

        let ndvi = ndvi(image.band("red")?, image.band("nir")?)?;
        let fpar = fpar(&ndvi, &simple_ratio(&ndvi), self.params)?;

        let (apar, rh) = match (
            self.climate.band_for(date, SOLAR_RADIATION)?,
            self.climate.band_for(date, RH)?,
        ) {
            (Some(srad), Some(rh)) => (apar(&fpar, srad)?, rh.clone()),
            _ => {
                warn!("No climate data joins {} ({})", image.id(), date);
                (Band::masked(dim), Band::masked(dim))
            }
        };

        let stress: Option<Vec<&Band>> = STRESS_BANDS
            .iter()
            .map(|band| self.stress.band_for(date, band))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .collect();
        let npp = match stress.as_deref() {
            Some([w, t1, t2]) => npp(&apar, &self.params.lue, w, t1, t2)?,
            _ => {
                warn!("No stress coefficients join {} ({}); NPP masked", image.id(), date);
                Band::masked(dim)
            }
        };
        let ncei = ncei(&npp, &rh)?;

        Image::new(image.id(), date, image.grid().clone())
            .with_band(NDVI, ndvi)?
            .with_band(FPAR, fpar)?
            .with_band(APAR, apar)?
            .with_band(NPP, npp)?
            .with_band(NCEI, ncei)
    }

    /// Estimate every image of a harmonized collection in parallel.
    pub fn estimate(&self, reflectance: &ImageCollection) -> Result<ImageCollection> {
        let out = reflectance.map(|image| self.estimate_image(image))?;
        info!("Estimated NPP/NCEI for {} images", out.len());
        Ok(ImageCollection::from_images("npp", out.into_images()))
    }
}
