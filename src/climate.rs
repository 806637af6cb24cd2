//! Monthly climate preprocessing: solar radiation, mean temperature,
//! precipitation and heterotrophic respiration.

use log::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::io::SceneSource;
use crate::raster::{GridSpec, Image, ImageCollection};

pub const COLLECTION: &str = "terraclimate";
pub const NATIVE_BANDS: [&str; 4] = ["srad", "tmmn", "tmmx", "pr"];

pub const SOLAR_RADIATION: &str = "solar_radiation";
pub const TMEAN: &str = "tmean";
pub const PRECIPITATION: &str = "precipitation";
pub const RH: &str = "RH";

/// W/m² (scaled by 10) to MJ/m²/month.
const SRAD_FACTOR: f32 = 0.1 * 2.592;
const TEMPERATURE_SCALE: f32 = 0.1;

/// Monthly heterotrophic respiration (gC/m²/month) for mean temperature `t`
/// (°C) and precipitation `p` (mm).
pub fn heterotrophic_respiration(t: f32, p: f32) -> f32 {
    0.22 * ((0.0913 * t).exp() + (0.3145 * p + 1.0).ln()) * 30.0 * 0.465
}

/// Derive the climate bands of one image and resample them onto `grid`.
pub fn preprocess_image(image: &Image, grid: &GridSpec) -> Result<Image> {
    let srad = image.band("srad")?;
    let tmmn = image.band("tmmn")?.scale(TEMPERATURE_SCALE, 0.0);
    let tmmx = image.band("tmmx")?.scale(TEMPERATURE_SCALE, 0.0);
    let pr = image.band("pr")?;

    let solar_radiation = srad.scale(SRAD_FACTOR, 0.0);
    let tmean = tmmn.add(&tmmx)?.scale(0.5, 0.0);
    let rh = tmean.zip_with(pr, |t, p| Some(heterotrophic_respiration(t, p)))?;

    Image::new(image.id(), image.date(), image.grid().clone())
        .with_band(SOLAR_RADIATION, solar_radiation)?
        .with_band(TMEAN, tmean)?
        .with_band(PRECIPITATION, pr.clone())?
        .with_band(RH, rh)?
        .resample(grid)
}

/// Load and preprocess the climate collection for the configured range.
pub fn preprocess<S>(
    source: &S,
    config: &PipelineConfig,
    grid: &GridSpec,
) -> Result<ImageCollection>
where
    S: SceneSource + ?Sized,
{
    let range = config.climate_range()?;
    let mut raw = source
        .load(COLLECTION, &NATIVE_BANDS, &range)?
        .filter_bounds(&config.region);
    if raw.is_empty() {
        return Err(PipelineError::EmptyCollection(COLLECTION.to_string()));
    }
    raw.sort_by_time();
    info!("Climate images in range: {}", raw.len());
    raw.map(|image| preprocess_image(image, grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;
    use crate::raster::{Band, GeoTransform, Region};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn grid() -> GridSpec {
        GridSpec::new(2, 1, GeoTransform::new(0.0, 1.0, 1.0, 1.0), "EPSG:4326")
    }

    fn raw_image(month: u32, tmmn: f32, tmmx: f32, pr: Vec<f32>) -> Image {
        let date = NaiveDate::from_ymd_opt(2020, month, 1).unwrap();
        Image::new(format!("terraclimate/2020-{:02}-01", month), date, grid())
            .with_band("srad", Band::constant((1, 2), 2000.0))
            .unwrap()
            .with_band("tmmn", Band::constant((1, 2), tmmn))
            .unwrap()
            .with_band("tmmx", Band::constant((1, 2), tmmx))
            .unwrap()
            .with_band("pr", Band::from_vec((1, 2), pr).unwrap())
            .unwrap()
    }

    #[test]
    fn test_rh_reference_value() {
        let expected = 0.22 * (1.826f32.exp() + 32.45f32.ln()) * 30.0 * 0.465;
        assert_relative_eq!(heterotrophic_respiration(20.0, 100.0), expected, max_relative = 1e-5);
    }

    #[test]
    fn test_preprocess_image() {
        let image = raw_image(6, 150.0, 250.0, vec![100.0, 0.0]);
        let out = preprocess_image(&image, &grid()).unwrap();
        let srad = out.band(SOLAR_RADIATION).unwrap();
        assert_relative_eq!(srad.get(0, 0).unwrap(), 518.4, epsilon = 1e-3);
        assert_relative_eq!(out.band(TMEAN).unwrap().get(0, 0).unwrap(), 20.0, epsilon = 1e-5);
        assert_eq!(out.band(PRECIPITATION).unwrap().get(0, 1), Some(0.0));
        assert_relative_eq!(
            out.band(RH).unwrap().get(0, 0).unwrap(),
            heterotrophic_respiration(20.0, 100.0),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_negative_precipitation_log_is_masked() {
        // ln(0.3145 * -10 + 1) is undefined
        let image = raw_image(6, 150.0, 250.0, vec![-10.0, 10.0]);
        let out = preprocess_image(&image, &grid()).unwrap();
        assert_eq!(out.band(RH).unwrap().get(0, 0), None);
        assert!(out.band(RH).unwrap().get(0, 1).is_some());
    }

    #[test]
    fn test_missing_band_is_an_image_error() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let image = Image::new("c", date, grid())
            .with_band("srad", Band::constant((1, 2), 1.0))
            .unwrap();
        assert!(matches!(
            preprocess_image(&image, &grid()),
            Err(PipelineError::MissingBand { .. })
        ));
    }

    #[test]
    fn test_empty_collection_is_an_error() {
        let region = Region::from_vertices(&[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0]]).unwrap();
        let config = PipelineConfig::new(2020, region);
        let source = MemorySource::new();
        assert!(matches!(
            preprocess(&source, &config, &grid()),
            Err(PipelineError::EmptyCollection(_))
        ));
    }

    #[test]
    fn test_preprocess_sorts_by_date() {
        let region = Region::from_vertices(&[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0]]).unwrap();
        let config = PipelineConfig::new(2020, region);
        let mut source = MemorySource::new();
        source.insert(ImageCollection::from_images(
            COLLECTION,
            vec![
                raw_image(3, 100.0, 200.0, vec![1.0, 1.0]),
                raw_image(1, 100.0, 200.0, vec![1.0, 1.0]),
            ],
        ));
        let climate = preprocess(&source, &config, &grid()).unwrap();
        let months: Vec<_> = climate.iter().map(|i| i.date().to_string()).collect();
        assert_eq!(months, vec!["2020-01-01", "2020-03-01"]);
    }
}
