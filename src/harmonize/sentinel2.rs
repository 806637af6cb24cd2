//! Sentinel-2 Level-2A surface reflectance with the cloud probability layer.

use ndarray::Zip;

use crate::error::Result;
use crate::harmonize::{CloudMaskConfig, OPTICAL_BANDS};
use crate::raster::Image;

pub const SCALE: f32 = 0.0001;

pub const QA60: &str = "QA60";
pub const SCL: &str = "SCL";
pub const CLOUD_PROBABILITY: &str = "probability";

/// QA60 opaque cloud and cirrus bits.
pub const OPAQUE_CLOUD_BIT: u32 = 10;
pub const CIRRUS_BIT: u32 = 11;

/// Scene classification values treated as cloud.
pub const SCL_CLOUD_SHADOW: u8 = 3;
pub const SCL_CIRRUS: u8 = 10;

pub const BANDS: [(&str, &str); 9] = [
    ("B2", "blue"),
    ("B3", "green"),
    ("B4", "red"),
    ("B8", "nir"),
    ("B11", "swir1"),
    ("B12", "swir2"),
    (QA60, QA60),
    (SCL, SCL),
    (CLOUD_PROBABILITY, CLOUD_PROBABILITY),
];

pub fn mask_clouds(image: &Image, config: &CloudMaskConfig) -> Result<Image> {
    let clear = image.band(QA60)?.bits_clear(&[OPAQUE_CLOUD_BIT, CIRRUS_BIT]);
    let max_probability = config.s2_cloud_probability_max;
    let low_probability = image.band(CLOUD_PROBABILITY)?.test(|p| p <= max_probability);
    let scl_ok = image.band(SCL)?.test(|c| {
        let class = c.round() as u8;
        class != SCL_CLOUD_SHADOW && class != SCL_CIRRUS
    });

    let keep = Zip::from(&clear)
        .and(&low_probability)
        .and(&scl_ok)
        .map_collect(|&a, &b, &c| a && b && c);
    image.update_mask(&keep)
}

/// Rename, scale optical bands and cloud-mask one scene.
pub fn prepare(image: &Image, config: &CloudMaskConfig) -> Result<Image> {
    let mut renamed = image.rename(&BANDS)?;
    for name in OPTICAL_BANDS {
        let scaled = renamed.band(name)?.scale(SCALE, 0.0);
        renamed.insert_band(name, scaled)?;
    }
    mask_clouds(&renamed, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Band, GeoTransform, GridSpec};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn scene(qa: Vec<f32>, scl: Vec<f32>, probability: Vec<f32>) -> Image {
        let n = qa.len();
        let grid = GridSpec::new(n, 1, GeoTransform::new(0.0, 1.0, 1.0, 1.0), "EPSG:4326");
        let date = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        let mut image = Image::new("sentinel2/2020-07-01_T50SKE", date, grid);
        for (native, _) in BANDS.iter().take(6) {
            image.insert_band(*native, Band::constant((1, n), 1200.0)).unwrap();
        }
        image.insert_band(QA60, Band::from_vec((1, n), qa).unwrap()).unwrap();
        image.insert_band(SCL, Band::from_vec((1, n), scl).unwrap()).unwrap();
        image
            .insert_band(CLOUD_PROBABILITY, Band::from_vec((1, n), probability).unwrap())
            .unwrap();
        image
    }

    #[test]
    fn test_scales_optical_bands() {
        let image = scene(vec![0.0], vec![4.0], vec![5.0]);
        let prepared = prepare(&image, &CloudMaskConfig::default()).unwrap();
        assert_relative_eq!(prepared.band("nir").unwrap().get(0, 0).unwrap(), 0.12, epsilon = 1e-6);
        assert_eq!(prepared.band(SCL).unwrap().get(0, 0), Some(4.0));
    }

    #[test]
    fn test_qa60_bits() {
        let qa = vec![0.0, 1024.0, 2048.0];
        let image = scene(qa, vec![4.0; 3], vec![0.0; 3]);
        let prepared = prepare(&image, &CloudMaskConfig::default()).unwrap();
        let red = prepared.band("red").unwrap();
        assert!(red.get(0, 0).is_some());
        assert!(red.get(0, 1).is_none());
        assert!(red.get(0, 2).is_none());
    }

    #[test]
    fn test_probability_threshold_is_inclusive() {
        let probability = vec![30.0, 30.5];
        let image = scene(vec![0.0; 2], vec![4.0; 2], probability);
        let prepared = prepare(&image, &CloudMaskConfig::default()).unwrap();
        let red = prepared.band("red").unwrap();
        assert!(red.get(0, 0).is_some());
        assert!(red.get(0, 1).is_none());
    }

    #[test]
    fn test_scl_shadow_and_cirrus() {
        let scl = vec![3.0, 10.0, 8.0, 4.0];
        let image = scene(vec![0.0; 4], scl, vec![0.0; 4]);
        let prepared = prepare(&image, &CloudMaskConfig::default()).unwrap();
        let nir = prepared.band("nir").unwrap();
        assert!(nir.get(0, 0).is_none());
        assert!(nir.get(0, 1).is_none());
        // class 8 (medium cloud probability) is left to the probability layer
        assert!(nir.get(0, 2).is_some());
        assert!(nir.get(0, 3).is_some());
    }

    #[test]
    fn test_missing_probability_band_fails() {
        let grid = GridSpec::new(1, 1, GeoTransform::new(0.0, 1.0, 1.0, 1.0), "EPSG:4326");
        let date = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        let image = Image::new("s2", date, grid);
        assert!(prepare(&image, &CloudMaskConfig::default()).is_err());
    }
}
