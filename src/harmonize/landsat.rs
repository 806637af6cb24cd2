//! Landsat Collection 2 Level-2 surface reflectance.

use ndarray::Zip;

use crate::error::Result;
use crate::harmonize::{BrightnessTest, CloudMaskConfig, OPTICAL_BANDS, QA_PIXEL};
use crate::raster::Image;

/// Collection 2 surface reflectance scale factor.
pub const SCALE: f32 = 0.0000275;
pub const OFFSET: f32 = -0.2;

/// QA_PIXEL bit flags.
pub const CLOUD_BIT: u32 = 3;
pub const CLOUD_SHADOW_BIT: u32 = 4;

/// Landsat 8 and 9 OLI band names.
pub const OLI_BANDS: [(&str, &str); 7] = [
    ("SR_B2", "blue"),
    ("SR_B3", "green"),
    ("SR_B4", "red"),
    ("SR_B5", "nir"),
    ("SR_B6", "swir1"),
    ("SR_B7", "swir2"),
    (QA_PIXEL, QA_PIXEL),
];

/// Landsat 7 ETM+ band names.
pub const ETM_BANDS: [(&str, &str); 7] = [
    ("SR_B1", "blue"),
    ("SR_B2", "green"),
    ("SR_B3", "red"),
    ("SR_B4", "nir"),
    ("SR_B5", "swir1"),
    ("SR_B7", "swir2"),
    (QA_PIXEL, QA_PIXEL),
];

/// Apply the reflectance scale to optical bands, leaving QA untouched.
pub fn scale_optical(image: &Image) -> Result<Image> {
    let mut out = image.clone();
    for name in OPTICAL_BANDS {
        if image.has_band(name) {
            out.insert_band(name, image.band(name)?.scale(SCALE, OFFSET))?;
        }
    }
    Ok(out)
}

/// Mask cloud, cloud shadow and bright pixels. Expects scaled reflectance.
///
/// A pixel survives when QA bits 3 and 4 are clear and the blue brightness
/// test passes. With [`BrightnessTest::Complement`] the test keeps pixels
/// whose blue reflectance is not above the threshold; a masked blue pixel
/// never passes.
pub fn mask_clouds(image: &Image, config: &CloudMaskConfig) -> Result<Image> {
    let clear = image.band(QA_PIXEL)?.bits_clear(&[CLOUD_BIT, CLOUD_SHADOW_BIT]);
    let blue = image.band("blue")?;
    let bright = blue.test(|b| b > config.landsat_blue_max);
    let complement = config.brightness_test == BrightnessTest::Complement;

    let keep = Zip::from(&clear)
        .and(&bright)
        .and(blue.valid())
        .map_collect(|&c, &b, &v| c && v && (b != complement));
    image.update_mask(&keep)
}

/// Rename to the common schema, scale and cloud-mask one scene.
pub fn prepare(image: &Image, bands: &[(&str, &str)], config: &CloudMaskConfig) -> Result<Image> {
    let renamed = image.rename(bands)?;
    let scaled = scale_optical(&renamed)?;
    mask_clouds(&scaled, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Band, GeoTransform, GridSpec};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn dn(reflectance: f32) -> f32 {
        ((reflectance - OFFSET) / SCALE).round()
    }

    fn scene(blue: Vec<f32>, qa: Vec<f32>) -> Image {
        let n = blue.len();
        let grid = GridSpec::new(n, 1, GeoTransform::new(0.0, 1.0, 1.0, 1.0), "EPSG:4326");
        let date = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        let mut image = Image::new("landsat8/2020-07-01_LC08", date, grid);
        for (native, _) in OLI_BANDS.iter().take(6) {
            let values = if *native == "SR_B2" { blue.clone() } else { vec![dn(0.1); n] };
            image.insert_band(*native, Band::from_vec((1, n), values).unwrap()).unwrap();
        }
        image.insert_band(QA_PIXEL, Band::from_vec((1, n), qa).unwrap()).unwrap();
        image
    }

    #[test]
    fn test_scaling_skips_qa() {
        let image = scene(vec![dn(0.05)], vec![21824.0]);
        let prepared = prepare(&image, &OLI_BANDS, &CloudMaskConfig::default()).unwrap();
        assert_relative_eq!(prepared.band("red").unwrap().get(0, 0).unwrap(), 0.1, epsilon = 1e-4);
        assert_eq!(prepared.band(QA_PIXEL).unwrap().get(0, 0), Some(21824.0));
    }

    #[test]
    fn test_qa_cloud_and_shadow_bits_mask() {
        let blue = vec![dn(0.05); 4];
        let qa = vec![0.0, 8.0, 16.0, 24.0];
        let prepared = prepare(&scene(blue, qa), &OLI_BANDS, &CloudMaskConfig::default()).unwrap();
        let red = prepared.band("red").unwrap();
        assert!(red.get(0, 0).is_some());
        assert!(red.get(0, 1).is_none());
        assert!(red.get(0, 2).is_none());
        assert!(red.get(0, 3).is_none());
    }

    #[test]
    fn test_complemented_brightness_keeps_dark_pixels() {
        let blue = vec![dn(0.05), dn(0.2), dn(0.35)];
        let config = CloudMaskConfig::default();
        let prepared = prepare(&scene(blue, vec![0.0; 3]), &OLI_BANDS, &config).unwrap();
        let nir = prepared.band("nir").unwrap();
        assert!(nir.get(0, 0).is_some());
        assert!(nir.get(0, 2).is_none());
    }

    #[test]
    fn test_direct_brightness_keeps_bright_pixels() {
        let config = CloudMaskConfig {
            brightness_test: BrightnessTest::Direct,
            ..CloudMaskConfig::default()
        };
        let blue = vec![dn(0.05), dn(0.35)];
        let prepared = prepare(&scene(blue, vec![0.0; 2]), &OLI_BANDS, &config).unwrap();
        let nir = prepared.band("nir").unwrap();
        assert!(nir.get(0, 0).is_none());
        assert!(nir.get(0, 1).is_some());
    }

    #[test]
    fn test_masked_blue_fails_either_brightness_test() {
        for brightness_test in [BrightnessTest::Complement, BrightnessTest::Direct] {
            let config = CloudMaskConfig {
                brightness_test,
                ..CloudMaskConfig::default()
            };
            let blue = vec![f32::NAN, dn(0.05), dn(0.35)];
            let prepared = prepare(&scene(blue, vec![0.0; 3]), &OLI_BANDS, &config).unwrap();
            let nir = prepared.band("nir").unwrap();
            assert!(nir.get(0, 0).is_none(), "{:?}", brightness_test);
            assert_eq!(nir.valid_count(), 1, "{:?}", brightness_test);
        }
    }

    #[test]
    fn test_fully_clouded_scene_is_kept_masked() {
        let image = scene(vec![dn(0.05); 2], vec![8.0; 2]);
        let prepared = prepare(&image, &OLI_BANDS, &CloudMaskConfig::default()).unwrap();
        assert!(prepared.band("red").unwrap().is_fully_masked());
    }

    #[test]
    fn test_etm_mapping_uses_shifted_band_numbers() {
        let grid = GridSpec::new(1, 1, GeoTransform::new(0.0, 1.0, 1.0, 1.0), "EPSG:4326");
        let date = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        let mut image = Image::new("landsat7/2020-07-01_LE07", date, grid);
        for (i, (native, _)) in ETM_BANDS.iter().take(6).enumerate() {
            image.insert_band(*native, Band::constant((1, 1), dn(0.01 * (i + 1) as f32))).unwrap();
        }
        image.insert_band(QA_PIXEL, Band::constant((1, 1), 0.0)).unwrap();

        let prepared = prepare(&image, &ETM_BANDS, &CloudMaskConfig::default()).unwrap();
        assert_relative_eq!(prepared.band("red").unwrap().get(0, 0).unwrap(), 0.03, epsilon = 1e-4);
        assert_relative_eq!(prepared.band("nir").unwrap().get(0, 0).unwrap(), 0.04, epsilon = 1e-4);
    }
}
