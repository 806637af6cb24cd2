//! NDVI, simple ratio and FPAR.

use crate::error::Result;
use crate::landcover::LandCoverParameters;
use crate::raster::Band;

pub const FPAR_MIN: f32 = 0.05;
pub const FPAR_MAX: f32 = 0.95;

const FPAR_SPAN: f32 = 0.949;
const FPAR_FLOOR: f32 = 0.001;

/// `(nir - red) / (nir + red)`, masked where red equals nir (including the
/// 0/0 case) or the sum is zero.
pub fn ndvi(red: &Band, nir: &Band) -> Result<Band> {
    red.zip_with(nir, |r, n| {
        let sum = n + r;
        if n == r || sum == 0.0 {
            None
        } else {
            Some((n - r) / sum)
        }
    })
}

/// `(1 + NDVI) / (1 - NDVI)`, masked at NDVI = 1.
pub fn simple_ratio(ndvi: &Band) -> Band {
    ndvi.map(|n| if n == 1.0 { f32::NAN } else { (1.0 + n) / (1.0 - n) })
}

/// `(x - min) / (max - min) * 0.949 + 0.001`; a zero range masks the pixel.
pub fn fpar_term(x: &Band, min: &Band, max: &Band) -> Result<Band> {
    let numerator = x.sub(min)?;
    let range = max.sub(min)?;
    Ok(numerator.div(&range)?.scale(FPAR_SPAN, FPAR_FLOOR))
}

/// Mean of the NDVI and SR terms, clamped to `[0.05, 0.95]`.
pub fn fpar(ndvi: &Band, sr: &Band, params: &LandCoverParameters) -> Result<Band> {
    let fpar1 = fpar_term(ndvi, &params.ndvi_min, &params.ndvi_max)?;
    let fpar2 = fpar_term(sr, &params.sr_min, &params.sr_max)?;
    Ok(fpar1.add(&fpar2)?.scale(0.5, 0.0).clamp(FPAR_MIN, FPAR_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landcover::{derive_parameters, UnmappedClassPolicy};
    use approx::assert_relative_eq;

    #[test]
    fn test_ndvi_masks_equal_bands_and_zero_denominator() {
        let red = Band::from_vec((1, 4), vec![0.0, 0.1, 0.2, 0.1]).unwrap();
        let nir = Band::from_vec((1, 4), vec![0.0, 0.3, 0.2, -0.1]).unwrap();
        let out = ndvi(&red, &nir).unwrap();
        assert_eq!(out.get(0, 0), None);
        assert_relative_eq!(out.get(0, 1).unwrap(), 0.5, epsilon = 1e-6);
        assert_eq!(out.get(0, 2), None);
        assert_eq!(out.get(0, 3), None);
        assert!(out.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_simple_ratio() {
        let n = Band::from_vec((1, 3), vec![0.5, 1.0, 0.0]).unwrap();
        let sr = simple_ratio(&n);
        assert_relative_eq!(sr.get(0, 0).unwrap(), 3.0, epsilon = 1e-6);
        assert_eq!(sr.get(0, 1), None);
        assert_eq!(sr.get(0, 2), Some(1.0));
    }

    #[test]
    fn test_zero_parameter_range_masks_fpar() {
        let x = Band::constant((1, 1), 0.5);
        let min = Band::constant((1, 1), 0.3);
        let out = fpar_term(&x, &min, &min).unwrap();
        assert!(out.is_fully_masked());
    }

    #[test]
    fn test_unmapped_class_zero_masks_fpar() {
        // class 0 retains code 0 for both min and max
        let classes = Band::constant((1, 1), 0.0);
        let params = derive_parameters(&classes, UnmappedClassPolicy::RetainCode);
        let n = Band::constant((1, 1), 0.4);
        let out = fpar(&n, &simple_ratio(&n), &params).unwrap();
        assert!(out.is_fully_masked());
    }

    fn sweep() -> Band {
        let values: Vec<f32> = (-99..=99).map(|i| i as f32 / 100.0).collect();
        Band::from_vec((1, values.len()), values).unwrap()
    }

    #[test]
    fn test_fpar_bounded_for_ndvi_sweep() {
        let ndvi = sweep();
        let n = ndvi.dim().1;
        let sr = simple_ratio(&ndvi);
        for class in 1..=12 {
            let classes = Band::constant((1, n), class as f32);
            let params = derive_parameters(&classes, UnmappedClassPolicy::RetainCode);
            let out = fpar(&ndvi, &sr, &params).unwrap();
            assert_eq!(out.valid_count(), n);
            for &v in out.values() {
                assert!((FPAR_MIN..=FPAR_MAX).contains(&v), "class {} gave {}", class, v);
            }
        }
    }

    #[test]
    fn test_classes_past_ndvi_tables_mask_fpar() {
        let ndvi = sweep();
        let n = ndvi.dim().1;
        let sr = simple_ratio(&ndvi);
        for class in 13..=17 {
            let classes = Band::constant((1, n), class as f32);
            for policy in [UnmappedClassPolicy::RetainCode, UnmappedClassPolicy::Mask] {
                let params = derive_parameters(&classes, policy);
                let out = fpar(&ndvi, &sr, &params).unwrap();
                assert!(out.is_fully_masked(), "class {} under {:?}", class, policy);
            }
        }
    }

    #[test]
    fn test_fpar_midpoint() {
        let classes = Band::constant((1, 1), 3.0);
        let params = derive_parameters(&classes, UnmappedClassPolicy::RetainCode);
        let ndvi = Band::constant((1, 1), 0.5);
        let sr = simple_ratio(&ndvi);
        let out = fpar(&ndvi, &sr, &params).unwrap();
        let f1 = (0.5 - 0.023) / (0.738 - 0.023) * 0.949 + 0.001;
        let f2 = (3.0 - 1.05) / (6.63 - 1.05) * 0.949 + 0.001;
        assert_relative_eq!(out.get(0, 0).unwrap(), (f1 + f2) / 2.0, epsilon = 1e-5);
    }
}
