//! A single band of pixel values with a per-pixel validity mask.
//!
//! Every arithmetic operation propagates validity: a masked operand yields a
//! masked result, and so does a zero denominator or a non-finite outcome.
//! Masked pixels always store `0.0` so equality stays well defined.

use ndarray::{Array2, Zip};

use crate::error::{PipelineError, Result};
use crate::raster::grid::GridSpec;

#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    values: Array2<f32>,
    valid: Array2<bool>,
}

impl Band {
    /// Wrap raw values; non-finite pixels become masked.
    pub fn new(values: Array2<f32>) -> Self {
        let valid = values.mapv(f32::is_finite);
        let values = values.mapv(|v| if v.is_finite() { v } else { 0.0 });
        Band { values, valid }
    }

    pub fn from_parts(values: Array2<f32>, valid: Array2<bool>) -> Result<Self> {
        if values.dim() != valid.dim() {
            return Err(PipelineError::ShapeMismatch {
                expected: values.dim(),
                actual: valid.dim(),
            });
        }
        let mut band = Band { values, valid };
        band.normalize();
        Ok(band)
    }

    /// Build a band from row-major values.
    pub fn from_vec(dim: (usize, usize), data: Vec<f32>) -> Result<Self> {
        let len = data.len();
        let values = Array2::from_shape_vec(dim, data).map_err(|_| PipelineError::ShapeMismatch {
            expected: dim,
            actual: (len, 1),
        })?;
        Ok(Band::new(values))
    }

    pub fn constant(dim: (usize, usize), value: f32) -> Self {
        Band::new(Array2::from_elem(dim, value))
    }

    /// A band where every pixel is masked.
    pub fn masked(dim: (usize, usize)) -> Self {
        Band {
            values: Array2::zeros(dim),
            valid: Array2::from_elem(dim, false),
        }
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn valid(&self) -> &Array2<bool> {
        &self.valid
    }

    /// Value at a pixel, `None` when masked or out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        match self.valid.get((row, col)) {
            Some(true) => self.values.get((row, col)).copied(),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn is_fully_masked(&self) -> bool {
        self.valid_count() == 0
    }

    /// Apply `f` to every valid pixel.
    pub fn map<F>(&self, f: F) -> Band
    where
        F: Fn(f32) -> f32,
    {
        let mut values = Array2::zeros(self.dim());
        let mut valid = Array2::from_elem(self.dim(), false);
        Zip::from(&mut values)
            .and(&mut valid)
            .and(&self.values)
            .and(&self.valid)
            .for_each(|out, ok, &v, &vv| {
                if vv {
                    let r = f(v);
                    if r.is_finite() {
                        *out = r;
                        *ok = true;
                    }
                }
            });
        Band { values, valid }
    }

    /// Combine two bands pixel by pixel. `f` returns `None` to mask a pixel.
    pub fn zip_with<F>(&self, other: &Band, f: F) -> Result<Band>
    where
        F: Fn(f32, f32) -> Option<f32>,
    {
        self.check_dim(other)?;
        let mut values = Array2::zeros(self.dim());
        let mut valid = Array2::from_elem(self.dim(), false);
        Zip::from(&mut values)
            .and(&mut valid)
            .and(&self.values)
            .and(&self.valid)
            .and(&other.values)
            .and(&other.valid)
            .for_each(|out, ok, &a, &va, &b, &vb| {
                if va && vb {
                    if let Some(r) = f(a, b).filter(|r| r.is_finite()) {
                        *out = r;
                        *ok = true;
                    }
                }
            });
        Ok(Band { values, valid })
    }

    pub fn add(&self, other: &Band) -> Result<Band> {
        self.zip_with(other, |a, b| Some(a + b))
    }

    pub fn sub(&self, other: &Band) -> Result<Band> {
        self.zip_with(other, |a, b| Some(a - b))
    }

    pub fn mul(&self, other: &Band) -> Result<Band> {
        self.zip_with(other, |a, b| Some(a * b))
    }

    /// Division that masks zero denominators.
    pub fn div(&self, other: &Band) -> Result<Band> {
        self.zip_with(other, |a, b| if b == 0.0 { None } else { Some(a / b) })
    }

    /// `v * mul + offset` on every valid pixel.
    pub fn scale(&self, mul: f32, offset: f32) -> Band {
        self.map(|v| v * mul + offset)
    }

    pub fn clamp(&self, lo: f32, hi: f32) -> Band {
        self.map(|v| v.clamp(lo, hi))
    }

    /// Evaluate a predicate on valid pixels. Masked pixels test false.
    pub fn test<F>(&self, pred: F) -> Array2<bool>
    where
        F: Fn(f32) -> bool,
    {
        let mut out = Array2::from_elem(self.dim(), false);
        Zip::from(&mut out)
            .and(&self.values)
            .and(&self.valid)
            .for_each(|o, &v, &ok| *o = ok && pred(v));
        out
    }

    /// True where every listed bit of the (integer) pixel value is zero.
    pub fn bits_clear(&self, bits: &[u32]) -> Array2<bool> {
        let flags = bits.iter().fold(0u32, |acc, b| acc | (1 << b));
        self.test(|v| (v as u32) & flags == 0)
    }

    /// Keep only pixels that are already valid and where `keep` is true.
    pub fn update_mask(&self, keep: &Array2<bool>) -> Result<Band> {
        if keep.dim() != self.dim() {
            return Err(PipelineError::ShapeMismatch {
                expected: self.dim(),
                actual: keep.dim(),
            });
        }
        let mut band = self.clone();
        Zip::from(&mut band.valid).and(keep).for_each(|v, &k| *v = *v && k);
        band.normalize();
        Ok(band)
    }

    /// Nearest-neighbour resample from `from` onto `to`. Target pixels whose
    /// centre falls outside the source grid are masked.
    pub fn resample_nearest(&self, from: &GridSpec, to: &GridSpec) -> Result<Band> {
        if self.dim() != from.dim() {
            return Err(PipelineError::ShapeMismatch {
                expected: from.dim(),
                actual: self.dim(),
            });
        }
        if from.crs != to.crs {
            return Err(PipelineError::CrsMismatch {
                expected: to.crs.clone(),
                actual: from.crs.clone(),
            });
        }
        if from == to {
            return Ok(self.clone());
        }
        let mut values = Array2::zeros(to.dim());
        let mut valid = Array2::from_elem(to.dim(), false);
        for row in 0..to.height {
            for col in 0..to.width {
                let centre = to.pixel_center(row, col);
                if let Some((r, c)) = from.locate(centre.x, centre.y) {
                    if self.valid[[r, c]] {
                        values[[row, col]] = self.values[[r, c]];
                        valid[[row, col]] = true;
                    }
                }
            }
        }
        Ok(Band { values, valid })
    }

    fn check_dim(&self, other: &Band) -> Result<()> {
        if self.dim() != other.dim() {
            return Err(PipelineError::ShapeMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        Ok(())
    }

    fn normalize(&mut self) {
        Zip::from(&mut self.values)
            .and(&mut self.valid)
            .for_each(|v, ok| {
                if !v.is_finite() {
                    *ok = false;
                }
                if !*ok {
                    *v = 0.0;
                }
            });
    }
}
