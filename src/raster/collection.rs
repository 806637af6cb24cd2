//! Ordered image collections with the map / filter / merge / reduce contract.

use chrono::NaiveDate;
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::raster::band::Band;
use crate::raster::image::Image;
use crate::raster::region::Region;

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = PipelineError;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(PipelineError::config(format!(
                "date range end {} is not after start {}",
                end, start
            )));
        }
        Ok(DateRange { start, end })
    }

    /// January 1st of `year` up to January 1st of the next year.
    pub fn year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| PipelineError::config(format!("invalid year {}", year)))?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .ok_or_else(|| PipelineError::config(format!("invalid year {}", year + 1)))?;
        DateRange::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection {
    name: String,
    images: Vec<Image>,
}

impl ImageCollection {
    pub fn new(name: impl Into<String>) -> Self {
        ImageCollection {
            name: name.into(),
            images: Vec::new(),
        }
    }

    pub fn from_images(name: impl Into<String>, images: Vec<Image>) -> Self {
        ImageCollection {
            name: name.into(),
            images,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images
    }

    /// Append `other` after this collection's images. Nothing is deduplicated.
    pub fn merge(mut self, other: ImageCollection) -> Self {
        self.images.extend(other.images);
        self
    }

    /// Stable ascending sort by acquisition date; equal dates keep their
    /// merge order.
    pub fn sort_by_time(&mut self) {
        self.images.sort_by_key(|image| image.date());
    }

    pub fn filter_date(self, range: &DateRange) -> Self {
        let name = self.name;
        let images = self.images.into_iter().filter(|i| range.contains(i.date())).collect();
        ImageCollection { name, images }
    }

    /// Keep images whose footprint intersects the region.
    pub fn filter_bounds(self, region: &Region) -> Self {
        let name = self.name;
        let images = self
            .images
            .into_iter()
            .filter(|i| region.intersects(&i.footprint()))
            .collect();
        ImageCollection { name, images }
    }

    /// Apply `f` to every image in parallel. Output order matches input
    /// order; the first error aborts the map.
    pub fn map<F>(&self, f: F) -> Result<ImageCollection>
    where
        F: Fn(&Image) -> Result<Image> + Sync + Send,
    {
        let images = self.images.par_iter().map(|image| f(image)).collect::<Result<Vec<_>>>()?;
        Ok(ImageCollection {
            name: self.name.clone(),
            images,
        })
    }

    pub fn select(&self, names: &[&str]) -> Result<ImageCollection> {
        self.map(|image| image.select(names))
    }

    /// Per-pixel mean of `band` over the collection, ignoring masked pixels.
    /// Pixels that are never valid stay masked.
    pub fn mean(&self, band: &str) -> Result<Band> {
        let first = self
            .images
            .first()
            .ok_or_else(|| PipelineError::EmptyCollection(self.name.clone()))?;
        let dim = first.band(band)?.dim();
        let mut sum = Array2::<f64>::zeros(dim);
        let mut count = Array2::<u32>::zeros(dim);

        for image in &self.images {
            let b = image.band(band)?;
            if b.dim() != dim {
                return Err(PipelineError::ShapeMismatch {
                    expected: dim,
                    actual: b.dim(),
                });
            }
            Zip::from(&mut sum)
                .and(&mut count)
                .and(b.values())
                .and(b.valid())
                .for_each(|s, n, &v, &ok| {
                    if ok {
                        *s += v as f64;
                        *n += 1;
                    }
                });
        }

        let values = Zip::from(&sum)
            .and(&count)
            .map_collect(|&s, &n| if n > 0 { (s / n as f64) as f32 } else { 0.0 });
        Band::from_parts(values, count.mapv(|n| n > 0))
    }
}

impl<'a> IntoIterator for &'a ImageCollection {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::grid::{GeoTransform, GridSpec};
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::new(2, 1, GeoTransform::new(0.0, 1.0, 1.0, 1.0), "EPSG:4326")
    }

    fn image(id: &str, ymd: (i32, u32, u32), band: Band) -> Image {
        let date = NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap();
        Image::new(id, date, grid()).with_band("v", band).unwrap()
    }

    #[test]
    fn test_mean_ignores_fully_masked_image() {
        let collection = ImageCollection::from_images(
            "test",
            vec![
                image("a", (2020, 1, 1), Band::from_vec((1, 2), vec![1.0, 2.0]).unwrap()),
                image("b", (2020, 2, 1), Band::masked((1, 2))),
                image("c", (2020, 3, 1), Band::from_vec((1, 2), vec![3.0, 6.0]).unwrap()),
            ],
        );
        let mean = collection.mean("v").unwrap();
        assert_relative_eq!(mean.get(0, 0).unwrap(), 2.0);
        assert_relative_eq!(mean.get(0, 1).unwrap(), 4.0);
    }

    #[test]
    fn test_mean_never_valid_pixel_stays_masked() {
        let keep = Array2::from_shape_vec((1, 2), vec![true, false]).unwrap();
        let band = Band::constant((1, 2), 5.0).update_mask(&keep).unwrap();
        let collection = ImageCollection::from_images("test", vec![image("a", (2020, 1, 1), band)]);
        let mean = collection.mean("v").unwrap();
        assert_eq!(mean.get(0, 0), Some(5.0));
        assert_eq!(mean.get(0, 1), None);
    }

    #[test]
    fn test_mean_of_empty_collection_fails() {
        let collection = ImageCollection::new("empty");
        assert!(matches!(collection.mean("v"), Err(PipelineError::EmptyCollection(_))));
    }

    #[test]
    fn test_sort_is_stable_for_duplicate_dates() {
        let mut collection = ImageCollection::from_images(
            "test",
            vec![
                image("late", (2020, 5, 1), Band::constant((1, 2), 1.0)),
                image("first", (2020, 3, 1), Band::constant((1, 2), 1.0)),
                image("second", (2020, 3, 1), Band::constant((1, 2), 1.0)),
            ],
        );
        collection.sort_by_time();
        let ids: Vec<_> = collection.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_filter_date_is_half_open() {
        let range = DateRange::year(2020).unwrap();
        let collection = ImageCollection::from_images(
            "test",
            vec![
                image("in", (2020, 12, 31), Band::constant((1, 2), 1.0)),
                image("out", (2021, 1, 1), Band::constant((1, 2), 1.0)),
            ],
        )
        .filter_date(&range);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.images()[0].id(), "in");
    }

    #[test]
    fn test_map_preserves_order_and_errors() {
        let collection = ImageCollection::from_images(
            "test",
            (1..=5)
                .map(|m| image(&format!("m{}", m), (2020, m, 1), Band::constant((1, 2), m as f32)))
                .collect(),
        );
        let doubled = collection
            .map(|i| {
                let v = i.band("v")?.scale(2.0, 0.0);
                Image::new(i.id(), i.date(), i.grid().clone()).with_band("v", v)
            })
            .unwrap();
        let firsts: Vec<_> = doubled
            .iter()
            .map(|i| i.band("v").unwrap().get(0, 0).unwrap())
            .collect();
        assert_eq!(firsts, vec![2.0, 4.0, 6.0, 8.0, 10.0]);

        assert!(collection.map(|i| i.select(&["missing"])).is_err());
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(DateRange::new(d, d).is_err());
    }
}
