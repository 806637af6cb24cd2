//! Temporal join of reflectance dates against a dated band collection
//! (monthly climate, stress coefficients).

use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use serde::Deserialize;

use crate::error::Result;
use crate::raster::{Band, Image, ImageCollection};

/// Which image of a collection supplies a band for a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// The image whose period `[t_i, t_{i+1})` encloses the date. The last
    /// image covers one month.
    #[default]
    Enclosing,
    /// The image closest in time; ties go to the earlier image.
    Nearest,
    /// The masked mean of the band over the whole collection.
    CollectionMean,
}

pub struct TemporalJoin<'a> {
    policy: JoinPolicy,
    /// Images in ascending date order.
    images: Vec<&'a Image>,
    means: BTreeMap<String, Band>,
}

impl<'a> TemporalJoin<'a> {
    /// Prepare a join over `collection`. For [`JoinPolicy::CollectionMean`]
    /// the means of `bands` are computed up front.
    pub fn new(
        collection: &'a ImageCollection,
        policy: JoinPolicy,
        bands: &[&str],
    ) -> Result<Self> {
        let mut images: Vec<&Image> = collection.iter().collect();
        images.sort_by_key(|image| image.date());

        let mut means = BTreeMap::new();
        if policy == JoinPolicy::CollectionMean && !collection.is_empty() {
            for band in bands {
                means.insert(band.to_string(), collection.mean(band)?);
            }
        }
        Ok(TemporalJoin { policy, images, means })
    }

    /// The image matched to `date`, if any. Always `None` for
    /// [`JoinPolicy::CollectionMean`].
    pub fn image_for(&self, date: NaiveDate) -> Option<&'a Image> {
        match self.policy {
            JoinPolicy::Enclosing => self.enclosing(date),
            JoinPolicy::Nearest => self
                .images
                .iter()
                .min_by_key(|image| (image.date() - date).num_days().abs())
                .copied(),
            JoinPolicy::CollectionMean => None,
        }
    }

    /// Resolve `band` for `date`. `Ok(None)` when no image joins the date.
    pub fn band_for(&self, date: NaiveDate, band: &str) -> Result<Option<&Band>> {
        match self.policy {
            JoinPolicy::CollectionMean => Ok(self.means.get(band)),
            _ => match self.image_for(date) {
                Some(image) => image.band(band).map(Some),
                None => Ok(None),
            },
        }
    }

    fn enclosing(&self, date: NaiveDate) -> Option<&'a Image> {
        // first index whose date is after `date`
        let next = self.images.partition_point(|image| image.date() <= date);
        let last = self.images.get(next.checked_sub(1)?)?;
        let start = last.date();
        let end = match self.images.get(next) {
            Some(image) => image.date(),
            None => start.checked_add_months(Months::new(1))?,
        };
        if date >= end {
            return None;
        }
        // first image of a run of equal dates
        let first = self.images.partition_point(|image| image.date() < start);
        self.images.get(first).copied()
    }
}
