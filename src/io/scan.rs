//! Archive scanning and scene loading.
//!
//! An archive is a directory per collection with one subdirectory per native
//! band. Each band file is named `YYYY-MM-DD_<scene>.tif` (or `.tiff`); files
//! sharing a name across band directories form one scene.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::io::geotiff::read_geotiff_safe;
use crate::raster::{DateRange, Image, ImageCollection};

/// Band files that make up one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFiles {
    pub id: String,
    pub date: NaiveDate,
    pub bands: BTreeMap<String, PathBuf>,
}

/// Where raw collections come from.
pub trait SceneSource: Sync {
    /// Load every scene of `collection` dated inside `range`, keeping only
    /// `bands` (native names). A scene missing one of them is an error.
    fn load(&self, collection: &str, bands: &[&str], range: &DateRange) -> Result<ImageCollection>;
}

pub(crate) fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Find all scenes of a collection directory.
pub fn scan_collection(dir: &Path) -> Result<Vec<SceneFiles>> {
    let name_re = Regex::new(r"^(\d{4}-\d{2}-\d{2})_(.+)\.tiff?$")?;
    let collection = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("collection")
        .to_string();

    let mut scenes: HashMap<String, SceneFiles> = HashMap::new();
    let mut band_dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    band_dirs.sort();

    for band_dir in band_dirs {
        let band = match band_dir.file_name().and_then(|n| n.to_str()) {
            Some(b) => b.to_string(),
            None => continue,
        };
        let pattern = band_dir.join("*.tif*").to_string_lossy().to_string();
        debug!("Searching in {}: {}", band, pattern);

        for entry in glob(&pattern)? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("Bad path from glob: {:?}", e);
                    continue;
                }
            };
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(f) => f.to_string(),
                None => continue,
            };
            let caps = match name_re.captures(&filename) {
                Some(c) => c,
                None => {
                    warn!("Filename does not match expected pattern: {}", filename);
                    continue;
                }
            };
            let date = match NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
                Ok(d) => d,
                Err(e) => {
                    warn!("Failed to parse date from {}: {}", filename, e);
                    continue;
                }
            };
            let stem = format!("{}_{}", &caps[1], &caps[2]);
            scenes
                .entry(stem.clone())
                .or_insert_with(|| SceneFiles {
                    id: format!("{}/{}", collection, stem),
                    date,
                    bands: BTreeMap::new(),
                })
                .bands
                .insert(band.clone(), path);
        }
    }

    let mut scenes: Vec<SceneFiles> = scenes.into_values().collect();
    scenes.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    Ok(scenes)
}

/// Decode the requested bands of one scene onto the grid of the first band.
pub fn load_scene(scene: &SceneFiles, bands: &[&str]) -> Result<Image> {
    let mut image: Option<Image> = None;
    for band in bands {
        let path = scene
            .bands
            .get(*band)
            .ok_or_else(|| PipelineError::missing_band(&scene.id, *band))?;
        let raster = read_geotiff_safe(path)?;
        let target = image
            .get_or_insert_with(|| Image::new(&scene.id, scene.date, raster.grid.clone()));
        let data = raster.band.resample_nearest(&raster.grid, target.grid())?;
        target.insert_band(*band, data)?;
    }
    image.ok_or_else(|| PipelineError::config(format!("no bands requested for scene {}", scene.id)))
}

/// Archive rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectorySource { root: root.into() }
    }
}

impl SceneSource for DirectorySource {
    fn load(&self, collection: &str, bands: &[&str], range: &DateRange) -> Result<ImageCollection> {
        let dir = self.root.join(collection);
        if !dir.is_dir() {
            warn!("Collection directory {:?} not found; treating as empty", dir);
            return Ok(ImageCollection::new(collection));
        }

        let scenes: Vec<SceneFiles> = scan_collection(&dir)?
            .into_iter()
            .filter(|s| range.contains(s.date))
            .collect();
        info!("Found {} {} scenes in date range", scenes.len(), collection);

        let pb = ProgressBar::new(scenes.len() as u64);
        pb.set_style(progress_style());
        pb.set_message(format!("Loading {}...", collection));

        let images = scenes
            .par_iter()
            .map(|scene| {
                let image = load_scene(scene, bands);
                pb.inc(1);
                image
            })
            .collect::<Result<Vec<_>>>()?;

        pb.finish_with_message(format!("Loaded {} {} scenes", images.len(), collection));
        Ok(ImageCollection::from_images(collection, images))
    }
}

/// Archive held in memory, keyed by collection name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    collections: HashMap<String, ImageCollection>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: ImageCollection) {
        self.collections.insert(collection.name().to_string(), collection);
    }
}

impl SceneSource for MemorySource {
    fn load(&self, collection: &str, bands: &[&str], range: &DateRange) -> Result<ImageCollection> {
        match self.collections.get(collection) {
            Some(c) => c.clone().filter_date(range).select(bands),
            None => Ok(ImageCollection::new(collection)),
        }
    }
}
