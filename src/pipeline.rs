//! End-to-end NPP/NCEI run for one region and year.

use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::ProgressBar;
use log::info;

use crate::climate;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::export::{valid_fraction, Exporter, ProcessingInfo};
use crate::harmonize::harmonize;
use crate::io::scan::progress_style;
use crate::io::SceneSource;
use crate::landcover::{derive_parameters, load_classes};
use crate::npp::{load_stress, Estimator, NCEI, NPP};

/// Files written by a run.
#[derive(Debug, Clone)]
pub struct RunOutputs {
    pub npp: PathBuf,
    pub ncei: PathBuf,
    pub info: PathBuf,
    pub summary: ProcessingInfo,
}

const STAGES: u64 = 6;

pub fn run<S>(source: &S, config: &PipelineConfig, out_dir: &Path) -> Result<RunOutputs>
where
    S: SceneSource + ?Sized,
{
    let start_time = Instant::now();
    config.validate()?;

    // analysis and export share one grid
    let exporter = Exporter::new(out_dir, config.export.clone(), &config.region)?;
    let grid = exporter.grid().clone();
    info!(
        "Analysis grid: {} x {} pixels at {} ({})",
        grid.width, grid.height, config.export.scale, grid.crs
    );

    let pb = ProgressBar::new(STAGES);
    pb.set_style(progress_style());

    pb.set_message("Land cover");
    let classes = load_classes(source, config, &grid)?;
    let params = derive_parameters(&classes, config.unmapped_classes);
    pb.inc(1);

    pb.set_message("Harmonizing reflectance");
    let (reflectance, harmonized) = harmonize(source, config, &grid)?;
    pb.inc(1);

    pb.set_message("Climate");
    let climate = climate::preprocess(source, config, &grid)?;
    pb.inc(1);

    pb.set_message("Stress coefficients");
    let stress = load_stress(source, config, &grid)?;
    pb.inc(1);

    pb.set_message("NPP / NCEI");
    let estimator = Estimator::new(&params, &climate, &stress, config.join)?;
    let products = estimator.estimate(&reflectance)?;
    pb.inc(1);

    pb.set_message("Exporting");
    let (npp_path, npp_mean) = exporter.export_mean(&products, NPP)?;
    let (ncei_path, ncei_mean) = exporter.export_mean(&products, NCEI)?;
    pb.inc(1);
    pb.finish_with_message("Done");

    let summary = ProcessingInfo {
        year: config.year,
        scenes: harmonized
            .scenes
            .iter()
            .map(|(sensor, count)| (sensor.to_string(), *count))
            .collect(),
        harmonized_images: reflectance.len(),
        fully_masked_images: harmonized.fully_masked,
        climate_images: climate.len(),
        stress_images: stress.len(),
        products: vec![
            (NPP.to_string(), valid_fraction(&npp_mean)),
            (NCEI.to_string(), valid_fraction(&ncei_mean)),
        ],
        elapsed_secs: start_time.elapsed().as_secs_f64(),
    };
    let info_path = summary.write(out_dir)?;

    info!("All done! Processing completed in {:.2} seconds", summary.elapsed_secs);
    info!("Output in {:?}", out_dir);
    Ok(RunOutputs {
        npp: npp_path,
        ncei: ncei_path,
        info: info_path,
        summary,
    })
}
