use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use env_logger::{Builder, Env};
use log::info;
use rayon::ThreadPoolBuilder;
use structopt::StructOpt;

use casa_ncei::export::ExportFormat;
use casa_ncei::io::DirectorySource;
use casa_ncei::PipelineConfig;

#[derive(Debug, StructOpt)]
#[structopt(name = "ncei_stack", about = "Estimate annual NPP and NCEI for a study region")]
struct Opt {
    /// Archive root holding one directory per collection (landsat8/,
    /// sentinel2/, terraclimate/, stress/, landcover/, ...)
    #[structopt(short = "i", long = "input-dir", parse(from_os_str))]
    input_dir: PathBuf,

    /// Output directory (where NPP/NCEI rasters will go)
    #[structopt(short = "o", long = "output-dir", parse(from_os_str))]
    output_dir: PathBuf,

    /// YAML run configuration
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: PathBuf,

    /// Override the study year from the configuration
    #[structopt(short = "y", long = "year")]
    year: Option<i32>,

    /// Number of parallel processes to use
    #[structopt(short = "p", long = "parallel", default_value = "8")]
    parallel: usize,

    /// Output format: geotiff or npy
    #[structopt(long = "format")]
    format: Option<ExportFormat>,
}

fn main() -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    let opt = Opt::from_args();

    info!("Starting ncei_stack with {} parallel processes...", opt.parallel);
    info!("Input dir: {:?}", opt.input_dir);
    info!("Output dir: {:?}", opt.output_dir);

    let mut config = PipelineConfig::from_file(&opt.config)
        .with_context(|| format!("loading configuration {:?}", opt.config))?;
    if let Some(year) = opt.year {
        config.year = year;
    }
    if let Some(format) = opt.format {
        config.export.format = format;
    }
    config.validate()?;
    info!("Study year: {}, join policy: {:?}", config.year, config.join);

    ThreadPoolBuilder::new().num_threads(opt.parallel).build_global()?;
    info!("Initialized thread pool with {} threads", opt.parallel);

    fs::create_dir_all(&opt.output_dir)?;

    let source = DirectorySource::new(&opt.input_dir);
    let outputs = casa_ncei::run(&source, &config, &opt.output_dir)?;
    info!("NPP: {:?}", outputs.npp);
    info!("NCEI: {:?}", outputs.ncei);
    Ok(())
}
