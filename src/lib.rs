//! CASA net primary productivity (NPP) and net carbon emission intensity
//! (NCEI) from Landsat and Sentinel-2 reflectance archives.
//!
//! The run is a fixed pipeline: harmonize reflectance, preprocess climate,
//! derive land-cover parameters, compute FPAR, estimate NPP/NCEI per date and
//! export the temporal means. See [`pipeline::run`].

pub mod climate;
pub mod config;
pub mod error;
pub mod export;
pub mod harmonize;
pub mod indices;
pub mod io;
pub mod join;
pub mod landcover;
pub mod npp;
pub mod pipeline;
pub mod raster;

pub use config::PipelineConfig;
pub use error::{ExportError, PipelineError, Result};
pub use pipeline::{run, RunOutputs};
