//! Single-band GeoTIFF decoding and encoding.
//!
//! Only the tags needed to place a north-up grid are understood: pixel scale,
//! one tiepoint, the EPSG code from the GeoKey directory and GDAL's nodata
//! string.

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::panic::AssertUnwindSafe;
use std::path::Path;

use memmap2::MmapOptions;
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::error::{PipelineError, Result};
use crate::raster::{Band, GeoTransform, GridSpec};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

/// Nodata value written for masked pixels.
pub const NODATA: f32 = -9999.0;

/// A decoded band together with its grid.
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub grid: GridSpec,
    pub band: Band,
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a GeoTIFF through a memory map. Nodata pixels come back masked.
pub fn read_geotiff(path: &Path) -> Result<GeoRaster> {
    let file = File::open(path)?;
    let mmap = unsafe { MmapOptions::new().map(&file) }?;
    let cursor = Cursor::new(&mmap);
    let mut decoder = Decoder::new(cursor)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let grid = read_grid(&mut decoder, path, width as usize, height as usize)?;
    let nodata = match decoder.find_tag(tag(GDAL_NODATA))? {
        Some(value) => value.into_string()?.trim_matches(char::from(0)).trim().parse::<f32>().ok(),
        None => None,
    };

    let data: Vec<f32> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return Err(PipelineError::decode(path, "unsupported sample format")),
    };

    let expected_len = width as usize * height as usize;
    if data.len() != expected_len {
        return Err(PipelineError::decode(
            path,
            format!("data length mismatch: got {}, expected {}", data.len(), expected_len),
        ));
    }

    let mut values = Array2::from_shape_vec(grid.dim(), data)
        .map_err(|e| PipelineError::decode(path, e.to_string()))?;
    if let Some(nd) = nodata {
        values.mapv_inplace(|v| if v == nd { f32::NAN } else { v });
    }

    Ok(GeoRaster {
        grid,
        band: Band::new(values),
    })
}

/// [`read_geotiff`] with decoder panics turned into errors.
pub fn read_geotiff_safe(path: &Path) -> Result<GeoRaster> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| read_geotiff(path))) {
        Ok(result) => result,
        Err(_) => Err(PipelineError::decode(path, "decoder panicked")),
    }
}

fn read_grid<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
    width: usize,
    height: usize,
) -> Result<GridSpec> {
    let scale = decoder.find_tag(tag(MODEL_PIXEL_SCALE))?;
    let tiepoint = decoder.find_tag(tag(MODEL_TIEPOINT))?;
    let (scale, tiepoint) = match (scale, tiepoint) {
        (Some(s), Some(t)) => (s.into_f64_vec()?, t.into_f64_vec()?),
        _ => return Err(PipelineError::MissingGeoreference(path.to_path_buf())),
    };
    if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
        return Err(PipelineError::MissingGeoreference(path.to_path_buf()));
    }

    let crs = match decoder.find_tag(tag(GEO_KEY_DIRECTORY))? {
        Some(keys) => epsg_from_geokeys(&keys.into_u32_vec()?),
        None => None,
    }
    .map(|code| format!("EPSG:{}", code))
    .unwrap_or_else(|| "EPSG:4326".to_string());

    // tiepoint: raster (i, j, k) -> model (x, y, z)
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Ok(GridSpec::new(
        width,
        height,
        GeoTransform::new(origin_x, origin_y, scale[0], scale[1]),
        crs,
    ))
}

fn epsg_from_geokeys(keys: &[u32]) -> Option<u32> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|entry| {
            let key = entry[0];
            (key == PROJECTED_CS_TYPE as u32 || key == GEOGRAPHIC_TYPE as u32) && entry[1] == 0
        })
        .map(|entry| entry[3])
}

fn epsg_code(crs: &str) -> Result<u16> {
    crs.strip_prefix("EPSG:")
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            PipelineError::config(format!("unsupported CRS '{}', expected EPSG:<code>", crs))
        })
}

fn geo_keys(crs: &str) -> Result<Vec<u16>> {
    let code = epsg_code(crs)?;
    let geographic = (4000..5000).contains(&code);
    let (model_type, crs_key) = if geographic {
        (2, GEOGRAPHIC_TYPE)
    } else {
        (1, PROJECTED_CS_TYPE)
    };
    // header, then (key, location, count, value) entries
    #[rustfmt::skip]
    let keys = vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, 1,
        crs_key, 0, 1, code,
    ];
    Ok(keys)
}

/// Write one band of samples with georeferencing tags.
pub fn write_geotiff<C>(
    path: &Path,
    grid: &GridSpec,
    data: &[C::Inner],
    nodata: Option<f32>,
) -> Result<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let keys = geo_keys(&grid.crs)?;
    let t = &grid.transform;
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];

    let file = File::create(path)?;
    let mut tiff = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = tiff.new_image::<C>(grid.width as u32, grid.height as u32)?;
    image.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
    image.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
    image.encoder().write_tag(tag(GEO_KEY_DIRECTORY), &keys[..])?;
    if let Some(nd) = nodata {
        let text = nd.to_string();
        image.encoder().write_tag(tag(GDAL_NODATA), text.as_str())?;
    }
    image.write_data(data)?;
    Ok(())
}

/// Write a band as 32-bit float with masked pixels set to [`NODATA`].
pub fn write_band(path: &Path, grid: &GridSpec, band: &Band) -> Result<()> {
    let data: Vec<f32> = band
        .values()
        .iter()
        .zip(band.valid().iter())
        .map(|(&v, &ok)| if ok { v } else { NODATA })
        .collect();
    write_geotiff::<colortype::Gray32Float>(path, grid, &data, Some(NODATA))
}
