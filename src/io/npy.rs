//! NPY output for products.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::raster::Band;

/// Trait for numpy dtype
pub trait NpyDtype: Copy {
    fn npy_dtype() -> &'static str;
    fn write_le<W: Write>(self, w: &mut W) -> std::io::Result<()>;
}

impl NpyDtype for f32 {
    fn npy_dtype() -> &'static str {
        "<f4"
    }

    fn write_le<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.to_le_bytes())
    }
}

impl NpyDtype for u8 {
    fn npy_dtype() -> &'static str {
        "|u1"
    }

    fn write_le<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&[self])
    }
}

/// NPY v1.0 header for a C-ordered array, padded to 16 bytes.
fn npy_header<T: NpyDtype>(shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let header_dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        T::npy_dtype(),
        shape_str
    );

    // magic (6) + version (2) + length (2) + dict + newline
    let unpadded = 10 + header_dict.len() + 1;
    let pad = (16 - unpadded % 16) % 16;
    let final_header = format!("{}{}\n", header_dict, " ".repeat(pad));

    let mut out = Vec::with_capacity(10 + final_header.len());
    out.extend_from_slice(b"\x93NUMPY");
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(final_header.len() as u16).to_le_bytes());
    out.extend_from_slice(final_header.as_bytes());
    out
}

/// Write an array all at once.
pub fn write_npy<T: NpyDtype>(path: &Path, shape: &[usize], data: &[T]) -> Result<()> {
    let expected_len: usize = shape.iter().product();
    if data.len() != expected_len {
        return Err(PipelineError::config(format!(
            "data length mismatch: got {}, expected {} for shape {:?}",
            data.len(),
            expected_len,
            shape
        )));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    writer.write_all(&npy_header::<T>(shape))?;
    for &v in data {
        v.write_le(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a band as `<stem>.npy` (values, masked pixels NaN) and
/// `<stem>_mask.npy` (1 = valid).
pub fn write_band_npy(dir: &Path, stem: &str, band: &Band) -> Result<()> {
    let (rows, cols) = band.dim();
    let values: Vec<f32> = band
        .values()
        .iter()
        .zip(band.valid().iter())
        .map(|(&v, &ok)| if ok { v } else { f32::NAN })
        .collect();
    let mask: Vec<u8> = band.valid().iter().map(|&ok| ok as u8).collect();

    write_npy(&dir.join(format!("{}.npy", stem)), &[rows, cols], &values)?;
    write_npy(&dir.join(format!("{}_mask.npy", stem)), &[rows, cols], &mask)?;
    Ok(())
}
