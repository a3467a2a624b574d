//! Reader for bare cubes stored as NumPy `.npy` arrays.
//!
//! The array must be 3-D in `(wavelength, y, x)` order with an `f64` or
//! `f32` dtype. No uncertainty, mask, unit or coordinates are attached.

use std::io::Cursor;
use std::sync::Arc;

use ndarray::ArrayD;
use ndarray_npy::ReadNpyExt;
use serde_json::Value;

use crate::cube::CubeData;
use crate::error::{CubeError, Result};
use crate::io::registry::CubeReader;
use crate::nddata::{Meta, NdData};

pub struct NpyCubeReader;

impl NpyCubeReader {
    /// NumPy magic bytes: \x93NUMPY
    const MAGIC: &'static [u8] = &[0x93, b'N', b'U', b'M', b'P', b'Y'];

    fn decode(data: &[u8]) -> Result<ArrayD<f64>> {
        let mut cursor = Cursor::new(data);
        match ArrayD::<f64>::read_npy(&mut cursor) {
            Ok(array) => Ok(array),
            Err(e) => {
                log::trace!("Not an f64 array ({e}), trying f32");
                cursor.set_position(0);
                Ok(ArrayD::<f32>::read_npy(&mut cursor)?.mapv(f64::from))
            }
        }
    }
}

impl CubeReader for NpyCubeReader {
    fn id(&self) -> &'static str {
        "npy"
    }

    fn display_name(&self) -> &'static str {
        "NumPy Array (.npy)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["npy"]
    }

    fn can_read(&self, data: &[u8]) -> bool {
        data.starts_with(Self::MAGIC)
    }

    fn read(&self, data: &[u8]) -> Result<CubeData> {
        let array = Self::decode(data)?;
        if array.ndim() != 3 {
            return Err(CubeError::io(
                "<bytes>",
                format!("unsupported array dimensions: {} (expected 3)", array.ndim()),
            ));
        }
        log::info!("Read NumPy cube {:?}", array.shape());

        let mut meta = Meta::new();
        meta.insert("reader".to_string(), Value::from(self.id()));
        CubeData::new(NdData::builder(array).meta(Arc::new(meta)).build()?)
    }

    fn priority(&self) -> i32 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nddata::NdContainer;
    use ndarray::{Array2, Array3};
    use ndarray_npy::WriteNpyExt;

    #[test]
    fn test_reader_metadata() {
        let reader = NpyCubeReader;
        assert_eq!(reader.id(), "npy");
        assert!(reader.extensions().contains(&"npy"));
        assert_eq!(reader.priority(), 5);
    }

    #[test]
    fn test_magic_detection() {
        let reader = NpyCubeReader;
        assert!(reader.can_read(&[0x93, b'N', b'U', b'M', b'P', b'Y', 0x01, 0x00]));
        assert!(!reader.can_read(b"SIMPLE  ="));
    }

    #[test]
    fn test_reads_f32_cube() {
        let array = Array3::from_shape_fn((2, 3, 4), |(w, y, x)| (w + y + x) as f32);
        let mut bytes = Vec::new();
        array.write_npy(&mut bytes).unwrap();

        let cube = NpyCubeReader.read(&bytes).unwrap();
        assert_eq!(cube.shape(), &[2, 3, 4]);
        assert_eq!(cube.get([1, 2, 3]), Some(6.0));
        assert_eq!(cube.nddata().meta()["reader"], Value::from("npy"));
    }

    #[test]
    fn test_rejects_images() {
        let array = Array2::<f64>::zeros((3, 3));
        let mut bytes = Vec::new();
        array.write_npy(&mut bytes).unwrap();
        assert!(matches!(
            NpyCubeReader.read(&bytes),
            Err(CubeError::Io { .. })
        ));
    }
}
