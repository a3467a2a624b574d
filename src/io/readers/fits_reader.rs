//! Reader for IFU cubes stored as FITS files.
//!
//! Layout (as written by [`crate::io::export`] and by MaNGA-style pipelines):
//! - primary HDU with the coordinate keywords,
//! - a 3-D `DATA` (or `FLUX`) image extension,
//! - optional `IVAR` (inverse variance) and `MASK` (non-zero = excluded)
//!   extensions of the same shape.
//!
//! The names of the consumed extensions are recorded in `meta["hdu_ids"]`
//! so that a generic loader can skip them.

use std::sync::Arc;

use serde_json::Value;

use crate::cube::CubeData;
use crate::error::{CubeError, Result};
use crate::io::fits::{FitsFile, Hdu};
use crate::io::registry::CubeReader;
use crate::nddata::{Meta, NdData};
use crate::uncertainty::Uncertainty;
use crate::units::Unit;
use crate::wcs::Wcs;

/// Extension names searched, in order, for the flux cube.
const DATA_NAMES: &[&str] = &["DATA", "FLUX"];

pub struct FitsCubeReader;

impl FitsCubeReader {
    /// The flux HDU: a named extension, or a 3-D primary array.
    fn find_data(fits: &FitsFile) -> Option<(usize, &Hdu)> {
        DATA_NAMES
            .iter()
            .find_map(|name| fits.get_by_name(name))
            .or_else(|| {
                fits.primary()
                    .filter(|h| h.data.shape().is_some_and(|s| s.len() == 3))
                    .map(|h| (0, h))
            })
    }
}

impl CubeReader for FitsCubeReader {
    fn id(&self) -> &'static str {
        "fits"
    }

    fn display_name(&self) -> &'static str {
        "FITS cube (.fits)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["fits", "fit", "fts"]
    }

    fn can_read(&self, data: &[u8]) -> bool {
        FitsFile::is_fits(data)
    }

    fn read(&self, data: &[u8]) -> Result<CubeData> {
        let fits = FitsFile::from_bytes(data)?;

        let (data_index, data_hdu) = Self::find_data(&fits)
            .ok_or_else(|| CubeError::io("<bytes>", "no DATA or FLUX extension"))?;
        let flux = data_hdu
            .data
            .to_f64()
            .filter(|a| a.ndim() == 3)
            .ok_or_else(|| CubeError::io("<bytes>", "flux extension is not 3-dimensional"))?;

        let mut hdu_ids = vec![data_hdu.label(data_index)];

        let uncertainty = fits.get_by_name("IVAR").and_then(|(index, hdu)| {
            hdu_ids.push(hdu.label(index));
            hdu.data.to_f64().map(Uncertainty::inverse_variance)
        });
        let mask = fits.get_by_name("MASK").and_then(|(index, hdu)| {
            hdu_ids.push(hdu.label(index));
            hdu.data.to_f64().map(|m| m.mapv(|v| v != 0.0))
        });

        let primary = fits.primary();
        let wcs = primary
            .and_then(|h| Wcs::from_header(&h.header))
            .or_else(|| Wcs::from_header(&data_hdu.header));
        let unit = data_hdu
            .header
            .get_str("BUNIT")
            .or_else(|| primary.and_then(|h| h.header.get_str("BUNIT")))
            .map(|s| Unit::parse(s.trim()));

        let mut meta = Meta::new();
        meta.insert("reader".to_string(), Value::from(self.id()));
        meta.insert(
            "hdu_ids".to_string(),
            Value::Array(hdu_ids.into_iter().map(Value::from).collect()),
        );
        if let Some(primary) = primary {
            meta.insert(
                "header".to_string(),
                Value::Object(primary.header.to_json_map()),
            );
        }

        log::info!(
            "Read FITS cube {:?} (uncertainty: {}, mask: {}, wcs: {})",
            flux.shape(),
            uncertainty.is_some(),
            mask.is_some(),
            wcs.is_some()
        );

        let nddata = NdData::builder(flux)
            .uncertainty(uncertainty)
            .mask(mask)
            .unit(unit)
            .wcs(wcs.map(Arc::new))
            .meta(Arc::new(meta))
            .build()?;
        CubeData::new(nddata)
    }

    fn priority(&self) -> i32 {
        10
    }
}
