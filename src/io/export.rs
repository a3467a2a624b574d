//! Persisting containers as multi-extension FITS files.
//!
//! File layout: a primary HDU carrying the coordinate keywords, followed by
//! `DATA` (float64), `IVAR` (the raw uncertainty values, float64) and `MASK`
//! (int32, 1 = masked) image extensions.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{CubeError, Result};
use crate::io::fits::{FitsFile, Hdu, HduData};
use crate::nddata::NdData;

/// Suffix appended to every export path.
pub const DEFAULT_EXTENSION: &str = "fits";

/// Removes a partially written file unless [`PartialFile::keep`] is called.
struct PartialFile<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if !self.keep {
            log::warn!("Removing incomplete export {:?}", self.path);
            if let Err(e) = fs::remove_file(self.path) {
                log::error!("Failed to remove {:?}: {}", self.path, e);
            }
        }
    }
}

/// `path` with `.<extension>` appended, whatever suffix it already has.
pub fn target_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Build the FITS representation of `nd`.
///
/// Requires an uncertainty, a mask and a coordinate mapping.
pub fn to_fits(nd: &NdData) -> Result<FitsFile> {
    let uncertainty = nd
        .uncertainty()
        .ok_or_else(|| CubeError::missing("uncertainty", "export"))?;
    let mask = nd
        .mask()
        .ok_or_else(|| CubeError::missing("mask", "export"))?;
    let wcs = nd
        .wcs()
        .ok_or_else(|| CubeError::missing("coordinates", "export"))?;

    let mut data = Hdu::image("DATA", HduData::F64(nd.data().clone()));
    if let Some(unit) = nd.unit() {
        data.header.set("BUNIT", unit.symbol());
    }

    Ok(FitsFile::new(vec![
        Hdu::primary(wcs.to_header()),
        data,
        Hdu::image("IVAR", HduData::F64(uncertainty.array().clone())),
        Hdu::image("MASK", HduData::I32(mask.mapv(i32::from))),
    ]))
}

/// Write `nd` to `<path>.<extension>` and return the path written.
///
/// Never overwrites: an existing target fails with
/// [`CubeError::FileExists`]. A file left incomplete by a write error is
/// removed.
pub fn export(nd: &NdData, path: &Path, extension: &str) -> Result<PathBuf> {
    let fits = to_fits(nd)?;
    let target = target_path(path, extension);

    // Reserve the name; fitsio then writes into the empty file.
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => CubeError::FileExists {
                path: target.clone(),
            },
            _ => CubeError::from(e),
        })?;

    let guard = PartialFile::new(&target);
    fits.write(&target)?;
    guard.keep();

    log::info!("Exported {:?} to {:?}", nd.shape(), target);
    Ok(target)
}
