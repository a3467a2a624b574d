//! cube-tools - IFU data cubes, spectra and images
//!
//! Containers for integral-field spectroscopy data that keep a data array
//! together with its uncertainty, mask, unit, world coordinates and
//! metadata:
//!
//! - [`CubeData`]: `(wavelength, y, x)` cubes, sliced into spectra and
//!   collapsed into spectra or images
//! - [`SpectrumData`]: spectra with a dispersion axis derived from the
//!   coordinates
//! - [`ImageData`]: 2-D images with linear coordinate axes
//!
//! All three support unit-aware arithmetic through [`NdContainer`] and can be
//! exported to FITS.

pub mod arithmetic;
pub mod config;
pub mod cube;
pub mod error;
pub mod image;
pub mod io;
pub mod nddata;
pub mod reduce;
pub mod spectrum;
pub mod uncertainty;
pub mod units;
pub mod wcs;

pub use arithmetic::{Operand, Operation};
pub use config::{Config, ConfigError, LogLevel};
pub use cube::CubeData;
pub use error::{CubeError, Result};
pub use image::ImageData;
pub use io::{CubeReader, Dataset, ReaderRegistry, read_cube_file};
pub use nddata::{Meta, NdContainer, NdData};
pub use reduce::ReductionMethod;
pub use spectrum::SpectrumData;
pub use uncertainty::{Uncertainty, UncertaintyKind};
pub use units::{Quantity, Unit};
pub use wcs::{Wcs, WcsAxis};
