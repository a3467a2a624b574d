//! Reading and writing cubes.
//!
//! - [`fits`]: in-memory FITS model, read and written through `fitsio`
//! - [`registry`] and [`readers`]: decoding cubes from bytes
//! - [`generic`]: whole-file loading, including leftover image extensions
//! - [`export`]: writing containers back to FITS

pub mod export;
pub mod fits;
pub mod generic;
pub mod readers;
pub mod registry;

pub use generic::{Dataset, ImageGroup, load_image_extensions, read_cube_file};
pub use readers::{FitsCubeReader, NpyCubeReader};
pub use registry::{CubeReader, ReaderRegistry};
