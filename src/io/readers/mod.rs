//! Built-in cube readers.

mod fits_reader;
mod npy_reader;

pub use fits_reader::FitsCubeReader;
pub use npy_reader::NpyCubeReader;
