//! Pluggable cube readers.
//!
//! A [`ReaderRegistry`] holds every [`CubeReader`] it knows about and picks
//! one for a byte stream. New formats are added by implementing the trait
//! and calling [`ReaderRegistry::register`].
//!
//! ```rust,ignore
//! use cube_tools::io::ReaderRegistry;
//!
//! let registry = ReaderRegistry::new();
//! let cube = registry.read(&bytes, Some("manga-7443-12703-LOGCUBE.fits"))?;
//! ```

use std::path::Path;

use crate::cube::CubeData;
use crate::error::{CubeError, Result};

/// A decoder from raw bytes to a [`CubeData`].
pub trait CubeReader: Send + Sync {
    /// Unique identifier (e.g. "fits", "npy").
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn display_name(&self) -> &'static str;

    /// File extensions handled, lowercase and without dots.
    fn extensions(&self) -> &'static [&'static str];

    /// Cheap check (magic bytes) whether the data looks readable.
    fn can_read(&self, data: &[u8]) -> bool;

    /// Decode the data.
    fn read(&self, data: &[u8]) -> Result<CubeData>;

    /// Detection order; higher is tried first.
    fn priority(&self) -> i32 {
        0
    }
}

/// Ordered collection of readers.
pub struct ReaderRegistry {
    readers: Vec<Box<dyn CubeReader>>,
}

impl ReaderRegistry {
    /// Registry with the built-in FITS and NumPy readers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(super::readers::FitsCubeReader));
        registry.register(Box::new(super::readers::NpyCubeReader));
        registry
    }

    /// Registry with no readers at all.
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    pub fn register(&mut self, reader: Box<dyn CubeReader>) {
        log::trace!("Registering cube reader {}", reader.id());
        self.readers.push(reader);
        self.readers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// All handled extensions, sorted and deduplicated.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .readers
            .iter()
            .flat_map(|r| r.extensions().iter().copied())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }

    fn readers_for_extension(&self, ext: &str) -> impl Iterator<Item = &dyn CubeReader> {
        let ext = ext.to_lowercase();
        self.readers
            .iter()
            .filter(move |r| r.extensions().iter().any(|e| *e == ext))
            .map(|r| r.as_ref())
    }

    fn detect_reader(&self, data: &[u8]) -> Option<&dyn CubeReader> {
        self.readers
            .iter()
            .find(|r| r.can_read(data))
            .map(|r| r.as_ref())
    }

    /// Decode `data`, trying readers by extension of `filename`, then by
    /// magic bytes, then every reader in priority order.
    ///
    /// Fails with [`CubeError::Io`] when no reader succeeds.
    pub fn read(&self, data: &[u8], filename: Option<&str>) -> Result<CubeData> {
        let extension = filename.and_then(extension_hint);

        if let Some(ext) = extension {
            for reader in self.readers_for_extension(ext) {
                match reader.read(data) {
                    Ok(cube) => {
                        log::debug!("Read cube with {} reader (by extension)", reader.id());
                        return Ok(cube);
                    }
                    Err(e) => log::trace!("Reader {} failed: {}", reader.id(), e),
                }
            }
        }

        if let Some(reader) = self.detect_reader(data) {
            match reader.read(data) {
                Ok(cube) => {
                    log::debug!("Read cube with {} reader (by detection)", reader.id());
                    return Ok(cube);
                }
                Err(e) => log::trace!("Detected reader {} failed: {}", reader.id(), e),
            }
        }

        for reader in &self.readers {
            if let Ok(cube) = reader.read(data) {
                log::debug!("Read cube with {} reader (fallback)", reader.id());
                return Ok(cube);
            }
        }

        Err(CubeError::io(
            filename.unwrap_or("<bytes>"),
            "no registered reader could decode a cube",
        ))
    }

    /// Read a file from disk, using its name as the extension hint.
    pub fn read_path(&self, path: &Path) -> Result<CubeData> {
        let bytes = std::fs::read(path)?;
        let name = path.file_name().map(|n| n.to_string_lossy());
        self.read(&bytes, name.as_deref())
    }

    /// Whether `filename` ends in a handled extension (case-insensitive).
    pub fn is_supported_file(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.supported_extensions()
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    pub fn readers(&self) -> &[Box<dyn CubeReader>] {
        &self.readers
    }
}

/// Text after the last `.` of `filename`; `None` for a name without one.
fn extension_hint(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
