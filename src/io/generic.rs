//! Whole-file loading: the cube plus every other image extension.
//!
//! After a cube has been read, the extensions it consumed (recorded in its
//! `meta["hdu_ids"]`) are skipped and the remaining image HDUs are grouped
//! by shape. Each group is labelled `<file stem>[<d0>x<d1>...]`. Table HDUs
//! are not loaded.

use std::path::Path;

use ndarray::ArrayD;
use serde_json::Value;

use crate::cube::CubeData;
use crate::error::{CubeError, Result};
use crate::io::fits::FitsFile;
use crate::io::registry::ReaderRegistry;
use crate::nddata::{Meta, NdContainer};
use crate::wcs::Wcs;

/// An extension identifier to skip: its name or its index in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionId {
    Name(String),
    Index(usize),
}

impl ExtensionId {
    /// Identifiers listed under `hdu_ids` in a container's metadata.
    pub fn from_meta(meta: &Meta) -> Vec<ExtensionId> {
        let Some(Value::Array(ids)) = meta.get("hdu_ids") else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| match id {
                Value::String(name) => Some(ExtensionId::Name(name.clone())),
                Value::Number(n) => n.as_u64().map(|i| ExtensionId::Index(i as usize)),
                _ => None,
            })
            .collect()
    }

    fn matches(&self, name: &str, index: usize) -> bool {
        match self {
            ExtensionId::Name(n) => n == name,
            ExtensionId::Index(i) => *i == index,
        }
    }
}

/// Image extensions of one shape.
#[derive(Debug, Clone)]
pub struct ImageGroup {
    pub label: String,
    pub shape: Vec<usize>,
    /// Coordinates from the header of the first extension in the group
    pub wcs: Option<Wcs>,
    /// `(extension label, data)` in file order
    pub components: Vec<(String, ArrayD<f64>)>,
}

/// One item loaded from a file.
#[derive(Debug, Clone)]
pub enum Dataset {
    Cube(CubeData),
    Images(ImageGroup),
}

/// Group the image HDUs of `fits` by shape, skipping those in `exclude`.
pub fn load_image_extensions(
    fits: &FitsFile,
    label_base: &str,
    exclude: &[ExtensionId],
) -> Vec<ImageGroup> {
    let mut groups: Vec<ImageGroup> = Vec::new();

    for (index, hdu) in fits.hdus().iter().enumerate() {
        if !hdu.is_image() {
            log::trace!("Skipping non-image HDU {index}");
            continue;
        }
        let name = hdu.label(index);
        if exclude.iter().any(|id| id.matches(&name, index)) {
            continue;
        }
        let Some(data) = hdu.data.to_f64() else {
            continue;
        };

        let shape = data.shape().to_vec();
        match groups.iter_mut().find(|g| g.shape == shape) {
            Some(group) => group.components.push((name, data)),
            None => {
                let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
                groups.push(ImageGroup {
                    label: format!("{label_base}[{}]", dims.join("x")),
                    shape,
                    wcs: Wcs::from_header(&hdu.header),
                    components: vec![(name, data)],
                });
            }
        }
    }
    groups
}

/// File name without its last extension, or the whole name if that is empty.
fn label_base(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Load a file: its cube (if any reader finds one) followed by the image
/// groups of the remaining FITS extensions.
///
/// A file without a readable cube is not an error; a warning is logged and
/// only the image groups are returned.
pub fn read_cube_file(registry: &ReaderRegistry, path: &Path) -> Result<Vec<Dataset>> {
    let bytes = std::fs::read(path)?;
    let filename = path.file_name().map(|n| n.to_string_lossy());

    let mut datasets = Vec::new();
    let mut exclude = Vec::new();
    match CubeData::read(registry, &bytes, filename.as_deref()) {
        Ok(cube) => {
            exclude = ExtensionId::from_meta(cube.nddata().meta());
            datasets.push(Dataset::Cube(cube));
        }
        Err(e @ CubeError::Io { .. }) => {
            log::warn!("No CubeData found in {:?}: {}", path, e);
        }
        Err(e) => return Err(e),
    }

    if FitsFile::is_fits(&bytes) {
        let fits = FitsFile::open(path)?;
        datasets.extend(
            load_image_extensions(&fits, &label_base(path), &exclude)
                .into_iter()
                .map(Dataset::Images),
        );
    }

    log::debug!("Loaded {} datasets from {:?}", datasets.len(), path);
    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fits::{Hdu, HduData};
    use ndarray::{ArrayD, IxDyn};

    fn image(name: &str, shape: &[usize]) -> Hdu {
        Hdu::image(name, HduData::F64(ArrayD::zeros(IxDyn(shape))))
    }

    #[test]
    fn test_groups_by_shape() {
        let fits = FitsFile::new(vec![
            Hdu::primary([]),
            image("DATA", &[3, 2, 2]),
            image("A", &[4, 5]),
            image("B", &[4, 5]),
            image("C", &[7]),
        ]);
        let exclude = vec![ExtensionId::Name("DATA".to_string())];
        let groups = load_image_extensions(&fits, "cube", &exclude);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "cube[4x5]");
        let names: Vec<_> = groups[0].components.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(groups[1].label, "cube[7]");
    }

    #[test]
    fn test_exclude_by_index() {
        let fits = FitsFile::new(vec![Hdu::primary([]), image("A", &[2]), image("B", &[3])]);
        let groups = load_image_extensions(&fits, "f", &[ExtensionId::Index(1)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].components[0].0, "B");
    }

    #[test]
    fn test_ids_from_meta() {
        let mut meta = Meta::new();
        meta.insert("hdu_ids".to_string(), serde_json::json!(["FLUX", 3]));
        assert_eq!(
            ExtensionId::from_meta(&meta),
            vec![ExtensionId::Name("FLUX".to_string()), ExtensionId::Index(3)]
        );
        assert!(ExtensionId::from_meta(&Meta::new()).is_empty());
    }

    #[test]
    fn test_label_base() {
        assert_eq!(label_base(Path::new("/data/manga.cube.fits")), "manga.cube");
        assert_eq!(label_base(Path::new("noext")), "noext");
        assert_eq!(label_base(Path::new(".hidden")), ".hidden");
    }
}
