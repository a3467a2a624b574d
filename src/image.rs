//! Two-dimensional images with linear coordinate axes.

use ndarray::{Array1, ArrayD, Ix1};

use crate::error::{CubeError, Result};
use crate::nddata::{NdContainer, NdData};
use crate::units::{Quantity, Unit};

/// A 2-D container. When a coordinate mapping is present, its first two
/// axes give linear dispersion (array axis 0) and cross-dispersion (array
/// axis 1) coordinates.
#[derive(Debug, Clone)]
pub struct ImageData {
    nddata: NdData,
    dispersion: Option<Quantity<Ix1>>,
    cross_dispersion: Option<Quantity<Ix1>>,
    source_mask: Option<ArrayD<bool>>,
}

impl ImageData {
    pub fn new(nddata: NdData) -> Result<Self> {
        if nddata.ndim() != 2 {
            return Err(CubeError::data(format!(
                "image data must be 2-dimensional, got shape {:?}",
                nddata.shape()
            )));
        }

        let (dispersion, cross_dispersion) = match nddata.wcs() {
            Some(wcs) => {
                let first = wcs
                    .axis(0)
                    .ok_or_else(|| CubeError::missing("first coordinate axis", "image axes"))?;
                let second = wcs
                    .axis(1)
                    .ok_or_else(|| CubeError::missing("second coordinate axis", "image axes"))?;
                let shape = nddata.shape();
                (
                    Some(Quantity::new(first.linear_samples(shape[0]), Some(first.unit()))),
                    Some(Quantity::new(
                        second.linear_samples(shape[1]),
                        Some(second.unit()),
                    )),
                )
            }
            None => (None, None),
        };

        Ok(Self {
            nddata,
            dispersion,
            cross_dispersion,
            source_mask: None,
        })
    }

    /// Attach the unreduced mask of the container this image was collapsed from.
    pub(crate) fn with_source_mask(mut self, mask: Option<ArrayD<bool>>) -> Self {
        self.source_mask = mask;
        self
    }

    /// Mask of the cube this image was collapsed from, in the cube's shape.
    pub fn source_mask(&self) -> Option<&ArrayD<bool>> {
        self.source_mask.as_ref()
    }

    /// Element at `index`, or `None` when out of bounds.
    pub fn get(&self, index: [usize; 2]) -> Option<f64> {
        self.nddata.get(&index)
    }

    /// Copy of the data tagged with its unit.
    pub fn quantity(&self) -> Quantity {
        self.nddata.quantity()
    }

    /// Copy of the data flattened in row-major order.
    pub fn ravel(&self) -> Array1<f64> {
        self.nddata.data().iter().copied().collect()
    }

    /// Coordinates along array axis 0, converted to `unit` when one is given.
    ///
    /// Fails with [`CubeError::MissingDependency`] for an image built
    /// without coordinates.
    pub fn get_dispersion(&self, unit: Option<&Unit>) -> Result<Quantity<Ix1>> {
        axis_in(self.dispersion.as_ref(), unit, "get_dispersion")
    }

    /// Coordinates along array axis 1, converted to `unit` when one is given.
    pub fn get_cross_dispersion(&self, unit: Option<&Unit>) -> Result<Quantity<Ix1>> {
        axis_in(self.cross_dispersion.as_ref(), unit, "get_cross_dispersion")
    }
}

fn axis_in(axis: Option<&Quantity<Ix1>>, unit: Option<&Unit>, operation: &str) -> Result<Quantity<Ix1>> {
    let axis = axis.ok_or_else(|| CubeError::missing("coordinates", operation))?;
    match unit {
        Some(unit) => axis.to(unit),
        None => Ok(axis.clone()),
    }
}

impl NdContainer for ImageData {
    fn nddata(&self) -> &NdData {
        &self.nddata
    }

    fn from_nddata(nddata: NdData) -> Result<Self> {
        Self::new(nddata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wcs::{Wcs, WcsAxis};
    use ndarray::{Array, IxDyn, array};
    use std::sync::Arc;

    fn image() -> ImageData {
        let wcs = Wcs::new(vec![
            WcsAxis::new(1.0, 10.0, 2.0).with_unit("arcsec"),
            WcsAxis::new(1.0, -1.0, 0.5).with_unit("deg"),
        ]);
        let nd = NdData::builder(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn())
            .wcs(Arc::new(wcs))
            .build()
            .unwrap();
        ImageData::new(nd).unwrap()
    }

    #[test]
    fn test_axes() {
        let image = image();
        let dispersion = image.get_dispersion(None).unwrap();
        assert_eq!(dispersion.value(), &array![10.0, 12.0]);
        let cross = image.get_cross_dispersion(None).unwrap();
        assert_eq!(cross.value(), &array![-1.0, -0.5, 0.0]);

        let in_deg = image.get_dispersion(Some(&Unit::parse("deg"))).unwrap();
        assert!((in_deg.value()[0] - 10.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn test_ravel_is_a_copy() {
        let image = image();
        let mut flat = image.ravel();
        assert_eq!(flat, array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        flat[0] = 100.0;
        assert_eq!(image.get([0, 0]), Some(1.0));
    }

    #[test]
    fn test_requires_two_dimensions() {
        let err = ImageData::new(NdData::new(Array::zeros(IxDyn(&[2, 2, 2])))).unwrap_err();
        assert!(matches!(err, CubeError::Data { .. }));
    }

    #[test]
    fn test_axes_without_wcs() {
        let image = ImageData::new(NdData::new(Array::zeros(IxDyn(&[2, 2])))).unwrap();
        assert!(matches!(
            image.get_dispersion(None),
            Err(CubeError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_arithmetic_keeps_kind() {
        let image = image();
        let doubled = image.multiply(2.0).unwrap();
        assert_eq!(doubled.get([1, 2]), Some(12.0));
        assert_eq!(doubled.get_dispersion(None).unwrap().len(), 2);
    }
}
