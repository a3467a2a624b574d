//! The numeric container shared by cubes, spectra and images.
//!
//! [`NdData`] binds a data array to its uncertainty, mask, unit, coordinate
//! mapping and metadata. The concrete entity types wrap one and re-expose
//! the shared capabilities through [`NdContainer`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::ArrayD;

use crate::arithmetic::{self, Operand, Operation};
use crate::error::{CubeError, Result};
use crate::io::export;
use crate::uncertainty::Uncertainty;
use crate::units::{Quantity, Unit};
use crate::wcs::Wcs;

/// Free-form metadata (provenance, consumed extension ids, header copies).
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Data array plus uncertainty, mask, unit, coordinates and metadata.
///
/// `uncertainty` and `mask`, when present, always have the shape of `data`;
/// this is checked when the container is built. `wcs` and `meta` are shared
/// by reference with containers derived from this one.
#[derive(Debug, Clone)]
pub struct NdData {
    pub(crate) data: ArrayD<f64>,
    pub(crate) uncertainty: Option<Uncertainty>,
    pub(crate) mask: Option<ArrayD<bool>>,
    pub(crate) unit: Option<Unit>,
    pub(crate) wcs: Option<Arc<Wcs>>,
    pub(crate) meta: Arc<Meta>,
}

impl NdData {
    /// Bare container around `data`.
    pub fn new(data: ArrayD<f64>) -> Self {
        Self {
            data,
            uncertainty: None,
            mask: None,
            unit: None,
            wcs: None,
            meta: Arc::new(Meta::new()),
        }
    }

    pub fn builder(data: ArrayD<f64>) -> NdDataBuilder {
        NdDataBuilder {
            inner: Self::new(data),
        }
    }

    /// Builder for a container derived from this one: `unit`, `wcs` and
    /// `meta` are inherited, everything else starts empty.
    pub fn derive(&self, data: ArrayD<f64>) -> NdDataBuilder {
        NdDataBuilder {
            inner: Self {
                data,
                uncertainty: None,
                mask: None,
                unit: self.unit.clone(),
                wcs: self.wcs.clone(),
                meta: Arc::clone(&self.meta),
            },
        }
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn uncertainty(&self) -> Option<&Uncertainty> {
        self.uncertainty.as_ref()
    }

    pub fn mask(&self) -> Option<&ArrayD<bool>> {
        self.mask.as_ref()
    }

    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    pub fn wcs(&self) -> Option<&Arc<Wcs>> {
        self.wcs.as_ref()
    }

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `index`, or `None` when out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.data.get(index).copied()
    }

    /// The data tagged with the container's unit.
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.data.clone(), self.unit.clone())
    }

    fn validate(&self) -> Result<()> {
        if let Some(uncertainty) = &self.uncertainty {
            CubeError::check_shape("uncertainty", self.shape(), uncertainty.shape())?;
        }
        if let Some(mask) = &self.mask {
            CubeError::check_shape("mask", self.shape(), mask.shape())?;
        }
        Ok(())
    }
}

/// Builder that checks the shape invariant on [`NdDataBuilder::build`].
#[derive(Debug, Clone)]
pub struct NdDataBuilder {
    inner: NdData,
}

impl NdDataBuilder {
    pub fn uncertainty(mut self, uncertainty: impl Into<Option<Uncertainty>>) -> Self {
        self.inner.uncertainty = uncertainty.into();
        self
    }

    pub fn mask(mut self, mask: impl Into<Option<ArrayD<bool>>>) -> Self {
        self.inner.mask = mask.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<Option<Unit>>) -> Self {
        self.inner.unit = unit.into();
        self
    }

    pub fn wcs(mut self, wcs: impl Into<Option<Arc<Wcs>>>) -> Self {
        self.inner.wcs = wcs.into();
        self
    }

    pub fn meta(mut self, meta: Arc<Meta>) -> Self {
        self.inner.meta = meta;
        self
    }

    pub fn build(self) -> Result<NdData> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// Capabilities shared by every container kind, implemented once on
/// [`NdData`] and reached through delegation.
pub trait NdContainer: Sized {
    /// The wrapped numeric container.
    fn nddata(&self) -> &NdData;

    /// Wrap a container, re-deriving any kind-specific state from it.
    fn from_nddata(nddata: NdData) -> Result<Self>;

    fn shape(&self) -> &[usize] {
        self.nddata().shape()
    }

    /// Total element count of the data array.
    fn len(&self) -> usize {
        self.nddata().len()
    }

    fn is_empty(&self) -> bool {
        self.nddata().is_empty()
    }

    /// `self + other`, as a new container of the same kind.
    fn add<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self> {
        Self::from_nddata(arithmetic::combine(self.nddata(), Operation::Add, other.into())?)
    }

    /// `self - other`, as a new container of the same kind.
    fn subtract<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self> {
        Self::from_nddata(arithmetic::combine(
            self.nddata(),
            Operation::Subtract,
            other.into(),
        )?)
    }

    /// `self * other`, as a new container of the same kind.
    fn multiply<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self> {
        Self::from_nddata(arithmetic::combine(
            self.nddata(),
            Operation::Multiply,
            other.into(),
        )?)
    }

    /// `self / other`, as a new container of the same kind.
    fn divide<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self> {
        Self::from_nddata(arithmetic::combine(
            self.nddata(),
            Operation::Divide,
            other.into(),
        )?)
    }

    /// Write data, uncertainty and mask to `<path>.fits`.
    ///
    /// The suffix is always appended, so `out.fits` is written as
    /// `out.fits.fits`. Returns the path written.
    fn export(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        export::export(self.nddata(), path.as_ref(), export::DEFAULT_EXTENSION)
    }
}

impl NdContainer for NdData {
    fn nddata(&self) -> &NdData {
        self
    }

    fn from_nddata(nddata: NdData) -> Result<Self> {
        nddata.validate()?;
        Ok(nddata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_builder_checks_shapes() {
        let data = Array::zeros(IxDyn(&[3, 2]));
        let err = NdData::builder(data.clone())
            .uncertainty(Uncertainty::inverse_variance(Array::ones(IxDyn(&[2, 3]))))
            .build()
            .unwrap_err();
        assert!(matches!(err, CubeError::Data { .. }));

        let err = NdData::builder(data.clone())
            .mask(Array::from_elem(IxDyn(&[3]), false))
            .build()
            .unwrap_err();
        assert!(matches!(err, CubeError::Data { .. }));

        let ok = NdData::builder(data)
            .uncertainty(Uncertainty::inverse_variance(Array::ones(IxDyn(&[3, 2]))))
            .mask(Array::from_elem(IxDyn(&[3, 2]), false))
            .build()
            .unwrap();
        assert_eq!(ok.shape(), &[3, 2]);
        assert_eq!(NdContainer::len(&ok), 6);
    }

    #[test]
    fn test_derive_shares_meta_and_wcs() {
        let mut meta = Meta::new();
        meta.insert("source".to_string(), "test".into());
        let parent = NdData::builder(Array::zeros(IxDyn(&[2, 2])))
            .unit(Unit::parse("Jy"))
            .wcs(Arc::new(Wcs::new(Vec::new())))
            .meta(Arc::new(meta))
            .build()
            .unwrap();

        let child = parent.derive(Array::zeros(IxDyn(&[2]))).build().unwrap();
        assert!(Arc::ptr_eq(child.meta(), parent.meta()));
        assert!(Arc::ptr_eq(child.wcs().unwrap(), parent.wcs().unwrap()));
        assert_eq!(child.unit().unwrap().symbol(), "Jy");
        assert!(child.uncertainty().is_none());
    }

    #[test]
    fn test_get_and_quantity() {
        let data = Array::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let nd = NdData::builder(data).unit(Unit::parse("nm")).build().unwrap();
        assert_eq!(nd.get(&[1, 0]), Some(3.0));
        assert_eq!(nd.get(&[2, 0]), None);
        assert_eq!(nd.quantity().unit().unwrap().symbol(), "nm");
    }
}
