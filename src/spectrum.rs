//! One-dimensional (or stacked) spectra with a derived dispersion axis.

use ndarray::{Array1, ArrayD, Ix1};

use crate::error::{CubeError, Result};
use crate::nddata::{NdContainer, NdData};
use crate::reduce::{ReductionMethod, exclusion_from_keep, masked_reduce};
use crate::units::{Quantity, Unit};

/// Flux along a dispersion axis, optionally with a spatial cross-dispersion
/// axis when the data is two-dimensional.
///
/// The dispersion is derived once, when the spectrum is built, from the
/// coordinate mapping; see [`SpectrumData::new`].
#[derive(Debug, Clone)]
pub struct SpectrumData {
    nddata: NdData,
    dispersion: Quantity<Ix1>,
    cross_dispersion: Option<Quantity<Ix1>>,
}

impl SpectrumData {
    /// Wrap `nddata`, deriving the dispersion and cross-dispersion axes.
    ///
    /// Without a coordinate mapping the dispersion is the pixel index
    /// `0..N` with no unit. With one, the index sequence starts at the
    /// reference pixel of the last coordinate axis and is transformed
    /// logarithmically when that axis is `WAVE-LOG`. If that sequence cannot
    /// be built with exactly `N` samples the plain index is used instead.
    pub fn new(nddata: NdData) -> Result<Self> {
        if nddata.ndim() == 0 {
            return Err(CubeError::data("spectrum data needs at least one axis"));
        }
        let dispersion = derive_dispersion(&nddata);
        let cross_dispersion = derive_cross_dispersion(&nddata)?;
        log::trace!(
            "Spectrum of shape {:?}, dispersion unit {:?}",
            nddata.shape(),
            dispersion.unit().map(Unit::symbol)
        );
        Ok(Self {
            nddata,
            dispersion,
            cross_dispersion,
        })
    }

    /// Element at `index`, or `None` when out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.nddata.get(index)
    }

    /// Copy of the data tagged with its unit.
    pub fn flux(&self) -> Quantity {
        self.nddata.quantity()
    }

    /// Copy of the uncertainty values tagged with the data unit.
    pub fn error(&self) -> Option<Quantity> {
        self.nddata
            .uncertainty()
            .map(|u| Quantity::new(u.array().clone(), self.nddata.unit().cloned()))
    }

    /// Same as [`SpectrumData::flux`].
    pub fn quantity(&self) -> Quantity {
        self.flux()
    }

    /// Dispersion axis derived at construction (or set later), one value per
    /// sample along axis 0.
    pub fn dispersion(&self) -> &Quantity<Ix1> {
        &self.dispersion
    }

    /// Replace the dispersion axis. The length is not checked against the data.
    pub fn set_dispersion(&mut self, dispersion: Quantity<Ix1>) {
        self.dispersion = dispersion;
    }

    /// Spatial axis along array axis 1, from the second coordinate axis.
    /// `None` for one-dimensional spectra or without coordinates.
    pub fn cross_dispersion(&self) -> Option<&Quantity<Ix1>> {
        self.cross_dispersion.as_ref()
    }

    /// Flux, converted to `unit` when one is given.
    pub fn get_flux(&self, unit: Option<&Unit>) -> Result<Quantity> {
        convert(self.flux(), unit)
    }

    /// Error, converted to `unit` when one is given.
    ///
    /// Converting a spectrum without uncertainty fails with
    /// [`CubeError::MissingDependency`].
    pub fn get_error(&self, unit: Option<&Unit>) -> Result<Option<Quantity>> {
        match (self.error(), unit) {
            (None, Some(_)) => Err(CubeError::missing("uncertainty", "get_error")),
            (error, unit) => error.map(|e| convert(e, unit)).transpose(),
        }
    }

    /// Dispersion, converted to `unit` when one is given.
    pub fn get_dispersion(&self, unit: Option<&Unit>) -> Result<Quantity<Ix1>> {
        convert(self.dispersion.clone(), unit)
    }

    /// Cross-dispersion, converted to `unit` when one is given.
    pub fn get_cross_dispersion(&self, unit: Option<&Unit>) -> Result<Option<Quantity<Ix1>>> {
        match (&self.cross_dispersion, unit) {
            (None, Some(_)) => Err(CubeError::missing("cross-dispersion", "get_cross_dispersion")),
            (cross, unit) => cross.clone().map(|c| convert(c, unit)).transpose(),
        }
    }

    /// Reduce along `axis`, keeping only elements where `filter_mask` is true.
    ///
    /// Only `mean`, `median` and `sum` are accepted. Data and uncertainty are
    /// reduced the same way; the resulting mask flags samples whose reduced
    /// uncertainty is non-zero. Requires an uncertainty.
    pub fn collapse<M>(
        &self,
        method: M,
        axis: usize,
        filter_mask: Option<&ArrayD<bool>>,
    ) -> Result<SpectrumData>
    where
        M: TryInto<ReductionMethod>,
        CubeError: From<M::Error>,
    {
        let method = method.try_into()?;
        if !matches!(
            method,
            ReductionMethod::Mean | ReductionMethod::Median | ReductionMethod::Sum
        ) {
            return Err(CubeError::unsupported(format!("No such method {method}")));
        }
        let uncertainty = self
            .nddata
            .uncertainty()
            .ok_or_else(|| CubeError::missing("uncertainty", "collapse"))?;

        let excluded = filter_mask
            .map(|keep| exclusion_from_keep(keep, self.nddata.shape()))
            .transpose()?;
        let (data, _) = masked_reduce(self.nddata.data(), excluded.as_ref(), axis, method)?;
        let (reduced_uncertainty, _) =
            masked_reduce(uncertainty.array(), excluded.as_ref(), axis, method)?;
        let mask = reduced_uncertainty.mapv(|u| u != 0.0);

        let collapsed = self
            .nddata
            .derive(data)
            .uncertainty(uncertainty.with_array(reduced_uncertainty))
            .mask(mask)
            .build()?;
        SpectrumData::new(collapsed)
    }

    /// Swap two data axes.
    ///
    /// Uncertainty and mask are carried over unchanged, so the swap only
    /// succeeds when it leaves the data shape as it was or when neither is
    /// present.
    pub fn flip(&self, axis1: usize, axis2: usize) -> Result<SpectrumData> {
        let ndim = self.nddata.ndim();
        if axis1 >= ndim || axis2 >= ndim {
            return Err(CubeError::data(format!(
                "cannot swap axes {axis1} and {axis2} of {ndim}-dimensional data"
            )));
        }
        let mut data = self.nddata.data().clone();
        data.swap_axes(axis1, axis2);

        let flipped = self
            .nddata
            .derive(data.as_standard_layout().into_owned())
            .uncertainty(self.nddata.uncertainty().cloned())
            .mask(self.nddata.mask().cloned())
            .build()?;
        SpectrumData::new(flipped)
    }
}

impl NdContainer for SpectrumData {
    fn nddata(&self) -> &NdData {
        &self.nddata
    }

    fn from_nddata(nddata: NdData) -> Result<Self> {
        Self::new(nddata)
    }
}

fn convert<D: ndarray::Dimension>(quantity: Quantity<D>, unit: Option<&Unit>) -> Result<Quantity<D>> {
    match unit {
        Some(unit) => quantity.to(unit),
        None => Ok(quantity),
    }
}

/// `start, start + 1, ...` below `stop`; empty when the span is not a
/// positive finite number.
fn arange(start: f64, stop: f64) -> Array1<f64> {
    let span = (stop - start).ceil();
    let len = if span.is_finite() && span > 0.0 {
        span as usize
    } else {
        0
    };
    Array1::from_shape_fn(len, |i| start + i as f64)
}

fn index_axis(n: usize) -> Quantity<Ix1> {
    Quantity::new(arange(0.0, n as f64), None)
}

fn derive_dispersion(nddata: &NdData) -> Quantity<Ix1> {
    let n = nddata.shape()[0];
    let Some(wcs) = nddata.wcs() else {
        return index_axis(n);
    };
    let Some(last) = wcs.last_axis() else {
        return index_axis(n);
    };

    let candidate = arange(last.crpix, last.crpix + n as f64);
    if candidate.len() != n {
        log::warn!(
            "Reference pixel {} does not yield {} dispersion samples, using pixel indices",
            last.crpix,
            n
        );
        return index_axis(n);
    }

    let units = wcs.units();
    let symbol = if units.len() == 3 { units[2] } else { units[0] };
    let unit = Unit::parse(symbol);

    let values = if last.is_log_wavelength() {
        let index = wcs.naxis() - 1;
        candidate.mapv(|pixel| wcs.pixel_to_world(index, pixel).unwrap_or(f64::NAN))
    } else {
        candidate
    };
    Quantity::new(values, Some(unit))
}

fn derive_cross_dispersion(nddata: &NdData) -> Result<Option<Quantity<Ix1>>> {
    if nddata.ndim() < 2 {
        return Ok(None);
    }
    let Some(wcs) = nddata.wcs() else {
        return Ok(None);
    };
    let axis = wcs
        .axis(1)
        .ok_or_else(|| CubeError::missing("second coordinate axis", "cross-dispersion"))?;
    Ok(Some(Quantity::new(
        axis.linear_samples(nddata.shape()[1]),
        Some(axis.unit()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uncertainty::Uncertainty;
    use crate::wcs::{WAVE_LOG, Wcs, WcsAxis};
    use ndarray::{Array, IxDyn, array};
    use std::sync::Arc;

    fn spectrum_wcs(crpix: f64) -> Arc<Wcs> {
        Arc::new(Wcs::new(vec![
            WcsAxis::new(1.0, 150.0, -0.5).with_unit("deg"),
            WcsAxis::new(1.0, 2.0, 0.25).with_unit("arcsec"),
            WcsAxis::new(crpix, 3600.0, 1.0)
                .with_unit("Angstrom")
                .with_type(WAVE_LOG),
        ]))
    }

    #[test]
    fn test_dispersion_without_wcs() {
        let spectrum = SpectrumData::new(NdData::new(Array::zeros(IxDyn(&[4])))).unwrap();
        assert_eq!(spectrum.dispersion().value(), &array![0.0, 1.0, 2.0, 3.0]);
        assert!(spectrum.dispersion().unit().is_none());
        assert!(spectrum.cross_dispersion().is_none());
    }

    #[test]
    fn test_log_dispersion() {
        let nd = NdData::builder(Array::zeros(IxDyn(&[3, 2])))
            .wcs(spectrum_wcs(0.0))
            .build()
            .unwrap();
        let spectrum = SpectrumData::new(nd).unwrap();

        let dispersion = spectrum.dispersion();
        assert_eq!(dispersion.unit().unwrap().symbol(), "Angstrom");
        assert_eq!(dispersion.value()[0], 3600.0);
        let expected = 3600.0 * (2.0 / 3600.0f64).exp();
        assert!((dispersion.value()[2] - expected).abs() < 1e-9);

        let cross = spectrum.cross_dispersion().unwrap();
        assert_eq!(cross.value(), &array![2.0, 2.25]);
        assert_eq!(cross.unit().unwrap().symbol(), "arcsec");
    }

    #[test]
    fn test_log_dispersion_uses_cd_step() {
        // CDELT3 disagrees with CD3_3; the CD matrix wins.
        let wcs = Wcs::new(vec![
            WcsAxis::new(1.0, 150.0, -0.5).with_unit("deg"),
            WcsAxis::new(1.0, 2.0, 0.25).with_unit("deg"),
            WcsAxis::new(0.0, 500.0, 1.0)
                .with_unit("nm")
                .with_type(WAVE_LOG),
        ])
        .with_cd(array![[-0.5, 0.0, 0.0], [0.0, 0.25, 0.0], [0.0, 0.0, 0.001]])
        .unwrap();
        let nd = NdData::builder(Array::zeros(IxDyn(&[4])))
            .wcs(Arc::new(wcs))
            .build()
            .unwrap();
        let spectrum = SpectrumData::new(nd).unwrap();

        let dispersion = spectrum.dispersion();
        assert_eq!(dispersion.unit().unwrap().symbol(), "nm");
        assert_eq!(dispersion.value()[0], 500.0);
        for (i, &value) in dispersion.value().iter().enumerate() {
            let expected = 500.0 * (0.001 * i as f64 / 500.0).exp();
            assert!((value - expected).abs() < 1e-9, "sample {i}: {value}");
        }
        assert!((dispersion.value()[1] - 500.001000001).abs() < 1e-9);
    }

    #[test]
    fn test_unusable_reference_pixel_falls_back_to_indices() {
        let nd = NdData::builder(Array::zeros(IxDyn(&[5])))
            .wcs(spectrum_wcs(1e20))
            .build()
            .unwrap();
        let spectrum = SpectrumData::new(nd).unwrap();
        assert_eq!(spectrum.dispersion().value(), &array![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(spectrum.dispersion().unit().is_none());
    }

    #[test]
    fn test_dispersion_conversion() {
        let nd = NdData::builder(Array::zeros(IxDyn(&[2])))
            .wcs(spectrum_wcs(0.0))
            .build()
            .unwrap();
        let spectrum = SpectrumData::new(nd).unwrap();
        let nm = spectrum.get_dispersion(Some(&Unit::parse("nm"))).unwrap();
        assert!((nm.value()[0] - 360.0).abs() < 1e-9);
        assert!(spectrum.get_dispersion(Some(&Unit::parse("Jy"))).is_err());
    }

    #[test]
    fn test_set_dispersion() {
        let mut spectrum = SpectrumData::new(NdData::new(Array::zeros(IxDyn(&[2])))).unwrap();
        spectrum.set_dispersion(Quantity::new(array![5.0, 6.0], Some(Unit::parse("nm"))));
        assert_eq!(spectrum.dispersion().value()[1], 6.0);
    }

    #[test]
    fn test_error_requires_uncertainty_for_conversion() {
        let spectrum = SpectrumData::new(NdData::new(Array::zeros(IxDyn(&[2])))).unwrap();
        assert!(spectrum.get_error(None).unwrap().is_none());
        assert!(matches!(
            spectrum.get_error(Some(&Unit::parse("Jy"))),
            Err(CubeError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_collapse_methods() {
        let nd = NdData::builder(array![[1.0, 3.0], [2.0, 6.0], [5.0, 5.0]].into_dyn())
            .uncertainty(Uncertainty::inverse_variance(
                array![[1.0, 1.0], [0.0, 0.0], [2.0, 4.0]].into_dyn(),
            ))
            .build()
            .unwrap();
        let spectrum = SpectrumData::new(nd).unwrap();

        let mean = spectrum.collapse("mean", 1, None).unwrap();
        assert_eq!(mean.nddata().data(), &array![2.0, 4.0, 5.0].into_dyn());
        assert_eq!(
            mean.nddata().mask().unwrap(),
            &array![true, false, true].into_dyn()
        );

        let keep = array![[true, false], [true, false], [true, false]].into_dyn();
        let sum = spectrum
            .collapse(ReductionMethod::Sum, 1, Some(&keep))
            .unwrap();
        assert_eq!(sum.nddata().data(), &array![1.0, 2.0, 5.0].into_dyn());

        assert!(matches!(
            spectrum.collapse("mode", 1, None),
            Err(CubeError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            spectrum.collapse("bogus", 1, None),
            Err(CubeError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_collapse_requires_uncertainty() {
        let spectrum = SpectrumData::new(NdData::new(Array::zeros(IxDyn(&[2, 2])))).unwrap();
        assert!(matches!(
            spectrum.collapse("mean", 1, None),
            Err(CubeError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_flip() {
        let square = NdData::builder(array![[1.0, 2.0], [3.0, 4.0]].into_dyn())
            .mask(array![[false, true], [false, false]].into_dyn())
            .build()
            .unwrap();
        let flipped = SpectrumData::new(square).unwrap().flip(0, 1).unwrap();
        assert_eq!(flipped.nddata().data(), &array![[1.0, 3.0], [2.0, 4.0]].into_dyn());
        // mask travels unchanged
        assert!(flipped.nddata().mask().unwrap()[[0, 1]]);

        let tall = NdData::builder(Array::zeros(IxDyn(&[3, 2])))
            .mask(Array::from_elem(IxDyn(&[3, 2]), false))
            .build()
            .unwrap();
        let err = SpectrumData::new(tall).unwrap().flip(0, 1).unwrap_err();
        assert!(matches!(err, CubeError::Data { .. }));
    }
}
