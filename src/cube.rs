//! Three-dimensional IFU cubes laid out as `(wavelength, y, x)`.

use ndarray::{Array1, ArrayD, Axis, Ix1, Slice};

use crate::error::{CubeError, Result};
use crate::image::ImageData;
use crate::io::registry::ReaderRegistry;
use crate::nddata::{NdContainer, NdData};
use crate::reduce::{ReductionMethod, exclusion_from_keep, masked_reduce};
use crate::spectrum::SpectrumData;

/// A spectral cube. Axis 0 is the spectral axis, axes 1 and 2 are spatial.
#[derive(Debug, Clone)]
pub struct CubeData {
    nddata: NdData,
}

impl CubeData {
    pub fn new(nddata: NdData) -> Result<Self> {
        if nddata.ndim() != 3 {
            return Err(CubeError::data(format!(
                "cube data must be 3-dimensional, got shape {:?}",
                nddata.shape()
            )));
        }
        Ok(Self { nddata })
    }

    /// Decode a cube from `bytes` with the first reader in `registry` that
    /// accepts it. `filename` is used as an extension hint.
    pub fn read(registry: &ReaderRegistry, bytes: &[u8], filename: Option<&str>) -> Result<Self> {
        registry.read(bytes, filename)
    }

    /// Element at `[wavelength, y, x]`, or `None` when out of bounds.
    pub fn get(&self, index: [usize; 3]) -> Option<f64> {
        self.nddata.get(&index)
    }

    /// The spectrum at spatial position `(x, y)`.
    ///
    /// Data is taken from `[:, y, x]`; uncertainty and mask from `[:, x, y]`.
    /// The transposed position only has to be in range when the cube has an
    /// uncertainty or a mask.
    pub fn get_spectrum(&self, x: usize, y: usize) -> Result<SpectrumData> {
        let shape = self.nddata.shape();
        let has_aux = self.nddata.uncertainty().is_some() || self.nddata.mask().is_some();
        if y >= shape[1] || x >= shape[2] || (has_aux && (x >= shape[1] || y >= shape[2])) {
            return Err(CubeError::data(format!(
                "spaxel ({x}, {y}) is out of bounds for cube shape {shape:?}"
            )));
        }

        let data = self
            .nddata
            .data()
            .index_axis(Axis(2), x)
            .index_axis_move(Axis(1), y)
            .to_owned();
        let uncertainty = self.nddata.uncertainty().map(|u| {
            u.with_array(
                u.array()
                    .index_axis(Axis(2), y)
                    .index_axis_move(Axis(1), x)
                    .to_owned(),
            )
        });
        let mask = self.nddata.mask().map(|m| {
            m.index_axis(Axis(2), y)
                .index_axis_move(Axis(1), x)
                .to_owned()
        });

        let spectrum = self
            .nddata
            .derive(data)
            .uncertainty(uncertainty)
            .mask(mask)
            .build()?;
        SpectrumData::new(spectrum)
    }

    /// Average the cube over both spatial axes.
    ///
    /// `filter_mask` selects the elements to keep (`true` = keep) and must
    /// broadcast to the cube shape; `None` keeps everything. Only `mean` is
    /// available: each spectral plane is averaged over `y` and the
    /// per-column averages are averaged over `x`, so columns with fewer kept
    /// pixels carry the same weight as full columns. Data and uncertainty are
    /// reduced identically. Requires an uncertainty.
    ///
    /// Returns the spectrum and, per spectral sample, whether any element
    /// contributed to it.
    pub fn collapse_to_spectrum<M>(
        &self,
        method: M,
        filter_mask: Option<&ArrayD<bool>>,
    ) -> Result<(SpectrumData, Array1<bool>)>
    where
        M: TryInto<ReductionMethod>,
        CubeError: From<M::Error>,
    {
        let method = method.try_into()?;
        match method {
            ReductionMethod::Mean => {}
            ReductionMethod::Median => {
                return Err(CubeError::unsupported(
                    "median collapse over the spatial axes is not available",
                ));
            }
            other => return Err(CubeError::unsupported(format!("No such method {other}"))),
        }
        let uncertainty = self
            .nddata
            .uncertainty()
            .ok_or_else(|| CubeError::missing("uncertainty", "collapse_to_spectrum"))?;

        let excluded = match filter_mask {
            Some(keep) => exclusion_from_keep(keep, self.nddata.shape())?,
            None => ArrayD::from_elem(self.nddata.data().raw_dim(), false),
        };

        let (columns, column_empty) = masked_reduce(self.nddata.data(), Some(&excluded), 1, method)?;
        let (data, empty) = masked_reduce(&columns, Some(&column_empty), 1, method)?;
        let (ucolumns, ucolumn_empty) = masked_reduce(uncertainty.array(), Some(&excluded), 1, method)?;
        let (udata, _) = masked_reduce(&ucolumns, Some(&ucolumn_empty), 1, method)?;

        let valid = empty.mapv(|e| !e).into_dimensionality::<Ix1>()?;
        log::debug!(
            "Collapsed cube {:?} to {} spectral samples ({} valid)",
            self.nddata.shape(),
            valid.len(),
            valid.iter().filter(|&&v| v).count()
        );

        let spectrum = self
            .nddata
            .derive(data)
            .uncertainty(uncertainty.with_array(udata))
            .mask(empty)
            .build()?;
        Ok((SpectrumData::new(spectrum)?, valid))
    }

    /// Reduce the cube along `axis` into an image.
    ///
    /// `wavelength_range` restricts the spectral axis to the index range
    /// `start..stop` beforehand (clamped like a slice). Masked elements are
    /// skipped. Only `mean` and `median` are available. The image carries no
    /// uncertainty and no mask of its own; the cube's unreduced mask is kept
    /// as [`ImageData::source_mask`].
    pub fn collapse_to_image<M>(
        &self,
        wavelength_range: Option<(usize, usize)>,
        method: M,
        axis: usize,
    ) -> Result<ImageData>
    where
        M: TryInto<ReductionMethod>,
        CubeError: From<M::Error>,
    {
        let method = method.try_into()?;
        match method {
            ReductionMethod::Mean | ReductionMethod::Median => {}
            ReductionMethod::Mode => {
                return Err(CubeError::unsupported("mode collapse is not implemented"));
            }
            other => return Err(CubeError::unsupported(format!("No such method {other}"))),
        }

        let (data, mask) = match wavelength_range {
            Some((start, stop)) => {
                let n = self.nddata.shape()[0];
                let start = start.min(n);
                let stop = stop.clamp(start, n);
                let slice = Slice::from(start..stop);
                (
                    self.nddata.data().slice_axis(Axis(0), slice).to_owned(),
                    self.nddata
                        .mask()
                        .map(|m| m.slice_axis(Axis(0), slice).to_owned()),
                )
            }
            None => (self.nddata.data().clone(), self.nddata.mask().cloned()),
        };

        let (reduced, _) = masked_reduce(&data, mask.as_ref(), axis, method)?;
        let image = self.nddata.derive(reduced).build()?;
        Ok(ImageData::new(image)?.with_source_mask(self.nddata.mask().cloned()))
    }
}

impl NdContainer for CubeData {
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
    use crate::uncertainty::Uncertainty;
    use ndarray::{Array, Array3, IxDyn, array};

    /// 2 x 3 x 3 cube where value = 100 * w + 10 * y + x.
    fn cube() -> CubeData {
        let data = Array3::from_shape_fn((2, 3, 3), |(w, y, x)| (100 * w + 10 * y + x) as f64);
        let ivar = data.mapv(|v| v + 1000.0);
        let nd = NdData::builder(data.into_dyn())
            .uncertainty(Uncertainty::inverse_variance(ivar.into_dyn()))
            .mask(Array::from_elem(IxDyn(&[2, 3, 3]), false))
            .build()
            .unwrap();
        CubeData::new(nd).unwrap()
    }

    #[test]
    fn test_requires_three_dimensions() {
        let err = CubeData::new(NdData::new(Array::zeros(IxDyn(&[2, 2])))).unwrap_err();
        assert!(matches!(err, CubeError::Data { .. }));
    }

    #[test]
    fn test_get_spectrum_axis_order() {
        let cube = cube();
        let spectrum = cube.get_spectrum(2, 1).unwrap();
        // data[:, y=1, x=2]
        assert_eq!(spectrum.nddata().data(), &array![12.0, 112.0].into_dyn());
        // uncertainty[:, 2, 1]
        assert_eq!(
            spectrum.nddata().uncertainty().unwrap().array(),
            &array![1021.0, 1121.0].into_dyn()
        );
        assert_eq!(cube.get([1, 1, 2]), Some(112.0));
    }

    #[test]
    fn test_get_spectrum_out_of_bounds() {
        assert!(matches!(cube().get_spectrum(3, 0), Err(CubeError::Data { .. })));
    }

    #[test]
    fn test_get_spectrum_non_square_without_aux() {
        // (wavelength, y, x) = (2, 2, 4)
        let data = Array3::from_shape_fn((2, 2, 4), |(w, y, x)| (100 * w + 10 * y + x) as f64);
        let bare = CubeData::new(NdData::new(data.clone().into_dyn())).unwrap();

        let spectrum = bare.get_spectrum(3, 0).unwrap();
        assert_eq!(spectrum.nddata().data(), &array![3.0, 103.0].into_dyn());
        assert!(matches!(bare.get_spectrum(0, 2), Err(CubeError::Data { .. })));

        // The transposed index for the mask would be out of range.
        let masked = NdData::builder(data.into_dyn())
            .mask(Array::from_elem(IxDyn(&[2, 2, 4]), false))
            .build()
            .unwrap();
        let masked = CubeData::new(masked).unwrap();
        assert!(matches!(masked.get_spectrum(3, 0), Err(CubeError::Data { .. })));
    }

    #[test]
    fn test_collapse_to_spectrum_mean_of_means() {
        let cube = cube();
        // keep (y=0, x=0), (y=0, x=1) and (y=1, x=0)
        let keep = array![
            [true, true, false],
            [true, false, false],
            [false, false, false]
        ]
        .into_dyn();

        let (spectrum, valid) = cube.collapse_to_spectrum("mean", Some(&keep)).unwrap();
        // y-means per column: x=0 -> 5, x=1 -> 1, x=2 fully filtered
        assert_eq!(spectrum.nddata().data(), &array![3.0, 103.0].into_dyn());
        assert_eq!(valid, array![true, true]);
        assert_eq!(spectrum.shape(), &[2]);
    }

    #[test]
    fn test_collapse_to_spectrum_keep_everything() {
        let cube = cube();
        let keep = Array::from_elem(IxDyn(&[3, 3]), true);
        let (spectrum, valid) = cube
            .collapse_to_spectrum(ReductionMethod::Mean, Some(&keep))
            .unwrap();

        assert_eq!(spectrum.len(), 2);
        assert_eq!(valid, array![true, true]);
        assert_eq!(spectrum.nddata().data(), &array![11.0, 111.0].into_dyn());
        assert!(spectrum.nddata().mask().unwrap().iter().all(|&m| !m));

        let (unfiltered, _) = cube.collapse_to_spectrum("mean", None).unwrap();
        assert_eq!(unfiltered.nddata().data(), spectrum.nddata().data());
    }

    #[test]
    fn test_collapse_to_spectrum_fully_filtered() {
        let keep = Array::from_elem(IxDyn(&[3, 3]), false);
        let (spectrum, valid) = cube()
            .collapse_to_spectrum(ReductionMethod::Mean, Some(&keep))
            .unwrap();
        assert!(spectrum.nddata().data().iter().all(|v| v.is_nan()));
        assert_eq!(valid, array![false, false]);
    }

    #[test]
    fn test_collapse_to_spectrum_rejections() {
        let cube = cube();
        assert!(matches!(
            cube.collapse_to_spectrum("median", None),
            Err(CubeError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            cube.collapse_to_spectrum("sum", None),
            Err(CubeError::UnsupportedOperation(_))
        ));

        let bare = CubeData::new(NdData::new(Array::zeros(IxDyn(&[2, 2, 2])))).unwrap();
        assert!(matches!(
            bare.collapse_to_spectrum("mean", None),
            Err(CubeError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_collapse_to_image() {
        let cube = cube();
        let image = cube.collapse_to_image(None, "mean", 0).unwrap();
        assert_eq!(image.shape(), &[3, 3]);
        assert_eq!(image.get([1, 2]), Some(62.0));
        assert!(image.nddata().uncertainty().is_none());
        assert!(image.nddata().mask().is_none());
        assert_eq!(image.source_mask().unwrap().shape(), &[2, 3, 3]);

        let first_plane = cube
            .collapse_to_image(Some((0, 1)), ReductionMethod::Median, 0)
            .unwrap();
        assert_eq!(first_plane.get([2, 1]), Some(21.0));
    }

    #[test]
    fn test_collapse_to_image_rejections() {
        let cube = cube();
        for method in ["mode", "sum", "bogus"] {
            assert!(matches!(
                cube.collapse_to_image(None, method, 0),
                Err(CubeError::UnsupportedOperation(_))
            ));
        }
    }

    #[test]
    fn test_cube_arithmetic() {
        let cube = cube();
        let diff = cube.subtract(&cube).unwrap();
        assert!(diff.nddata().data().iter().all(|&v| v == 0.0));
        assert_eq!(diff.shape(), cube.shape());
    }
}
