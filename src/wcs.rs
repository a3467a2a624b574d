//! World coordinate mapping between array indices and physical coordinates.
//!
//! Axes are kept in FITS order: `axes[0]` is WCS axis 1, which belongs to the
//! last (fastest-varying) array axis. For a cube stored as
//! `(wavelength, y, x)` the spectral axis is therefore the last WCS axis.
//!
//! Only per-axis transforms are provided (linear and `WAVE-LOG`); celestial
//! projections are not modelled.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};
use crate::io::fits::{Card, Header};
use crate::units::Unit;

/// Axis type marking a logarithmically sampled wavelength axis.
pub const WAVE_LOG: &str = "WAVE-LOG";

/// Reference pixel, value, step, unit and type of one WCS axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WcsAxis {
    /// Reference pixel (FITS convention, as written in the header)
    pub crpix: f64,
    /// Coordinate value at the reference pixel
    pub crval: f64,
    /// Coordinate increment per pixel
    pub cdelt: f64,
    /// Unit of `crval`/`cdelt`
    #[serde(default)]
    pub cunit: String,
    /// Axis type, e.g. `RA---TAN` or `WAVE-LOG`
    #[serde(default)]
    pub ctype: String,
}

impl WcsAxis {
    pub fn new(crpix: f64, crval: f64, cdelt: f64) -> Self {
        Self {
            crpix,
            crval,
            cdelt,
            cunit: String::new(),
            ctype: String::new(),
        }
    }

    pub fn with_unit(mut self, cunit: impl Into<String>) -> Self {
        self.cunit = cunit.into();
        self
    }

    pub fn with_type(mut self, ctype: impl Into<String>) -> Self {
        self.ctype = ctype.into();
        self
    }

    /// Parsed `cunit`.
    pub fn unit(&self) -> Unit {
        Unit::parse(&self.cunit)
    }

    pub fn is_log_wavelength(&self) -> bool {
        self.ctype.trim() == WAVE_LOG
    }

    /// `n` linearly spaced coordinates starting at `crval` with step `cdelt`.
    pub fn linear_samples(&self, n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| self.crval + self.cdelt * i as f64)
    }
}

/// Coordinate mapping for an N-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    axes: Vec<WcsAxis>,
    cd: Option<Array2<f64>>,
}

impl Wcs {
    pub fn new(axes: Vec<WcsAxis>) -> Self {
        Self { axes, cd: None }
    }

    /// Attach a CD (linear transformation) matrix; must be `naxis x naxis`.
    pub fn with_cd(mut self, cd: Array2<f64>) -> Result<Self> {
        let n = self.axes.len();
        if cd.dim() != (n, n) {
            return Err(CubeError::data(format!(
                "CD matrix shape {:?} does not match {} axes",
                cd.dim(),
                n
            )));
        }
        self.cd = Some(cd);
        Ok(self)
    }

    pub fn naxis(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[WcsAxis] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&WcsAxis> {
        self.axes.get(index)
    }

    pub fn last_axis(&self) -> Option<&WcsAxis> {
        self.axes.last()
    }

    pub fn cd(&self) -> Option<&Array2<f64>> {
        self.cd.as_ref()
    }

    /// Diagonal step for an axis: the CD entry when a CD matrix is present,
    /// otherwise `cdelt`.
    pub fn step(&self, index: usize) -> Option<f64> {
        match &self.cd {
            Some(cd) => cd.get((index, index)).copied(),
            None => self.axes.get(index).map(|a| a.cdelt),
        }
    }

    /// Declared axis units, in FITS axis order.
    pub fn units(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.cunit.as_str()).collect()
    }

    /// Physical coordinate of a (FITS-convention) pixel position along one axis.
    pub fn pixel_to_world(&self, index: usize, pixel: f64) -> Option<f64> {
        let axis = self.axes.get(index)?;
        let step = self.step(index)?;
        let offset = step * (pixel - axis.crpix);
        if axis.is_log_wavelength() {
            Some(axis.crval * (offset / axis.crval).exp())
        } else {
            Some(axis.crval + offset)
        }
    }

    /// Inverse of [`Wcs::pixel_to_world`].
    pub fn world_to_pixel(&self, index: usize, world: f64) -> Option<f64> {
        let axis = self.axes.get(index)?;
        let step = self.step(index)?;
        if step == 0.0 {
            return None;
        }
        let offset = if axis.is_log_wavelength() {
            axis.crval * (world / axis.crval).ln()
        } else {
            world - axis.crval
        };
        Some(axis.crpix + offset / step)
    }

    /// Header cards describing this mapping.
    pub fn to_header(&self) -> Vec<Card> {
        let mut cards = vec![Card::new("WCSAXES", self.axes.len() as i64)];
        for (i, axis) in self.axes.iter().enumerate() {
            let n = i + 1;
            cards.push(Card::new(format!("CRPIX{n}"), axis.crpix));
            cards.push(Card::new(format!("CRVAL{n}"), axis.crval));
            cards.push(Card::new(format!("CDELT{n}"), axis.cdelt));
            if !axis.cunit.is_empty() {
                cards.push(Card::new(format!("CUNIT{n}"), axis.cunit.as_str()));
            }
            if !axis.ctype.is_empty() {
                cards.push(Card::new(format!("CTYPE{n}"), axis.ctype.as_str()));
            }
        }
        if let Some(cd) = &self.cd {
            for ((i, j), value) in cd.indexed_iter() {
                cards.push(Card::new(format!("CD{}_{}", i + 1, j + 1), *value));
            }
        }
        cards
    }

    /// Build a mapping from header keywords.
    ///
    /// Returns `None` when the header carries no WCS keywords at all.
    /// Missing per-axis keywords take the FITS defaults
    /// (`CRPIX = 0`, `CRVAL = 0`, `CDELT = 1`).
    pub fn from_header(header: &Header) -> Option<Self> {
        let highest = highest_axis_keyword(header);
        if highest == 0 {
            return None;
        }
        let declared = header
            .get_i64("WCSAXES")
            .or_else(|| header.get_i64("NAXIS"))
            .unwrap_or(0)
            .max(0) as usize;
        let declared = declared.max(highest);

        let axes: Vec<WcsAxis> = (1..=declared)
            .map(|n| WcsAxis {
                crpix: header.get_f64(&format!("CRPIX{n}")).unwrap_or(0.0),
                crval: header.get_f64(&format!("CRVAL{n}")).unwrap_or(0.0),
                cdelt: header.get_f64(&format!("CDELT{n}")).unwrap_or(1.0),
                cunit: header
                    .get_str(&format!("CUNIT{n}"))
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                ctype: header
                    .get_str(&format!("CTYPE{n}"))
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            })
            .collect();

        let has_cd = (1..=declared)
            .any(|i| (1..=declared).any(|j| header.get(&format!("CD{i}_{j}")).is_some()));
        let cd = has_cd.then(|| {
            Array2::from_shape_fn((declared, declared), |(i, j)| {
                header
                    .get_f64(&format!("CD{}_{}", i + 1, j + 1))
                    .unwrap_or(0.0)
            })
        });

        Some(Self { axes, cd })
    }
}

/// Highest axis number appearing in a per-axis WCS keyword, 0 if none.
fn highest_axis_keyword(header: &Header) -> usize {
    header
        .cards()
        .iter()
        .filter_map(|card| {
            ["CRPIX", "CRVAL", "CDELT", "CTYPE", "CUNIT"]
                .iter()
                .find_map(|prefix| card.keyword.strip_prefix(prefix))
                .and_then(|n| n.parse::<usize>().ok())
        })
        .max()
        .unwrap_or(0)
}
