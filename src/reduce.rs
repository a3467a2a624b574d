//! Masked reductions along a single axis.
//!
//! Masks follow the masked-array convention: `true` marks an element that is
//! excluded from the reduction. A lane whose elements are all excluded
//! reduces to NaN (0 for `sum`) and is flagged in the returned mask.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};

/// Reduction applied when collapsing an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMethod {
    #[default]
    Mean,
    Median,
    Sum,
    /// Accepted by name but not implemented by any reduction
    Mode,
}

impl ReductionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Sum => "sum",
            Self::Mode => "mode",
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReductionMethod {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "sum" => Ok(Self::Sum),
            "mode" => Ok(Self::Mode),
            other => Err(CubeError::unsupported(format!("No such method {other}"))),
        }
    }
}

impl TryFrom<&str> for ReductionMethod {
    type Error = CubeError;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Reduce the kept values of one lane.
fn reduce_lane(method: ReductionMethod, kept: &mut [f64]) -> Result<f64> {
    match method {
        ReductionMethod::Sum => Ok(kept.iter().sum()),
        _ if kept.is_empty() => Ok(f64::NAN),
        ReductionMethod::Mean => Ok(kept.iter().sum::<f64>() / kept.len() as f64),
        ReductionMethod::Median => {
            kept.sort_by(f64::total_cmp);
            let mid = kept.len() / 2;
            if kept.len() % 2 == 0 {
                Ok((kept[mid - 1] + kept[mid]) / 2.0)
            } else {
                Ok(kept[mid])
            }
        }
        ReductionMethod::Mode => Err(CubeError::unsupported(
            "mode reduction is not implemented",
        )),
    }
}

/// Reduce `data` along `axis`, skipping elements where `excluded` is true.
///
/// Returns the reduced values and a mask flagging lanes with no
/// contributing element. `excluded` must have the same shape as `data`.
pub fn masked_reduce(
    data: &ArrayD<f64>,
    excluded: Option<&ArrayD<bool>>,
    axis: usize,
    method: ReductionMethod,
) -> Result<(ArrayD<f64>, ArrayD<bool>)> {
    if axis >= data.ndim() {
        return Err(CubeError::data(format!(
            "axis {axis} is out of bounds for array of dimension {}",
            data.ndim()
        )));
    }
    if method == ReductionMethod::Mode {
        return Err(CubeError::unsupported("mode reduction is not implemented"));
    }

    let keep_all;
    let excluded = match excluded {
        Some(mask) => {
            CubeError::check_shape("mask", data.shape(), mask.shape())?;
            mask
        }
        None => {
            keep_all = ArrayD::from_elem(data.raw_dim(), false);
            &keep_all
        }
    };

    let mut failure = None;
    let reduced = Zip::from(data.lanes(Axis(axis)))
        .and(excluded.lanes(Axis(axis)))
        .map_collect(|values, mask| {
            let mut kept: Vec<f64> = values
                .iter()
                .zip(mask.iter())
                .filter(|&(_, &m)| !m)
                .map(|(&v, _)| v)
                .collect();
            let empty = kept.is_empty();
            match reduce_lane(method, &mut kept) {
                Ok(v) => (v, empty),
                Err(e) => {
                    failure.get_or_insert(e);
                    (f64::NAN, true)
                }
            }
        });
    if let Some(e) = failure {
        return Err(e);
    }

    Ok((reduced.mapv(|(v, _)| v), reduced.mapv(|(_, empty)| empty)))
}

/// Broadcast a keep-mask to `shape` and invert it into an exclusion mask.
pub(crate) fn exclusion_from_keep(keep: &ArrayD<bool>, shape: &[usize]) -> Result<ArrayD<bool>> {
    let view = keep.broadcast(shape).ok_or_else(|| {
        CubeError::data(format!(
            "filter mask shape {:?} cannot be broadcast to {:?}",
            keep.shape(),
            shape
        ))
    })?;
    Ok(view.mapv(|k| !k))
}
