//! Unit-aware element-wise arithmetic with uncertainty and mask propagation.
//!
//! The right-hand operand is resolved once into an array, an optional
//! variance, an optional mask and a unit:
//! - scalars are broadcast to the receiver's shape,
//! - bare scalars and arrays take the receiver's unit for `+`/`-` and are
//!   dimensionless for `*`/`/`,
//! - containers contribute their own unit, uncertainty and mask.
//!
//! Variances add for `+`/`-` and combine first-order for `*`/`/`; a missing
//! uncertainty counts as zero variance. Masks are OR-ed. The result keeps the
//! receiver's coordinate mapping and metadata.

use std::fmt;

use ndarray::{ArrayD, Zip};

use crate::error::{CubeError, Result};
use crate::nddata::{NdContainer, NdData};
use crate::uncertainty::{
    Uncertainty, propagate_additive, propagate_product, propagate_quotient,
};
use crate::units::{Unit, factor_between};

/// Element-wise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    fn is_additive(self) -> bool {
        matches!(self, Self::Add | Self::Subtract)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        })
    }
}

/// Right-hand operand of an arithmetic operation.
#[derive(Debug, Clone)]
pub enum Operand<'a> {
    Scalar(f64),
    Array(ArrayD<f64>),
    Data(&'a NdData),
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl From<ArrayD<f64>> for Operand<'_> {
    fn from(array: ArrayD<f64>) -> Self {
        Operand::Array(array)
    }
}

impl<'a, T: NdContainer> From<&'a T> for Operand<'a> {
    fn from(container: &'a T) -> Self {
        Operand::Data(container.nddata())
    }
}

struct Resolved<'a> {
    data: ArrayD<f64>,
    uncertainty: Option<&'a Uncertainty>,
    mask: Option<&'a ArrayD<bool>>,
    unit: Option<Unit>,
}

fn resolve<'a>(lhs: &NdData, op: Operation, operand: Operand<'a>) -> Result<Resolved<'a>> {
    let bare_unit = if op.is_additive() {
        lhs.unit.clone()
    } else {
        None
    };

    match operand {
        Operand::Scalar(value) => Ok(Resolved {
            data: ArrayD::from_elem(lhs.data.raw_dim(), value),
            uncertainty: None,
            mask: None,
            unit: bare_unit,
        }),
        Operand::Array(array) => {
            CubeError::check_shape("operand", lhs.shape(), array.shape())?;
            Ok(Resolved {
                data: array,
                uncertainty: None,
                mask: None,
                unit: bare_unit,
            })
        }
        Operand::Data(other) => {
            CubeError::check_shape("operand", lhs.shape(), other.shape())?;
            Ok(Resolved {
                data: other.data.clone(),
                uncertainty: other.uncertainty.as_ref(),
                mask: other.mask.as_ref(),
                unit: other.unit.clone(),
            })
        }
    }
}

/// Combine `lhs` with `operand`, producing a new container.
pub fn combine(lhs: &NdData, op: Operation, operand: Operand<'_>) -> Result<NdData> {
    let rhs = resolve(lhs, op, operand)?;
    log::trace!("{} on shape {:?}", op, lhs.shape());

    let (rhs_data, rhs_variance, unit) = if op.is_additive() {
        let factor = factor_between(rhs.unit.as_ref(), lhs.unit.as_ref())?;
        let data = if factor == 1.0 {
            rhs.data
        } else {
            rhs.data.mapv(|v| v * factor)
        };
        let variance = rhs
            .uncertainty
            .map(|u| u.to_variance().mapv(|v| v * factor * factor));
        (data, variance, lhs.unit.clone())
    } else {
        let unit = match (&lhs.unit, &rhs.unit) {
            (None, None) => None,
            (a, b) => {
                let a = a.clone().unwrap_or_else(Unit::dimensionless);
                let b = b.clone().unwrap_or_else(Unit::dimensionless);
                Some(if op == Operation::Multiply {
                    a.multiply(&b)
                } else {
                    a.divide(&b)
                })
            }
        };
        (rhs.data, rhs.uncertainty.map(Uncertainty::to_variance), unit)
    };

    let data = Zip::from(&lhs.data)
        .and(&rhs_data)
        .map_collect(|&a, &b| match op {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide => a / b,
        });

    let lhs_variance = lhs.uncertainty.as_ref().map(Uncertainty::to_variance);
    let kind = lhs
        .uncertainty
        .as_ref()
        .or(rhs.uncertainty)
        .map(Uncertainty::kind);
    let uncertainty = kind.map(|kind| {
        let zeros = || ArrayD::zeros(lhs.data.raw_dim());
        let var_a = lhs_variance.unwrap_or_else(zeros);
        let var_b = rhs_variance.unwrap_or_else(zeros);
        let variance = match op {
            Operation::Add | Operation::Subtract => propagate_additive(&var_a, &var_b),
            Operation::Multiply => propagate_product(&lhs.data, &var_a, &rhs_data, &var_b),
            Operation::Divide => propagate_quotient(&lhs.data, &var_a, &rhs_data, &var_b),
        };
        Uncertainty::from_variance(kind, variance)
    });

    let mask = match (&lhs.mask, rhs.mask) {
        (None, None) => None,
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (Some(a), Some(b)) => Some(Zip::from(a).and(b).map_collect(|&x, &y| x || y)),
    };

    Ok(NdData {
        data,
        uncertainty,
        mask,
        unit,
        wcs: lhs.wcs.clone(),
        meta: lhs.meta.clone(),
    })
}
