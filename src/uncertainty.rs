//! Per-element uncertainty arrays and their propagation rules.

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// How the values of an uncertainty array are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyKind {
    /// Standard deviation, same unit as the data
    StdDev,
    /// Variance, unit squared
    Variance,
    /// Inverse variance, as stored in IVAR extensions
    #[default]
    InverseVariance,
}

/// An uncertainty array aligned with a data array.
#[derive(Debug, Clone, PartialEq)]
pub struct Uncertainty {
    kind: UncertaintyKind,
    array: ArrayD<f64>,
}

impl Uncertainty {
    pub fn new(kind: UncertaintyKind, array: ArrayD<f64>) -> Self {
        Self { kind, array }
    }

    pub fn inverse_variance(array: ArrayD<f64>) -> Self {
        Self::new(UncertaintyKind::InverseVariance, array)
    }

    pub fn std_dev(array: ArrayD<f64>) -> Self {
        Self::new(UncertaintyKind::StdDev, array)
    }

    pub fn variance(array: ArrayD<f64>) -> Self {
        Self::new(UncertaintyKind::Variance, array)
    }

    pub fn kind(&self) -> UncertaintyKind {
        self.kind
    }

    /// The raw values, interpreted according to [`Uncertainty::kind`].
    pub fn array(&self) -> &ArrayD<f64> {
        &self.array
    }

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    /// Same kind, different values.
    pub fn with_array(&self, array: ArrayD<f64>) -> Self {
        Self::new(self.kind, array)
    }

    /// Values expressed as variance. A zero inverse variance becomes infinite.
    pub fn to_variance(&self) -> ArrayD<f64> {
        match self.kind {
            UncertaintyKind::StdDev => self.array.mapv(|s| s * s),
            UncertaintyKind::Variance => self.array.clone(),
            UncertaintyKind::InverseVariance => self.array.mapv(|w| 1.0 / w),
        }
    }

    /// Build an uncertainty of `kind` from variances.
    pub fn from_variance(kind: UncertaintyKind, variance: ArrayD<f64>) -> Self {
        let array = match kind {
            UncertaintyKind::StdDev => variance.mapv(f64::sqrt),
            UncertaintyKind::Variance => variance,
            UncertaintyKind::InverseVariance => variance.mapv(|v| 1.0 / v),
        };
        Self::new(kind, array)
    }
}

/// Variance of `a + b` or `a - b`.
pub(crate) fn propagate_additive(var_a: &ArrayD<f64>, var_b: &ArrayD<f64>) -> ArrayD<f64> {
    Zip::from(var_a).and(var_b).map_collect(|&va, &vb| va + vb)
}

/// Variance of `a * b`.
pub(crate) fn propagate_product(
    a: &ArrayD<f64>,
    var_a: &ArrayD<f64>,
    b: &ArrayD<f64>,
    var_b: &ArrayD<f64>,
) -> ArrayD<f64> {
    Zip::from(a)
        .and(var_a)
        .and(b)
        .and(var_b)
        .map_collect(|&a, &va, &b, &vb| b * b * va + a * a * vb)
}

/// Variance of `a / b`.
pub(crate) fn propagate_quotient(
    a: &ArrayD<f64>,
    var_a: &ArrayD<f64>,
    b: &ArrayD<f64>,
    var_b: &ArrayD<f64>,
) -> ArrayD<f64> {
    Zip::from(a)
        .and(var_a)
        .and(b)
        .and(var_b)
        .map_collect(|&a, &va, &b, &vb| {
            let b2 = b * b;
            va / b2 + a * a * vb / (b2 * b2)
        })
}
