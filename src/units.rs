//! Physical units and unit-tagged arrays.
//!
//! Units are parsed from the strings found in FITS headers (`CUNITn`,
//! `BUNIT`): a product of symbols with optional integer powers, separated by
//! `/` for division and whitespace for multiplication, with an optional leading numeric scale
//! (e.g. `1E-17 erg/s/cm2/Angstrom`). Each known unit reduces to a scale
//! factor against SI plus a dimension vector, which is all that conversion
//! needs. Symbols that are not in the table are kept as opaque units that
//! only convert to themselves.

use std::fmt;

use ndarray::{Array, Dimension, IxDyn};

use crate::error::{CubeError, Result};

/// Exponents of the base dimensions, in the order
/// length, mass, time, angle, count, pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Dims([i8; 6]);

impl Dims {
    const LENGTH: Dims = Dims([1, 0, 0, 0, 0, 0]);
    const MASS: Dims = Dims([0, 1, 0, 0, 0, 0]);
    const TIME: Dims = Dims([0, 0, 1, 0, 0, 0]);
    const ANGLE: Dims = Dims([0, 0, 0, 1, 0, 0]);
    const COUNT: Dims = Dims([0, 0, 0, 0, 1, 0]);
    const PIXEL: Dims = Dims([0, 0, 0, 0, 0, 1]);
    // kg m^2 s^-2
    const ENERGY: Dims = Dims([2, 1, -2, 0, 0, 0]);
    // kg m^2 s^-3
    const POWER: Dims = Dims([2, 1, -3, 0, 0, 0]);
    // s^-1
    const FREQUENCY: Dims = Dims([0, 0, -1, 0, 0, 0]);
    // kg s^-2 (W m^-2 Hz^-1)
    const SPECTRAL_FLUX: Dims = Dims([0, 1, -2, 0, 0, 0]);

    /// `self * other^sign`; `None` when an exponent leaves the `i8` range.
    fn combine(self, other: Dims, sign: i8) -> Option<Dims> {
        let mut out = self.0;
        for (o, e) in out.iter_mut().zip(other.0) {
            *o = e.checked_mul(sign).and_then(|e| o.checked_add(e))?;
        }
        Some(Dims(out))
    }

    fn powi(self, power: i8) -> Option<Dims> {
        let mut out = self.0;
        for e in out.iter_mut() {
            *e = e.checked_mul(power)?;
        }
        Some(Dims(out))
    }
}

/// Resolved definition of a unit: SI scale and dimensions, or an opaque tag.
#[derive(Debug, Clone, PartialEq)]
enum Definition {
    Known { scale: f64, dims: Dims },
    Opaque,
}

/// A physical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    symbol: String,
    definition: Definition,
}

fn lookup(symbol: &str) -> Option<(f64, Dims)> {
    let entry = match symbol {
        "m" => (1.0, Dims::LENGTH),
        "km" => (1e3, Dims::LENGTH),
        "cm" => (1e-2, Dims::LENGTH),
        "mm" => (1e-3, Dims::LENGTH),
        "um" | "micron" => (1e-6, Dims::LENGTH),
        "nm" => (1e-9, Dims::LENGTH),
        "Angstrom" | "angstrom" | "AA" => (1e-10, Dims::LENGTH),
        "pc" => (3.085_677_581_491_367e16, Dims::LENGTH),
        "kg" => (1.0, Dims::MASS),
        "g" => (1e-3, Dims::MASS),
        "s" => (1.0, Dims::TIME),
        "ms" => (1e-3, Dims::TIME),
        "min" => (60.0, Dims::TIME),
        "h" => (3600.0, Dims::TIME),
        "Hz" => (1.0, Dims::FREQUENCY),
        "erg" => (1e-7, Dims::ENERGY),
        "J" => (1.0, Dims::ENERGY),
        "W" => (1.0, Dims::POWER),
        "Jy" => (1e-26, Dims::SPECTRAL_FLUX),
        "mJy" => (1e-29, Dims::SPECTRAL_FLUX),
        "rad" => (1.0, Dims::ANGLE),
        "deg" => (std::f64::consts::PI / 180.0, Dims::ANGLE),
        "arcmin" => (std::f64::consts::PI / 10_800.0, Dims::ANGLE),
        "arcsec" => (std::f64::consts::PI / 648_000.0, Dims::ANGLE),
        "mas" => (std::f64::consts::PI / 648_000_000.0, Dims::ANGLE),
        "ct" | "count" | "counts" | "electron" => (1.0, Dims::COUNT),
        "pix" | "pixel" | "spaxel" => (1.0, Dims::PIXEL),
        _ => return None,
    };
    Some(entry)
}

/// Split `cm2`, `cm^2`, `cm**2`, `s-1` into symbol and power.
fn split_power(factor: &str) -> (&str, i8) {
    let factor = factor.trim();
    let digits_at = factor
        .char_indices()
        .find(|&(i, c)| i > 0 && (c.is_ascii_digit() || c == '-' || c == '+' || c == '^' || c == '*'))
        .map(|(i, _)| i);

    match digits_at {
        Some(i) => {
            let (symbol, power) = factor.split_at(i);
            let power = power.trim_start_matches(['^', '*']);
            match power.parse::<i8>() {
                Ok(p) => (symbol, p),
                Err(_) => (factor, 1),
            }
        }
        None => (factor, 1),
    }
}

impl Unit {
    /// The dimensionless unit.
    pub fn dimensionless() -> Self {
        Self {
            symbol: String::new(),
            definition: Definition::Known {
                scale: 1.0,
                dims: Dims::default(),
            },
        }
    }

    /// Parse a FITS-style unit string.
    ///
    /// Never fails: unknown symbols, and powers too large to track, produce
    /// an opaque unit.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::dimensionless();
        }

        let mut scale = 1.0;
        let mut dims = Dims::default();

        for (term_index, term) in text.split('/').enumerate() {
            let sign: i8 = if term_index == 0 { 1 } else { -1 };
            for factor in term.split_whitespace() {
                if let Ok(number) = factor.parse::<f64>() {
                    scale *= if sign > 0 { number } else { 1.0 / number };
                    continue;
                }
                let (symbol, power) = split_power(factor);
                let resolved = lookup(symbol).and_then(|(factor_scale, factor_dims)| {
                    let exponent = sign.checked_mul(power)?;
                    let combined = dims.combine(factor_dims.powi(power)?, sign)?;
                    Some((factor_scale.powi(i32::from(exponent)), combined))
                });
                match resolved {
                    Some((factor_scale, combined)) => {
                        scale *= factor_scale;
                        dims = combined;
                    }
                    None => {
                        log::trace!("Cannot resolve unit factor '{}' in '{}'", factor, text);
                        return Self {
                            symbol: text.to_string(),
                            definition: Definition::Opaque,
                        };
                    }
                }
            }
        }

        Self {
            symbol: text.to_string(),
            definition: Definition::Known { scale, dims },
        }
    }

    /// The symbol this unit was written as.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Whether this unit carries no dimensions and unit scale.
    pub fn is_dimensionless(&self) -> bool {
        matches!(self.definition, Definition::Known { scale, dims } if scale == 1.0 && dims == Dims::default())
    }

    /// Whether the unit was resolved against the symbol table.
    pub fn is_known(&self) -> bool {
        matches!(self.definition, Definition::Known { .. })
    }

    /// Factor `f` such that `value_in_self * f == value_in_target`.
    pub fn conversion_factor(&self, target: &Unit) -> Result<f64> {
        match (&self.definition, &target.definition) {
            (
                Definition::Known { scale: a, dims: da },
                Definition::Known { scale: b, dims: db },
            ) if da == db => Ok(a / b),
            (Definition::Opaque, Definition::Opaque) if self.symbol == target.symbol => Ok(1.0),
            _ => Err(CubeError::UnitConversion {
                from: self.symbol.clone(),
                to: target.symbol.clone(),
            }),
        }
    }

    /// Product of two units.
    pub fn multiply(&self, other: &Unit) -> Unit {
        self.compose(other, 1)
    }

    /// Quotient of two units.
    pub fn divide(&self, other: &Unit) -> Unit {
        self.compose(other, -1)
    }

    fn compose(&self, other: &Unit, sign: i8) -> Unit {
        let symbol = match (self.symbol.is_empty(), other.symbol.is_empty(), sign) {
            (_, true, _) => self.symbol.clone(),
            (true, false, 1) => other.symbol.clone(),
            (true, false, _) => format!("1 / ({})", other.symbol),
            (false, false, 1) => format!("{} {}", self.symbol, other.symbol),
            (false, false, _) if other.symbol.contains([' ', '/']) => {
                format!("{} / ({})", self.symbol, other.symbol)
            }
            (false, false, _) => format!("{} / {}", self.symbol, other.symbol),
        };

        let definition = match (&self.definition, &other.definition) {
            (
                Definition::Known { scale: a, dims: da },
                Definition::Known { scale: b, dims: db },
            ) => match da.combine(*db, sign) {
                Some(dims) => Definition::Known {
                    scale: if sign > 0 { a * b } else { a / b },
                    dims,
                },
                None => Definition::Opaque,
            },
            _ => Definition::Opaque,
        };

        Unit { symbol, definition }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

impl From<&str> for Unit {
    fn from(text: &str) -> Self {
        Unit::parse(text)
    }
}

/// Conversion factor between two optional units; an absent unit is dimensionless.
pub(crate) fn factor_between(from: Option<&Unit>, to: Option<&Unit>) -> Result<f64> {
    match (from, to) {
        (None, None) => Ok(1.0),
        (Some(a), Some(b)) => a.conversion_factor(b),
        (Some(a), None) => a.conversion_factor(&Unit::dimensionless()),
        (None, Some(b)) => Unit::dimensionless().conversion_factor(b),
    }
}

/// An array of values tagged with a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity<D: Dimension = IxDyn> {
    value: Array<f64, D>,
    unit: Option<Unit>,
}

impl<D: Dimension> Quantity<D> {
    /// Tag `value` with `unit`.
    pub fn new(value: Array<f64, D>, unit: Option<Unit>) -> Self {
        Self { value, unit }
    }

    /// The numeric values.
    pub fn value(&self) -> &Array<f64, D> {
        &self.value
    }

    /// Consume into the numeric values.
    pub fn into_value(self) -> Array<f64, D> {
        self.value
    }

    /// The unit, if any.
    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the quantity holds no elements.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Convert to `target`, producing a new quantity.
    pub fn to(&self, target: &Unit) -> Result<Self> {
        let factor = factor_between(self.unit.as_ref(), Some(target))?;
        Ok(Self {
            value: self.value.mapv(|v| v * factor),
            unit: Some(target.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_length_conversion() {
        let angstrom = Unit::parse("Angstrom");
        let nm = Unit::parse("nm");
        assert!(close(angstrom.conversion_factor(&nm).unwrap(), 0.1));
        assert!(close(nm.conversion_factor(&angstrom).unwrap(), 10.0));
    }

    #[test]
    fn test_flux_density_with_scale() {
        let manga = Unit::parse("1E-17 erg/s/cm2/Angstrom");
        let cgs = Unit::parse("erg/s/cm2/Angstrom");
        assert!(manga.is_known());
        assert!(close(manga.conversion_factor(&cgs).unwrap(), 1e-17));
    }

    #[test]
    fn test_incompatible_units() {
        let err = Unit::parse("deg").conversion_factor(&Unit::parse("m"));
        assert!(matches!(err, Err(CubeError::UnitConversion { .. })));
    }

    #[test]
    fn test_opaque_unit() {
        let unit = Unit::parse("furlong");
        assert!(!unit.is_known());
        assert_eq!(unit.conversion_factor(&unit.clone()).unwrap(), 1.0);
        assert!(unit.conversion_factor(&Unit::parse("m")).is_err());
    }

    #[test]
    fn test_exponent_overflow_is_opaque() {
        let unit = Unit::parse("m100 m100");
        assert!(!unit.is_known());
        assert_eq!(unit.symbol(), "m100 m100");

        assert!(!Unit::parse("m / m-128").is_known());
        assert!(Unit::parse("m100 / m50").is_known());

        let big = Unit::parse("m100");
        assert!(big.is_known());
        assert!(!big.multiply(&big).is_known());
        assert!(big.divide(&big).is_dimensionless());
    }

    #[test]
    fn test_powers() {
        let area = Unit::parse("cm2");
        let area_caret = Unit::parse("cm^2");
        let m2 = Unit::parse("m m");
        assert!(close(area.conversion_factor(&m2).unwrap(), 1e-4));
        assert!(close(area_caret.conversion_factor(&m2).unwrap(), 1e-4));

        let per_second = Unit::parse("s-1");
        assert!(close(per_second.conversion_factor(&Unit::parse("Hz")).unwrap(), 1.0));
    }

    #[test]
    fn test_compose() {
        let flux = Unit::parse("erg/s");
        let squared = flux.multiply(&flux);
        assert_eq!(squared.symbol(), "erg/s erg/s");
        assert!(squared.conversion_factor(&Unit::parse("J2 s-2")).is_ok());

        let ratio = flux.divide(&flux);
        assert!(close(ratio.conversion_factor(&Unit::dimensionless()).unwrap(), 1.0));

        let plain = flux.multiply(&Unit::dimensionless());
        assert_eq!(plain, flux);
    }

    #[test]
    fn test_quantity_to() {
        let q = Quantity::new(array![1.0, 2.0], Some(Unit::parse("um")));
        let nm = q.to(&Unit::parse("nm")).unwrap();
        assert!(close(nm.value()[0], 1000.0));
        assert!(close(nm.value()[1], 2000.0));
        assert_eq!(nm.unit().unwrap().symbol(), "nm");
    }

    #[test]
    fn test_unitless_quantity_only_converts_to_dimensionless() {
        let q = Quantity::new(array![3.0], None);
        assert!(q.to(&Unit::dimensionless()).is_ok());
        assert!(q.to(&Unit::parse("m")).is_err());
    }
}
