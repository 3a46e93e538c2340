//! Dimensional analysis for the physical quantities reported by the pipeline.
//!
//! Units are parsed from plain expressions such as `t`, `Gt`, `t/TJ` or
//! `kg/MWh` into dimensional exponents plus an exact rational scale relative
//! to the coherent unit (gram, metre, second, euro). Conversions apply the
//! reduced ratio of the two scales, so `t → Gt` divides by exactly `1e9` and
//! `t/TJ → kg/MWh` multiplies by exactly `3.6`.
//!
//! `ton` is read as the metric tonne: the databases this tool consumes report
//! every mass in metric units.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Failures raised while parsing or converting units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// The expression names a unit the registry does not know.
    #[error("unknown unit '{0}'")]
    Unknown(String),

    /// The expression is not a sequence of `*`, `.` or `/` separated factors.
    #[error("malformed unit expression '{0}'")]
    Malformed(String),

    /// Source and target units measure different things.
    #[error("cannot convert '{from}' to '{to}': incompatible dimensions")]
    Incompatible { from: String, to: String },

    /// The exact scale no longer fits in 128 bits.
    #[error("scale overflow while evaluating '{0}'")]
    Overflow(String),
}

/// SI prefixes with their decimal exponents, two-letter prefixes first.
const SI_PREFIXES: &[(&str, i32)] = &[
    ("da", 1),
    ("Y", 24),
    ("Z", 21),
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
    ("h", 2),
    ("d", -1),
    ("c", -2),
    ("m", -3),
    ("μ", -6),
    ("u", -6),
    ("n", -9),
];

/// Base symbols that accept an SI prefix.
const PREFIXABLE: &[&str] = &["g", "t", "ton", "tonne", "J", "Wh", "W", "m", "s", "EUR"];

/// Dimensional exponents over the base quantities the tool deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimensions {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
    pub currency: i8,
}

impl Dimensions {
    pub const NONE: Dimensions = Dimensions {
        mass: 0,
        length: 0,
        time: 0,
        currency: 0,
    };
    pub const MASS: Dimensions = Dimensions {
        mass: 1,
        ..Dimensions::NONE
    };
    pub const LENGTH: Dimensions = Dimensions {
        length: 1,
        ..Dimensions::NONE
    };
    pub const TIME: Dimensions = Dimensions {
        time: 1,
        ..Dimensions::NONE
    };
    pub const CURRENCY: Dimensions = Dimensions {
        currency: 1,
        ..Dimensions::NONE
    };
    pub const ENERGY: Dimensions = Dimensions {
        mass: 1,
        length: 2,
        time: -2,
        currency: 0,
    };
    pub const POWER: Dimensions = Dimensions {
        mass: 1,
        length: 2,
        time: -3,
        currency: 0,
    };

    /// `self + other * exponent`, or `None` when an exponent leaves `i8`.
    fn checked_scaled_add(self, other: Dimensions, exponent: i8) -> Option<Dimensions> {
        let term = |lhs: i8, rhs: i8| rhs.checked_mul(exponent).and_then(|rhs| lhs.checked_add(rhs));
        Some(Dimensions {
            mass: term(self.mass, other.mass)?,
            length: term(self.length, other.length)?,
            time: term(self.time, other.time)?,
            currency: term(self.currency, other.currency)?,
        })
    }
}

/// Exact positive rational scale, always stored in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    /// Multiplicative identity.
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    /// Builds a ratio from a non-zero numerator and denominator.
    pub fn new(num: u128, den: u128) -> Self {
        debug_assert!(num > 0 && den > 0, "ratio terms must be positive");
        let divisor = gcd(num, den);
        Ratio {
            num: num / divisor,
            den: den / divisor,
        }
    }

    /// `10^exponent` as an exact ratio.
    pub fn power_of_ten(exponent: i32) -> Self {
        let magnitude = 10u128.pow(exponent.unsigned_abs());
        if exponent >= 0 {
            Ratio::new(magnitude, 1)
        } else {
            Ratio::new(1, magnitude)
        }
    }

    pub fn recip(self) -> Self {
        Ratio {
            num: self.den,
            den: self.num,
        }
    }

    /// `None` when the reduced product overflows.
    pub fn checked_mul(self, other: Ratio) -> Option<Ratio> {
        let lhs = gcd(self.num, other.den);
        let rhs = gcd(other.num, self.den);
        let num = (self.num / lhs).checked_mul(other.num / rhs)?;
        let den = (self.den / rhs).checked_mul(other.den / lhs)?;
        Some(Ratio { num, den })
    }

    pub fn checked_div(self, other: Ratio) -> Option<Ratio> {
        self.checked_mul(other.recip())
    }

    /// Integer power; negative exponents invert first.
    pub fn checked_pow(self, exponent: i8) -> Option<Ratio> {
        let base = if exponent < 0 { self.recip() } else { self };
        let mut result = Ratio::ONE;
        for _ in 0..exponent.unsigned_abs() {
            result = result.checked_mul(base)?;
        }
        Some(result)
    }

    /// Lossy floating point value of the ratio.
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Scales `value` by the ratio. Pure divisions and pure multiplications
    /// use the exact integer term so `x / 1e9` is reproduced bit for bit.
    pub fn apply(&self, value: f64) -> f64 {
        if self.num == 1 {
            value / self.den as f64
        } else if self.den == 1 {
            value * self.num as f64
        } else {
            value * self.as_f64()
        }
    }
}

fn gcd(mut lhs: u128, mut rhs: u128) -> u128 {
    while rhs != 0 {
        let remainder = lhs % rhs;
        lhs = rhs;
        rhs = remainder;
    }
    lhs
}

/// A parsed unit expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    symbol: String,
    dims: Dimensions,
    scale: Ratio,
}

impl Unit {
    /// Parses expressions made of factors joined by `*`, `.` or `/`, each
    /// factor optionally raised to an integer power with `^`.
    pub fn parse(expression: &str) -> Result<Self, UnitError> {
        let symbol = expression.trim();
        if symbol.is_empty() {
            return Err(UnitError::Malformed(expression.to_string()));
        }

        let mut dims = Dimensions::NONE;
        let mut scale = Ratio::ONE;
        let mut dividing = false;
        let mut rest = symbol;

        loop {
            let end = rest.find(['*', '.', '/']).unwrap_or(rest.len());
            let term = rest[..end].trim();
            if term.is_empty() {
                return Err(UnitError::Malformed(symbol.to_string()));
            }

            let (base, exponent) = match term.split_once('^') {
                Some((base, exponent)) => {
                    let exponent = exponent
                        .trim()
                        .parse::<i8>()
                        .map_err(|_| UnitError::Malformed(symbol.to_string()))?;
                    (base.trim(), exponent)
                }
                None => (term, 1),
            };
            let overflow = || UnitError::Overflow(symbol.to_string());
            let exponent = if dividing {
                exponent.checked_neg().ok_or_else(overflow)?
            } else {
                exponent
            };

            let (base_dims, base_scale) = resolve_symbol(base)?;
            dims = dims
                .checked_scaled_add(base_dims, exponent)
                .ok_or_else(overflow)?;
            scale = base_scale
                .checked_pow(exponent)
                .and_then(|factor| scale.checked_mul(factor))
                .ok_or_else(overflow)?;

            if end == rest.len() {
                break;
            }
            dividing = rest[end..].starts_with('/');
            rest = &rest[end + 1..];
        }

        Ok(Unit {
            symbol: symbol.to_string(),
            dims,
            scale,
        })
    }

    /// Dimensional exponents of the unit.
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Scale relative to the coherent unit of the same dimensions.
    pub fn scale(&self) -> Ratio {
        self.scale
    }

    /// Exact factor converting a value in `self` into a value in `target`.
    pub fn conversion_factor(&self, target: &Unit) -> Result<Ratio, UnitError> {
        if self.dims != target.dims {
            return Err(UnitError::Incompatible {
                from: self.symbol.clone(),
                to: target.symbol.clone(),
            });
        }
        self.scale
            .checked_div(target.scale)
            .ok_or_else(|| UnitError::Overflow(format!("{} -> {}", self.symbol, target.symbol)))
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Unit::parse(value)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

fn resolve_symbol(name: &str) -> Result<(Dimensions, Ratio), UnitError> {
    if let Some(resolved) = exact_symbol(name) {
        return Ok(resolved);
    }

    for (prefix, exponent) in SI_PREFIXES {
        if let Some(base) = name.strip_prefix(prefix) {
            if !PREFIXABLE.contains(&base) {
                continue;
            }
            if let Some((dims, scale)) = exact_symbol(base) {
                let scale = scale
                    .checked_mul(Ratio::power_of_ten(*exponent))
                    .ok_or_else(|| UnitError::Overflow(name.to_string()))?;
                return Ok((dims, scale));
            }
        }
    }

    Err(UnitError::Unknown(name.to_string()))
}

fn exact_symbol(name: &str) -> Option<(Dimensions, Ratio)> {
    let resolved = match name {
        "1" => (Dimensions::NONE, Ratio::ONE),
        "g" | "gram" => (Dimensions::MASS, Ratio::ONE),
        "t" | "tonne" | "tonnes" | "ton" | "tons" => (Dimensions::MASS, Ratio::new(1_000_000, 1)),
        "m" => (Dimensions::LENGTH, Ratio::ONE),
        "s" => (Dimensions::TIME, Ratio::ONE),
        "min" => (Dimensions::TIME, Ratio::new(60, 1)),
        "h" | "hr" | "hour" => (Dimensions::TIME, Ratio::new(3_600, 1)),
        "day" => (Dimensions::TIME, Ratio::new(86_400, 1)),
        "yr" | "year" => (Dimensions::TIME, Ratio::new(31_557_600, 1)),
        // 1 J = 1 kg m^2 s^-2 = 1000 g m^2 s^-2
        "J" => (Dimensions::ENERGY, Ratio::new(1_000, 1)),
        "Wh" => (Dimensions::ENERGY, Ratio::new(3_600_000, 1)),
        "W" => (Dimensions::POWER, Ratio::new(1_000, 1)),
        "EUR" => (Dimensions::CURRENCY, Ratio::ONE),
        _ => return None,
    };
    Some(resolved)
}

/// A value tagged with its unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    value: f64,
    unit: Unit,
}

impl Quantity {
    /// Tags `value` with a parsed unit.
    pub fn new(value: f64, unit: &str) -> Result<Self, UnitError> {
        Ok(Quantity {
            value,
            unit: Unit::parse(unit)?,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Converts the quantity into `target`.
    pub fn to(&self, target: &str) -> Result<Quantity, UnitError> {
        let target = Unit::parse(target)?;
        let factor = self.unit.conversion_factor(&target)?;
        Ok(Quantity {
            value: factor.apply(self.value),
            unit: target,
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(precision) => write!(f, "{:.*} {}", precision, self.value, self.unit),
            None => write!(f, "{} {}", self.value, self.unit),
        }
    }
}
