//! Kubernetes resource quantity arithmetic
//!
//! Parses quantity strings ("100m", "1.5", "128Mi", "1e3") into an exact
//! integer count of nano-units so that requests, limits and storage sizes can
//! be ordered and compared by value rather than by spelling.

use std::cmp::Ordering;
use std::fmt;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::Error;

/// Scale of the internal representation (1 unit = 10^9 nano-units)
const NANO_EXPONENT: i32 = 9;

/// Binary SI suffixes and their power-of-two exponent
const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

/// Decimal SI suffixes and their power-of-ten exponent
const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// A parsed quantity, exact to the nano-unit
///
/// Values finer than a nano-unit are rounded up, matching how the API server
/// canonicalizes quantities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedQuantity {
    nanos: i128,
}

impl ParsedQuantity {
    /// Parse a quantity string
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(Error::quantity(raw, "empty quantity"));
        }

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_end = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);

        let (mantissa, fraction_digits) = parse_decimal(raw, number)?;
        let (exp10, exp2) = parse_suffix(raw, suffix)?;

        let scale = NANO_EXPONENT
            .checked_add(exp10)
            .and_then(|s| s.checked_sub(fraction_digits))
            .ok_or_else(|| Error::quantity(raw, "value out of range"))?;
        let mut nanos = mantissa;
        if exp2 > 0 {
            nanos = nanos
                .checked_mul(1i128 << exp2)
                .ok_or_else(|| Error::quantity(raw, "value out of range"))?;
        }
        nanos = apply_scale(raw, nanos, scale)?;

        Ok(Self {
            nanos: if negative { -nanos } else { nanos },
        })
    }

    /// Parse a `k8s-openapi` quantity
    pub fn from_quantity(q: &Quantity) -> Result<Self, Error> {
        Self::parse(&q.0)
    }

    /// Value in nano-units
    pub fn as_nanos(&self) -> i128 {
        self.nanos
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}n", self.nanos)
    }
}

impl std::str::FromStr for ParsedQuantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse "123", "1.5", ".5" into (digits-as-integer, number of fraction digits)
fn parse_decimal(raw: &str, number: &str) -> Result<(i128, i32), Error> {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(Error::quantity(raw, "missing numeric value"));
    }
    if frac_part.contains('.') {
        return Err(Error::quantity(raw, "more than one decimal point"));
    }

    let mut mantissa: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let digit = c
            .to_digit(10)
            .ok_or_else(|| Error::quantity(raw, "invalid digit"))?;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit)))
            .ok_or_else(|| Error::quantity(raw, "value out of range"))?;
    }
    let fraction_digits = i32::try_from(frac_part.len())
        .map_err(|_| Error::quantity(raw, "value out of range"))?;
    Ok((mantissa, fraction_digits))
}

/// Map a suffix to (power-of-ten, power-of-two) exponents
fn parse_suffix(raw: &str, suffix: &str) -> Result<(i32, u32), Error> {
    if suffix.is_empty() {
        return Ok((0, 0));
    }
    if let Some((_, exp)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((0, *exp));
    }
    if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((*exp, 0));
    }
    if let Some(exponent) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    {
        let exp: i32 = exponent
            .parse()
            .map_err(|_| Error::quantity(raw, format!("invalid exponent '{suffix}'")))?;
        return Ok((exp, 0));
    }
    Err(Error::quantity(raw, format!("unknown suffix '{suffix}'")))
}

/// Multiply or divide by a power of ten, rounding up on division
fn apply_scale(raw: &str, value: i128, scale: i32) -> Result<i128, Error> {
    let out_of_range = || Error::quantity(raw, "value out of range");
    match scale.cmp(&0) {
        Ordering::Equal => Ok(value),
        Ordering::Greater => {
            let factor = 10i128.checked_pow(scale as u32).ok_or_else(out_of_range)?;
            value.checked_mul(factor).ok_or_else(out_of_range)
        }
        Ordering::Less => {
            let divisor = match 10i128.checked_pow(scale.unsigned_abs()) {
                Some(d) => d,
                // Anything this small rounds up to a single nano-unit
                None => return Ok(if value > 0 { 1 } else { 0 }),
            };
            let quotient = value / divisor;
            Ok(if value % divisor > 0 {
                quotient + 1
            } else {
                quotient
            })
        }
    }
}

/// Compare two quantities by value, falling back to string equality when
/// either side cannot be parsed
pub fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (
        ParsedQuantity::from_quantity(a),
        ParsedQuantity::from_quantity(b),
    ) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.0.trim() == b.0.trim(),
    }
}
