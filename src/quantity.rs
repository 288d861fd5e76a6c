//! Unit-aware comparison of Kubernetes resource quantities.
//!
//! The API server accepts many spellings of the same amount (`2`, `2000m`,
//! `2e0`; `1Gi`, `1024Mi`) and may hand back a different spelling than the
//! one written. Quantities are therefore compared by value, never as text.

use crate::error::{ProvisionError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

const NANO_EXPONENT: i32 = 9;

/// A quantity normalized to an exact count of nano-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParsedQuantity {
    nanos: i128,
}

impl ParsedQuantity {
    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }
}

enum Suffix {
    Decimal(i32),
    Binary(u32),
}

/// Parse a quantity string following the Kubernetes quantity grammar.
pub fn parse(input: &str) -> Result<ParsedQuantity> {
    let invalid = || ProvisionError::Validation(format!("invalid quantity {:?}", input));

    let (negative, rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        Some(_) => (false, input),
        None => return Err(invalid()),
    };

    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_len);

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.contains('.') {
        return Err(invalid());
    }

    let mut mantissa: i128 = 0;
    for digit in whole.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit - b'0')))
            .ok_or_else(invalid)?;
    }
    let scale = i32::try_from(fraction.len()).map_err(|_| invalid())?;

    let magnitude = match parse_suffix(suffix).ok_or_else(invalid)? {
        Suffix::Decimal(exponent) => {
            let exponent = exponent
                .checked_add(NANO_EXPONENT)
                .and_then(|e| e.checked_sub(scale))
                .ok_or_else(invalid)?;
            scale_by_ten(mantissa, exponent).ok_or_else(invalid)?
        }
        Suffix::Binary(shift) => {
            let shifted = mantissa
                .checked_mul(1i128 << shift)
                .ok_or_else(invalid)?;
            let exponent = NANO_EXPONENT.checked_sub(scale).ok_or_else(invalid)?;
            scale_by_ten(shifted, exponent).ok_or_else(invalid)?
        }
    };

    Ok(ParsedQuantity {
        nanos: if negative { -magnitude } else { magnitude },
    })
}

fn parse_suffix(suffix: &str) -> Option<Suffix> {
    let parsed = match suffix {
        "" => Suffix::Decimal(0),
        "n" => Suffix::Decimal(-9),
        "u" => Suffix::Decimal(-6),
        "m" => Suffix::Decimal(-3),
        "k" => Suffix::Decimal(3),
        "M" => Suffix::Decimal(6),
        "G" => Suffix::Decimal(9),
        "T" => Suffix::Decimal(12),
        "P" => Suffix::Decimal(15),
        "E" => Suffix::Decimal(18),
        "Ki" => Suffix::Binary(10),
        "Mi" => Suffix::Binary(20),
        "Gi" => Suffix::Binary(30),
        "Ti" => Suffix::Binary(40),
        "Pi" => Suffix::Binary(50),
        "Ei" => Suffix::Binary(60),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            if exponent.is_empty() || exponent == "-" || exponent == "+" {
                return None;
            }
            Suffix::Decimal(exponent.parse().ok()?)
        }
    };
    Some(parsed)
}

/// Multiply by 10^exponent, rounding sub-nano remainders up.
fn scale_by_ten(value: i128, exponent: i32) -> Option<i128> {
    if exponent >= 0 {
        value.checked_mul(10i128.checked_pow(exponent as u32)?)
    } else {
        let divisor = 10i128.checked_pow(exponent.unsigned_abs())?;
        let quotient = value / divisor;
        if value % divisor == 0 {
            Some(quotient)
        } else {
            quotient.checked_add(1)
        }
    }
}

/// Parse and reject negative values; used for operator-supplied limits.
pub fn parse_limit(name: &str, input: &str) -> Result<Quantity> {
    let parsed = parse(input)
        .map_err(|_| ProvisionError::Validation(format!("invalid {} quantity {:?}", name, input)))?;
    if parsed.is_negative() || parsed.is_zero() {
        return Err(ProvisionError::Validation(format!(
            "{} must be greater than zero, got {:?}",
            name, input
        )));
    }
    Ok(Quantity(input.to_string()))
}

/// Compare two quantities by value. Unparseable values fall back to text.
pub fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (parse(&a.0), parse(&b.0)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.0 == b.0,
    }
}

/// Compare two resource lists: same keys, semantically equal values.
///
/// An absent list and an empty list are equal.
pub fn resource_lists_equal(
    a: Option<&BTreeMap<String, Quantity>>,
    b: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);

    a.len() == b.len()
        && a.iter().all(|(key, value)| {
            b.get(key)
                .is_some_and(|other| quantities_equal(value, other))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn test_cpu_equivalence() {
        assert!(quantities_equal(&q("2"), &q("2000m")));
        assert!(quantities_equal(&q("500m"), &q("0.5")));
        assert!(quantities_equal(&q("1e3"), &q("1k")));
        assert!(!quantities_equal(&q("2"), &q("2001m")));
    }

    #[test]
    fn test_memory_equivalence() {
        assert!(quantities_equal(&q("1Gi"), &q("1024Mi")));
        assert!(quantities_equal(&q("1Ki"), &q("1024")));
        assert!(quantities_equal(&q("1.5Gi"), &q("1536Mi")));
        assert!(!quantities_equal(&q("1G"), &q("1Gi")));
        assert!(quantities_equal(&q("1G"), &q("1000M")));
    }

    #[test]
    fn test_exponent_forms() {
        assert_eq!(parse("1E6").unwrap(), parse("1M").unwrap());
        assert_eq!(parse("12e-3").unwrap(), parse("12m").unwrap());
        assert_eq!(parse("1E").unwrap(), parse("1e18").unwrap());
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "abc", "2x", "1.2.3", "Gi", "-", "1e", "1Gib", "."] {
            assert!(parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_out_of_range_exponent_is_rejected() {
        for bad in ["1e2147483647", "1E2147483640", "1e-2147483648", "0.5e-2147483648"] {
            assert!(parse(bad).is_err(), "{:?} should not parse", bad);
        }
        assert!(parse_limit("cpu", "1e2147483647").is_err());
    }

    #[test]
    fn test_signs() {
        assert!(parse("-1").unwrap().is_negative());
        assert_eq!(parse("+1").unwrap(), parse("1").unwrap());
        assert!(parse("0").unwrap().is_zero());
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("cpu", "4").unwrap(), q("4"));
        assert!(parse_limit("cpu", "four").is_err());
        assert!(parse_limit("memory", "-1Gi").is_err());
        assert!(parse_limit("memory", "0").is_err());
    }

    #[test]
    fn test_resource_lists_equal() {
        let mut a = BTreeMap::new();
        a.insert("limits.cpu".to_string(), q("2"));
        a.insert("limits.memory".to_string(), q("2Gi"));

        let mut b = BTreeMap::new();
        b.insert("limits.cpu".to_string(), q("2000m"));
        b.insert("limits.memory".to_string(), q("2048Mi"));
        assert!(resource_lists_equal(Some(&a), Some(&b)));

        b.insert("pods".to_string(), q("10"));
        assert!(!resource_lists_equal(Some(&a), Some(&b)));

        assert!(resource_lists_equal(None, Some(&BTreeMap::new())));
    }
}
