//! # Column Value Representation
//!
//! `Value` is the heap-owned runtime value stored in row versions and index
//! keys. Row versions are immutable and shared across snapshots, so values
//! own their data rather than borrowing from pages.
//!
//! ## Two Comparisons
//!
//! Values are compared in two different ways and the distinction matters:
//!
//! - [`Value::compare`] follows SQL semantics: NULL compared to anything is
//!   UNKNOWN (`None`). Check expressions and evaluators use this.
//! - `Ord` is a *total* order used for index keys. NULL sorts first, numbers
//!   compare across Int/Float/Decimal, floats use IEEE total ordering, and
//!   values of unrelated types order by a fixed type rank. Int and Decimal
//!   meet Float without rounding their integral part. `Eq` is derived from
//!   this order, so `Int(1) == Float(1.0)` as a key component.
//!
//! ## Cross-Type Rank
//!
//! ```text
//! Null < Bool < numeric (Int/Float/Decimal) < Text < Blob
//!      < Date < Time < Timestamp < Uuid
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since midnight.
    Time(i64),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
    Decimal(i128, i16),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) | Value::Decimal(_, _) => 2,
            Value::Text(_) => 3,
            Value::Blob(_) => 4,
            Value::Date(_) => 5,
            Value::Time(_) => 6,
            Value::Timestamp(_) => 7,
            Value::Uuid(_) => 8,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(digits, scale) => Some(decimal_to_f64(*digits, *scale)),
            _ => None,
        }
    }

    /// Compares two values with SQL NULL semantics.
    /// Returns None if either value is NULL (SQL UNKNOWN) or the types are
    /// not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Float(a), _) if a.is_nan() => None,
            (_, Value::Float(b)) if b.is_nan() => None,
            _ if self.type_rank() == other.type_rank() => Some(self.total_cmp(other)),
            _ => None,
        }
    }

    fn total_cmp(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Decimal(ad, asc), Value::Decimal(bd, bsc)) => {
                compare_decimals(*ad, *asc, *bd, *bsc)
            }
            (Value::Int(a), Value::Decimal(bd, bsc)) => compare_decimals(*a as i128, 0, *bd, *bsc),
            (Value::Decimal(ad, asc), Value::Int(b)) => compare_decimals(*ad, *asc, *b as i128, 0),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => compare_exact_float(*a as i128, 0.0, *b),
            (Value::Float(a), Value::Int(b)) => compare_exact_float(*b as i128, 0.0, *a).reverse(),
            (Value::Decimal(ad, asc), Value::Float(b)) => compare_decimal_float(*ad, *asc, *b),
            (Value::Float(a), Value::Decimal(bd, bsc)) => compare_decimal_float(*bd, *bsc, *a).reverse(),
            _ => {
                // mixed numeric kinds involving a float
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
        }
    }
}

fn decimal_to_f64(digits: i128, scale: i16) -> f64 {
    if scale >= 0 {
        digits as f64 / 10f64.powi(scale as i32)
    } else {
        digits as f64 * 10f64.powi(-(scale as i32))
    }
}

/// 2^127; every float at or beyond it lies outside the i128 range.
const I128_FLOAT_LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;

/// Orders the exact number `whole + frac` against a float. `frac` lies in
/// (-1, 1) with the sign of the number, so only the fractional parts ever
/// meet in floating point. Consistent with `f64::total_cmp` among floats:
/// zero sits above -0.0, positive NaN above everything.
fn compare_exact_float(whole: i128, frac: f64, b: f64) -> Ordering {
    if b.is_nan() {
        return if b.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if b >= I128_FLOAT_LIMIT {
        return Ordering::Less;
    }
    if b < -I128_FLOAT_LIMIT {
        return Ordering::Greater;
    }
    let b_whole = b.trunc();
    whole
        .cmp(&(b_whole as i128))
        .then_with(|| frac.partial_cmp(&(b - b_whole)).unwrap_or(Ordering::Equal))
        .then_with(|| {
            if b == 0.0 && b.is_sign_negative() {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
}

fn compare_decimal_float(digits: i128, scale: i16, b: f64) -> Ordering {
    let split = if scale <= 0 {
        10i128
            .checked_pow(-(scale as i32) as u32)
            .and_then(|m| digits.checked_mul(m))
            .map(|whole| (whole, 0.0))
    } else {
        10i128
            .checked_pow(scale as u32)
            .map(|p| (digits / p, (digits % p) as f64 / p as f64))
    };
    match split {
        Some((whole, frac)) => compare_exact_float(whole, frac, b),
        None => decimal_to_f64(digits, scale).total_cmp(&b),
    }
}

fn compare_decimals(ad: i128, asc: i16, bd: i128, bsc: i16) -> Ordering {
    let target = asc.max(bsc);
    let rescale = |digits: i128, scale: i16| -> Option<i128> {
        let shift = (target - scale) as u32;
        10i128.checked_pow(shift).and_then(|m| digits.checked_mul(m))
    };
    match (rescale(ad, asc), rescale(bd, bsc)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => decimal_to_f64(ad, asc).total_cmp(&decimal_to_f64(bd, bsc)),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Blob(b) => write!(f, "<blob:{} bytes>", b.len()),
            Value::Date(d) => write!(f, "date({})", d),
            Value::Time(t) => write!(f, "time({})", t),
            Value::Timestamp(ts) => write!(f, "timestamp({})", ts),
            Value::Uuid(u) => {
                for b in u {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Decimal(digits, scale) => {
                if *scale <= 0 {
                    write!(f, "{}", digits)
                } else {
                    let divisor = 10i128.pow(*scale as u32);
                    let int_part = digits / divisor;
                    let frac_part = (digits % divisor).abs();
                    let sign = if *digits < 0 && int_part == 0 { "-" } else { "" };
                    write!(
                        f,
                        "{}{}.{:0>width$}",
                        sign,
                        int_part,
                        frac_part,
                        width = *scale as usize
                    )
                }
            }
        }
    }
}
