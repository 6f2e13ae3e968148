use num_bigint::BigUint;

use crate::error::JsError;
use crate::types::{JsString, WHITESPACE, number_ops};

const BASE: u64 = 10_000_000;
const LIMBS: usize = 6;

/// Non-negative integer in base 10^7, least significant limb first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BigDecimal {
    limbs: [u64; LIMBS],
}

impl BigDecimal {
    /// `self = self * n + carry`
    fn multiply(&mut self, n: u64, carry: u64) {
        let mut c = carry;
        for limb in self.limbs.iter_mut() {
            c += n * *limb;
            *limb = c % BASE;
            c /= BASE;
        }
    }

    /// `self = floor(self / n)`
    fn divide(&mut self, n: u64) {
        let mut c = 0;
        for limb in self.limbs.iter_mut().rev() {
            c += *limb;
            *limb = c / n;
            c = (c % n) * BASE;
        }
    }

    fn to_digits(self) -> String {
        let mut s = String::new();
        for (i, limb) in self.limbs.iter().enumerate().rev() {
            if s.is_empty() {
                if *limb != 0 || i == 0 {
                    s = limb.to_string();
                }
            } else {
                s.push_str(&format!("{limb:07}"));
            }
        }
        s
    }
}

/// Splits a finite positive double into `(mantissa, exponent)` with
/// `x == mantissa * 2^exponent` exactly.
fn decompose(x: f64) -> (u64, i32) {
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1 << 52) - 1);
    if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1 << 52), biased - 1075)
    }
}

/// `Number.prototype.toFixed` on a plain number.
///
/// Ties round away from zero on the exact binary value, so `1.005` (stored
/// as 1.00499999999999989...) gives `"1.00"`. A result whose digits are all
/// zero carries no sign.
pub fn to_fixed(x: f64, fraction_digits: i32) -> Result<String, JsError> {
    if !(0..=20).contains(&fraction_digits) {
        return Err(JsError::range_error(
            "toFixed() digits argument must be between 0 and 20",
        ));
    }
    if x.is_nan() {
        return Ok("NaN".to_string());
    }
    if x.abs() >= 1e21 {
        return Ok(number_ops::to_string(x));
    }

    let f = fraction_digits as usize;
    let negative = x < 0.0;
    let x = x.abs();

    let mut digits = String::from("0");
    if x > 1e-21 {
        let (mantissa, exponent) = decompose(x);
        let mut n = BigDecimal::default();
        n.multiply(0, mantissa);
        if exponent < 0 {
            let mut j = f;
            while j >= 7 {
                n.multiply(BASE, 0);
                j -= 7;
            }
            n.multiply(10u64.pow(j as u32), 0);
            // divide by 2^(shift - 1), then add one and halve: round half up
            let mut j = (-exponent - 1) as u32;
            while j >= 23 {
                n.divide(1 << 23);
                j -= 23;
            }
            n.divide(1 << j);
            n.multiply(1, 1);
            n.divide(2);
            digits = n.to_digits();
        } else {
            n.multiply(1 << exponent, 0);
            digits = n.to_digits();
            digits.push_str(&"0".repeat(f));
        }
    }

    let sign = if negative && digits.bytes().any(|b| b != b'0') {
        "-"
    } else {
        ""
    };
    if f == 0 {
        return Ok(format!("{sign}{digits}"));
    }
    let k = digits.len();
    Ok(if k <= f {
        format!("{sign}0.{}{digits}", "0".repeat(f - k))
    } else {
        format!("{sign}{}.{}", &digits[..k - f], &digits[k - f..])
    })
}

/// Every significant decimal digit of a finite positive double, and the
/// power of ten of the last one.
fn exact_digits(x: f64) -> (String, i32) {
    let (mantissa, exponent) = decompose(x);
    if exponent >= 0 {
        ((BigUint::from(mantissa) << exponent as usize).to_string(), 0)
    } else {
        let k = exponent.unsigned_abs();
        let scaled = BigUint::from(mantissa) * BigUint::from(5u32).pow(k);
        (scaled.to_string(), exponent)
    }
}

/// `Number.prototype.toPrecision` on a plain number. `precision` is the
/// integral argument, `None` when it was `undefined`.
pub fn to_precision(x: f64, precision: Option<f64>) -> Result<String, JsError> {
    let Some(p) = precision else {
        return Ok(number_ops::to_string(x));
    };
    if !x.is_finite() {
        return Ok(number_ops::to_string(x));
    }
    if !(1.0..=100.0).contains(&p) {
        return Err(JsError::range_error(
            "toPrecision() argument must be between 1 and 100",
        ));
    }
    let p = p as usize;
    let sign = if x < 0.0 { "-" } else { "" };
    let x = x.abs();

    let (digits, e) = if x == 0.0 {
        ("0".repeat(p), 0)
    } else {
        let (all, last_power) = exact_digits(x);
        let mut e = all.len() as i32 - 1 + last_power;
        let digits = if all.len() <= p {
            format!("{all:0<p$}")
        } else {
            // round half up on the exact expansion
            let mut kept = all[..p].parse::<BigUint>().unwrap_or_default();
            if all.as_bytes()[p] >= b'5' {
                kept += 1u32;
            }
            let mut kept = kept.to_string();
            if kept.len() > p {
                kept.truncate(p);
                e += 1;
            }
            kept
        };
        (digits, e)
    };

    if e < -6 || e >= p as i32 {
        let mut out = format!("{sign}{}", &digits[..1]);
        if p > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let exp_sign = if e >= 0 { "+" } else { "-" };
        out.push_str(&format!("e{exp_sign}{}", e.unsigned_abs()));
        return Ok(out);
    }
    Ok(if e == p as i32 - 1 {
        format!("{sign}{digits}")
    } else if e >= 0 {
        let split = e as usize + 1;
        format!("{sign}{}.{}", &digits[..split], &digits[split..])
    } else {
        format!("{sign}0.{}{digits}", "0".repeat((-(e + 1)) as usize))
    })
}

fn trim_start(s: &JsString) -> String {
    let units = &s.code_units;
    let start = units.iter().position(|u| !WHITESPACE.contains(u)).unwrap_or(units.len());
    String::from_utf16_lossy(&units[start..])
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
}

/// Global `parseInt`. `radix` is the already converted Number argument.
pub fn parse_int(input: &JsString, radix: f64) -> f64 {
    let s = trim_start(input);
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s.as_str()),
    };
    let mut radix = to_int32(radix);
    let mut strip_prefix = true;
    if radix != 0 {
        if !(2..=36).contains(&radix) {
            return f64::NAN;
        }
        strip_prefix = radix == 16;
    } else {
        radix = 10;
    }
    let s = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(rest) if strip_prefix => {
            radix = 16;
            rest
        }
        _ => s,
    };
    let radix = radix as u32;
    let end = s.find(|c: char| !c.is_digit(radix)).unwrap_or(s.len());
    let z = &s[..end];
    if z.is_empty() {
        return f64::NAN;
    }
    let value = if radix == 10 {
        z.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        z.chars()
            .filter_map(|c| c.to_digit(radix))
            .fold(0.0, |acc, d| acc * radix as f64 + d as f64)
    };
    if negative { -value } else { value }
}

/// Global `parseFloat`: the longest prefix that is a decimal literal.
pub fn parse_float(input: &JsString) -> f64 {
    let s = trim_start(input);
    let bytes = s.as_bytes();
    let mut pos = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        pos = 1;
    }
    if s[pos..].starts_with("Infinity") {
        return if bytes.first() == Some(&b'-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };
    let int_end = digits_from(pos);
    let mut end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if frac_end > end + 1 || int_end > pos {
            end = frac_end;
        }
    }
    if end == pos {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut i = end + 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_end = digits_from(i);
        if exp_end > i {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}
