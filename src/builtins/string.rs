use std::rc::Rc;

use crate::bootstrap::InstallStep;
use crate::error::JsError;
use crate::realm::Realm;
use crate::types::{JsString, JsValue, WHITESPACE, number_ops, to_number};

fn this_string(this: &JsValue, method: &str) -> Result<JsString, JsError> {
    match this {
        JsValue::Undefined | JsValue::Null => Err(JsError::type_error(format!(
            "String.prototype.{method} called on null or undefined"
        ))),
        JsValue::String(s) => Ok(s.clone()),
        other => Ok(JsString::from_str(&other.to_string())),
    }
}

/// Replace unless the existing `trim` strips the whole whitespace set and
/// leaves a zero-width space alone.
fn trim_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let ws = JsValue::String(JsString::from_code_units(WHITESPACE.to_vec()));
    let trimmed = realm.call(existing, &ws, &[])?;
    if !matches!(&trimmed, JsValue::String(s) if s.is_empty()) {
        return Ok(true);
    }
    let zero_width = JsValue::String(JsString::from_code_units(vec![0x200B]));
    let kept = realm.call(existing, &zero_width, &[])?;
    Ok(!matches!(&kept, JsValue::String(s) if s.code_units == [0x200B]))
}

fn from_code_point(args: &[JsValue]) -> Result<JsValue, JsError> {
    let mut units = Vec::with_capacity(args.len());
    for arg in args {
        let n = to_number(arg);
        if n.is_nan() || n.trunc() != n || !(0.0..=1_114_111.0).contains(&n) {
            return Err(JsError::range_error(format!(
                "Invalid code point {}",
                number_ops::to_string(n)
            )));
        }
        let cp = n as u32;
        if cp < 0x10000 {
            units.push(cp as u16);
        } else {
            let v = cp - 0x10000;
            units.push(0xD800 + (v >> 10) as u16);
            units.push(0xDC00 + (v & 0x3FF) as u16);
        }
    }
    Ok(JsValue::String(JsString::from_code_units(units)))
}

fn code_point_at(this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = this_string(this, "codePointAt")?;
    let pos = number_ops::to_integer_or_infinity(args.first().map(to_number).unwrap_or(0.0));
    if pos < 0.0 || pos >= s.len() as f64 {
        return Ok(JsValue::Undefined);
    }
    let i = pos as usize;
    let first = s.code_units[i];
    if (0xD800..=0xDBFF).contains(&first)
        && let Some(&second) = s.code_units.get(i + 1)
        && (0xDC00..=0xDFFF).contains(&second)
    {
        let cp = ((first as u32 - 0xD800) << 10) + (second as u32 - 0xDC00) + 0x10000;
        return Ok(JsValue::Number(cp as f64));
    }
    Ok(JsValue::Number(first as f64))
}

pub(crate) fn steps() -> Vec<InstallStep> {
    vec![
        InstallStep::method("String", "fromCodePoint", 1, Rc::new(|_realm, _this, args| from_code_point(args))),
        InstallStep::method(
            "String.prototype",
            "codePointAt",
            1,
            Rc::new(|_realm, this, args| code_point_at(this, args)),
        ),
        InstallStep::method(
            "String.prototype",
            "trim",
            0,
            Rc::new(|_realm, this, _args| {
                let s = this_string(this, "trim")?;
                Ok(JsValue::String(s.trim()))
            }),
        )
        .probe("String.prototype.trim", trim_is_broken),
    ]
}
