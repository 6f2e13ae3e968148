use std::rc::Rc;

use crate::bootstrap::InstallStep;
use crate::error::JsError;
use crate::number::{parse_float, parse_int, to_fixed, to_precision};
use crate::object::{NativeFn, PropertyAttributes};
use crate::realm::Realm;
use crate::types::{JsString, JsValue, WHITESPACE, number_ops, to_number};

fn this_number_value(this: &JsValue) -> Option<f64> {
    match this {
        JsValue::Number(n) => Some(*n),
        JsValue::Object(o) if o.class_name() == "Number" => match o.primitive_value() {
            Some(JsValue::Number(n)) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::Undefined)
}

/// True when the existing `toFixed` mis-rounds any of the classic cases.
fn to_fixed_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let cases: [(f64, f64, &str); 4] = [
        (0.00008, 3.0, "0.000"),
        (0.9, 0.0, "1"),
        (1.255, 2.0, "1.25"),
        (1000000000000000128.0, 0.0, "1000000000000000128"),
    ];
    for (x, digits, expected) in cases {
        let got = realm.call(existing, &JsValue::Number(x), &[JsValue::Number(digits)])?;
        if got.as_rust_string().as_deref() != Some(expected) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Replace when `toPrecision(undefined)` throws or does not fall back to
/// `ToString`.
fn to_precision_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let out = realm.call(existing, &JsValue::Number(1.0), &[JsValue::Undefined])?;
    Ok(out.as_rust_string().as_deref() != Some("1"))
}

/// Leading whitespace must be skipped and a leading zero must not select
/// octal.
fn parse_int_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let ws = String::from_utf16_lossy(WHITESPACE);
    let eight = realm.call(existing, &JsValue::Undefined, &[JsValue::string(&format!("{ws}08"))])?;
    let hex = realm.call(existing, &JsValue::Undefined, &[JsValue::string(&format!("{ws}0x16"))])?;
    Ok(eight.as_number() != Some(8.0) || hex.as_number() != Some(22.0))
}

fn parse_float_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let out = realm.call(existing, &JsValue::Undefined, &[JsValue::string("-0")])?;
    Ok(!out.as_number().is_some_and(|n| n == 0.0 && n.is_sign_negative()))
}

fn string_arg(args: &[JsValue]) -> JsString {
    match arg(args, 0) {
        JsValue::String(s) => s,
        other => JsString::from_str(&other.to_string()),
    }
}

pub(crate) fn steps() -> Vec<InstallStep> {
    let mut steps = vec![
        InstallStep::method(
            "Number.prototype",
            "toFixed",
            1,
            Rc::new(|_realm, this, args| {
                let Some(x) = this_number_value(this) else {
                    return Err(JsError::type_error("Number.prototype.toFixed requires a Number"));
                };
                let f = number_ops::to_integer_or_infinity(to_number(&arg(args, 0)));
                // out-of-range values stay out of range after the cast
                let f = if f.is_finite() { f.clamp(-1.0, 21.0) as i32 } else { -1 };
                to_fixed(x, f).map(|s| JsValue::string(&s))
            }),
        )
        .probe("Number.prototype.toFixed", to_fixed_is_broken),
        InstallStep::method(
            "Number.prototype",
            "toPrecision",
            1,
            Rc::new(|_realm, this, args| {
                let Some(x) = this_number_value(this) else {
                    return Err(JsError::type_error("Number.prototype.toPrecision requires a Number"));
                };
                let precision = match arg(args, 0) {
                    JsValue::Undefined => None,
                    p => Some(number_ops::to_integer_or_infinity(to_number(&p))),
                };
                to_precision(x, precision).map(|s| JsValue::string(&s))
            }),
        )
        .probe("Number.prototype.toPrecision", to_precision_is_broken),
        InstallStep::method(
            "",
            "parseInt",
            2,
            Rc::new(|_realm, _this, args| {
                Ok(JsValue::Number(parse_int(&string_arg(args), to_number(&arg(args, 1)))))
            }),
        )
        .probe("parseInt", parse_int_is_broken),
        InstallStep::method(
            "",
            "parseFloat",
            1,
            Rc::new(|_realm, _this, args| Ok(JsValue::Number(parse_float(&string_arg(args))))),
        )
        .probe("parseFloat", parse_float_is_broken),
        InstallStep::alias("Number", "parseInt", "parseInt"),
        InstallStep::alias("Number", "parseFloat", "parseFloat"),
    ];

    let predicates: Vec<(&str, NativeFn)> = vec![
        (
            "isNaN",
            Rc::new(|_realm, _this, args| {
                Ok(JsValue::Boolean(matches!(args.first(), Some(JsValue::Number(n)) if n.is_nan())))
            }),
        ),
        (
            "isFinite",
            Rc::new(|_realm, _this, args| {
                Ok(JsValue::Boolean(matches!(args.first(), Some(JsValue::Number(n)) if n.is_finite())))
            }),
        ),
        (
            "isInteger",
            Rc::new(|_realm, _this, args| {
                Ok(JsValue::Boolean(
                    matches!(args.first(), Some(JsValue::Number(n)) if n.is_finite() && n.trunc() == *n),
                ))
            }),
        ),
        (
            "isSafeInteger",
            Rc::new(|_realm, _this, args| {
                Ok(JsValue::Boolean(matches!(
                    args.first(),
                    Some(JsValue::Number(n))
                        if n.is_finite() && n.trunc() == *n && n.abs() <= 9007199254740991.0
                )))
            }),
        ),
    ];
    steps.extend(
        predicates
            .into_iter()
            .map(|(name, func)| InstallStep::method("Number", name, 1, func)),
    );

    let constants: [(&str, f64); 8] = [
        ("EPSILON", f64::EPSILON),
        ("MAX_SAFE_INTEGER", 9007199254740991.0),
        ("MIN_SAFE_INTEGER", -9007199254740991.0),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ];
    steps.extend(
        constants
            .into_iter()
            .map(|(name, value)| InstallStep::constant("Number", name, value, PropertyAttributes::AS_CONST)),
    );

    let math: Vec<(&str, NativeFn)> = vec![
        (
            "sign",
            Rc::new(|_realm, _this, args| {
                let n = to_number(&arg(args, 0));
                Ok(JsValue::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() }))
            }),
        ),
        (
            "trunc",
            Rc::new(|_realm, _this, args| Ok(JsValue::Number(to_number(&arg(args, 0)).trunc()))),
        ),
    ];
    steps.extend(
        math.into_iter()
            .map(|(name, func)| InstallStep::method("Math", name, 1, func)),
    );
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(name: &str) -> InstallStep {
        steps()
            .into_iter()
            .find(|s| s.name() == name)
            .unwrap_or_else(|| panic!("no step {name}"))
    }

    fn call(realm: &Realm, step: &str, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let f = find(step).make_value(realm);
        realm.call(&f, &this, args)
    }

    #[test]
    fn to_fixed_method_coerces_arguments() {
        let realm = Realm::bare();
        let out = call(&realm, "Number.prototype.toFixed", JsValue::Number(1.005), &[JsValue::Number(2.0)])
            .unwrap();
        assert_eq!(out.as_rust_string().as_deref(), Some("1.00"));
        let out = call(&realm, "Number.prototype.toFixed", JsValue::Number(2.5), &[]).unwrap();
        assert_eq!(out.as_rust_string().as_deref(), Some("3"));
        let boxed = JsValue::Object(realm.to_object(&JsValue::Number(0.5)).unwrap());
        let out = call(&realm, "Number.prototype.toFixed", boxed, &[JsValue::string("1")]).unwrap();
        assert_eq!(out.as_rust_string().as_deref(), Some("0.5"));
        let err = call(&realm, "Number.prototype.toFixed", JsValue::string("1"), &[]).unwrap_err();
        assert!(matches!(err, JsError::Type(_)));
        let err = call(&realm, "Number.prototype.toFixed", JsValue::Number(1.0), &[JsValue::Number(f64::INFINITY)])
            .unwrap_err();
        assert!(matches!(err, JsError::Range(_)));
    }

    #[test]
    fn probe_detects_misrounding() {
        let realm = Realm::bare();
        let naive = JsValue::Object(realm.create_function(
            "toFixed",
            1,
            Rc::new(|_, this, args| {
                let x = to_number(this);
                let d = to_number(&args[0]) as usize;
                Ok(JsValue::string(&format!("{x:.d$}")))
            }),
        ));
        // std formatting rounds the exact binary expansion, which is what the probe wants
        assert!(!to_fixed_is_broken(&realm, &naive).unwrap());
        let wrong = JsValue::Object(realm.create_function(
            "toFixed",
            1,
            Rc::new(|_, _, _| Ok(JsValue::string("0.001"))),
        ));
        assert!(to_fixed_is_broken(&realm, &wrong).unwrap());
        assert!(to_fixed_is_broken(&realm, &JsValue::Undefined).is_err());
    }

    #[test]
    fn to_precision_method() {
        let realm = Realm::bare();
        let run = |x: f64, args: &[JsValue]| {
            call(&realm, "Number.prototype.toPrecision", JsValue::Number(x), args)
        };
        assert_eq!(run(1.0, &[JsValue::Undefined]).unwrap().as_rust_string().as_deref(), Some("1"));
        assert_eq!(run(0.5, &[]).unwrap().as_rust_string().as_deref(), Some("0.5"));
        let out = run(123.456, &[JsValue::string("4")]).unwrap();
        assert_eq!(out.as_rust_string().as_deref(), Some("123.5"));
        assert!(matches!(run(1.0, &[JsValue::Number(0.0)]), Err(JsError::Range(_))));
        let err = call(&realm, "Number.prototype.toPrecision", JsValue::Null, &[]).unwrap_err();
        assert!(matches!(err, JsError::Type(_)));
    }

    #[test]
    fn to_precision_probe() {
        let realm = Realm::bare();
        let mine = find("Number.prototype.toPrecision").make_value(&realm);
        assert!(!to_precision_is_broken(&realm, &mine).unwrap());
        let strict = JsValue::Object(realm.create_function(
            "toPrecision",
            1,
            Rc::new(|_, _, args| {
                if args[0].is_undefined() {
                    return Err(JsError::range_error("toPrecision() argument must be between 1 and 100"));
                }
                Ok(JsValue::string("1"))
            }),
        ));
        assert!(to_precision_is_broken(&realm, &strict).unwrap());
    }

    #[test]
    fn parse_globals_and_their_checks() {
        let realm = Realm::bare();
        let parse_int = find("parseInt").make_value(&realm);
        let parse_float = find("parseFloat").make_value(&realm);
        assert!(!parse_int_is_broken(&realm, &parse_int).unwrap());
        assert!(!parse_float_is_broken(&realm, &parse_float).unwrap());
        let out = realm
            .call(&parse_int, &JsValue::Undefined, &[JsValue::string("0x1f"), JsValue::Undefined])
            .unwrap();
        assert_eq!(out.as_number(), Some(31.0));
        let out = realm.call(&parse_float, &JsValue::Undefined, &[JsValue::Number(2.5)]).unwrap();
        assert_eq!(out.as_number(), Some(2.5));

        // an ES3 host: octal for a leading zero, no whitespace skipping
        let octal = JsValue::Object(realm.create_function(
            "parseInt",
            2,
            Rc::new(|_, _, args| {
                let s = args[0].to_string();
                let radix = if s.starts_with('0') { 8 } else { 10 };
                Ok(JsValue::Number(i64::from_str_radix(&s, radix).map_or(f64::NAN, |n| n as f64)))
            }),
        ));
        assert!(parse_int_is_broken(&realm, &octal).unwrap());
        let unsigned_zero = JsValue::Object(realm.create_function(
            "parseFloat",
            1,
            Rc::new(|_, _, _| Ok(JsValue::Number(0.0))),
        ));
        assert!(parse_float_is_broken(&realm, &unsigned_zero).unwrap());
    }

    #[test]
    fn number_parse_aliases_the_globals() {
        let realm = Realm::bare();
        for name in ["parseInt", "parseFloat"] {
            let global = find(name).make_value(&realm);
            realm.global().insert_builtin(name, global.clone());
            let alias = find(&format!("Number.{name}"));
            assert_eq!(alias.depends_on, vec![name]);
            assert!(matches!(
                (alias.make_value(&realm), global),
                (JsValue::Object(a), JsValue::Object(b)) if a.ptr_eq(&b)
            ));
        }
    }

    #[test]
    fn number_predicates() {
        let realm = Realm::bare();
        let t = |name: &str, v: f64| {
            call(&realm, name, JsValue::Undefined, &[JsValue::Number(v)])
                .map(|r| matches!(r, JsValue::Boolean(true)))
                .unwrap()
        };
        assert!(t("Number.isNaN", f64::NAN));
        assert!(!t("Number.isFinite", f64::INFINITY));
        assert!(t("Number.isInteger", 5.0));
        assert!(!t("Number.isInteger", 5.5));
        assert!(t("Number.isSafeInteger", 9007199254740991.0));
        assert!(!t("Number.isSafeInteger", 9007199254740992.0));
        let not_number = call(&realm, "Number.isNaN", JsValue::Undefined, &[JsValue::string("x")]).unwrap();
        assert!(matches!(not_number, JsValue::Boolean(false)));
    }

    #[test]
    fn math_sign_and_trunc() {
        let realm = Realm::bare();
        let n = |name: &str, v: f64| {
            call(&realm, name, JsValue::Undefined, &[JsValue::Number(v)])
                .ok()
                .and_then(|r| r.as_number())
                .unwrap()
        };
        assert_eq!(n("Math.sign", -3.0), -1.0);
        assert!(n("Math.sign", -0.0).is_sign_negative());
        assert!(n("Math.sign", f64::NAN).is_nan());
        assert_eq!(n("Math.trunc", -4.7), -4.0);
    }
}
