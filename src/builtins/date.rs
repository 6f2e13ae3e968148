use std::rc::Rc;

use regex::Regex;

use crate::bootstrap::InstallStep;
use crate::calendar::{self, CalendarDate};
use crate::error::JsError;
use crate::object::NativeFn;
use crate::realm::Realm;
use crate::types::{JsValue, to_number};

fn this_time_value(this: &JsValue) -> Result<f64, JsError> {
    match this {
        JsValue::Object(o) if o.class_name() == "Date" => {
            Ok(o.primitive_value().map(|v| to_number(&v)).unwrap_or(f64::NAN))
        }
        _ => Err(JsError::type_error("this is not a Date object.")),
    }
}

fn date_value(realm: &Realm, t: f64) -> JsValue {
    JsValue::Object(realm.make_date(t))
}

fn string_result(v: &JsValue) -> Option<String> {
    v.as_rust_string()
}

/// A negative extended year; its UTC month is January.
const NEGATIVE_MONTH_PROBE: f64 = -3509827329600292.0;
/// `Mon, 01 Jan -45875 11:59:59 GMT`
const NEGATIVE_UTC_PROBE: f64 = -1509842289600292.0;
/// `0000-01-01` minus one year, i.e. `-000001-01-01T00:00:00.000Z`.
const NEGATIVE_ISO_PROBE: f64 = -62198755200000.0;
/// `Wed Dec 09 2015 12:00:00 UTC`
const TO_STRING_PROBE: f64 = 1449662400000.0;

/// Shared by every field getter: the host must place the negative extended
/// year test date in January.
fn getters_are_broken(realm: &Realm, _existing: &JsValue) -> Result<bool, JsError> {
    let month = realm.invoke(&date_value(realm, NEGATIVE_MONTH_PROBE), "getUTCMonth", &[])?;
    Ok(month.as_number() != Some(0.0))
}

fn to_iso_string_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let negative = realm.call(existing, &date_value(realm, NEGATIVE_ISO_PROBE), &[])?;
    if !string_result(&negative).is_some_and(|s| s.contains("-000001")) {
        return Ok(true);
    }
    let before_epoch = realm.call(existing, &date_value(realm, -1.0), &[])?;
    Ok(string_result(&before_epoch).as_deref() != Some("1969-12-31T23:59:59.999Z"))
}

fn to_json_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    if !realm.call(existing, &date_value(realm, f64::NAN), &[])?.is_null() {
        return Ok(true);
    }
    let negative = realm.call(existing, &date_value(realm, NEGATIVE_ISO_PROBE), &[])?;
    if !string_result(&negative).is_some_and(|s| s.contains("-000001")) {
        return Ok(true);
    }
    // must be generic over any object with a toISOString
    let impostor = realm.create_object();
    impostor.insert_value(
        "toISOString",
        JsValue::Object(realm.create_function(
            "toISOString",
            0,
            Rc::new(|_, _, _| Ok(JsValue::Boolean(true))),
        )),
    );
    let generic = realm.call(existing, &JsValue::Object(impostor), &[])?;
    Ok(!matches!(generic, JsValue::Boolean(true)))
}

fn to_utc_string_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let s = realm.call(existing, &date_value(realm, NEGATIVE_UTC_PROBE), &[])?;
    Ok(string_result(&s).as_deref() != Some("Mon, 01 Jan -45875 11:59:59 GMT"))
}

fn to_date_string_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let expected = if realm.time_zone().offset_at_utc(NEGATIVE_UTC_PROBE) > 720 {
        "Tue Jan 02 -45875"
    } else {
        "Mon Jan 01 -45875"
    };
    let s = realm.call(existing, &date_value(realm, NEGATIVE_UTC_PROBE), &[])?;
    Ok(string_result(&s).as_deref() != Some(expected))
}

/// Shared by `toString` and `toTimeString`; checks the host's `toString`.
fn to_string_is_broken(realm: &Realm, _existing: &JsValue) -> Result<bool, JsError> {
    let day = if realm.time_zone().offset_at_utc(TO_STRING_PROBE) > 720 {
        "Thu Dec 10"
    } else {
        "Wed Dec 09"
    };
    let pattern = Regex::new(&format!(r"^{day} 2015 \d\d:\d\d:\d\d GMT[-+]\d\d\d\d(?: |$)"))
        .map_err(|e| JsError::syntax_error(e.to_string()))?;
    let s = realm.invoke(&date_value(realm, TO_STRING_PROBE), "toString", &[])?;
    Ok(!string_result(&s).is_some_and(|s| pattern.is_match(&s)))
}

fn date_parse_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let ctor = realm.get(&JsValue::Object(realm.global().clone()), "Date")?;
    let parse = |text: &str| -> Result<f64, JsError> {
        realm.call(existing, &ctor, &[JsValue::string(text)]).map(|v| to_number(&v))
    };
    if parse("+033658-09-27T01:46:40.000Z")? != 1e15 {
        return Ok(true);
    }
    for invalid in [
        "2012-04-04T24:00:00.500Z",
        "2012-11-31T23:59:59.000Z",
        "2012-12-31T23:59:60.000Z",
    ] {
        if !parse(invalid)?.is_nan() {
            return Ok(true);
        }
    }
    Ok(parse("2000-01-01T00:00:00.000Z")?.is_nan())
}

type Field = fn(&CalendarDate) -> f64;

fn getter(utc: bool, field: Field) -> NativeFn {
    Rc::new(move |realm, this, _args| {
        let t = this_time_value(this)?;
        let date = if utc {
            CalendarDate::from_time(t)
        } else {
            calendar::local_fields(t, realm.time_zone())
        };
        Ok(JsValue::Number(date.map_or(f64::NAN, |d| field(&d))))
    })
}

fn formatter(format: fn(&Realm, f64) -> String) -> NativeFn {
    Rc::new(move |realm, this, _args| {
        let t = this_time_value(this)?;
        Ok(JsValue::string(&format(realm, t)))
    })
}

pub(crate) fn steps() -> Vec<InstallStep> {
    let mut steps = Vec::new();

    let fields: [(&str, Field); 8] = [
        ("Month", |d| d.month as f64),
        ("FullYear", |d| d.year as f64),
        ("Date", |d| d.day as f64),
        ("Day", |d| d.weekday as f64),
        ("Hours", |d| d.hour as f64),
        ("Minutes", |d| d.minute as f64),
        ("Seconds", |d| d.second as f64),
        ("Milliseconds", |d| d.millisecond as f64),
    ];
    for (field, read) in fields {
        for utc in [true, false] {
            let key = if utc { format!("getUTC{field}") } else { format!("get{field}") };
            steps.push(
                InstallStep::method("Date.prototype", key, 0, getter(utc, read))
                    .probe("Date.prototype getters", getters_are_broken),
            );
        }
    }
    steps.push(InstallStep::method(
        "Date.prototype",
        "getTime",
        0,
        Rc::new(|_realm, this, _args| this_time_value(this).map(JsValue::Number)),
    ));
    steps.push(InstallStep::method(
        "Date.prototype",
        "getTimezoneOffset",
        0,
        Rc::new(|realm, this, _args| {
            let t = this_time_value(this)?;
            if !t.is_finite() {
                return Ok(JsValue::Number(f64::NAN));
            }
            Ok(JsValue::Number(-(realm.time_zone().offset_at_utc(t) as f64)))
        }),
    ));

    steps.push(
        InstallStep::method(
            "Date.prototype",
            "toISOString",
            0,
            Rc::new(|_realm, this, _args| {
                let t = this_time_value(this)?;
                calendar::to_iso_string(t).map(|s| JsValue::string(&s))
            }),
        )
        .probe("Date.prototype.toISOString", to_iso_string_is_broken),
    );
    steps.push(
        InstallStep::method(
            "Date.prototype",
            "toJSON",
            1,
            Rc::new(|realm, this, _args| {
                let obj = realm.to_object(this)?;
                let primitive = match obj.class_name().as_str() {
                    "Date" | "Number" => obj.primitive_value().map(|v| to_number(&v)),
                    _ => None,
                };
                if primitive.is_some_and(|t| !t.is_finite()) {
                    return Ok(JsValue::Null);
                }
                let receiver = JsValue::Object(obj);
                let to_iso = realm.get(&receiver, "toISOString")?;
                if !to_iso.is_callable() {
                    return Err(JsError::type_error("toISOString is not a function"));
                }
                realm.call(&to_iso, &receiver, &[])
            }),
        )
        .probe("Date.prototype.toJSON", to_json_is_broken)
        .after(&["Date.prototype.toISOString"]),
    );
    steps.push(
        InstallStep::method("Date.prototype", "toUTCString", 0, formatter(|_, t| calendar::to_utc_string(t)))
            .probe("Date.prototype.toUTCString", to_utc_string_is_broken),
    );
    steps.push(
        InstallStep::method(
            "Date.prototype",
            "toDateString",
            0,
            formatter(|realm, t| calendar::to_date_string(t, realm.time_zone())),
        )
        .probe("Date.prototype.toDateString", to_date_string_is_broken),
    );
    steps.push(
        InstallStep::method(
            "Date.prototype",
            "toString",
            0,
            formatter(|realm, t| calendar::to_date_time_string(t, realm.time_zone())),
        )
        .probe("Date.prototype.toString", to_string_is_broken),
    );
    steps.push(
        InstallStep::method(
            "Date.prototype",
            "toTimeString",
            0,
            formatter(|realm, t| calendar::to_time_string(t, realm.time_zone())),
        )
        .probe("Date.prototype.toString", to_string_is_broken),
    );

    steps.push(
        InstallStep::method(
            "Date",
            "parse",
            1,
            Rc::new(|realm, _this, args| {
                let text = args.first().map(|v| v.to_string()).unwrap_or_else(|| "undefined".to_string());
                Ok(JsValue::Number(calendar::parse_date(&text, realm.time_zone())))
            }),
        )
        .probe("Date.parse", date_parse_is_broken),
    );
    steps.push(InstallStep::method(
        "Date",
        "now",
        0,
        Rc::new(|realm, _this, _args| Ok(JsValue::Number(realm.now()))),
    ));
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalTimeZone;

    fn method(name: &str) -> NativeFn {
        let step = steps()
            .into_iter()
            .find(|s| s.name() == name)
            .unwrap_or_else(|| panic!("no step {name}"));
        step.native().expect("method step")
    }

    fn install_all(realm: &Realm) {
        let proto = realm.resolve("Date.prototype").unwrap();
        let ctor = realm.resolve("Date").unwrap();
        for step in steps() {
            let target = if step.target == "Date" { &ctor } else { &proto };
            target.insert_builtin(&step.key, step.make_value(realm));
        }
    }

    #[test]
    fn getters_read_negative_years() {
        let realm = Realm::bare().with_time_zone(LocalTimeZone::UTC);
        let d = date_value(&realm, NEGATIVE_UTC_PROBE);
        let get = |name: &str| method(name)(&realm, &d, &[]).unwrap().as_number().unwrap();
        assert_eq!(get("Date.prototype.getUTCFullYear"), -45875.0);
        assert_eq!(get("Date.prototype.getUTCMonth"), 0.0);
        assert_eq!(get("Date.prototype.getUTCDate"), 1.0);
        assert_eq!(get("Date.prototype.getUTCDay"), 1.0);
        assert_eq!(get("Date.prototype.getUTCHours"), 11.0);
        assert_eq!(get("Date.prototype.getUTCMilliseconds"), 708.0);
        assert_eq!(get("Date.prototype.getTime"), NEGATIVE_UTC_PROBE);
        assert_eq!(get("Date.prototype.getTimezoneOffset"), 0.0);
        let nan = method("Date.prototype.getFullYear")(&realm, &date_value(&realm, f64::NAN), &[]).unwrap();
        assert!(nan.as_number().unwrap().is_nan());
        let err = method("Date.prototype.getMonth")(&realm, &JsValue::Number(0.0), &[]).unwrap_err();
        assert!(matches!(err, JsError::Type(_)));
    }

    #[test]
    fn local_getters_follow_time_zone() {
        let realm = Realm::bare().with_time_zone(LocalTimeZone::Fixed { offset_minutes: 60 });
        let d = date_value(&realm, TO_STRING_PROBE);
        let get = |name: &str| method(name)(&realm, &d, &[]).unwrap().as_number().unwrap();
        assert_eq!(get("Date.prototype.getHours"), 13.0);
        assert_eq!(get("Date.prototype.getUTCHours"), 12.0);
        assert_eq!(get("Date.prototype.getTimezoneOffset"), -60.0);
    }

    #[test]
    fn replacements_pass_their_own_probes() {
        for offset in [0, 330, -480, 780] {
            let realm = Realm::bare().with_time_zone(LocalTimeZone::Fixed { offset_minutes: offset });
            install_all(&realm);
            let proto = JsValue::Object(realm.resolve("Date.prototype").unwrap());
            let get = |key: &str| realm.get(&proto, key).unwrap();
            assert!(!getters_are_broken(&realm, &get("getUTCMonth")).unwrap());
            assert!(!to_iso_string_is_broken(&realm, &get("toISOString")).unwrap());
            assert!(!to_json_is_broken(&realm, &get("toJSON")).unwrap());
            assert!(!to_utc_string_is_broken(&realm, &get("toUTCString")).unwrap());
            assert!(!to_date_string_is_broken(&realm, &get("toDateString")).unwrap(), "offset {offset}");
            assert!(!to_string_is_broken(&realm, &get("toString")).unwrap(), "offset {offset}");
            let parse = realm.get(&JsValue::Object(realm.resolve("Date").unwrap()), "parse").unwrap();
            assert!(!date_parse_is_broken(&realm, &parse).unwrap());
        }
    }

    #[test]
    fn probes_reject_missing_methods() {
        let realm = Realm::bare();
        assert!(getters_are_broken(&realm, &JsValue::Undefined).is_err());
        assert!(to_iso_string_is_broken(&realm, &JsValue::Undefined).is_err());
    }

    #[test]
    fn to_iso_string_probe_catches_unpadded_years() {
        let realm = Realm::bare();
        let short = JsValue::Object(realm.create_function(
            "toISOString",
            0,
            Rc::new(|_, this, _| {
                let t = this_time_value(this)?;
                let d = CalendarDate::from_time(t).ok_or_else(|| JsError::range_error("Invalid time value"))?;
                Ok(JsValue::string(&format!("{}-{:02}-{:02}", d.year, d.month + 1, d.day)))
            }),
        ));
        assert!(to_iso_string_is_broken(&realm, &short).unwrap());
    }

    #[test]
    fn to_json_is_generic() {
        let realm = Realm::bare();
        let to_json = method("Date.prototype.toJSON");
        let obj = realm.create_object();
        obj.insert_value(
            "toISOString",
            JsValue::Object(realm.create_function("toISOString", 0, Rc::new(|_, _, _| Ok(JsValue::string("x"))))),
        );
        let out = to_json(&realm, &JsValue::Object(obj), &[]).unwrap();
        assert_eq!(out.as_rust_string().as_deref(), Some("x"));
        let bare = JsValue::Object(realm.create_object());
        assert!(matches!(to_json(&realm, &bare, &[]), Err(JsError::Type(_))));
        assert!(to_json(&realm, &JsValue::Number(f64::INFINITY), &[]).unwrap().is_null());
        assert!(matches!(to_json(&realm, &JsValue::Undefined, &[]), Err(JsError::Type(_))));
    }

    #[test]
    fn date_parse_probe_catches_lenient_hosts() {
        let realm = Realm::bare();
        let lenient = JsValue::Object(realm.create_function(
            "parse",
            1,
            Rc::new(|_, _, args| {
                let text = args[0].to_string();
                Ok(JsValue::Number(if text.starts_with('+') { 1e15 } else { 0.0 }))
            }),
        ));
        assert!(date_parse_is_broken(&realm, &lenient).unwrap());
    }

    #[test]
    fn formatters_reject_non_dates() {
        let realm = Realm::bare();
        for name in ["toISOString", "toUTCString", "toDateString", "toString", "toTimeString"] {
            let f = method(&format!("Date.prototype.{name}"));
            assert!(matches!(f(&realm, &JsValue::Null, &[]), Err(JsError::Type(_))), "{name}");
        }
        let iso = method("Date.prototype.toISOString");
        assert!(matches!(iso(&realm, &date_value(&realm, f64::NAN), &[]), Err(JsError::Range(_))));
        let utc = method("Date.prototype.toUTCString");
        let s = utc(&realm, &date_value(&realm, f64::NAN), &[]).unwrap();
        assert_eq!(s.as_rust_string().as_deref(), Some("Invalid Date"));
    }
}
