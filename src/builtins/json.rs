use std::rc::Rc;

use crate::bootstrap::InstallStep;
use crate::error::JsError;
use crate::json;
use crate::object::JsObject;
use crate::realm::Realm;
use crate::types::{JsString, JsValue};

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::Undefined)
}

fn apply_revived(holder: &JsObject, key: &str, value: JsValue) {
    if holder.is_array()
        && let Ok(index) = key.parse::<usize>()
    {
        // arrays have no holes here: a dropped element reads as undefined
        let mut data = holder.borrow_mut();
        if let Some(slot) = data.array_elements.as_mut().and_then(|e| e.get_mut(index)) {
            *slot = value;
        }
        return;
    }
    if value.is_undefined() {
        holder.delete(key);
    } else {
        holder.set(key, value);
    }
}

/// Walks a freshly parsed value bottom-up, replacing each member with the
/// reviver's result for it.
pub(crate) fn internalize(
    realm: &Realm,
    holder: &JsObject,
    name: &str,
    reviver: &JsValue,
) -> Result<JsValue, JsError> {
    let value = holder.get(name);
    if let JsValue::Object(obj) = &value {
        let keys = if obj.is_array() {
            (0..obj.array_elements().len()).map(|i| i.to_string()).collect()
        } else {
            obj.own_enumerable_keys()
        };
        for key in keys {
            let revived = internalize(realm, obj, &key, reviver)?;
            apply_revived(obj, &key, revived);
        }
    }
    let key = JsValue::String(JsString::from_str(name));
    realm.call(reviver, &JsValue::Object(holder.clone()), &[key, value])
}

fn parse(realm: &Realm, text: &JsValue, reviver: &JsValue) -> Result<JsValue, JsError> {
    let parsed = json::parse(&text.to_string())?.to_js(realm);
    if !reviver.is_callable() {
        return Ok(parsed);
    }
    let root = realm.create_object();
    root.insert_value("", parsed);
    internalize(realm, &root, "", reviver)
}

/// Replace unless the host's `stringify` drops `undefined` and writes
/// non-finite numbers as `null`.
fn stringify_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    if !existing.is_callable() {
        return Ok(true);
    }
    let json = JsValue::Object(realm.resolve("JSON").unwrap_or_else(|| realm.create_object()));
    if !realm.call(existing, &json, &[JsValue::Undefined])?.is_undefined() {
        return Ok(true);
    }
    let obj = realm.create_object();
    let arr = realm.create_array(vec![JsValue::Undefined, JsValue::Number(f64::NAN)]);
    obj.insert_value("a", JsValue::Object(arr));
    let out = realm.call(existing, &json, &[JsValue::Object(obj)])?;
    Ok(out.as_rust_string().as_deref() != Some(r#"{"a":[null,null]}"#))
}

/// Replace unless the host's `parse` builds nested values and rejects
/// trailing commas.
fn parse_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    if !existing.is_callable() {
        return Ok(true);
    }
    let json = JsValue::Object(realm.resolve("JSON").unwrap_or_else(|| realm.create_object()));
    let parsed = realm.call(existing, &json, &[JsValue::string(r#"{"a":[1,true]}"#)])?;
    let items = realm.get(&parsed, "a")?;
    if !items.as_object().is_some_and(|a| a.is_array() && a.array_elements().len() == 2) {
        return Ok(true);
    }
    Ok(realm.call(existing, &json, &[JsValue::string("[1,]")]).is_ok())
}

/// `toJSON` for the primitive wrappers: the wrapped value.
fn primitive_to_json(realm: &Realm, this: &JsValue) -> Result<JsValue, JsError> {
    match this {
        JsValue::Object(o) => match o.primitive_value() {
            Some(value) => Ok(value),
            None => realm.invoke(this, "valueOf", &[]),
        },
        JsValue::Undefined | JsValue::Null => realm.invoke(this, "valueOf", &[]),
        primitive => Ok(primitive.clone()),
    }
}

pub(crate) fn steps() -> Vec<InstallStep> {
    let mut steps = vec![
        InstallStep::namespace("", "JSON", "JSON"),
        InstallStep::method(
            "JSON",
            "stringify",
            3,
            Rc::new(|realm, _this, args| {
                let out = json::stringify(realm, &arg(args, 0), &arg(args, 1), &arg(args, 2))?;
                Ok(out.map_or(JsValue::Undefined, |s| JsValue::string(&s)))
            }),
        )
        .probe("JSON.stringify", stringify_is_broken)
        .after(&["JSON"]),
        InstallStep::method(
            "JSON",
            "parse",
            2,
            Rc::new(|realm, _this, args| parse(realm, &arg(args, 0), &arg(args, 1))),
        )
        .probe("JSON.parse", parse_is_broken)
        .after(&["JSON"]),
    ];
    for target in ["Boolean.prototype", "Number.prototype", "String.prototype"] {
        steps.push(InstallStep::method(
            target,
            "toJSON",
            0,
            Rc::new(|realm, this, _args| primitive_to_json(realm, this)),
        ));
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reviver(realm: &Realm, f: impl Fn(&str, &JsValue) -> JsValue + 'static) -> JsValue {
        JsValue::Object(realm.create_function(
            "reviver",
            2,
            Rc::new(move |_, _, args| Ok(f(&args[0].to_string(), &args[1]))),
        ))
    }

    #[test]
    fn parse_without_reviver() {
        let realm = Realm::bare();
        let v = parse(&realm, &JsValue::string(r#"{"a":[1,"x"]}"#), &JsValue::Undefined).unwrap();
        let a = realm.get(&v, "a").unwrap();
        assert_eq!(a.as_object().unwrap().array_elements().len(), 2);
        let err = parse(&realm, &JsValue::string("{'a':1}"), &JsValue::Undefined).unwrap_err();
        assert!(matches!(err, JsError::Syntax(_)));
    }

    #[test]
    fn reviver_runs_bottom_up_and_drops_members() {
        let realm = Realm::bare();
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let log = seen.clone();
        let rev = reviver(&realm, move |key, value| {
            log.borrow_mut().push(key.to_string());
            match (key, value) {
                ("drop", _) => JsValue::Undefined,
                (_, JsValue::Number(n)) => JsValue::Number(n * 10.0),
                _ => value.clone(),
            }
        });
        let text = JsValue::string(r#"{"n":1,"drop":2,"list":[3,4]}"#);
        let v = parse(&realm, &text, &rev).unwrap();
        assert_eq!(*seen.borrow(), vec!["n", "drop", "0", "1", "list", ""]);
        let obj = v.as_object().unwrap();
        assert_eq!(obj.own_enumerable_keys(), vec!["n", "list"]);
        assert_eq!(obj.get("n").as_number(), Some(10.0));
        let list = obj.get("list");
        let items = list.as_object().unwrap().array_elements();
        assert_eq!(items[1].as_number(), Some(40.0));
    }

    #[test]
    fn reviver_undefined_array_element_stays_as_undefined() {
        let realm = Realm::bare();
        let rev = reviver(&realm, |key, value| {
            if key == "0" { JsValue::Undefined } else { value.clone() }
        });
        let v = parse(&realm, &JsValue::string("[1,2]"), &rev).unwrap();
        let items = v.as_object().unwrap().array_elements();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_undefined());
    }

    #[test]
    fn probes_accept_own_methods() {
        let realm = Realm::bare();
        let json = realm.create_object();
        realm.global().insert_builtin("JSON", JsValue::Object(json.clone()));
        for step in steps().into_iter().filter(|s| s.target == "JSON") {
            json.insert_builtin(&step.key, step.make_value(&realm));
        }
        assert!(!stringify_is_broken(&realm, &json.get("stringify")).unwrap());
        assert!(!parse_is_broken(&realm, &json.get("parse")).unwrap());
        assert!(stringify_is_broken(&realm, &JsValue::Null).unwrap());
        assert!(parse_is_broken(&realm, &JsValue::Number(1.0)).unwrap());
    }

    #[test]
    fn lenient_parse_is_replaced() {
        let realm = Realm::bare();
        let lenient = JsValue::Object(realm.create_function(
            "parse",
            2,
            Rc::new(|realm, _, _| {
                let obj = realm.create_object();
                obj.insert_value("a", JsValue::Object(realm.create_array(vec![JsValue::Null, JsValue::Null])));
                Ok(JsValue::Object(obj))
            }),
        ));
        assert!(parse_is_broken(&realm, &lenient).unwrap());
    }

    #[test]
    fn wrappers_serialize_as_their_value() {
        let realm = Realm::bare();
        let boxed = realm.to_object(&JsValue::Number(3.0)).unwrap();
        assert_eq!(primitive_to_json(&realm, &JsValue::Object(boxed)).unwrap().as_number(), Some(3.0));
        let text = primitive_to_json(&realm, &JsValue::string("x")).unwrap();
        assert_eq!(text.as_rust_string().as_deref(), Some("x"));
        assert!(matches!(primitive_to_json(&realm, &JsValue::Boolean(true)), Ok(JsValue::Boolean(true))));
        assert!(matches!(primitive_to_json(&realm, &JsValue::Null), Err(JsError::Type(_))));

        for step in steps().into_iter().filter(|s| s.key == "toJSON") {
            realm.resolve(step.target).unwrap().insert_builtin("toJSON", step.make_value(&realm));
        }
        let flag = JsValue::Object(realm.to_object(&JsValue::Boolean(false)).unwrap());
        let out = json::stringify(&realm, &flag, &JsValue::Undefined, &JsValue::Undefined).unwrap();
        assert_eq!(out.as_deref(), Some("false"));
    }
}
