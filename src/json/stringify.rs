use super::{MAX_DEPTH, quote, wrap};
use crate::error::JsError;
use crate::object::JsObject;
use crate::realm::Realm;
use crate::types::{JsString, JsValue, number_ops, to_number};

/// The indentation string selected by the `space` argument: a number gives
/// that many spaces (at most 10), a string its first 10 code units.
pub fn gap_from_space(space: &JsValue) -> String {
    let space = match space {
        JsValue::Object(o) if matches!(o.class_name().as_str(), "Number" | "String") => {
            o.primitive_value().unwrap_or(JsValue::Undefined)
        }
        other => other.clone(),
    };
    match space {
        JsValue::Number(n) => {
            let n = number_ops::to_integer_or_infinity(n).clamp(0.0, 10.0);
            " ".repeat(n as usize)
        }
        JsValue::String(s) => s.slice_utf16(0, 10).to_rust_string(),
        _ => String::new(),
    }
}

struct Serializer<'r> {
    realm: &'r Realm,
    replacer_fn: Option<JsValue>,
    property_list: Option<Vec<String>>,
    gap: String,
    stack: Vec<JsObject>,
}

/// `JSON.stringify` over host values. `Ok(None)` when the value has no
/// JSON representation (`undefined`, functions).
pub fn stringify(
    realm: &Realm,
    value: &JsValue,
    replacer: &JsValue,
    space: &JsValue,
) -> Result<Option<String>, JsError> {
    let mut replacer_fn = None;
    let mut property_list = None;
    if let JsValue::Object(rep) = replacer {
        if rep.is_callable() {
            replacer_fn = Some(replacer.clone());
        } else if rep.is_array() {
            let mut keys: Vec<String> = Vec::new();
            for item in rep.array_elements() {
                let key = match &item {
                    JsValue::String(s) => Some(s.to_rust_string()),
                    JsValue::Number(n) => Some(number_ops::to_string(*n)),
                    JsValue::Object(o) if matches!(o.class_name().as_str(), "Number" | "String") => {
                        o.primitive_value().map(|v| v.to_string())
                    }
                    _ => None,
                };
                if let Some(k) = key
                    && !keys.contains(&k)
                {
                    keys.push(k);
                }
            }
            property_list = Some(keys);
        }
    }

    let wrapper = realm.create_object();
    wrapper.insert_value("", value.clone());
    let mut serializer = Serializer {
        realm,
        replacer_fn,
        property_list,
        gap: gap_from_space(space),
        stack: Vec::new(),
    };
    serializer.property(&wrapper, "", value.clone(), "")
}

impl Serializer<'_> {
    fn property(
        &mut self,
        holder: &JsObject,
        key: &str,
        mut value: JsValue,
        indent: &str,
    ) -> Result<Option<String>, JsError> {
        let key_val = JsValue::String(JsString::from_str(key));

        if value.is_object() {
            let to_json = self.realm.get(&value, "toJSON")?;
            if to_json.is_callable() {
                value = self.realm.call(&to_json, &value, &[key_val.clone()])?;
            }
        }

        if let Some(rep) = &self.replacer_fn {
            let this = JsValue::Object(holder.clone());
            value = self.realm.call(rep, &this, &[key_val, value])?;
        }

        if let JsValue::Object(o) = &value {
            let unwrapped = match o.class_name().as_str() {
                "Number" => Some(JsValue::Number(to_number(&value))),
                "String" => o.primitive_value().map(|v| JsValue::string(&v.to_string())),
                "Boolean" => o.primitive_value(),
                _ => None,
            };
            if let Some(v) = unwrapped {
                value = v;
            }
        }

        match &value {
            JsValue::Null => Ok(Some("null".to_string())),
            JsValue::Boolean(b) => Ok(Some(b.to_string())),
            JsValue::Number(n) if n.is_finite() => Ok(Some(number_ops::to_string(*n))),
            JsValue::Number(_) => Ok(Some("null".to_string())),
            JsValue::String(s) => Ok(Some(quote(&s.code_units))),
            JsValue::Undefined => Ok(None),
            JsValue::Object(o) if o.is_callable() => Ok(None),
            JsValue::Object(o) => {
                if self.stack.iter().any(|seen| seen.ptr_eq(o)) {
                    return Err(JsError::type_error("Converting circular structure to JSON"));
                }
                if self.stack.len() >= MAX_DEPTH {
                    return Err(JsError::range_error("JSON nesting too deep"));
                }
                self.stack.push(o.clone());
                let result = if o.is_array() {
                    self.array(o, indent)
                } else {
                    self.object(o, indent)
                };
                self.stack.pop();
                result.map(Some)
            }
        }
    }

    fn array(&mut self, arr: &JsObject, indent: &str) -> Result<String, JsError> {
        let inner = format!("{indent}{}", self.gap);
        let len = arr.array_elements().len();
        let holder = JsValue::Object(arr.clone());
        let mut parts = Vec::with_capacity(len);
        for i in 0..len {
            let key = i.to_string();
            let v = self.realm.get(&holder, &key)?;
            let s = self.property(arr, &key, v, &inner)?;
            parts.push(s.unwrap_or_else(|| "null".to_string()));
        }
        Ok(wrap('[', ']', parts, &self.gap, indent))
    }

    fn object(&mut self, obj: &JsObject, indent: &str) -> Result<String, JsError> {
        let inner = format!("{indent}{}", self.gap);
        let keys = match &self.property_list {
            Some(list) => list.clone(),
            None => obj.own_enumerable_keys(),
        };
        let holder = JsValue::Object(obj.clone());
        let colon = if self.gap.is_empty() { ":" } else { ": " };
        let mut parts = Vec::new();
        for k in keys {
            let v = self.realm.get(&holder, &k)?;
            if let Some(s) = self.property(obj, &k, v, &inner)? {
                let key = JsString::from_str(&k);
                parts.push(format!("{}{colon}{s}", quote(&key.code_units)));
            }
        }
        Ok(wrap('{', '}', parts, &self.gap, indent))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn run(realm: &Realm, value: &JsValue) -> Option<String> {
        stringify(realm, value, &JsValue::Undefined, &JsValue::Undefined).unwrap()
    }

    #[test]
    fn primitives_and_non_finite() {
        let realm = Realm::bare();
        assert_eq!(run(&realm, &JsValue::Number(f64::NAN)).as_deref(), Some("null"));
        assert_eq!(run(&realm, &JsValue::Number(-0.0)).as_deref(), Some("0"));
        assert_eq!(run(&realm, &JsValue::string("a\u{7f}\"")).as_deref(), Some("\"a\u{7f}\\\"\""));
        assert_eq!(run(&realm, &JsValue::Undefined), None);
        let f = realm.create_function("f", 0, Rc::new(|_, _, _| Ok(JsValue::Undefined)));
        assert_eq!(run(&realm, &JsValue::Object(f)), None);
    }

    #[test]
    fn objects_and_arrays() {
        let realm = Realm::bare();
        let f = realm.create_function("f", 0, Rc::new(|_, _, _| Ok(JsValue::Undefined)));
        let obj = realm.create_object();
        obj.insert_value("b", JsValue::Number(f64::INFINITY));
        obj.insert_value("a", JsValue::Undefined);
        obj.insert_value("fn", JsValue::Object(f.clone()));
        obj.insert_builtin("hidden", JsValue::Number(1.0));
        let arr = realm.create_array(vec![JsValue::Undefined, JsValue::Object(f), JsValue::Object(obj)]);
        assert_eq!(run(&realm, &JsValue::Object(arr)).as_deref(), Some(r#"[null,null,{"b":null}]"#));
    }

    #[test]
    fn to_json_and_wrappers() {
        let realm = Realm::bare();
        let obj = realm.create_object();
        let to_json = realm.create_function(
            "toJSON",
            1,
            Rc::new(|_, _, args| Ok(JsValue::string(&format!("key:{}", args[0])))),
        );
        obj.insert_value("toJSON", JsValue::Object(to_json));
        let holder = realm.create_object();
        holder.insert_value("x", JsValue::Object(obj));
        holder.insert_value("n", JsValue::Object(realm.to_object(&JsValue::Number(3.0)).unwrap()));
        holder.insert_value("s", JsValue::Object(realm.to_object(&JsValue::string("t")).unwrap()));
        assert_eq!(
            run(&realm, &JsValue::Object(holder)).as_deref(),
            Some(r#"{"x":"key:x","n":3,"s":"t"}"#)
        );
    }

    #[test]
    fn replacer_function_sees_holder() {
        let realm = Realm::bare();
        let obj = realm.create_object();
        obj.insert_value("keep", JsValue::Number(1.0));
        obj.insert_value("drop", JsValue::Number(2.0));
        let replacer = realm.create_function(
            "r",
            2,
            Rc::new(|_, this, args| {
                assert!(this.is_object());
                if args[0].to_string() == "drop" {
                    Ok(JsValue::Undefined)
                } else {
                    Ok(args[1].clone())
                }
            }),
        );
        let out = stringify(&realm, &JsValue::Object(obj), &JsValue::Object(replacer), &JsValue::Undefined)
            .unwrap();
        assert_eq!(out.as_deref(), Some(r#"{"keep":1}"#));
    }

    #[test]
    fn replacer_array_and_space() {
        let realm = Realm::bare();
        let obj = realm.create_object();
        obj.insert_value("a", JsValue::Number(1.0));
        obj.insert_value("b", JsValue::Number(2.0));
        obj.insert_value("1", JsValue::Number(3.0));
        let list = realm.create_array(vec![
            JsValue::string("b"),
            JsValue::Number(1.0),
            JsValue::string("b"),
            JsValue::Boolean(true),
        ]);
        let out = stringify(&realm, &JsValue::Object(obj), &JsValue::Object(list), &JsValue::Number(2.0))
            .unwrap();
        assert_eq!(out.as_deref(), Some("{\n  \"b\": 2,\n  \"1\": 3\n}"));
    }

    #[test]
    fn gap_rules() {
        assert_eq!(gap_from_space(&JsValue::Number(20.0)), " ".repeat(10));
        assert_eq!(gap_from_space(&JsValue::Number(-3.0)), "");
        assert_eq!(gap_from_space(&JsValue::string("abcdefghijkl")), "abcdefghij");
        assert_eq!(gap_from_space(&JsValue::Boolean(true)), "");
    }

    #[test]
    fn nesting_is_bounded_like_the_reader() {
        let realm = Realm::bare();
        let nest = |depth: usize| {
            let mut value = JsValue::Number(0.0);
            for _ in 0..depth {
                value = JsValue::Object(realm.create_array(vec![value]));
            }
            value
        };
        let ok = run(&realm, &nest(MAX_DEPTH)).unwrap();
        assert_eq!(ok.len(), 2 * MAX_DEPTH + 1);
        assert!(super::super::parse(&ok).is_ok());
        let err = stringify(&realm, &nest(MAX_DEPTH + 1), &JsValue::Undefined, &JsValue::Undefined)
            .unwrap_err();
        assert!(matches!(err, JsError::Range(_)));
    }

    #[test]
    fn cycles_are_type_errors() {
        let realm = Realm::bare();
        let obj = realm.create_object();
        obj.insert_value("self", JsValue::Object(obj.clone()));
        let err = stringify(&realm, &JsValue::Object(obj), &JsValue::Undefined, &JsValue::Undefined)
            .unwrap_err();
        assert!(matches!(err, JsError::Type(_)));
    }
}
