mod parse;
mod stringify;

use indexmap::IndexMap;

use crate::realm::Realm;
use crate::types::{JsString, JsValue, number_ops};

pub use parse::{parse, parse_with_reviver};
pub use stringify::{gap_from_space, stringify};

/// Nesting bound shared by the reader and the serializer.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(IndexMap<String, JsonValue>),
}

impl JsonValue {
    /// Builds the equivalent host value: plain objects and arrays created in
    /// `realm`.
    pub fn to_js(&self, realm: &Realm) -> JsValue {
        match self {
            JsonValue::Null => JsValue::Null,
            JsonValue::Bool(b) => JsValue::Boolean(*b),
            JsonValue::Number(n) => JsValue::Number(*n),
            JsonValue::String(s) => JsValue::String(JsString::from_str(s)),
            JsonValue::Array(items) => {
                let values = items.iter().map(|v| v.to_js(realm)).collect();
                JsValue::Object(realm.create_array(values))
            }
            JsonValue::Object(members) => {
                let obj = realm.create_object();
                for (k, v) in members {
                    obj.insert_value(k, v.to_js(realm));
                }
                JsValue::Object(obj)
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(members) => members.get(key),
            _ => None,
        }
    }
}

/// Serializes a typed tree. `indent` follows the `space` rules of
/// `JSON.stringify` (at most ten characters are used).
pub fn to_string(value: &JsonValue, indent: &str) -> String {
    let gap: String = indent.chars().take(10).collect();
    let mut out = String::new();
    write_value(value, &gap, "", &mut out);
    out
}

fn write_value(value: &JsonValue, gap: &str, indent: &str, out: &mut String) {
    match value {
        JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Number(n) if n.is_finite() => out.push_str(&number_ops::to_string(*n)),
        JsonValue::Number(_) => out.push_str("null"),
        JsonValue::String(s) => out.push_str(&quote_str(s)),
        JsonValue::Array(items) => {
            let inner = format!("{indent}{gap}");
            let parts = items
                .iter()
                .map(|v| {
                    let mut s = String::new();
                    write_value(v, gap, &inner, &mut s);
                    s
                })
                .collect();
            out.push_str(&wrap('[', ']', parts, gap, indent));
        }
        JsonValue::Object(members) => {
            let inner = format!("{indent}{gap}");
            let colon = if gap.is_empty() { ":" } else { ": " };
            let parts = members
                .iter()
                .map(|(k, v)| {
                    let mut s = quote_str(k);
                    s.push_str(colon);
                    write_value(v, gap, &inner, &mut s);
                    s
                })
                .collect();
            out.push_str(&wrap('{', '}', parts, gap, indent));
        }
    }
}

/// Joins serialized members, one per line when `gap` is non-empty.
pub(crate) fn wrap(open: char, close: char, parts: Vec<String>, gap: &str, indent: &str) -> String {
    if parts.is_empty() {
        return format!("{open}{close}");
    }
    if gap.is_empty() {
        return format!("{open}{}{close}", parts.join(","));
    }
    let inner = format!("{indent}{gap}");
    let sep = format!(",\n{inner}");
    format!("{open}\n{inner}{}\n{indent}{close}", parts.join(&sep))
}

fn quote_str(s: &str) -> String {
    let units: Vec<u16> = s.encode_utf16().collect();
    quote(&units)
}

/// Quotes a UTF-16 string. Lone surrogates are written as `\udxxx`.
pub(crate) fn quote(units: &[u16]) -> String {
    let mut result = String::with_capacity(units.len() + 2);
    result.push('"');
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok('"') => result.push_str("\\\""),
            Ok('\\') => result.push_str("\\\\"),
            Ok('\u{0008}') => result.push_str("\\b"),
            Ok('\u{000C}') => result.push_str("\\f"),
            Ok('\n') => result.push_str("\\n"),
            Ok('\r') => result.push_str("\\r"),
            Ok('\t') => result.push_str("\\t"),
            Ok(c) if c < '\u{0020}' => result.push_str(&format!("\\u{:04x}", c as u32)),
            Ok(c) => result.push(c),
            Err(e) => result.push_str(&format!("\\u{:04x}", e.unpaired_surrogate())),
        }
    }
    result.push('"');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> JsonValue {
        let mut inner = IndexMap::new();
        inner.insert("z".to_string(), JsonValue::Bool(false));
        inner.insert("a".to_string(), JsonValue::Array(vec![JsonValue::Null, JsonValue::Number(1.5)]));
        let mut root = IndexMap::new();
        root.insert("name".to_string(), JsonValue::String("q\"\n\u{1}".to_string()));
        root.insert("inner".to_string(), JsonValue::Object(inner));
        root.insert("nan".to_string(), JsonValue::Number(f64::NAN));
        JsonValue::Object(root)
    }

    #[test]
    fn compact_output_keeps_insertion_order() {
        assert_eq!(
            to_string(&sample(), ""),
            r#"{"name":"q\"\n\u0001","inner":{"z":false,"a":[null,1.5]},"nan":null}"#
        );
    }

    #[test]
    fn indented_output() {
        let v = JsonValue::Array(vec![JsonValue::Number(1.0), JsonValue::Array(vec![])]);
        assert_eq!(to_string(&v, "  "), "[\n  1,\n  []\n]");
    }

    #[test]
    fn lone_surrogates_are_escaped() {
        assert_eq!(quote(&[0x61, 0xd800]), "\"a\\ud800\"");
        assert_eq!(quote(&[0xd83d, 0xde00]), "\"\u{1F600}\"");
    }

    #[test]
    fn to_js_builds_host_objects() {
        let realm = Realm::bare();
        let v = sample().to_js(&realm);
        let obj = v.as_object().unwrap();
        assert_eq!(obj.own_enumerable_keys(), vec!["name", "inner", "nan"]);
        let inner = obj.get("inner");
        let arr = inner.as_object().unwrap().get("a");
        assert!(arr.as_object().unwrap().is_array());
    }

    fn arb_json() -> impl Strategy<Value = JsonValue> {
        let leaf = prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::Bool),
            any::<f64>()
                .prop_filter("finite", |n| n.is_finite())
                .prop_map(JsonValue::Number),
            "\\PC*".prop_map(JsonValue::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(JsonValue::Array),
                prop::collection::vec(("[a-z]{0,4}", inner), 0..6).prop_map(|pairs| {
                    JsonValue::Object(pairs.into_iter().collect())
                }),
            ]
        })
    }

    fn normalize_zero(v: JsonValue) -> JsonValue {
        match v {
            JsonValue::Number(n) if n == 0.0 => JsonValue::Number(0.0),
            JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(normalize_zero).collect()),
            JsonValue::Object(m) => {
                JsonValue::Object(m.into_iter().map(|(k, v)| (k, normalize_zero(v))).collect())
            }
            other => other,
        }
    }

    proptest! {
        #[test]
        fn round_trips_through_text(v in arb_json(), pretty in any::<bool>()) {
            let text = to_string(&v, if pretty { "\t" } else { "" });
            let back = parse(&text).unwrap();
            prop_assert_eq!(back, normalize_zero(v));
        }
    }
}
