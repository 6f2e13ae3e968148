use std::rc::Rc;

use crate::bootstrap::InstallStep;
use crate::error::JsError;
use crate::realm::Realm;
use crate::types::{JsValue, number_ops};

/// SameValue: like strict equality, except `NaN` equals itself and `+0`
/// differs from `-0`.
pub fn same_value(x: &JsValue, y: &JsValue) -> bool {
    match (x, y) {
        (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::Object(a), JsValue::Object(b)) => a.ptr_eq(b),
        _ => false,
    }
}

fn keys(realm: &Realm, value: &JsValue) -> Result<Vec<String>, JsError> {
    let obj = realm.to_object(value)?;
    let mut keys = Vec::new();
    if let Some(JsValue::String(s)) = obj.primitive_value()
        && obj.class_name() == "String"
    {
        keys.extend((0..s.len()).map(|i| i.to_string()));
    }
    keys.extend(obj.own_enumerable_keys());
    Ok(keys)
}

pub(crate) fn steps() -> Vec<InstallStep> {
    vec![
        InstallStep::alias("", "globalThis", ""),
        InstallStep::method(
            "Object",
            "keys",
            1,
            Rc::new(|realm, _this, args| {
                let target = args.first().cloned().unwrap_or(JsValue::Undefined);
                let names = keys(realm, &target)?
                    .iter()
                    .map(|k| JsValue::string(k))
                    .collect();
                Ok(JsValue::Object(realm.create_array(names)))
            }),
        ),
        InstallStep::method(
            "Object",
            "is",
            2,
            Rc::new(|_realm, _this, args| {
                let x = args.first().cloned().unwrap_or(JsValue::Undefined);
                let y = args.get(1).cloned().unwrap_or(JsValue::Undefined);
                Ok(JsValue::Boolean(same_value(&x, &y)))
            }),
        ),
    ]
}
