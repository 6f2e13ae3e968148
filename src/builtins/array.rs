use std::cell::RefCell;
use std::rc::Rc;

use super::object::same_value;
use crate::bootstrap::InstallStep;
use crate::error::JsError;
use crate::object::JsObject;
use crate::realm::Realm;
use crate::types::{JsString, JsValue, number_ops, to_boolean, to_number};

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::Undefined)
}

fn length_of_array_like(realm: &Realm, o: &JsObject) -> Result<usize, JsError> {
    let len = realm.get(&JsValue::Object(o.clone()), "length")?;
    let len = number_ops::to_integer_or_infinity(to_number(&len));
    if len <= 0.0 {
        return Ok(0);
    }
    Ok(len.min(9007199254740991.0) as usize)
}

fn require_callable(callback: &JsValue, method: &str) -> Result<(), JsError> {
    if callback.is_callable() {
        Ok(())
    } else {
        Err(JsError::type_error(format!(
            "Array.prototype.{method}: {} is not a function",
            callback.type_of()
        )))
    }
}

fn strict_equality(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Number(x), JsValue::Number(y)) => x == y,
        _ => same_value(a, b),
    }
}

/// The receiver of an array method, boxed. String wrappers expose their
/// code units as elements.
struct ArrayLike {
    object: JsObject,
    chars: Option<JsString>,
    len: usize,
}

impl ArrayLike {
    fn from_this(realm: &Realm, this: &JsValue, method: &str) -> Result<Self, JsError> {
        if this.is_nullish() {
            return Err(JsError::type_error(format!(
                "Array.prototype.{method} called on null or undefined"
            )));
        }
        let object = realm.to_object(this)?;
        let chars = match object.primitive_value() {
            Some(JsValue::String(s)) if object.class_name() == "String" => Some(s),
            _ => None,
        };
        let len = match &chars {
            Some(s) => s.len(),
            None => length_of_array_like(realm, &object)?,
        };
        Ok(Self { object, chars, len })
    }

    fn receiver(&self) -> JsValue {
        JsValue::Object(self.object.clone())
    }

    /// `None` for a missing index.
    fn get(&self, realm: &Realm, k: usize) -> Result<Option<JsValue>, JsError> {
        if let Some(s) = &self.chars {
            return Ok(s
                .code_units
                .get(k)
                .map(|u| JsValue::String(JsString::from_code_units(vec![*u]))));
        }
        let key = k.to_string();
        if !self.object.has_property(&key) {
            return Ok(None);
        }
        realm.get(&self.receiver(), &key).map(Some)
    }
}

#[derive(Debug, Clone, Copy)]
enum Iteration {
    ForEach,
    Map,
    Filter,
    Some,
    Every,
}

impl Iteration {
    fn name(self) -> &'static str {
        match self {
            Iteration::ForEach => "forEach",
            Iteration::Map => "map",
            Iteration::Filter => "filter",
            Iteration::Some => "some",
            Iteration::Every => "every",
        }
    }
}

fn iterate(kind: Iteration, realm: &Realm, this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let list = ArrayLike::from_this(realm, this, kind.name())?;
    let callback = arg(args, 0);
    require_callable(&callback, kind.name())?;
    let this_arg = arg(args, 1);
    let mut collected = Vec::new();
    for k in 0..list.len {
        let Some(value) = list.get(realm, k)? else {
            if let Iteration::Map = kind {
                collected.push(JsValue::Undefined);
            }
            continue;
        };
        let result = realm.call(
            &callback,
            &this_arg,
            &[value.clone(), JsValue::Number(k as f64), list.receiver()],
        )?;
        match kind {
            Iteration::ForEach => {}
            Iteration::Map => collected.push(result),
            Iteration::Filter => {
                if to_boolean(&result) {
                    collected.push(value);
                }
            }
            Iteration::Some => {
                if to_boolean(&result) {
                    return Ok(JsValue::Boolean(true));
                }
            }
            Iteration::Every => {
                if !to_boolean(&result) {
                    return Ok(JsValue::Boolean(false));
                }
            }
        }
    }
    Ok(match kind {
        Iteration::ForEach => JsValue::Undefined,
        Iteration::Map | Iteration::Filter => JsValue::Object(realm.create_array(collected)),
        Iteration::Some => JsValue::Boolean(false),
        Iteration::Every => JsValue::Boolean(true),
    })
}

fn reduce(realm: &Realm, this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let list = ArrayLike::from_this(realm, this, "reduce")?;
    let callback = arg(args, 0);
    require_callable(&callback, "reduce")?;
    let mut k = 0;
    let mut acc = if args.len() >= 2 {
        args[1].clone()
    } else {
        loop {
            if k >= list.len {
                return Err(JsError::type_error("Reduce of empty array with no initial value"));
            }
            let found = list.get(realm, k)?;
            k += 1;
            if let Some(first) = found {
                break first;
            }
        }
    };
    while k < list.len {
        if let Some(value) = list.get(realm, k)? {
            acc = realm.call(
                &callback,
                &JsValue::Undefined,
                &[acc, value, JsValue::Number(k as f64), list.receiver()],
            )?;
        }
        k += 1;
    }
    Ok(acc)
}

fn index_of(realm: &Realm, this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let list = ArrayLike::from_this(realm, this, "indexOf")?;
    let not_found = Ok(JsValue::Number(-1.0));
    if list.len == 0 {
        return not_found;
    }
    let search = arg(args, 0);
    let n = if args.len() >= 2 {
        number_ops::to_integer_or_infinity(to_number(&args[1]))
    } else {
        0.0
    };
    if n >= list.len as f64 {
        return not_found;
    }
    let start = if n >= 0.0 {
        n as usize
    } else {
        (list.len as f64 + n).max(0.0) as usize
    };
    for k in start..list.len {
        if let Some(value) = list.get(realm, k)?
            && strict_equality(&value, &search)
        {
            return Ok(JsValue::Number(k as f64));
        }
    }
    not_found
}

/// Replace unless the callback's third argument is an object when the
/// method runs on a string.
fn iteration_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let callback = realm.create_function(
        "callback",
        3,
        Rc::new(move |_, _, args| {
            log.borrow_mut().push(matches!(args.get(2), Some(JsValue::Object(_))));
            Ok(JsValue::Boolean(true))
        }),
    );
    realm.call(existing, &JsValue::string("foo"), &[JsValue::Object(callback)])?;
    let seen = seen.borrow();
    Ok(seen.is_empty() || seen.contains(&false))
}

fn reduce_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let callback = realm.create_function("callback", 4, Rc::new(|_, _, args| Ok(arg(args, 3))));
    let list = realm.call(existing, &JsValue::string("es5"), &[JsValue::Object(callback)])?;
    Ok(!list.is_object())
}

fn index_of_is_broken(realm: &Realm, existing: &JsValue) -> Result<bool, JsError> {
    let pair = JsValue::Object(realm.create_array(vec![JsValue::Number(0.0), JsValue::Number(1.0)]));
    let one = JsValue::Number(1.0);
    let past_end = realm.call(existing, &pair, &[one.clone(), JsValue::Number(2.0)])?;
    let found = realm.call(existing, &pair, &[one])?;
    Ok(past_end.as_number() != Some(-1.0) || found.as_number() != Some(1.0))
}

pub(crate) fn steps() -> Vec<InstallStep> {
    let mut steps = vec![InstallStep::method(
        "Array",
        "isArray",
        1,
        Rc::new(|_realm, _this, args| {
            Ok(JsValue::Boolean(matches!(args.first(), Some(JsValue::Object(o)) if o.is_array())))
        }),
    )];

    let iterations: [(Iteration, &'static str); 5] = [
        (Iteration::ForEach, "Array.prototype.forEach"),
        (Iteration::Map, "Array.prototype.map"),
        (Iteration::Filter, "Array.prototype.filter"),
        (Iteration::Some, "Array.prototype.some"),
        (Iteration::Every, "Array.prototype.every"),
    ];
    for (kind, probe) in iterations {
        steps.push(
            InstallStep::method(
                "Array.prototype",
                kind.name(),
                1,
                Rc::new(move |realm, this, args| iterate(kind, realm, this, args)),
            )
            .probe(probe, iteration_is_broken),
        );
    }

    steps.push(
        InstallStep::method("Array.prototype", "reduce", 1, Rc::new(reduce))
            .probe("Array.prototype.reduce", reduce_is_broken),
    );
    steps.push(
        InstallStep::method("Array.prototype", "indexOf", 1, Rc::new(index_of))
            .probe("Array.prototype.indexOf", index_of_is_broken),
    );
    steps
}
