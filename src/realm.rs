use std::rc::Rc;

use crate::calendar;
use crate::config::LocalTimeZone;
use crate::error::JsError;
use crate::object::{JsFunction, JsObject, JsObjectData, PropertyDescriptor};
use crate::types::{JsValue, to_boolean, to_number};

struct Intrinsics {
    object_prototype: JsObject,
    function_prototype: JsObject,
    array_prototype: JsObject,
    number_prototype: JsObject,
    string_prototype: JsObject,
    boolean_prototype: JsObject,
    date_prototype: JsObject,
    element_prototype: Option<JsObject>,
}

/// An in-process host environment: a global object graph plus the host
/// capabilities the installer depends on.
pub struct Realm {
    global: JsObject,
    intrinsics: Intrinsics,
    supports_descriptors: bool,
    time_zone: LocalTimeZone,
}

impl Realm {
    /// A host with the standard constructors and their prototypes but none
    /// of the methods this crate installs.
    pub fn bare() -> Self {
        let object_prototype = JsObject::with_prototype(None);
        let function_prototype = JsObject::with_prototype(Some(object_prototype.clone()));
        function_prototype.borrow_mut().class_name = "Function".to_string();

        let proto = |class: &str, primitive: Option<JsValue>| {
            let p = JsObject::with_prototype(Some(object_prototype.clone()));
            let mut data = p.borrow_mut();
            data.class_name = class.to_string();
            data.primitive_value = primitive;
            drop(data);
            p
        };
        let array_prototype = proto("Array", None);
        array_prototype.borrow_mut().array_elements = Some(Vec::new());
        let intrinsics = Intrinsics {
            number_prototype: proto("Number", Some(JsValue::Number(0.0))),
            string_prototype: proto("String", Some(JsValue::string(""))),
            boolean_prototype: proto("Boolean", Some(JsValue::Boolean(false))),
            date_prototype: proto("Object", None),
            array_prototype,
            object_prototype: object_prototype.clone(),
            function_prototype,
            element_prototype: None,
        };

        let global = JsObject::with_prototype(Some(object_prototype));
        global.borrow_mut().class_name = "global".to_string();
        let realm = Realm {
            global,
            intrinsics,
            supports_descriptors: true,
            time_zone: LocalTimeZone::System,
        };
        realm.setup_constructors();
        realm
    }

    /// A bare host that also carries a minimal DOM (`document`, `Element`).
    pub fn with_dom() -> Self {
        let mut realm = Self::bare();
        realm.setup_dom();
        realm
    }

    /// Models an engine without `Object.defineProperty`: installs fall back
    /// to plain assignment.
    pub fn without_descriptors(mut self) -> Self {
        self.supports_descriptors = false;
        self
    }

    pub fn with_time_zone(mut self, tz: LocalTimeZone) -> Self {
        self.time_zone = tz;
        self
    }

    pub fn global(&self) -> &JsObject {
        &self.global
    }

    pub fn supports_descriptors(&self) -> bool {
        self.supports_descriptors
    }

    pub fn time_zone(&self) -> LocalTimeZone {
        self.time_zone
    }

    pub fn has_dom(&self) -> bool {
        self.intrinsics.element_prototype.is_some()
    }

    /// Resolves a dotted path such as `Number.prototype` from the global
    /// object. The empty path is the global itself.
    pub fn resolve(&self, path: &str) -> Option<JsObject> {
        let mut current = self.global.clone();
        if path.is_empty() {
            return Some(current);
        }
        for segment in path.split('.') {
            let next = match current.get(segment) {
                JsValue::Object(o) => o,
                _ => return None,
            };
            current = next;
        }
        Some(current)
    }

    /// The value at a dotted path, without running getters. The empty path
    /// is the global object.
    pub fn lookup(&self, path: &str) -> JsValue {
        match path.rsplit_once('.') {
            _ if path.is_empty() => JsValue::Object(self.global.clone()),
            Some((parent, key)) => self.resolve(parent).map_or(JsValue::Undefined, |o| o.get(key)),
            None => self.global.get(path),
        }
    }

    fn setup_constructors(&self) {
        let ctors: Vec<(
            &str,
            usize,
            JsObject,
            Rc<dyn Fn(&Realm, &JsValue, &[JsValue]) -> Result<JsValue, JsError>>,
        )> = vec![
            (
                "Object",
                1,
                self.intrinsics.object_prototype.clone(),
                Rc::new(|realm, _this, args| match args.first() {
                    None | Some(JsValue::Undefined) | Some(JsValue::Null) => {
                        Ok(JsValue::Object(realm.create_object()))
                    }
                    Some(v) => realm.to_object(v).map(JsValue::Object),
                }),
            ),
            (
                "Function",
                1,
                self.intrinsics.function_prototype.clone(),
                Rc::new(|_realm, _this, _args| {
                    Err(JsError::type_error("Function constructor is not supported"))
                }),
            ),
            (
                "Array",
                1,
                self.intrinsics.array_prototype.clone(),
                Rc::new(|realm, _this, args| Ok(JsValue::Object(realm.create_array(args.to_vec())))),
            ),
            (
                "Number",
                1,
                self.intrinsics.number_prototype.clone(),
                Rc::new(|_realm, _this, args| {
                    Ok(JsValue::Number(args.first().map(to_number).unwrap_or(0.0)))
                }),
            ),
            (
                "String",
                1,
                self.intrinsics.string_prototype.clone(),
                Rc::new(|_realm, _this, args| {
                    Ok(JsValue::string(
                        &args.first().map(|v| v.to_string()).unwrap_or_default(),
                    ))
                }),
            ),
            (
                "Boolean",
                1,
                self.intrinsics.boolean_prototype.clone(),
                Rc::new(|_realm, _this, args| {
                    Ok(JsValue::Boolean(args.first().is_some_and(to_boolean)))
                }),
            ),
            (
                "Date",
                7,
                self.intrinsics.date_prototype.clone(),
                Rc::new(|realm, _this, args| {
                    let t = match args.first() {
                        None => realm.now(),
                        Some(JsValue::String(s)) => {
                            calendar::parse_date(&s.to_rust_string(), realm.time_zone())
                        }
                        Some(JsValue::Object(o)) if o.class_name() == "Date" => {
                            o.primitive_value().map(|v| to_number(&v)).unwrap_or(f64::NAN)
                        }
                        Some(v) => to_number(v),
                    };
                    Ok(JsValue::Object(realm.make_date(calendar::time_clip(t))))
                }),
            ),
        ];

        for (name, length, prototype, func) in ctors {
            let ctor = self.create_function(name, length, func);
            ctor.define_own_property(
                "prototype",
                PropertyDescriptor::data(JsValue::Object(prototype.clone()), false, false, false),
            );
            prototype.insert_builtin("constructor", JsValue::Object(ctor.clone()));
            self.global.insert_builtin(name, JsValue::Object(ctor));
        }

        let math = self.create_object();
        math.borrow_mut().class_name = "Math".to_string();
        self.global.insert_builtin("Math", JsValue::Object(math));
    }

    fn setup_dom(&mut self) {
        let element_prototype = self.create_object();
        let methods: Vec<(
            &str,
            usize,
            Rc<dyn Fn(&Realm, &JsValue, &[JsValue]) -> Result<JsValue, JsError>>,
        )> = vec![
            (
                "appendChild",
                1,
                Rc::new(|realm, this, args| {
                    let parent = this_element(this, "appendChild")?;
                    let child = this_element(args.first().unwrap_or(&JsValue::Undefined), "appendChild")?;
                    if let JsValue::Object(old) = child.get("parentNode") {
                        realm.detach_child(&old, &child);
                    }
                    if let JsValue::Object(children) = parent.get("childNodes") {
                        let mut data = children.borrow_mut();
                        if let Some(elems) = data.array_elements.as_mut() {
                            elems.push(JsValue::Object(child.clone()));
                        }
                    }
                    child.set("parentNode", JsValue::Object(parent));
                    Ok(JsValue::Object(child))
                }),
            ),
            (
                "removeChild",
                1,
                Rc::new(|realm, this, args| {
                    let parent = this_element(this, "removeChild")?;
                    let child = this_element(args.first().unwrap_or(&JsValue::Undefined), "removeChild")?;
                    match child.get("parentNode") {
                        JsValue::Object(p) if p.ptr_eq(&parent) => {
                            realm.detach_child(&parent, &child);
                            Ok(JsValue::Object(child))
                        }
                        _ => Err(JsError::type_error(
                            "The node to be removed is not a child of this node",
                        )),
                    }
                }),
            ),
        ];
        for (name, length, func) in methods {
            let f = self.create_function(name, length, func);
            element_prototype.insert_builtin(name, JsValue::Object(f));
        }

        let element_ctor = self.create_function(
            "Element",
            0,
            Rc::new(|_realm, _this, _args| Err(JsError::type_error("Illegal constructor"))),
        );
        element_ctor.define_own_property(
            "prototype",
            PropertyDescriptor::data(JsValue::Object(element_prototype.clone()), false, false, false),
        );
        self.global.insert_builtin("Element", JsValue::Object(element_ctor));
        self.intrinsics.element_prototype = Some(element_prototype);

        let document = self.create_object();
        document.borrow_mut().class_name = "HTMLDocument".to_string();
        let create_element = self.create_function(
            "createElement",
            1,
            Rc::new(|realm, _this, args| {
                let tag = args.first().map(|v| v.to_string()).unwrap_or_default();
                realm
                    .create_element(&tag)
                    .map(JsValue::Object)
                    .ok_or_else(|| JsError::type_error("document is not available"))
            }),
        );
        document.insert_builtin("createElement", JsValue::Object(create_element));
        self.global.insert_builtin("document", JsValue::Object(document));
    }

    /// Creates a detached element. `None` when the realm has no DOM.
    pub fn create_element(&self, tag: &str) -> Option<JsObject> {
        let proto = self.intrinsics.element_prototype.clone()?;
        let el = JsObject::with_prototype(Some(proto));
        el.borrow_mut().class_name = "Element".to_string();
        el.insert_value("tagName", JsValue::string(&tag.to_ascii_uppercase()));
        el.insert_value("parentNode", JsValue::Null);
        el.insert_value("childNodes", JsValue::Object(self.create_array(Vec::new())));
        Some(el)
    }

    fn detach_child(&self, parent: &JsObject, child: &JsObject) {
        if let JsValue::Object(children) = parent.get("childNodes") {
            let mut data = children.borrow_mut();
            if let Some(elems) = data.array_elements.as_mut() {
                elems.retain(|e| !matches!(e, JsValue::Object(o) if o.ptr_eq(child)));
            }
        }
        child.set("parentNode", JsValue::Null);
    }

    pub fn create_object(&self) -> JsObject {
        JsObject::with_prototype(Some(self.intrinsics.object_prototype.clone()))
    }

    pub fn create_array(&self, values: Vec<JsValue>) -> JsObject {
        let arr = JsObject::with_prototype(Some(self.intrinsics.array_prototype.clone()));
        let mut data = arr.borrow_mut();
        data.class_name = "Array".to_string();
        data.array_elements = Some(values);
        drop(data);
        arr
    }

    pub fn create_function(
        &self,
        name: &str,
        length: usize,
        func: Rc<dyn Fn(&Realm, &JsValue, &[JsValue]) -> Result<JsValue, JsError>>,
    ) -> JsObject {
        let mut data = JsObjectData::new();
        data.prototype = Some(self.intrinsics.function_prototype.clone());
        data.class_name = "Function".to_string();
        data.callable = Some(JsFunction {
            name: name.to_string(),
            length,
            func,
        });
        data.insert_property(
            "length".to_string(),
            PropertyDescriptor::data(JsValue::Number(length as f64), false, false, true),
        );
        data.insert_property(
            "name".to_string(),
            PropertyDescriptor::data(JsValue::string(name), false, false, true),
        );
        JsObject::from_data(data)
    }

    pub fn make_date(&self, t: f64) -> JsObject {
        let date = JsObject::with_prototype(Some(self.intrinsics.date_prototype.clone()));
        let mut data = date.borrow_mut();
        data.class_name = "Date".to_string();
        data.primitive_value = Some(JsValue::Number(t));
        drop(data);
        date
    }

    /// Current time in ms since the epoch.
    pub fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64
    }

    pub fn to_object(&self, value: &JsValue) -> Result<JsObject, JsError> {
        let (proto, class) = match value {
            JsValue::Undefined | JsValue::Null => {
                return Err(JsError::type_error(format!(
                    "Cannot convert {value} to object"
                )));
            }
            JsValue::Object(o) => return Ok(o.clone()),
            JsValue::Boolean(_) => (&self.intrinsics.boolean_prototype, "Boolean"),
            JsValue::Number(_) => (&self.intrinsics.number_prototype, "Number"),
            JsValue::String(_) => (&self.intrinsics.string_prototype, "String"),
        };
        let wrapper = JsObject::with_prototype(Some(proto.clone()));
        let mut data = wrapper.borrow_mut();
        data.class_name = class.to_string();
        data.primitive_value = Some(value.clone());
        if let JsValue::String(s) = value {
            data.insert_property(
                "length".to_string(),
                PropertyDescriptor::data(JsValue::Number(s.len() as f64), false, false, false),
            );
        }
        drop(data);
        Ok(wrapper)
    }

    pub fn call(&self, f: &JsValue, this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let callable = match f {
            JsValue::Object(o) => o.callable(),
            _ => None,
        };
        match callable {
            Some(func) => (func.func)(self, this, args),
            None => Err(JsError::type_error(format!("{} is not a function", f.type_of()))),
        }
    }

    /// `[[Get]]`, running getters with the original receiver.
    pub fn get(&self, target: &JsValue, key: &str) -> Result<JsValue, JsError> {
        let obj = self.to_object(target)?;
        match obj.get_property_descriptor(key) {
            Some(desc) if desc.is_accessor_descriptor() => match desc.get {
                Some(getter) if getter.is_callable() => self.call(&getter, target, &[]),
                _ => Ok(JsValue::Undefined),
            },
            Some(desc) => Ok(desc.value.unwrap_or(JsValue::Undefined)),
            None => Ok(JsValue::Undefined),
        }
    }

    /// Looks up `key` on `this` and calls it as a method.
    pub fn invoke(&self, this: &JsValue, key: &str, args: &[JsValue]) -> Result<JsValue, JsError> {
        let method = self.get(this, key)?;
        self.call(&method, this, args)
    }
}

fn this_element(value: &JsValue, method: &str) -> Result<JsObject, JsError> {
    match value {
        JsValue::Object(o) if o.class_name() == "Element" => Ok(o.clone()),
        _ => Err(JsError::type_error(format!(
            "Failed to execute '{method}': parameter is not of type 'Node'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_realm_has_constructors_without_methods() {
        let realm = Realm::bare();
        let proto = realm.resolve("Number.prototype").expect("Number.prototype");
        assert!(!proto.has_property("toFixed"));
        assert!(realm.resolve("Date.prototype").is_some());
        assert!(realm.resolve("JSON").is_none());
        assert!(!realm.has_dom());
        assert!(realm.resolve("Element.prototype").is_none());
    }

    #[test]
    fn lookup_follows_paths() {
        let realm = Realm::bare();
        assert!(matches!(realm.lookup(""), JsValue::Object(o) if o.ptr_eq(realm.global())));
        let proto = realm.lookup("Number.prototype");
        assert!(matches!(proto, JsValue::Object(o) if o.class_name() == "Number"));
        assert!(realm.lookup("Number.missing").is_undefined());
        assert!(realm.lookup("Missing.prototype").is_undefined());
    }

    #[test]
    fn to_object_boxes_primitives() {
        let realm = Realm::bare();
        let boxed = realm.to_object(&JsValue::Number(2.5)).unwrap();
        assert_eq!(boxed.class_name(), "Number");
        assert!(boxed.prototype().unwrap().ptr_eq(&realm.resolve("Number.prototype").unwrap()));
        let s = realm.to_object(&JsValue::string("abc")).unwrap();
        assert_eq!(s.get("length").as_number(), Some(3.0));
        assert!(matches!(realm.to_object(&JsValue::Null), Err(JsError::Type(_))));
    }

    #[test]
    fn call_non_callable_is_type_error() {
        let realm = Realm::bare();
        let err = realm.call(&JsValue::Number(1.0), &JsValue::Undefined, &[]).unwrap_err();
        assert!(matches!(err, JsError::Type(_)));
    }

    #[test]
    fn getter_runs_with_receiver() {
        let realm = Realm::bare();
        let obj = realm.create_object();
        obj.insert_value("x", JsValue::Number(4.0));
        let getter = realm.create_function(
            "get",
            0,
            Rc::new(|realm, this, _| {
                let x = realm.get(this, "x")?;
                Ok(JsValue::Number(to_number(&x) * 2.0))
            }),
        );
        obj.define_own_property(
            "double",
            PropertyDescriptor {
                get: Some(JsValue::Object(getter)),
                enumerable: Some(true),
                configurable: Some(true),
                ..Default::default()
            },
        );
        let v = realm.get(&JsValue::Object(obj), "double").unwrap();
        assert_eq!(v.as_number(), Some(8.0));
    }

    #[test]
    fn date_constructor_parses_and_clips() {
        let realm = Realm::bare().with_time_zone(LocalTimeZone::UTC);
        let ctor = JsValue::Object(realm.resolve("Date").unwrap());
        let d = realm
            .call(&ctor, &JsValue::Undefined, &[JsValue::string("1970-01-02T00:00:00Z")])
            .unwrap();
        assert_eq!(to_number(&d), 86_400_000.0);
        let clipped = realm.call(&ctor, &JsValue::Undefined, &[JsValue::Number(9e15)]).unwrap();
        assert!(to_number(&clipped).is_nan());
    }

    #[test]
    fn dom_append_and_remove() {
        let realm = Realm::with_dom();
        assert!(realm.has_dom());
        let parent = JsValue::Object(realm.create_element("div").unwrap());
        let child = JsValue::Object(realm.create_element("span").unwrap());
        realm.invoke(&parent, "appendChild", &[child.clone()]).unwrap();
        assert!(realm.get(&child, "parentNode").unwrap().is_object());
        realm.invoke(&parent, "removeChild", &[child.clone()]).unwrap();
        assert!(realm.get(&child, "parentNode").unwrap().is_null());
        let err = realm.invoke(&parent, "removeChild", &[child]).unwrap_err();
        assert!(matches!(err, JsError::Type(_)));
    }
}
