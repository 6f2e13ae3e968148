use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::JsError;
use crate::realm::Realm;
use crate::types::JsValue;

pub type NativeFn = Rc<dyn Fn(&Realm, &JsValue, &[JsValue]) -> Result<JsValue, JsError>>;

#[derive(Clone)]
pub struct JsFunction {
    pub name: String,
    pub length: usize,
    pub func: NativeFn,
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

/// The three boolean attributes of a property. Every flag defaults to false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    pub enumerable: bool,
    pub configurable: bool,
    pub writable: bool,
}

impl PropertyAttributes {
    pub const NON_ENUM: Self = Self {
        enumerable: false,
        configurable: true,
        writable: true,
    };
    pub const AS_CONST: Self = Self {
        enumerable: false,
        configurable: false,
        writable: false,
    };
    pub const ALL: Self = Self {
        enumerable: true,
        configurable: true,
        writable: true,
    };
}

#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn data_default(value: JsValue) -> Self {
        Self::data(value, true, true, true)
    }

    pub fn with_attributes(value: JsValue, attrs: PropertyAttributes) -> Self {
        Self::data(value, attrs.writable, attrs.enumerable, attrs.configurable)
    }

    pub fn accessor(get: Option<JsValue>, set: Option<JsValue>, attrs: PropertyAttributes) -> Self {
        Self {
            value: None,
            writable: None,
            get,
            set,
            enumerable: Some(attrs.enumerable),
            configurable: Some(attrs.configurable),
        }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn attributes(&self) -> PropertyAttributes {
        PropertyAttributes {
            enumerable: self.enumerable == Some(true),
            configurable: self.configurable == Some(true),
            writable: self.writable == Some(true),
        }
    }

    /// Rejects descriptors that mix accessor and data fields.
    pub fn validate(&self) -> Result<(), JsError> {
        if self.is_accessor_descriptor() && self.is_data_descriptor() {
            return Err(JsError::type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        for accessor in [&self.get, &self.set].into_iter().flatten() {
            if !accessor.is_undefined() && !accessor.is_callable() {
                return Err(JsError::type_error("Accessor must be a function"));
            }
        }
        Ok(())
    }
}

pub struct JsObjectData {
    pub properties: FxHashMap<String, PropertyDescriptor>,
    pub property_order: Vec<String>,
    pub prototype: Option<JsObject>,
    pub callable: Option<JsFunction>,
    pub array_elements: Option<Vec<JsValue>>,
    pub class_name: String,
    pub extensible: bool,
    pub primitive_value: Option<JsValue>,
}

impl JsObjectData {
    pub(crate) fn new() -> Self {
        Self {
            properties: FxHashMap::default(),
            property_order: Vec::new(),
            prototype: None,
            callable: None,
            array_elements: None,
            class_name: "Object".to_string(),
            extensible: true,
            primitive_value: None,
        }
    }

    fn array_index(&self, key: &str) -> Option<usize> {
        let elems = self.array_elements.as_ref()?;
        let idx = key.parse::<usize>().ok()?;
        // "01" and "+1" are ordinary keys
        if idx.to_string() != key || idx >= elems.len() {
            return None;
        }
        Some(idx)
    }

    pub fn get_own_property(&self, key: &str) -> Option<PropertyDescriptor> {
        if let Some(desc) = self.properties.get(key) {
            return Some(desc.clone());
        }
        if let Some(idx) = self.array_index(key)
            && let Some(elems) = &self.array_elements
        {
            return Some(PropertyDescriptor::data_default(elems[idx].clone()));
        }
        if key == "length"
            && let Some(elems) = &self.array_elements
        {
            return Some(PropertyDescriptor::data(
                JsValue::Number(elems.len() as f64),
                true,
                false,
                false,
            ));
        }
        None
    }

    pub fn has_own_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
            || self.array_index(key).is_some()
            || (key == "length" && self.array_elements.is_some())
    }

    pub fn define_own_property(&mut self, key: String, desc: PropertyDescriptor) -> bool {
        if let Some(current) = self.properties.get(&key) {
            if current.configurable == Some(false) {
                if desc.configurable == Some(true) {
                    return false;
                }
                if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
                    return false;
                }
                if current.is_data_descriptor() != desc.is_data_descriptor() {
                    return false;
                }
                if current.is_data_descriptor() && current.writable == Some(false) {
                    if desc.writable == Some(true) {
                        return false;
                    }
                    if desc.value.is_some() {
                        return false;
                    }
                }
            }
        } else if self.array_index(&key).is_none() && !self.extensible {
            return false;
        }
        if let Some(idx) = self.array_index(&key)
            && let Some(elems) = &mut self.array_elements
        {
            // plain array slots stay in the element vector
            if desc.attributes() == PropertyAttributes::ALL && desc.is_data_descriptor() {
                elems[idx] = desc.value.unwrap_or(JsValue::Undefined);
                return true;
            }
        }
        if !self.properties.contains_key(&key) {
            self.property_order.push(key.clone());
        }
        self.properties.insert(key, desc);
        true
    }

    /// Own-property assignment. Returns false when the write is refused.
    pub fn set_own_value(&mut self, key: &str, value: JsValue) -> bool {
        if let Some(idx) = self.array_index(key)
            && let Some(elems) = &mut self.array_elements
        {
            elems[idx] = value;
            return true;
        }
        if let Some(desc) = self.properties.get_mut(key) {
            if desc.is_accessor_descriptor() || desc.writable == Some(false) {
                return false;
            }
            desc.value = Some(value);
            return true;
        }
        if !self.extensible {
            return false;
        }
        self.insert_value(key.to_string(), value);
        true
    }

    pub fn insert_value(&mut self, key: String, value: JsValue) {
        self.insert_property(key, PropertyDescriptor::data_default(value));
    }

    pub fn insert_builtin(&mut self, key: String, value: JsValue) {
        self.insert_property(key, PropertyDescriptor::data(value, true, false, true));
    }

    pub fn insert_property(&mut self, key: String, desc: PropertyDescriptor) {
        if !self.properties.contains_key(&key) {
            self.property_order.push(key.clone());
        }
        self.properties.insert(key, desc);
    }

    pub fn delete(&mut self, key: &str) -> bool {
        match self.properties.get(key) {
            Some(desc) if desc.configurable == Some(false) => false,
            Some(_) => {
                self.properties.remove(key);
                self.property_order.retain(|k| k != key);
                true
            }
            None => true,
        }
    }

    /// Own string keys in property order: array indices first, then the
    /// remaining keys in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(elems) = &self.array_elements {
            keys.extend((0..elems.len()).map(|i| i.to_string()));
        }
        keys.extend(self.property_order.iter().cloned());
        keys
    }
}

/// Shared handle to a host object.
#[derive(Clone)]
pub struct JsObject(Rc<RefCell<JsObjectData>>);

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => write!(f, "[object {}]", data.class_name),
            Err(_) => write!(f, "[object <borrowed>]"),
        }
    }
}

impl JsObject {
    pub fn from_data(data: JsObjectData) -> Self {
        JsObject(Rc::new(RefCell::new(data)))
    }

    pub fn with_prototype(prototype: Option<JsObject>) -> Self {
        let mut data = JsObjectData::new();
        data.prototype = prototype;
        Self::from_data(data)
    }

    pub fn borrow(&self) -> Ref<'_, JsObjectData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, JsObjectData> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &JsObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_callable(&self) -> bool {
        self.0.borrow().callable.is_some()
    }

    pub fn callable(&self) -> Option<JsFunction> {
        self.0.borrow().callable.clone()
    }

    pub fn is_array(&self) -> bool {
        self.0.borrow().array_elements.is_some()
    }

    pub fn array_elements(&self) -> Vec<JsValue> {
        self.0.borrow().array_elements.clone().unwrap_or_default()
    }

    pub fn class_name(&self) -> String {
        self.0.borrow().class_name.clone()
    }

    pub fn primitive_value(&self) -> Option<JsValue> {
        self.0.borrow().primitive_value.clone()
    }

    pub fn prototype(&self) -> Option<JsObject> {
        self.0.borrow().prototype.clone()
    }

    pub fn is_extensible(&self) -> bool {
        self.0.borrow().extensible
    }

    pub fn prevent_extensions(&self) {
        self.0.borrow_mut().extensible = false;
    }

    pub fn get_own_property(&self, key: &str) -> Option<PropertyDescriptor> {
        self.0.borrow().get_own_property(key)
    }

    pub fn has_own_property(&self, key: &str) -> bool {
        self.0.borrow().has_own_property(key)
    }

    /// Looks `key` up along the prototype chain.
    pub fn get_property_descriptor(&self, key: &str) -> Option<PropertyDescriptor> {
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            if let Some(desc) = obj.get_own_property(key) {
                return Some(desc);
            }
            current = obj.prototype();
        }
        None
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.get_property_descriptor(key).is_some()
    }

    /// Stored value of `key`, without running getters.
    pub fn get(&self, key: &str) -> JsValue {
        self.get_property_descriptor(key)
            .and_then(|d| d.value)
            .unwrap_or(JsValue::Undefined)
    }

    pub fn define_own_property(&self, key: &str, desc: PropertyDescriptor) -> bool {
        self.0.borrow_mut().define_own_property(key.to_string(), desc)
    }

    /// Plain assignment. Inherited read-only or accessor properties block
    /// the write the same way own ones do.
    pub fn set(&self, key: &str, value: JsValue) -> bool {
        if !self.has_own_property(key)
            && let Some(proto) = self.prototype()
            && let Some(inherited) = proto.get_property_descriptor(key)
            && (inherited.is_accessor_descriptor() || inherited.writable == Some(false))
        {
            return false;
        }
        self.0.borrow_mut().set_own_value(key, value)
    }

    pub fn insert_builtin(&self, key: &str, value: JsValue) {
        self.0.borrow_mut().insert_builtin(key.to_string(), value);
    }

    pub fn insert_value(&self, key: &str, value: JsValue) {
        self.0.borrow_mut().insert_value(key.to_string(), value);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.0.borrow_mut().delete(key)
    }

    pub fn own_keys(&self) -> Vec<String> {
        self.0.borrow().own_keys()
    }

    pub fn own_enumerable_keys(&self) -> Vec<String> {
        let data = self.0.borrow();
        data.own_keys()
            .into_iter()
            .filter(|k| {
                data.properties
                    .get(k)
                    .is_none_or(|d| d.enumerable == Some(true))
            })
            .collect()
    }
}
