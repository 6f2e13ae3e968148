use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::config::ShimConfig;
use crate::error::JsError;
use crate::object::{JsObject, PropertyAttributes, PropertyDescriptor};
use crate::realm::Realm;
use crate::types::{JsValue, number_ops};

/// Decides whether an existing property must be replaced. Receives the
/// stored value, the key and the attributes of the pending install. An
/// error counts as "replace".
pub type ConformancePredicate =
    Rc<dyn Fn(&Realm, &JsValue, &str, PropertyAttributes) -> Result<bool, JsError>>;

#[derive(Clone)]
pub enum Overwrite {
    Never,
    Always,
    When(ConformancePredicate),
}

impl fmt::Debug for Overwrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overwrite::Never => write!(f, "Never"),
            Overwrite::Always => write!(f, "Always"),
            Overwrite::When(_) => write!(f, "When(<predicate>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Defined with the requested attributes.
    Defined,
    /// Written by plain assignment; the property is enumerable, writable
    /// and configurable.
    Assigned,
    /// The existing property was left in place.
    Kept,
    /// Replacement requested over a non-configurable property.
    Sealed,
    Failed(String),
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallOutcome::Defined | InstallOutcome::Assigned)
    }
}

#[derive(Debug, Clone)]
pub struct Installed {
    pub outcome: InstallOutcome,
    /// `target[key]` after the install, without running getters.
    pub value: JsValue,
}

pub struct Installer<'r> {
    realm: &'r Realm,
    config: ShimConfig,
}

impl<'r> Installer<'r> {
    pub fn new(realm: &'r Realm, config: ShimConfig) -> Self {
        Self { realm, config }
    }

    pub fn install(
        &self,
        target: &JsObject,
        key: &str,
        desc: PropertyDescriptor,
        overwrite: &Overwrite,
    ) -> Result<Installed, JsError> {
        desc.validate()?;
        let attrs = desc.attributes();

        if target.has_property(key) && !self.should_replace(target, key, attrs, overwrite) {
            return Ok(self.finish(target, key, InstallOutcome::Kept));
        }

        if let Some(own) = target.get_own_property(key)
            && own.configurable == Some(false)
        {
            if self.config.debug {
                debug!(key, "property is not configurable, leaving it in place");
            }
            if self.config.strict {
                return Err(JsError::type_error(format!("Cannot redefine property: {key}")));
            }
            return Ok(self.finish(target, key, InstallOutcome::Sealed));
        }

        if self.realm.supports_descriptors() && target.define_own_property(key, desc.clone()) {
            return Ok(self.finish(target, key, InstallOutcome::Defined));
        }

        let reason = match self.assign(target, key, &desc) {
            Ok(()) => {
                if self.config.debug && self.realm.supports_descriptors() {
                    debug!(key, "define refused, fell back to assignment");
                }
                return Ok(self.finish(target, key, InstallOutcome::Assigned));
            }
            Err(reason) => reason,
        };

        if self.config.debug {
            debug!(key, reason = %reason, "install failed");
        }
        if self.config.strict {
            return Err(JsError::type_error(format!("Cannot install {key}: {reason}")));
        }
        Ok(self.finish(target, key, InstallOutcome::Failed(reason)))
    }

    fn should_replace(
        &self,
        target: &JsObject,
        key: &str,
        attrs: PropertyAttributes,
        overwrite: &Overwrite,
    ) -> bool {
        match overwrite {
            Overwrite::Never => false,
            Overwrite::Always => true,
            Overwrite::When(predicate) => {
                let existing = target.get(key);
                match predicate(self.realm, &existing, key, attrs) {
                    Ok(replace) => replace,
                    Err(err) => {
                        if self.config.debug {
                            debug!(key, error = %err, "conformance check threw, replacing");
                        }
                        true
                    }
                }
            }
        }
    }

    fn assign(&self, target: &JsObject, key: &str, desc: &PropertyDescriptor) -> Result<(), String> {
        if desc.is_accessor_descriptor() {
            return Err("accessors cannot be installed by assignment".to_string());
        }
        let value = desc.value.clone().unwrap_or(JsValue::Undefined);
        if !target.set(key, value.clone()) {
            return Err(if target.is_extensible() {
                "property is read-only".to_string()
            } else {
                "object is not extensible".to_string()
            });
        }
        let stuck = match (&target.get(key), &value) {
            (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
            (JsValue::Object(a), JsValue::Object(b)) => a.ptr_eq(b),
            (a, b) => a.type_of() == b.type_of() && a.to_string() == b.to_string(),
        };
        if stuck {
            Ok(())
        } else {
            Err("assignment did not take effect".to_string())
        }
    }

    fn finish(&self, target: &JsObject, key: &str, outcome: InstallOutcome) -> Installed {
        Installed {
            outcome,
            value: target.get(key),
        }
    }
}
