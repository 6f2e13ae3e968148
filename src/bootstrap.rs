use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::builtins;
use crate::calendar;
use crate::config::ShimConfig;
use crate::error::{BootstrapError, JsError};
use crate::installer::{InstallOutcome, Installer, Overwrite};
use crate::object::{JsObject, NativeFn, PropertyAttributes, PropertyDescriptor};
use crate::probes::{Probe, ProbeRegistry};
use crate::realm::Realm;
use crate::types::{JsString, JsValue, to_number};

pub enum StepValue {
    Method { length: usize, func: NativeFn },
    Number(f64),
    /// A plain object with the given class name, such as `JSON`.
    Namespace(&'static str),
    /// The value already at a dotted path; `""` is the global object.
    Alias(&'static str),
}

pub struct InstallStep {
    /// Dotted path from the global object; empty for the global itself.
    pub target: &'static str,
    pub key: String,
    pub value: StepValue,
    pub attributes: PropertyAttributes,
    /// Probe name (shared names share one verdict) and check.
    pub probe: Option<(&'static str, Probe)>,
    pub depends_on: Vec<&'static str>,
    pub requires_dom: bool,
}

impl InstallStep {
    pub fn method(target: &'static str, key: impl Into<String>, length: usize, func: NativeFn) -> Self {
        Self::new(target, key.into(), StepValue::Method { length, func }, PropertyAttributes::NON_ENUM)
    }

    pub fn constant(
        target: &'static str,
        key: impl Into<String>,
        value: f64,
        attributes: PropertyAttributes,
    ) -> Self {
        Self::new(target, key.into(), StepValue::Number(value), attributes)
    }

    pub fn namespace(target: &'static str, key: impl Into<String>, class_name: &'static str) -> Self {
        Self::new(target, key.into(), StepValue::Namespace(class_name), PropertyAttributes::NON_ENUM)
    }

    /// Installs the value found at `path` under another name. A non-empty
    /// `path` must be an earlier step.
    pub fn alias(target: &'static str, key: impl Into<String>, path: &'static str) -> Self {
        let step = Self::new(target, key.into(), StepValue::Alias(path), PropertyAttributes::NON_ENUM);
        if path.is_empty() { step } else { step.after(&[path]) }
    }

    fn new(target: &'static str, key: String, value: StepValue, attributes: PropertyAttributes) -> Self {
        Self {
            target,
            key,
            value,
            attributes,
            probe: None,
            depends_on: Vec::new(),
            requires_dom: false,
        }
    }

    pub fn probe(mut self, name: &'static str, probe: Probe) -> Self {
        self.probe = Some((name, probe));
        self
    }

    pub fn after(mut self, steps: &[&'static str]) -> Self {
        self.depends_on.extend_from_slice(steps);
        self
    }

    pub fn dom_only(mut self) -> Self {
        self.requires_dom = true;
        self
    }

    /// `Number.prototype.toFixed`, or just the key for globals.
    pub fn name(&self) -> String {
        if self.target.is_empty() {
            self.key.clone()
        } else {
            format!("{}.{}", self.target, self.key)
        }
    }

    pub fn native(&self) -> Option<NativeFn> {
        match &self.value {
            StepValue::Method { func, .. } => Some(func.clone()),
            _ => None,
        }
    }

    /// A fresh host value for this step.
    pub fn make_value(&self, realm: &Realm) -> JsValue {
        match &self.value {
            StepValue::Method { length, func } => {
                JsValue::Object(realm.create_function(&self.key, *length, func.clone()))
            }
            StepValue::Number(n) => JsValue::Number(*n),
            StepValue::Namespace(class_name) => {
                let obj = realm.create_object();
                obj.borrow_mut().class_name = class_name.to_string();
                JsValue::Object(obj)
            }
            StepValue::Alias(path) => realm.lookup(path),
        }
    }

    fn overwrite(&self, registry: &Rc<ProbeRegistry>) -> Overwrite {
        match self.probe {
            None => Overwrite::Never,
            Some((name, probe)) => {
                let registry = Rc::clone(registry);
                Overwrite::When(Rc::new(move |realm, existing, _key, _attrs| {
                    Ok(registry.evaluate(name, || probe(realm, existing)))
                }))
            }
        }
    }
}

/// The default sequence: every builtin this crate provides, in install order.
pub fn default_steps() -> Vec<InstallStep> {
    builtins::steps()
}

/// Checks that step names are unique and that every dependency names an
/// earlier step.
pub fn validate(steps: &[InstallStep]) -> Result<(), BootstrapError> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for step in steps {
        let name = step.name();
        if seen.contains(&name) {
            return Err(BootstrapError::DuplicateStep(name));
        }
        if let Some(dependency) = step.depends_on.iter().find(|d| !seen.contains(**d)) {
            return Err(BootstrapError::MisorderedDependency {
                step: name,
                dependency: dependency.to_string(),
            });
        }
        seen.insert(name);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: String,
    /// `None` when the step was skipped: its target is missing from the realm.
    pub outcome: Option<InstallOutcome>,
    /// The probe verdict consulted for this step, if it ran.
    pub replace_verdict: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub steps: Vec<StepReport>,
    pub probes: Vec<(String, bool)>,
}

impl InstallReport {
    pub fn get(&self, step: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    pub fn outcome(&self, step: &str) -> Option<&InstallOutcome> {
        self.get(step).and_then(|s| s.outcome.as_ref())
    }

    pub fn count(&self, pred: impl Fn(&InstallOutcome) -> bool) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome.as_ref().is_some_and(&pred))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_none()).count()
    }
}

fn step_target(realm: &Realm, step: &InstallStep) -> Option<JsObject> {
    if step.requires_dom && !realm.has_dom() {
        return None;
    }
    realm.resolve(step.target)
}

/// Runs the default sequence. See [`install_steps`].
pub fn install(realm: &Realm, config: ShimConfig) -> Result<(Capabilities<'_>, InstallReport), BootstrapError> {
    install_steps(realm, config, default_steps())
}

/// Validates `steps`, then installs each in order. A step whose target
/// cannot be resolved is skipped. Install failures are reported per step
/// unless `config.strict`, which turns the first one into an error.
pub fn install_steps(
    realm: &Realm,
    config: ShimConfig,
    steps: Vec<InstallStep>,
) -> Result<(Capabilities<'_>, InstallReport), BootstrapError> {
    validate(&steps)?;
    let registry = Rc::new(ProbeRegistry::new(config.debug));
    let installer = Installer::new(realm, config);
    let mut values = FxHashMap::default();
    let mut report = InstallReport::default();

    // a verdict shared by several steps is taken before any of them installs
    let mut uses: FxHashMap<&str, usize> = FxHashMap::default();
    for (name, _) in steps.iter().filter_map(|s| s.probe) {
        *uses.entry(name).or_default() += 1;
    }
    for step in &steps {
        if let Some((name, probe)) = step.probe
            && uses.get(name).is_some_and(|n| *n > 1)
            && let Some(target) = step_target(realm, step)
            && target.has_property(&step.key)
        {
            let existing = target.get(&step.key);
            registry.evaluate(name, || probe(realm, &existing));
        }
    }

    for step in &steps {
        let name = step.name();
        let Some(target) = step_target(realm, step) else {
            if config.debug {
                debug!(step = %name, "target unavailable, skipping");
            }
            report.steps.push(StepReport {
                step: name,
                outcome: None,
                replace_verdict: None,
            });
            continue;
        };

        let desc = PropertyDescriptor::with_attributes(step.make_value(realm), step.attributes);
        let installed = installer
            .install(&target, &step.key, desc, &step.overwrite(&registry))
            .map_err(|source| BootstrapError::Step {
                step: name.clone(),
                source,
            })?;
        if !installed.value.is_undefined() {
            values.insert(name.clone(), installed.value);
        }
        report.steps.push(StepReport {
            step: name,
            outcome: Some(installed.outcome),
            replace_verdict: step.probe.and_then(|(probe, _)| registry.verdict(probe)),
        });
    }

    report.probes = registry.verdicts();
    info!(
        installed = report.count(InstallOutcome::is_installed),
        kept = report.count(|o| *o == InstallOutcome::Kept),
        sealed = report.count(|o| *o == InstallOutcome::Sealed),
        failed = report.count(|o| matches!(o, InstallOutcome::Failed(_))),
        skipped = report.skipped(),
        "shims installed"
    );
    Ok((Capabilities { realm, values }, report))
}

/// The implementations in effect after installation, native or replaced,
/// keyed by step name.
pub struct Capabilities<'r> {
    realm: &'r Realm,
    values: FxHashMap<String, JsValue>,
}

impl<'r> Capabilities<'r> {
    pub fn realm(&self) -> &'r Realm {
        self.realm
    }

    pub fn get(&self, step: &str) -> Option<&JsValue> {
        self.values.get(step)
    }

    pub fn call(&self, step: &str, this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let f = self
            .values
            .get(step)
            .ok_or_else(|| JsError::type_error(format!("{step} is not available")))?;
        self.realm.call(f, this, args)
    }

    fn call_string(&self, step: &str, this: &JsValue, args: &[JsValue]) -> Result<String, JsError> {
        let out = self.call(step, this, args)?;
        Ok(out.to_string())
    }

    fn date(&self, t: f64) -> JsValue {
        JsValue::Object(self.realm.make_date(calendar::time_clip(t)))
    }

    pub fn to_fixed(&self, x: f64, fraction_digits: u32) -> Result<String, JsError> {
        self.call_string(
            "Number.prototype.toFixed",
            &JsValue::Number(x),
            &[JsValue::Number(fraction_digits as f64)],
        )
    }

    /// `precision: None` is `toPrecision(undefined)`.
    pub fn to_precision(&self, x: f64, precision: Option<u32>) -> Result<String, JsError> {
        let precision = precision.map_or(JsValue::Undefined, |p| JsValue::Number(p as f64));
        self.call_string("Number.prototype.toPrecision", &JsValue::Number(x), &[precision])
    }

    pub fn parse_int(&self, text: &str, radix: Option<u32>) -> Result<f64, JsError> {
        let radix = radix.map_or(JsValue::Undefined, |r| JsValue::Number(r as f64));
        self.call("parseInt", &JsValue::Undefined, &[JsValue::string(text), radix])
            .map(|v| to_number(&v))
    }

    pub fn parse_float(&self, text: &str) -> Result<f64, JsError> {
        self.call("parseFloat", &JsValue::Undefined, &[JsValue::string(text)])
            .map(|v| to_number(&v))
    }

    pub fn is_array(&self, value: &JsValue) -> Result<bool, JsError> {
        let out = self.call("Array.isArray", &JsValue::Undefined, std::slice::from_ref(value))?;
        Ok(matches!(out, JsValue::Boolean(true)))
    }

    pub fn to_iso_string(&self, t: f64) -> Result<String, JsError> {
        self.call_string("Date.prototype.toISOString", &self.date(t), &[])
    }

    pub fn to_json_date(&self, t: f64) -> Result<JsValue, JsError> {
        self.call("Date.prototype.toJSON", &self.date(t), &[])
    }

    pub fn to_utc_string(&self, t: f64) -> Result<String, JsError> {
        self.call_string("Date.prototype.toUTCString", &self.date(t), &[])
    }

    pub fn to_date_string(&self, t: f64) -> Result<String, JsError> {
        self.call_string("Date.prototype.toDateString", &self.date(t), &[])
    }

    pub fn to_time_string(&self, t: f64) -> Result<String, JsError> {
        self.call_string("Date.prototype.toTimeString", &self.date(t), &[])
    }

    pub fn date_to_string(&self, t: f64) -> Result<String, JsError> {
        self.call_string("Date.prototype.toString", &self.date(t), &[])
    }

    pub fn date_parse(&self, text: &str) -> Result<f64, JsError> {
        let ctor = self.realm.resolve("Date").map_or(JsValue::Undefined, JsValue::Object);
        self.call("Date.parse", &ctor, &[JsValue::string(text)])
            .map(|v| to_number(&v))
    }

    pub fn now(&self) -> Result<f64, JsError> {
        self.call("Date.now", &JsValue::Undefined, &[]).map(|v| to_number(&v))
    }

    /// `Ok(None)` when the value has no JSON text.
    pub fn json_stringify(
        &self,
        value: &JsValue,
        replacer: &JsValue,
        space: &JsValue,
    ) -> Result<Option<String>, JsError> {
        let json = self.values.get("JSON").cloned().unwrap_or(JsValue::Undefined);
        let out = self.call("JSON.stringify", &json, &[value.clone(), replacer.clone(), space.clone()])?;
        Ok(if out.is_undefined() { None } else { Some(out.to_string()) })
    }

    pub fn json_parse(&self, text: &str, reviver: &JsValue) -> Result<JsValue, JsError> {
        let json = self.values.get("JSON").cloned().unwrap_or(JsValue::Undefined);
        self.call("JSON.parse", &json, &[JsValue::string(text), reviver.clone()])
    }

    pub fn object_keys(&self, value: &JsValue) -> Result<Vec<String>, JsError> {
        let keys = self.call("Object.keys", &JsValue::Undefined, std::slice::from_ref(value))?;
        Ok(keys
            .as_object()
            .map(|arr| arr.array_elements().iter().map(|k| k.to_string()).collect())
            .unwrap_or_default())
    }

    pub fn object_is(&self, x: &JsValue, y: &JsValue) -> Result<bool, JsError> {
        let same = self.call("Object.is", &JsValue::Undefined, &[x.clone(), y.clone()])?;
        Ok(matches!(same, JsValue::Boolean(true)))
    }

    pub fn trim(&self, s: &str) -> Result<String, JsError> {
        self.call_string("String.prototype.trim", &JsValue::string(s), &[])
    }

    pub fn from_code_point(&self, code_points: &[f64]) -> Result<JsString, JsError> {
        let args: Vec<JsValue> = code_points.iter().map(|cp| JsValue::Number(*cp)).collect();
        match self.call("String.fromCodePoint", &JsValue::Undefined, &args)? {
            JsValue::String(s) => Ok(s),
            other => Ok(JsString::from_str(&other.to_string())),
        }
    }

    pub fn code_point_at(&self, s: &JsString, pos: f64) -> Result<Option<u32>, JsError> {
        let out = self.call(
            "String.prototype.codePointAt",
            &JsValue::String(s.clone()),
            &[JsValue::Number(pos)],
        )?;
        Ok(out.as_number().map(|n| n as u32))
    }
}
