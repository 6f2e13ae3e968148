use std::cell::RefCell;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::JsError;
use crate::realm::Realm;
use crate::types::JsValue;

/// A feature/bug check against the value currently installed under a key.
/// `Ok(true)` means the existing value is missing or non-conformant and must
/// be replaced.
pub type Probe = fn(&Realm, &JsValue) -> Result<bool, JsError>;

/// Memoized probe verdicts, keyed by probe name in evaluation order. A
/// verdict is recorded once and never re-evaluated.
#[derive(Debug, Default)]
pub struct ProbeRegistry {
    verdicts: RefCell<IndexMap<String, bool>>,
    debug: bool,
}

impl ProbeRegistry {
    pub fn new(debug: bool) -> Self {
        Self {
            verdicts: RefCell::new(IndexMap::new()),
            debug,
        }
    }

    /// Returns the recorded verdict for `name`, running `probe` the first
    /// time. A probe that errors is recorded as `true`.
    pub fn evaluate(
        &self,
        name: &str,
        probe: impl FnOnce() -> Result<bool, JsError>,
    ) -> bool {
        if let Some(verdict) = self.verdicts.borrow().get(name) {
            return *verdict;
        }
        let verdict = match probe() {
            Ok(v) => v,
            Err(err) => {
                if self.debug {
                    debug!(probe = name, error = %err, "probe threw");
                }
                true
            }
        };
        if self.debug {
            debug!(probe = name, replace = verdict, "probe verdict");
        }
        self.verdicts.borrow_mut().insert(name.to_string(), verdict);
        verdict
    }

    pub fn verdict(&self, name: &str) -> Option<bool> {
        self.verdicts.borrow().get(name).copied()
    }

    pub fn verdicts(&self) -> Vec<(String, bool)> {
        self.verdicts
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.verdicts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.borrow().is_empty()
    }
}
