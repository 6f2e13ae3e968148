use thiserror::Error;

/// An exception raised by an installed method or by one of the typed
/// capability calls. The variant mirrors the host error constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsError {
    #[error("TypeError: {0}")]
    Type(String),
    #[error("RangeError: {0}")]
    Range(String),
    #[error("SyntaxError: {0}")]
    Syntax(String),
}

impl JsError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        JsError::Type(msg.into())
    }

    pub fn range_error(msg: impl Into<String>) -> Self {
        JsError::Range(msg.into())
    }

    pub fn syntax_error(msg: impl Into<String>) -> Self {
        JsError::Syntax(msg.into())
    }

    pub fn name(&self) -> &'static str {
        match self {
            JsError::Type(_) => "TypeError",
            JsError::Range(_) => "RangeError",
            JsError::Syntax(_) => "SyntaxError",
        }
    }
}

/// Failures of the install sequence itself, detected before any step runs
/// or raised by a step in strict mode.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("install step `{step}` depends on `{dependency}`, which is not an earlier step")]
    MisorderedDependency { step: String, dependency: String },
    #[error("install step `{0}` appears twice")]
    DuplicateStep(String),
    #[error("install step `{step}` failed: {source}")]
    Step {
        step: String,
        #[source]
        source: JsError,
    },
}
