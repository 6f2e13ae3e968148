pub mod bootstrap;
mod builtins;
pub mod calendar;
pub mod config;
pub mod error;
pub mod installer;
pub mod json;
pub mod number;
pub mod object;
pub mod probes;
pub mod realm;
pub mod types;

pub use bootstrap::{Capabilities, InstallReport, InstallStep, install};
pub use builtins::same_value;
pub use config::{LocalTimeZone, ShimConfig};
pub use error::{BootstrapError, JsError};
pub use installer::{InstallOutcome, Installer, Overwrite};
pub use realm::Realm;
pub use types::{JsString, JsValue};
