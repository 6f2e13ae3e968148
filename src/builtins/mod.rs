mod array;
mod date;
mod dom;
mod json;
mod number;
mod object;
mod string;

use crate::bootstrap::InstallStep;

pub use object::same_value;

/// Every area's steps, in the order they must run.
pub(crate) fn steps() -> Vec<InstallStep> {
    let mut steps = object::steps();
    steps.extend(array::steps());
    steps.extend(number::steps());
    steps.extend(string::steps());
    steps.extend(date::steps());
    steps.extend(json::steps());
    steps.extend(dom::steps());
    steps
}
