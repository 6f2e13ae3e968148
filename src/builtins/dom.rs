use std::rc::Rc;

use crate::bootstrap::InstallStep;
use crate::types::JsValue;

pub(crate) fn steps() -> Vec<InstallStep> {
    vec![
        InstallStep::method(
            "Element.prototype",
            "remove",
            0,
            Rc::new(|realm, this, _args| {
                let parent = realm.get(this, "parentNode")?;
                if parent.is_object() {
                    realm.invoke(&parent, "removeChild", std::slice::from_ref(this))?;
                }
                Ok(JsValue::Undefined)
            }),
        )
        .dom_only(),
    ]
}
