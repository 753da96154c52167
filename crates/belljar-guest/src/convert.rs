//! Value conversion at the serialization boundary.

use boa_engine::{Context, JsError, JsValue};

/// Convert an engine value for the boundary crossing.
///
/// `undefined` does not exist on the far side; it crosses as null ("no
/// value"). Everything else goes through the engine's JSON conversion, and
/// anything that conversion cannot express becomes a runtime fault for the
/// call that produced it.
pub(crate) fn json_from_value(
    value: &JsValue,
    context: &mut Context,
) -> boa_engine::JsResult<serde_json::Value> {
    if value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    value.to_json(context)
}

/// Render a thrown or rejected value as a failure message.
pub(crate) fn error_message(value: &JsValue, context: &mut Context) -> String {
    match JsError::from_opaque(value.clone()).try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => value.display().to_string(),
    }
}
