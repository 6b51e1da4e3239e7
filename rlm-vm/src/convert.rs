//! Moving values between JSON and the sandbox, and their display form

use crate::error::{runtime_fault, Result};
use rhai::{Dynamic, FnPtr};

/// The sandbox value for a JSON document. Numbers Rhai cannot hold fall
/// back to their JSON text.
pub fn to_dynamic(value: &serde_json::Value) -> Dynamic {
    match rhai::serde::to_dynamic(value) {
        Ok(dynamic) => dynamic,
        Err(_) => Dynamic::from(value.to_string()),
    }
}

/// JSON form of a sandbox value
pub fn to_json(value: &Dynamic) -> Result<serde_json::Value> {
    if value.is::<FnPtr>() {
        return Err(runtime_fault("a function pointer has no JSON form"));
    }
    rhai::serde::from_dynamic(value)
        .map_err(|e| runtime_fault(format!("value has no JSON form: {}", e)))
}

/// Text a value is reported as: strings raw, arrays and maps as JSON
pub fn display(value: &Dynamic) -> String {
    if value.is_string() {
        return value.clone().into_string().unwrap_or_default();
    }
    if value.is_array() || value.is_map() {
        if let Ok(json) = to_json(value) {
            return json.to_string();
        }
    }
    value.to_string()
}
