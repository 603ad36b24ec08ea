//! Filters available to custom environment templates
//!
//! Binding values are strings, so most filters take and return `&str`.
//! `default` and `required` work on raw values because they have to see
//! undefined and none.

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Error, ErrorKind, Value};

fn invalid(msg: String) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg)
}

/// `{{ value | default("fallback") }}`: fallback for undefined or none
pub fn default_filter(value: Value, fallback: Value) -> Value {
    match value.is_undefined() || value.is_none() {
        true => fallback,
        false => value,
    }
}

/// `{{ value | b64enc }}`
pub fn b64enc(value: &str) -> String {
    STANDARD.encode(value)
}

/// `{{ value | b64dec }}`; the decoded bytes must be UTF-8
pub fn b64dec(value: &str) -> Result<String, Error> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| invalid(format!("b64dec: {e}")))?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("b64dec: decoded value is not UTF-8: {e}")))
}

/// `{{ value | required("message") }}`: fail on undefined or none
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        let msg = message.unwrap_or_else(|| "required binding value is missing".to_string());
        return Err(Error::new(ErrorKind::UndefinedError, msg));
    }
    Ok(value)
}

/// `{{ value | upper }}`
pub fn upper(value: &str) -> String {
    value.to_uppercase()
}

/// `{{ value | lower }}`
pub fn lower(value: &str) -> String {
    value.to_lowercase()
}
