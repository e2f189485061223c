//! Pre-flight request checks.
//!
//! Runs before any URL handling or network activity. A validator error is
//! handed back to the caller unchanged.

use crate::error::{Result, RiapError};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static ACTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("action regex must compile"));

/// Protocol versions a request may ask for.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.1", "1.2"];

/// Checks a request (`action` plus the extra fields) before it is sent.
pub trait RequestValidator: Send + Sync {
    fn check(&self, request: &Map<String, Value>) -> Result<()>;
}

/// Shape checks every Riap request must pass.
///
/// - `action` is present and consists of word characters only (400)
/// - `v`, if present, names a supported protocol version (501)
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl RequestValidator for DefaultValidator {
    fn check(&self, request: &Map<String, Value>) -> Result<()> {
        match request.get("action") {
            None | Some(Value::Null) => {
                return Err(RiapError::validation("Please specify action"));
            }
            Some(Value::String(action)) if ACTION_NAME.is_match(action) => {}
            Some(_) => {
                return Err(RiapError::validation(
                    "Invalid syntax in action, please use letters/numbers only",
                ));
            }
        }

        if let Some(version) = request.get("v") {
            let version = match version {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
                return Err(RiapError::Validation {
                    status: 501,
                    message: format!(
                        "Protocol version {} not supported, use one of: {}",
                        version,
                        SUPPORTED_VERSIONS.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Accepts every request. For hosts that validate upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl RequestValidator for NoValidation {
    fn check(&self, _request: &Map<String, Value>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(request: Value) -> Result<()> {
        match request {
            Value::Object(map) => DefaultValidator.check(&map),
            other => panic!("not an object: {}", other),
        }
    }

    fn status_of(result: Result<()>) -> u16 {
        result.unwrap_err().status_code()
    }

    #[test]
    fn test_accepts_plain_action() {
        assert!(check(json!({"action": "call", "args": {"a": 1}})).is_ok());
        assert!(check(json!({"action": "child_metas"})).is_ok());
    }

    #[test]
    fn test_missing_action() {
        let err = check(json!({"uri": "/Foo/"})).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Please specify action");
    }

    #[test]
    fn test_invalid_action_syntax() {
        assert_eq!(status_of(check(json!({"action": "call me"}))), 400);
        assert_eq!(status_of(check(json!({"action": ""}))), 400);
        assert_eq!(status_of(check(json!({"action": 5}))), 400);
    }

    #[test]
    fn test_version_check() {
        assert!(check(json!({"action": "call", "v": 1.1})).is_ok());
        assert!(check(json!({"action": "call", "v": "1.2"})).is_ok());
        assert_eq!(status_of(check(json!({"action": "call", "v": 2}))), 501);
    }

    #[test]
    fn test_no_validation_accepts_anything() {
        assert!(NoValidation.check(&Map::new()).is_ok());
    }
}
