//! Riap envelope helper.
//!
//! The client returns whatever the peer sent, decoded but otherwise
//! untouched. Riap servers answer with an envelope array
//! `[status, message, result?, meta?]`; [`Envelope`] gives typed access to it.

use crate::error::RiapError;
use serde::Serialize;
use serde_json::Value;

/// A decoded response, exactly as the peer sent it.
pub type Response = Value;

/// Typed view of a `[status, message, result?, meta?]` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Envelope {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            result: None,
            meta: None,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Read an envelope out of a decoded response.
    ///
    /// Fails with a protocol error if the response is not an array starting
    /// with an integer status.
    pub fn from_value(value: &Value) -> Result<Self, RiapError> {
        let items = value
            .as_array()
            .ok_or_else(|| RiapError::protocol("response is not an envelope array"))?;

        let status = items
            .first()
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .ok_or_else(|| RiapError::protocol("response envelope has no valid status"))?;

        let message = match items.get(1) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            status,
            message,
            result: items.get(2).cloned(),
            meta: items.get(3).cloned(),
        })
    }

    /// 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Render back to the `[status, message, result?, meta?]` array form.
    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::from(self.status), Value::from(self.message.clone())];
        match (&self.result, &self.meta) {
            (None, None) => {}
            (result, None) => items.push(result.clone().unwrap_or(Value::Null)),
            (result, Some(meta)) => {
                items.push(result.clone().unwrap_or(Value::Null));
                items.push(meta.clone());
            }
        }
        Value::Array(items)
    }
}

impl TryFrom<&Value> for Envelope {
    type Error = RiapError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<&RiapError> for Envelope {
    fn from(err: &RiapError) -> Self {
        Envelope::new(err.status_code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_envelope() {
        let envelope =
            Envelope::from_value(&json!([200, "OK", {"a": 1}, {"func.x": true}])).unwrap();
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.message, "OK");
        assert_eq!(envelope.result, Some(json!({"a": 1})));
        assert_eq!(envelope.meta, Some(json!({"func.x": true})));
        assert!(envelope.is_success());
    }

    #[test]
    fn test_minimal_envelope() {
        let envelope = Envelope::try_from(&json!([404, "Not found"])).unwrap();
        assert_eq!(envelope.status, 404);
        assert!(envelope.result.is_none());
        assert!(!envelope.is_success());
        assert_eq!(envelope.to_value(), json!([404, "Not found"]));
    }

    #[test]
    fn test_non_envelope_is_protocol_error() {
        for value in [json!({"a": 1}), json!([]), json!(["200", "OK"]), json!([70000, "x"])] {
            assert!(matches!(
                Envelope::from_value(&value),
                Err(RiapError::Protocol { .. })
            ));
        }
    }

    #[test]
    fn test_from_error() {
        let envelope = Envelope::from(&RiapError::MissingResourceUri);
        assert_eq!(envelope.status, 400);
        assert!(envelope.message.contains("resource uri"));
    }
}
