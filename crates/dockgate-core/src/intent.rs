//! Front-ends that turn user input into an [`ActionRequest`].
//!
//! The dispatcher never trusts what comes out of an intent source; every
//! request still goes through the validator.

use crate::error::{DispatchError, Result};
use crate::types::ActionRequest;
use serde_json::Value;

pub trait IntentSource {
    fn intent(&self, text: &str) -> Result<ActionRequest>;
}

/// Parses a JSON action request, as emitted by a tool-calling model:
///
/// ```json
/// {"action": "RunContainer", "params": {"image": "web", "hostPort": 8080, "name": "c1"}}
/// ```
///
/// Scalar parameter values (strings, numbers, booleans) are accepted and
/// converted to their string form; nested values are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonIntent;

impl IntentSource for JsonIntent {
    fn intent(&self, text: &str) -> Result<ActionRequest> {
        let raw: Value = serde_json::from_str(text)?;
        let obj = raw.as_object().ok_or_else(|| DispatchError::TypeMismatch {
            param: "request".to_string(),
            expected: "object".to_string(),
            value: raw.to_string(),
        })?;

        let action = obj
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::MissingParameter {
                action: "request".to_string(),
                param: "action".to_string(),
            })?;

        let mut request = ActionRequest::new(action);
        if let Some(params) = obj.get("params") {
            let params = params.as_object().ok_or_else(|| DispatchError::TypeMismatch {
                param: "params".to_string(),
                expected: "object".to_string(),
                value: params.to_string(),
            })?;
            for (name, value) in params {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(DispatchError::TypeMismatch {
                            param: name.clone(),
                            expected: "scalar".to_string(),
                            value: other.to_string(),
                        })
                    }
                };
                request = request.param(name.clone(), text);
            }
        }
        Ok(request)
    }
}
