//! Request bodies and validated response records for each stage.

use serde_json::{Value, json};

use crate::error::StageError;

const ROOT: &str = "(root)";

/// A stage response, checked field by field at decode time.
pub trait StageResponse: Sized {
    fn from_json(value: &Value) -> Result<Self, StageError>;
}

/// Stage 1: `POST guest/activate.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestActivation {
    pub guest_token: String,
}

impl StageResponse for GuestActivation {
    fn from_json(value: &Value) -> Result<Self, StageError> {
        require_root_object(value)?;
        Ok(Self {
            guest_token: require_str(value, "/guest_token")?.to_owned(),
        })
    }
}

/// Stage 2: `POST onboarding/task.json?flow_name=welcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStart {
    pub flow_token: String,
}

impl StageResponse for FlowStart {
    fn from_json(value: &Value) -> Result<Self, StageError> {
        require_root_object(value)?;
        Ok(Self {
            flow_token: require_str(value, "/flow_token")?.to_owned(),
        })
    }
}

/// Stage 3: the `open_account` subtask of `POST onboarding/task.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAccount {
    pub oauth_token: String,
    pub oauth_token_secret: String,
}

impl StageResponse for OpenAccount {
    fn from_json(value: &Value) -> Result<Self, StageError> {
        require_root_object(value)?;
        require(value, "/subtasks", "array", Value::is_array)?;
        require(value, "/subtasks/0", "object", Value::is_object)?;
        require(value, "/subtasks/0/open_account", "object", Value::is_object)?;
        Ok(Self {
            oauth_token: require_str(value, "/subtasks/0/open_account/oauth_token")?.to_owned(),
            oauth_token_secret: require_str(value, "/subtasks/0/open_account/oauth_token_secret")?
                .to_owned(),
        })
    }
}

/// Body of the flow request.
pub fn flow_start_body() -> Value {
    json!({
        "flow_token": null,
        "input_flow_data": {
            "flow_context": {
                "start_location": { "location": "splash_screen" }
            }
        }
    })
}

/// Body of the open-account request, continuing `flow_token`.
pub fn open_account_body(flow_token: &str) -> Value {
    json!({
        "flow_token": flow_token,
        "subtask_inputs": [{
            "open_link": { "link": "next_link" },
            "subtask_id": "NextTaskOpenLink"
        }]
    })
}

fn require_root_object(value: &Value) -> Result<(), StageError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(StageError::shape(ROOT, "object"))
    }
}

fn require<'a>(
    value: &'a Value,
    pointer: &str,
    expected: &'static str,
    check: fn(&Value) -> bool,
) -> Result<&'a Value, StageError> {
    value
        .pointer(pointer)
        .filter(|v| check(v))
        .ok_or_else(|| StageError::shape(pointer, expected))
}

fn require_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, StageError> {
    require(value, pointer, "string", Value::is_string)?
        .as_str()
        .ok_or_else(|| StageError::shape(pointer, "string"))
}
