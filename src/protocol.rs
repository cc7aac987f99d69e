//! Message envelope: requests, responses and events over the framed
//! transport, built on our own `JsonValue` instead of `serde_json::Value`.

use crate::error::AdapterError;
use crate::json::JsonValue;

#[derive(Debug, Clone)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    pub arguments: JsonValue,
}

impl Request {
    pub fn from_json(value: &JsonValue) -> Result<Request, AdapterError> {
        let seq = value
            .get("seq")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| AdapterError::Protocol("request missing 'seq'".into()))?;
        let msg_type = value.get("type").and_then(JsonValue::as_str).unwrap_or("");
        if msg_type != "request" {
            return Err(AdapterError::Protocol(format!(
                "expected type 'request', got '{msg_type}'"
            )));
        }
        let command = value
            .get("command")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AdapterError::Protocol("request missing 'command'".into()))?
            .to_owned();
        let arguments = value.get("arguments").cloned().unwrap_or(JsonValue::object());
        Ok(Request {
            seq,
            command,
            arguments,
        })
    }
}

/// A response body is either a success body (possibly absent) or an
/// error message; the envelope's `success` flag and `body`/`message`
/// fields are derived from this at encode time.
pub enum ResponseBody {
    Success(Option<JsonValue>),
    Error(String),
}

pub struct Response {
    pub request_seq: i64,
    pub command: String,
    pub body: ResponseBody,
}

impl Response {
    pub fn success(request_seq: i64, command: impl Into<String>, body: Option<JsonValue>) -> Self {
        Response {
            request_seq,
            command: command.into(),
            body: ResponseBody::Success(body),
        }
    }

    pub fn error(request_seq: i64, command: impl Into<String>, message: impl Into<String>) -> Self {
        Response {
            request_seq,
            command: command.into(),
            body: ResponseBody::Error(message.into()),
        }
    }

    /// Builds the wire envelope. `seq` is assigned by the caller (the
    /// session's monotonic counter) immediately before sending.
    pub fn into_json(self, seq: i64) -> JsonValue {
        let mut obj = JsonValue::object();
        obj.insert("seq", JsonValue::Number(seq as f64));
        obj.insert("type", JsonValue::from("response"));
        obj.insert("request_seq", JsonValue::Number(self.request_seq as f64));
        obj.insert("command", JsonValue::from(self.command));
        match self.body {
            ResponseBody::Success(body) => {
                obj.insert("success", JsonValue::Bool(true));
                if let Some(body) = body {
                    obj.insert("body", body);
                }
            }
            ResponseBody::Error(message) => {
                obj.insert("success", JsonValue::Bool(false));
                obj.insert("message", JsonValue::from(message));
            }
        }
        obj
    }
}

pub struct Event {
    pub event: String,
    pub body: Option<JsonValue>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<JsonValue>) -> Self {
        Event {
            event: event.into(),
            body,
        }
    }

    pub fn into_json(self, seq: i64) -> JsonValue {
        let mut obj = JsonValue::object();
        obj.insert("seq", JsonValue::Number(seq as f64));
        obj.insert("type", JsonValue::from("event"));
        obj.insert("event", JsonValue::from(self.event));
        if let Some(body) = self.body {
            obj.insert("body", body);
        }
        obj
    }
}
