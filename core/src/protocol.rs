//! JSON control messages exchanged between the server and its clients.
//!
//! Every message is a `{"selector": ..., "value": ...}` object. Parameter
//! updates use the parameter name as selector.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ProtocolError;
use crate::params::{Param, ParamValue};

/// Untyped wire form of a control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub selector: String,
    #[serde(default)]
    pub value: Value,
}

impl Envelope {
    pub fn new(selector: impl Into<String>, value: Value) -> Self {
        Envelope {
            selector: selector.into(),
            value,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> String {
        json!({ "selector": self.selector, "value": self.value }).to_string()
    }
}

/// A control message, decoded and validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Player asks for every current parameter value.
    GetParams,
    /// Recorder (re)starts its audio stream.
    InitStream,
    Start,
    Stop,
    /// Group the receiving player was assigned to.
    PlayerGroup(usize),
    /// A new segment is available in file `slot`.
    UpdateBuffer { slot: usize, sequence: u64 },
    /// Whether a recorder connection was accepted.
    RecorderOk(bool),
    Param(Param, ParamValue),
}

impl Message {
    pub fn selector(&self) -> &'static str {
        match self {
            Message::GetParams => "get-params",
            Message::InitStream => "init-stream",
            Message::Start => "start",
            Message::Stop => "stop",
            Message::PlayerGroup(_) => "player-group",
            Message::UpdateBuffer { .. } => "update-buffer",
            Message::RecorderOk(_) => "recorder-ok",
            Message::Param(param, _) => param.name(),
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let value = match self {
            Message::GetParams | Message::InitStream | Message::Start | Message::Stop => json!(0),
            Message::PlayerGroup(group) => json!(group),
            Message::UpdateBuffer { slot, sequence } => json!([slot, sequence]),
            Message::RecorderOk(ok) => json!(ok),
            Message::Param(_, value) => match value {
                ParamValue::Flag(b) => json!(b),
                ParamValue::Number(n) => json!(n),
            },
        };
        Envelope::new(self.selector(), value)
    }

    pub fn to_json(&self) -> String {
        self.to_envelope().to_json()
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Message::from_envelope(&Envelope::parse(text)?)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let selector = envelope.selector.as_str();
        let invalid = |reason| ProtocolError::InvalidValue {
            selector: selector.to_string(),
            reason,
        };
        let value = &envelope.value;

        match selector {
            "get-params" => Ok(Message::GetParams),
            "init-stream" => Ok(Message::InitStream),
            "start" => Ok(Message::Start),
            "stop" => Ok(Message::Stop),
            "player-group" => value
                .as_u64()
                .map(|g| Message::PlayerGroup(g as usize))
                .ok_or_else(|| invalid("expected a group index")),
            "update-buffer" => match value.as_array().map(Vec::as_slice) {
                Some([slot, sequence]) => match (slot.as_u64(), sequence.as_u64()) {
                    (Some(slot), Some(sequence)) => Ok(Message::UpdateBuffer {
                        slot: slot as usize,
                        sequence,
                    }),
                    _ => Err(invalid("expected non-negative integers")),
                },
                _ => Err(invalid("expected [slot, sequence]")),
            },
            "recorder-ok" => value
                .as_bool()
                .map(Message::RecorderOk)
                .ok_or_else(|| invalid("expected a boolean")),
            other => match Param::from_name(other) {
                Some(param) => Ok(Message::Param(param, param.validate(value)?)),
                None => Err(ProtocolError::UnknownSelector(other.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_params() {
        assert_eq!(
            Message::parse(r#"{"selector":"get-params"}"#).unwrap(),
            Message::GetParams
        );
        assert_eq!(
            Message::parse(r#"{"selector":"update-buffer","value":[3,17]}"#).unwrap(),
            Message::UpdateBuffer {
                slot: 3,
                sequence: 17
            }
        );
        assert_eq!(
            Message::parse(r#"{"selector":"gain","value":99}"#).unwrap(),
            Message::Param(Param::Gain, ParamValue::Number(20.0))
        );
        assert_eq!(
            Message::parse(r#"{"selector":"freeze","value":true}"#).unwrap(),
            Message::Param(Param::Freeze, ParamValue::Flag(true))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Message::parse("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Message::parse(r#"{"selector":"volume","value":1}"#),
            Err(ProtocolError::UnknownSelector(s)) if s == "volume"
        ));
        assert!(matches!(
            Message::parse(r#"{"selector":"update-buffer","value":[1]}"#),
            Err(ProtocolError::InvalidValue { .. })
        ));
        assert!(matches!(
            Message::parse(r#"{"selector":"end","value":"yes"}"#),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }

    #[test]
    fn encodes_the_envelope_shape() {
        let text = Message::UpdateBuffer {
            slot: 2,
            sequence: 12,
        }
        .to_json();
        let envelope = Envelope::parse(&text).unwrap();
        assert_eq!(envelope.selector, "update-buffer");
        assert_eq!(envelope.value, json!([2, 12]));

        let envelope = Envelope::parse(&Message::RecorderOk(false).to_json()).unwrap();
        assert_eq!(envelope.value, json!(false));
    }
}
