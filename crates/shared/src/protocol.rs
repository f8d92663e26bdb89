use serde::{Deserialize, Serialize};

use crate::domain::{PeerId, WidgetId};

/// A typed protocol argument. The serialized form is byte-stable and
/// identical to the `preArgs` objects in layout documents:
/// `{"type":"i","value":1}`, `{"type":"f","value":0.5}`, `{"type":"T"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ArgValue {
    #[serde(rename = "i")]
    Int(i32),
    #[serde(rename = "f")]
    Float(f64),
    #[serde(rename = "s")]
    Str(String),
    #[serde(rename = "T")]
    True,
    #[serde(rename = "F")]
    False,
}

impl ArgValue {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }

    /// Single-character kind tag, as used on the wire.
    pub fn kind(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::Str(_) => 's',
            Self::True => 'T',
            Self::False => 'F',
        }
    }

    /// Numeric reading of the argument; booleans map to 1/0, strings to
    /// nothing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::True => Some(1.0),
            Self::False => Some(0.0),
            Self::Str(_) => None,
        }
    }
}

/// One protocol message: a slash-delimited address plus an ordered,
/// typed argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub address: String,
    pub args: Vec<ArgValue>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<ArgValue>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// A widget's current value: one scalar, or one independent scalar per
/// cell for matrix-shaped widgets. Serializes as a bare number or array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell(&self, index: usize) -> Option<f64> {
        match self {
            Self::Scalar(v) if index == 0 => Some(*v),
            Self::Scalar(_) => None,
            Self::Vector(cells) => cells.get(index).copied(),
        }
    }

    pub fn cells(&self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Vector(cells) => cells.clone(),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Vector(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetValue {
    pub widget_id: WidgetId,
    pub value: Value,
}

/// Frames sent by a connected control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    Control {
        message: Message,
    },
}

/// Frames sent to a connected control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        peer_id: PeerId,
    },
    /// Full widget-id to value table, sent once after the handshake so a
    /// surface can recall the session state.
    StateSnapshot {
        values: Vec<WidgetValue>,
    },
    Control {
        message: Message,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_value_wire_form_is_byte_stable() {
        let cases = [
            (ArgValue::Int(1), r#"{"type":"i","value":1}"#),
            (ArgValue::Float(7000.0), r#"{"type":"f","value":7000.0}"#),
            (ArgValue::Str("a".into()), r#"{"type":"s","value":"a"}"#),
            (ArgValue::True, r#"{"type":"T"}"#),
            (ArgValue::False, r#"{"type":"F"}"#),
        ];
        for (arg, expected) in cases {
            assert_eq!(serde_json::to_string(&arg).expect("serialize"), expected);
            let back: ArgValue = serde_json::from_str(expected).expect("deserialize");
            assert_eq!(back, arg);
        }
    }

    #[test]
    fn arg_value_parses_document_pre_args() {
        let arg: ArgValue = serde_json::from_str(r#"{"type":"i","value":1}"#).expect("parse");
        assert_eq!(arg, ArgValue::Int(1));
        assert_eq!(arg.as_f64(), Some(1.0));
    }

    #[test]
    fn value_serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&Value::Scalar(0.5)).expect("scalar"),
            "0.5"
        );
        assert_eq!(
            serde_json::to_string(&Value::Vector(vec![0.0, 1.0])).expect("vector"),
            "[0.0,1.0]"
        );
    }

    #[test]
    fn client_frame_round_trips() {
        let frame = ClientFrame::Control {
            message: Message::new("/osc/freq", vec![ArgValue::Int(1), ArgValue::Float(7000.0)]),
        };
        let text = serde_json::to_string(&frame).expect("serialize");
        let back: ClientFrame = serde_json::from_str(&text).expect("deserialize");
        match back {
            ClientFrame::Control { message } => {
                assert_eq!(message.address, "/osc/freq");
                assert_eq!(message.args.len(), 2);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
