//! Wire message envelope shared by every plugin on a connection.
//!
//! On the wire a message is a JSON object with a string `type` tag and any
//! number of additional fields:
//!
//! ```json
//! { "type": "object_position", "id": 3, "position": { "x": 10, "y": 20 } }
//! ```
//!
//! All plugins share one type namespace. The runtime hands every inbound
//! message to every plugin, and each plugin picks out the tags it knows with
//! [`WireMessage::interpret`].

use crate::error::MessageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A set of message types owned by one plugin.
///
/// Implemented by a plugin's `#[serde(tag = "type")]` message enum. `KINDS`
/// lists every tag the enum can decode so that foreign messages are skipped
/// without attempting a decode.
///
/// ```rust
/// use room_runtime::MessageSet;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "type", rename_all = "snake_case")]
/// enum PingMessage {
///     Ping { nonce: u32 },
/// }
///
/// impl MessageSet for PingMessage {
///     const KINDS: &'static [&'static str] = &["ping"];
/// }
/// ```
pub trait MessageSet: Serialize + DeserializeOwned {
    const KINDS: &'static [&'static str];
}

/// A tagged message as it travels between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// The `type` tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Every other field of the message
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WireMessage {
    /// Creates a message with no fields besides its tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field, replacing any previous value under the same key.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Parses a raw JSON message.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Builds a message from a typed payload whose serialized form carries a `type` tag.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, MessageError> {
        Self::from_value(serde_json::to_value(payload)?)
    }

    fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Object(mut fields) = value else {
            return Err(MessageError::NotAnObject);
        };
        match fields.remove("type") {
            Some(Value::String(kind)) => Ok(Self { kind, fields }),
            _ => Err(MessageError::MissingType),
        }
    }

    /// Returns the `type` tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns a field by name.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the message as a JSON value, tag included.
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("type".to_string(), Value::String(self.kind.clone()));
        Value::Object(object)
    }

    /// Encodes the message as a JSON string.
    pub fn encode(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(&self.to_value())?)
    }

    /// Decodes the message into a typed payload regardless of its tag.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        Ok(serde_json::from_value(self.to_value())?)
    }

    /// Decodes the message if its tag belongs to `M`.
    ///
    /// Returns `None` for tags `M` does not own, which is the normal case for
    /// most plugins and most messages. `Some(Err(_))` means the tag matched but
    /// the fields were malformed.
    pub fn interpret<M: MessageSet>(&self) -> Option<Result<M, MessageError>> {
        if M::KINDS.contains(&self.kind.as_str()) {
            Some(self.decode())
        } else {
            None
        }
    }
}
