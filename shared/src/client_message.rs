use serde_json::Value;

use crate::RoomCode;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("payload is null")]
    Null,
    #[error("create command has no string \"roomName\"")]
    MissingRoomName,
}

/// A control message received from a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Create {
        room_name: String,
        client_name: String,
    },
    /// `room_code` is `None` when the field is missing or not a string; such
    /// a join can never match a live room.
    Join {
        room_code: Option<RoomCode>,
        client_name: String,
    },
    /// Anything that is not a room command, including values with no `type`.
    /// `raw` is the frame exactly as it arrived and is what gets forwarded to
    /// the other members.
    Relay { kind: Option<String>, raw: String },
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

impl ClientMessage {
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;

        if value.is_null() {
            return Err(DecodeError::Null);
        }

        let kind = string_field(&value, "type");
        let client_name = string_field(&value, "clientName").unwrap_or_default();

        match kind.as_deref() {
            Some("create") => Ok(ClientMessage::Create {
                room_name: string_field(&value, "roomName").ok_or(DecodeError::MissingRoomName)?,
                client_name,
            }),
            Some("join") => Ok(ClientMessage::Join {
                room_code: string_field(&value, "roomCode"),
                client_name,
            }),
            _ => Ok(ClientMessage::Relay {
                kind,
                raw: text.to_string(),
            }),
        }
    }
}
