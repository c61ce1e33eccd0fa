use serde::{Deserialize, Serialize};

use crate::{INVALID_MESSAGE_FORMAT_MESSAGE, ROOM_NOT_FOUND_MESSAGE, RoomCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Created {
        room_code: RoomCode,
        room_name: String,
    },
    Joined {
        room_code: RoomCode,
        room_name: String,
    },
    Error {
        message: String,
    },
    ClientList {
        clients: Vec<String>,
    },
}

impl ServerMessage {
    pub fn room_not_found() -> Self {
        ServerMessage::Error {
            message: ROOM_NOT_FOUND_MESSAGE.to_string(),
        }
    }

    pub fn invalid_format() -> Self {
        ServerMessage::Error {
            message: INVALID_MESSAGE_FORMAT_MESSAGE.to_string(),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
