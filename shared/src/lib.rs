pub mod client_message;
pub mod server_message;

pub use client_message::{ClientMessage, DecodeError};
pub use server_message::ServerMessage;

pub const SIGNAL_PORT: u16 = 3001;

pub const ROOM_CODE_LENGTH: usize = 6;

pub const ROOM_NOT_FOUND_MESSAGE: &str = "Room not found";
pub const INVALID_MESSAGE_FORMAT_MESSAGE: &str = "Invalid message format";

pub type RoomCode = String;
