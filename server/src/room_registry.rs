use std::collections::HashMap;

use log::{debug, info};
use rand::Rng;
use shared::{ROOM_CODE_LENGTH, RoomCode};
use tokio::sync::Mutex;

use crate::{
    connection::{ConnectionId, PeerConnection},
    room::{Member, Room},
};

const ROOM_CODE_CHARSET: &[u8] = b"0123456789abcdef";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),
}

/// Where a connection ended up after `create_room` or `join_room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntry {
    pub room_code: RoomCode,
    pub room_name: String,
    /// Room the connection was moved out of, if it was already in one.
    pub vacated_room: Option<RoomCode>,
}

#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub clients: Vec<String>,
    pub connections: Vec<PeerConnection>,
}

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<RoomCode, Room>,
    connection_rooms: HashMap<ConnectionId, RoomCode>,
}

impl RegistryState {
    fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<RoomCode> {
        let room_code = self.connection_rooms.remove(&connection_id)?;

        if let Some(room) = self.rooms.get_mut(&room_code) {
            room.remove_member(connection_id);

            if room.is_empty() {
                self.rooms.remove(&room_code);
                info!("Room {} closed", room_code);
            }
        }

        Some(room_code)
    }
}

type CodeGenerator = Box<dyn Fn() -> RoomCode + Send + Sync>;

pub struct RoomRegistry {
    state: Mutex<RegistryState>,
    generate_code: CodeGenerator,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_code_generator(random_room_code)
    }

    pub fn with_code_generator<F>(generate_code: F) -> Self
    where
        F: Fn() -> RoomCode + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(RegistryState::default()),
            generate_code: Box::new(generate_code),
        }
    }

    pub async fn create_room(
        &self,
        room_name: &str,
        creator: PeerConnection,
        display_name: &str,
    ) -> RoomEntry {
        let connection_id = creator.id();
        let mut state = self.state.lock().await;

        let vacated_room = state.remove_connection(connection_id);

        let room_code = loop {
            let candidate = (self.generate_code)();

            if !state.rooms.contains_key(&candidate) {
                break candidate;
            }

            debug!("Room code {} already in use, generating another", candidate);
        };

        let creator = Member {
            connection: creator,
            display_name: display_name.to_string(),
        };

        state
            .rooms
            .insert(room_code.clone(), Room::new(room_name, creator));
        state
            .connection_rooms
            .insert(connection_id, room_code.clone());

        info!(
            "{} created room {} ({:?})",
            connection_id, room_code, room_name
        );

        RoomEntry {
            room_code,
            room_name: room_name.to_string(),
            vacated_room,
        }
    }

    pub async fn join_room(
        &self,
        room_code: &str,
        joiner: PeerConnection,
        display_name: &str,
    ) -> Result<RoomEntry, RegistryError> {
        let connection_id = joiner.id();
        let mut state = self.state.lock().await;

        let room_name = match state.rooms.get(room_code) {
            Some(room) => room.name.clone(),
            None => return Err(RegistryError::RoomNotFound(room_code.to_string())),
        };

        if state
            .connection_rooms
            .get(&connection_id)
            .is_some_and(|current| current == room_code)
        {
            return Ok(RoomEntry {
                room_code: room_code.to_string(),
                room_name,
                vacated_room: None,
            });
        }

        let vacated_room = state.remove_connection(connection_id);

        let room = state
            .rooms
            .get_mut(room_code)
            .ok_or_else(|| RegistryError::RoomNotFound(room_code.to_string()))?;

        room.add_member(Member {
            connection: joiner,
            display_name: display_name.to_string(),
        });

        state
            .connection_rooms
            .insert(connection_id, room_code.to_string());

        info!("{} joined room {}", connection_id, room_code);

        Ok(RoomEntry {
            room_code: room_code.to_string(),
            room_name,
            vacated_room,
        })
    }

    /// Removes the connection from its room, closing the room if it empties.
    /// Returns the affected room code, or `None` if the connection was in no room.
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<RoomCode> {
        self.state.lock().await.remove_connection(connection_id)
    }

    pub async fn room_of(&self, connection_id: ConnectionId) -> Option<RoomCode> {
        self.state
            .lock()
            .await
            .connection_rooms
            .get(&connection_id)
            .cloned()
    }

    pub async fn members_of(&self, room_code: &str) -> Vec<String> {
        match self.state.lock().await.rooms.get(room_code) {
            Some(room) => room.client_names(),
            None => Vec::new(),
        }
    }

    pub async fn snapshot(&self, room_code: &str) -> Option<RoomSnapshot> {
        let state = self.state.lock().await;
        let room = state.rooms.get(room_code)?;

        Some(RoomSnapshot {
            clients: room.client_names(),
            connections: room.connections(),
        })
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    #[cfg(test)]
    pub(crate) async fn assert_consistent(&self) {
        let state = self.state.lock().await;

        for (connection_id, room_code) in &state.connection_rooms {
            let room = state
                .rooms
                .get(room_code)
                .unwrap_or_else(|| panic!("{} indexed to missing room {}", connection_id, room_code));
            assert!(room.has_member(*connection_id));
        }

        for (room_code, room) in &state.rooms {
            assert!(!room.is_empty(), "empty room {} still registered", room_code);

            for member in room.members() {
                assert_eq!(
                    state.connection_rooms.get(&member.connection.id()),
                    Some(room_code)
                );
            }
        }
    }
}

pub fn random_room_code() -> RoomCode {
    let mut rng = rand::rng();

    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_CODE_CHARSET.len());
            ROOM_CODE_CHARSET[idx] as char
        })
        .collect()
}
