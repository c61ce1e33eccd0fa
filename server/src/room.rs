use crate::connection::{ConnectionId, PeerConnection};

#[derive(Debug, Clone)]
pub struct Member {
    pub connection: PeerConnection,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    members: Vec<Member>,
}

impl Room {
    pub fn new(name: &str, creator: Member) -> Self {
        Self {
            name: name.to_string(),
            members: vec![creator],
        }
    }

    pub fn add_member(&mut self, member: Member) {
        self.members.push(member);
    }

    pub fn remove_member(&mut self, connection_id: ConnectionId) {
        self.members
            .retain(|member| member.connection.id() != connection_id);
    }

    pub fn has_member(&self, connection_id: ConnectionId) -> bool {
        self.members
            .iter()
            .any(|member| member.connection.id() == connection_id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn client_names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|member| member.display_name.clone())
            .collect()
    }

    pub fn connections(&self) -> Vec<PeerConnection> {
        self.members
            .iter()
            .map(|member| member.connection.clone())
            .collect()
    }
}
