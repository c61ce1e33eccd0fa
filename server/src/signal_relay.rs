use log::{debug, error, info, warn};
use shared::{ClientMessage, RoomCode, ServerMessage};

use crate::{
    connection::{ConnectionId, PeerConnection, SendError},
    room_registry::{RegistryError, RoomRegistry},
};

/// Routes decoded control messages to the room registry and fans frames out
/// to room members. One instance is shared by every connection task.
pub struct SignalRelay {
    registry: RoomRegistry,
}

impl SignalRelay {
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub async fn handle_text(&self, sender: &PeerConnection, text: &str) {
        let message = match ClientMessage::from_text(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("{} sent a malformed message: {}", sender.id(), e);
                self.reply(sender, &ServerMessage::invalid_format());
                return;
            }
        };

        match message {
            ClientMessage::Create {
                room_name,
                client_name,
            } => self.handle_create(sender, &room_name, &client_name).await,
            ClientMessage::Join {
                room_code,
                client_name,
            } => match room_code {
                Some(room_code) => self.handle_join(sender, &room_code, &client_name).await,
                None => {
                    warn!("{} sent a join without a room code", sender.id());
                    self.reply(sender, &ServerMessage::room_not_found());
                }
            },
            ClientMessage::Relay { kind, raw } => {
                self.relay_payload(sender, kind.as_deref(), raw).await
            }
        }
    }

    /// Frames the relay cannot interpret at all, such as binary frames.
    pub fn handle_undecodable(&self, sender: &PeerConnection) {
        warn!("{} sent an undecodable frame", sender.id());
        self.reply(sender, &ServerMessage::invalid_format());
    }

    async fn handle_create(&self, sender: &PeerConnection, room_name: &str, client_name: &str) {
        let entry = self
            .registry
            .create_room(room_name, sender.clone(), client_name)
            .await;

        self.reply(
            sender,
            &ServerMessage::Created {
                room_code: entry.room_code.clone(),
                room_name: entry.room_name,
            },
        );

        if let Some(vacated_room) = entry.vacated_room {
            self.broadcast_client_list(&vacated_room).await;
        }
        self.broadcast_client_list(&entry.room_code).await;
    }

    async fn handle_join(&self, sender: &PeerConnection, room_code: &str, client_name: &str) {
        let entry = match self
            .registry
            .join_room(room_code, sender.clone(), client_name)
            .await
        {
            Ok(entry) => entry,
            Err(RegistryError::RoomNotFound(room_code)) => {
                warn!("{} tried to join unknown room {}", sender.id(), room_code);
                self.reply(sender, &ServerMessage::room_not_found());
                return;
            }
        };

        self.reply(
            sender,
            &ServerMessage::Joined {
                room_code: entry.room_code.clone(),
                room_name: entry.room_name,
            },
        );

        if let Some(vacated_room) = entry.vacated_room {
            self.broadcast_client_list(&vacated_room).await;
        }
        self.broadcast_client_list(&entry.room_code).await;
    }

    async fn relay_payload(&self, sender: &PeerConnection, kind: Option<&str>, raw: String) {
        let room_code = match self.registry.room_of(sender.id()).await {
            Some(room_code) => room_code,
            None => {
                debug!("Dropping {:?} from {}: not in a room", kind, sender.id());
                return;
            }
        };

        let recipients = match self.registry.snapshot(&room_code).await {
            Some(snapshot) => snapshot.connections,
            None => return,
        };

        for recipient in recipients
            .iter()
            .filter(|recipient| recipient.id() != sender.id() && recipient.is_open())
        {
            if let Err(e) = recipient.send_text(raw.clone()) {
                debug!("Dropped {:?} in room {}: {}", kind, room_code, e);
            }
        }
    }

    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let room_code = match self.registry.leave(connection_id).await {
            Some(room_code) => room_code,
            None => return,
        };

        info!("{} left room {}", connection_id, room_code);

        self.broadcast_client_list(&room_code).await;
    }

    /// Pushes the room's current member list to every open member. Does
    /// nothing if the room no longer exists.
    pub async fn broadcast_client_list(&self, room_code: &RoomCode) {
        let snapshot = match self.registry.snapshot(room_code).await {
            Some(snapshot) => snapshot,
            None => return,
        };

        let message = ServerMessage::ClientList {
            clients: snapshot.clients,
        };

        for connection in snapshot.connections.iter().filter(|c| c.is_open()) {
            log_send_failure(connection.send_message(&message));
        }
    }

    fn reply(&self, recipient: &PeerConnection, message: &ServerMessage) {
        log_send_failure(recipient.send_message(message));
    }
}

fn log_send_failure(result: Result<(), SendError>) {
    match result {
        Ok(()) => {}
        Err(SendError::Unreachable(e)) => debug!("Dropped message: {}", e),
        Err(e @ SendError::Encode(_)) => error!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use shared::{ROOM_CODE_LENGTH, ServerMessage};
    use tokio::sync::mpsc;

    use super::*;
    use crate::connection::OUTGOING_QUEUE_CAPACITY;

    struct TestPeer {
        connection: PeerConnection,
        outgoing_rx: mpsc::Receiver<String>,
    }

    impl TestPeer {
        fn new() -> Self {
            let (tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
            Self {
                connection: PeerConnection::new(tx),
                outgoing_rx,
            }
        }

        fn drain(&mut self) -> Vec<String> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.outgoing_rx.try_recv() {
                frames.push(frame);
            }
            frames
        }

        fn drain_messages(&mut self) -> Vec<ServerMessage> {
            self.drain()
                .iter()
                .map(|frame| ServerMessage::from_text(frame).unwrap())
                .collect()
        }
    }

    fn client_list(names: &[&str]) -> ServerMessage {
        ServerMessage::ClientList {
            clients: names.iter().map(|name| name.to_string()).collect(),
        }
    }

    async fn create(relay: &SignalRelay, peer: &mut TestPeer, room: &str, name: &str) -> String {
        let text = format!(
            r#"{{"type":"create","roomName":"{}","clientName":"{}"}}"#,
            room, name
        );
        relay.handle_text(&peer.connection, &text).await;

        match peer.drain_messages().first() {
            Some(ServerMessage::Created { room_code, .. }) => room_code.clone(),
            other => panic!("expected created, got {:?}", other),
        }
    }

    async fn join(relay: &SignalRelay, peer: &TestPeer, code: &str, name: &str) {
        let text = format!(
            r#"{{"type":"join","roomCode":"{}","clientName":"{}"}}"#,
            code, name
        );
        relay.handle_text(&peer.connection, &text).await;
    }

    #[tokio::test]
    async fn create_acknowledges_then_lists_creator() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();

        relay
            .handle_text(
                &ana.connection,
                r#"{"type":"create","roomName":"Standup","clientName":"ana"}"#,
            )
            .await;

        let messages = ana.drain_messages();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            ServerMessage::Created {
                room_code,
                room_name,
            } => {
                assert_eq!(room_code.len(), ROOM_CODE_LENGTH);
                assert_eq!(room_name, "Standup");
            }
            other => panic!("expected created, got {:?}", other),
        }
        assert_eq!(messages[1], client_list(&["ana"]));
    }

    #[tokio::test]
    async fn join_broadcasts_members_in_join_order() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;

        assert_eq!(
            bo.drain_messages(),
            [
                ServerMessage::Joined {
                    room_code: code.clone(),
                    room_name: "Standup".to_string(),
                },
                client_list(&["ana", "bo"]),
            ]
        );
        assert_eq!(ana.drain_messages(), [client_list(&["ana", "bo"])]);
        relay.registry().assert_consistent().await;
    }

    #[tokio::test]
    async fn join_unknown_room_errors_to_joiner_only() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, "ZZZZZZ", "bo").await;

        assert_eq!(bo.drain_messages(), [ServerMessage::room_not_found()]);
        assert!(ana.drain().is_empty());
        assert_eq!(relay.registry().room_count().await, 1);
        assert_eq!(relay.registry().members_of(&code).await, ["ana"]);
    }

    #[tokio::test]
    async fn malformed_message_only_answers_sender() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;
        ana.drain();
        bo.drain();

        relay.handle_text(&ana.connection, "{oops").await;

        assert_eq!(ana.drain_messages(), [ServerMessage::invalid_format()]);
        assert!(bo.drain().is_empty());
        assert_eq!(relay.registry().members_of(&code).await, ["ana", "bo"]);
    }

    #[tokio::test]
    async fn relay_payload_reaches_others_unmodified() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();
        let mut cy = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;
        join(&relay, &cy, &code, "cy").await;
        ana.drain();
        bo.drain();
        cy.drain();

        let offer = r#"{"type":"offer",  "offer":{"type":"offer","sdp":"v=0\r\n"}}"#;
        relay.handle_text(&ana.connection, offer).await;

        assert!(ana.drain().is_empty());
        assert_eq!(bo.drain(), [offer]);
        assert_eq!(cy.drain(), [offer]);
    }

    #[tokio::test]
    async fn relay_payload_without_room_is_dropped() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        ana.drain();

        relay
            .handle_text(&bo.connection, r#"{"type":"candidate","candidate":null}"#)
            .await;

        assert!(bo.drain().is_empty());
        assert!(ana.drain().is_empty());
        assert_eq!(relay.registry().members_of(&code).await, ["ana"]);
    }

    #[tokio::test]
    async fn closed_members_are_skipped() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let bo = TestPeer::new();
        let mut cy = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;
        join(&relay, &cy, &code, "cy").await;
        ana.drain();
        cy.drain();

        drop(bo.outgoing_rx);

        let answer = r#"{"type":"answer","answer":{}}"#;
        relay.handle_text(&ana.connection, answer).await;

        assert_eq!(cy.drain(), [answer]);
    }

    #[tokio::test]
    async fn disconnects_update_and_then_close_room() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();
        let mut cy = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;
        ana.drain();
        bo.drain();

        relay.handle_disconnect(bo.connection.id()).await;
        assert_eq!(ana.drain_messages(), [client_list(&["ana"])]);
        assert_eq!(relay.registry().room_count().await, 1);
        relay.registry().assert_consistent().await;

        relay.handle_disconnect(ana.connection.id()).await;
        assert_eq!(relay.registry().room_count().await, 0);
        relay.registry().assert_consistent().await;

        relay.handle_disconnect(ana.connection.id()).await;
        assert!(ana.drain().is_empty());

        join(&relay, &cy, &code, "cy").await;
        assert_eq!(cy.drain_messages(), [ServerMessage::room_not_found()]);
    }

    #[tokio::test]
    async fn switching_rooms_notifies_vacated_room() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();

        let first = create(&relay, &mut ana, "One", "ana").await;
        join(&relay, &bo, &first, "bo").await;
        ana.drain();
        bo.drain();

        relay
            .handle_text(
                &bo.connection,
                r#"{"type":"create","roomName":"Two","clientName":"bo"}"#,
            )
            .await;

        let messages = bo.drain_messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            ServerMessage::Created { room_code, .. } if *room_code != first
        ));
        assert_eq!(messages[1], client_list(&["bo"]));
        assert_eq!(ana.drain_messages(), [client_list(&["ana"])]);
        relay.registry().assert_consistent().await;
    }

    #[tokio::test]
    async fn payload_without_type_is_relayed() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;
        ana.drain();
        bo.drain();

        let untyped = r#"{"offer":{"sdp":"v=0"}}"#;
        relay.handle_text(&ana.connection, untyped).await;
        relay.handle_text(&ana.connection, "[1,2]").await;

        assert!(ana.drain().is_empty());
        assert_eq!(bo.drain(), [untyped, "[1,2]"]);
    }

    #[tokio::test]
    async fn join_without_room_code_reports_room_not_found() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();

        relay
            .handle_text(&ana.connection, r#"{"type":"join","clientName":"ana"}"#)
            .await;
        relay
            .handle_text(
                &ana.connection,
                r#"{"type":"join","roomCode":null,"clientName":"ana"}"#,
            )
            .await;

        assert_eq!(
            ana.drain_messages(),
            [ServerMessage::room_not_found(), ServerMessage::room_not_found()]
        );
        assert_eq!(relay.registry().room_count().await, 0);
    }

    #[tokio::test]
    async fn backlogged_member_loses_frames_without_blocking_others() {
        let relay = SignalRelay::new(RoomRegistry::new());
        let mut ana = TestPeer::new();
        let mut bo = TestPeer::new();
        let mut cy = TestPeer::new();

        let code = create(&relay, &mut ana, "Standup", "ana").await;
        join(&relay, &bo, &code, "bo").await;
        join(&relay, &cy, &code, "cy").await;
        ana.drain();
        bo.drain();
        cy.drain();

        for i in 0..=OUTGOING_QUEUE_CAPACITY {
            let candidate = format!(r#"{{"type":"candidate","candidate":{}}}"#, i);
            relay.handle_text(&ana.connection, &candidate).await;

            assert_eq!(cy.drain(), [candidate]);
        }

        let queued = bo.drain();
        assert_eq!(queued.len(), OUTGOING_QUEUE_CAPACITY);
        assert_eq!(
            queued.last().unwrap(),
            &format!(
                r#"{{"type":"candidate","candidate":{}}}"#,
                OUTGOING_QUEUE_CAPACITY - 1
            )
        );
        assert!(ana.drain().is_empty());
    }
}
