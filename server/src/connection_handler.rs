use core::error::Error;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::{
    connection::{ConnectionId, OUTGOING_QUEUE_CAPACITY, PeerConnection},
    signal_relay::SignalRelay,
};

pub struct ConnectionHandler;

impl ConnectionHandler {
    /// Runs one peer's receive loop until its socket closes. The id of the
    /// peer is stored in `current_connection_option` as soon as the upgrade
    /// succeeds, so the caller can clean up whether this returns `Ok` or `Err`.
    pub async fn handle_stream(
        stream: TcpStream,
        current_connection_option: &mut Option<ConnectionId>,
        relay: Arc<SignalRelay>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let peer_addr = stream.peer_addr()?;
        let mut ws_stream = accept_async(stream).await?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_QUEUE_CAPACITY);
        let connection = PeerConnection::new(outgoing_tx);

        *current_connection_option = Some(connection.id());
        info!("{} connected from {}", connection.id(), peer_addr);

        loop {
            tokio::select! {

                incoming = ws_stream.next() => {

                    let message = match incoming {
                        Some(result) => result?,
                        None => return Ok(()),
                    };

                    match message {
                        Message::Text(text) => {
                            relay.handle_text(&connection, text.as_str()).await;
                        }
                        Message::Binary(_) => {
                            relay.handle_undecodable(&connection);
                        }
                        Message::Close(frame) => {
                            debug!("{} sent close: {:?}", connection.id(), frame);
                            return Ok(());
                        }
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }

                outgoing = outgoing_rx.recv() => {

                    let frame = match outgoing {
                        Some(frame) => frame,
                        None => return Ok(()),
                    };

                    ws_stream.send(Message::text(frame)).await?;
                }
            }
        }
    }
}
