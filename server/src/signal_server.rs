use core::error::Error;
use std::{net::SocketAddr, sync::Arc, time::Duration};

use log::{error, info};
use tokio::net::TcpListener;

use crate::{
    connection_handler::ConnectionHandler, room_registry::RoomRegistry, signal_relay::SignalRelay,
};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

pub struct SignalServer {
    tcp_listener: TcpListener,
    relay: Arc<SignalRelay>,
}

impl SignalServer {
    pub async fn bind(addr: String) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self::with_registry(TcpListener::bind(addr).await?, RoomRegistry::new()))
    }

    pub fn with_registry(tcp_listener: TcpListener, registry: RoomRegistry) -> Self {
        Self {
            tcp_listener,
            relay: Arc::new(SignalRelay::new(registry)),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn Error + Send + Sync>> {
        Ok(self.tcp_listener.local_addr()?)
    }

    pub fn relay(&self) -> Arc<SignalRelay> {
        self.relay.clone()
    }

    pub async fn listen(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            let tcp_socket = match self.tcp_listener.accept().await {
                Ok((tcp_socket, _)) => tcp_socket,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            let relay = self.relay.clone();

            tokio::spawn(async move {
                let mut current_connection_option = None;

                if let Err(e) = ConnectionHandler::handle_stream(
                    tcp_socket,
                    &mut current_connection_option,
                    relay.clone(),
                )
                .await
                {
                    error!("Error handling connection: {}", e);
                }

                if let Some(connection_id) = current_connection_option.take() {
                    relay.handle_disconnect(connection_id).await;
                    info!("{} has disconnected", connection_id);
                }
            });
        }
    }
}
