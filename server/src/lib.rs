pub mod connection;
pub mod connection_handler;
pub mod room;
pub mod room_registry;
pub mod signal_relay;
pub mod signal_server;
