pub mod api;
pub mod handler;
pub mod server;

/// Connection ID.
pub type ConnId = usize;

/// Serialized message sent to a client.
pub type Msg = String;
