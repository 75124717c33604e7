use serde::{Deserialize, Serialize};

/// An accepted chat message.
///
/// The `id` is assigned by the server when the message is accepted and is
/// unique for the lifetime of the process. Accepted messages are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub username: String,
    pub message: String,
}

/// The inbound message shape, used both on the WebSocket stream and as the
/// `POST /api/messages` body. Clients never supply an `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub username: String,
    pub message: String,
}

/// Status portion of every HTTP API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub error: bool,
    pub message: String,
    pub code: u16,
}

/// The HTTP API response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessagesResponse {
    pub status: ApiStatus,
    pub data: Vec<Message>,
}

impl ApiMessagesResponse {
    pub fn success(data: Vec<Message>) -> Self {
        Self {
            status: ApiStatus {
                error: false,
                message: String::new(),
                code: 200,
            },
            data,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus {
                error: true,
                message: message.into(),
                code: 400,
            },
            data: vec![],
        }
    }
}
