use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::SendMessageRequest;
use crate::models::Message;

/// Events sent over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms the socket is authenticated
    Ready { user_id: Uuid, username: String },

    /// A message was created in one of the user's conversations
    ReceiveMessage(Message),

    /// Messages in a conversation transitioned to read
    MessagesRead {
        conversation_id: Uuid,
        updated_messages: Vec<Message>,
    },

    /// A conversation (and all of its messages) was removed
    ConversationDeleted { conversation_id: Uuid },

    /// A command sent on this session was rejected
    Error { message: String },
}

impl GatewayEvent {
    /// Wire name of the event, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessagesRead { .. } => "messages_read",
            Self::ConversationDeleted { .. } => "conversation_deleted",
            Self::Error { .. } => "error",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    /// Announce presence for the authenticated user
    Join { user_id: Uuid },

    /// Create a message and fan it out to both parties
    SendMessage(SendMessageRequest),
}
