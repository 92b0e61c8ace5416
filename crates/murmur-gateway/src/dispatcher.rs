use tracing::{debug, warn};
use uuid::Uuid;

use murmur_types::events::GatewayEvent;
use murmur_types::models::{Conversation, Message};

use crate::presence::PresenceRegistry;

/// Pushes store changes to every live session of the users they concern.
///
/// Delivery is best-effort and at most once: users without a session simply
/// miss the push and pick the change up from the store when they next fetch.
/// Nothing here can fail a request.
#[derive(Clone)]
pub struct Dispatcher {
    presence: PresenceRegistry,
}

impl Dispatcher {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Send a targeted event to every session of a user. Returns how many
    /// sessions accepted it.
    pub async fn send_to_user(&self, user_id: Uuid, event: &GatewayEvent) -> usize {
        let sessions = self.presence.sessions_for(user_id).await;
        if sessions.is_empty() {
            debug!("{} for {} dropped: no live sessions", event.name(), user_id);
            return 0;
        }

        let mut delivered = 0;
        for session in &sessions {
            if session.send(event.clone()) {
                delivered += 1;
            } else {
                warn!(
                    "{} push to {} failed: session {} is closed",
                    event.name(),
                    user_id,
                    session.id()
                );
            }
        }
        delivered
    }

    async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) -> usize {
        let mut delivered = 0;
        for &user_id in user_ids {
            delivered += self.send_to_user(user_id, &event).await;
        }
        delivered
    }

    /// `receive_message` to both sender and recipient, so the sender's other
    /// sessions see their own message too.
    pub async fn message_created(&self, message: &Message) -> usize {
        self.send_to_users(
            &[message.to.id, message.from.id],
            GatewayEvent::ReceiveMessage(message.clone()),
        )
        .await
    }

    /// `messages_read` to every participant.
    pub async fn conversation_read(&self, conversation: &Conversation, updated: Vec<Message>) -> usize {
        self.send_to_users(
            &conversation.participants,
            GatewayEvent::MessagesRead {
                conversation_id: conversation.id,
                updated_messages: updated,
            },
        )
        .await
    }

    /// `conversation_deleted` to every former participant.
    pub async fn conversation_deleted(&self, conversation: &Conversation) -> usize {
        self.send_to_users(
            &conversation.participants,
            GatewayEvent::ConversationDeleted {
                conversation_id: conversation.id,
            },
        )
        .await
    }
}
