use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Notification;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the realtime upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Errors --

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub errors: Option<Vec<FieldError>>,
}

/// Parse a required identifier field.
pub fn parse_id(field: &str, value: Option<&str>) -> Result<Uuid, FieldError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FieldError::new(field, format!("{} is required", field)))?;
    raw.parse()
        .map_err(|_| FieldError::new(field, format!("invalid {} format", field)))
}

// -- Conversations --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkConversationReadResponse {
    pub updated_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConversationResponse {
    pub conversation_id: Uuid,
    pub deleted_messages: usize,
}

// -- Messages --

/// Body of `POST /messages` and payload of the realtime `send_message` command.
/// Fields stay optional so a missing field is reported by name instead of
/// failing deserialisation as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub to: Option<String>,
    pub text: Option<String>,
    pub conversation_id: Option<String>,
}

/// A `SendMessageRequest` whose identifiers parsed and whose text is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub to: Uuid,
    pub text: String,
}

impl SendMessageRequest {
    pub fn validate(self) -> Result<NewMessage, Vec<FieldError>> {
        let mut errors = Vec::new();

        let to = parse_id("to", self.to.as_deref()).map_err(|e| errors.push(e)).ok();
        let conversation_id = parse_id("conversationId", self.conversation_id.as_deref())
            .map_err(|e| errors.push(e))
            .ok();
        let text = self.text.filter(|t| !t.trim().is_empty());
        if text.is_none() {
            errors.push(FieldError::new("text", "text is required"));
        }

        match (to, conversation_id, text) {
            (Some(to), Some(conversation_id), Some(text)) => Ok(NewMessage {
                conversation_id,
                to,
                text,
            }),
            _ => Err(errors),
        }
    }
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated_count: usize,
    pub purged_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearNotificationsResponse {
    pub deleted_count: usize,
}
