//! Database row types. These map directly to SQLite rows and are converted
//! into `murmur-types` models at the edge of the store.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use tracing::warn;
use uuid::Uuid;

use murmur_types::models::{
    Conversation, ConversationSummary, Message, Notification, NotificationActor, NotificationKind,
    PublicProfile,
};

/// Current time in the stored format: RFC 3339, UTC, microseconds. Strings in
/// this format sort in time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}

pub fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", raw, context, e);
        Uuid::default()
    })
}

pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub profile_image: String,
}

impl ProfileRow {
    /// Read four consecutive columns starting at `at`.
    pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            username: row.get(at + 1)?,
            fullname: row.get(at + 2)?,
            profile_image: row.get(at + 3)?,
        })
    }

    pub fn into_profile(self) -> PublicProfile {
        PublicProfile {
            id: parse_uuid(&self.id, "user"),
            username: self.username,
            fullname: self.fullname,
            profile_image: self.profile_image,
        }
    }
}

pub struct ConversationRow {
    pub id: String,
    pub user_low: String,
    pub user_high: String,
    pub created_at: String,
}

impl ConversationRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_low: row.get(1)?,
            user_high: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn into_conversation(self) -> Conversation {
        let context = format!("conversation '{}'", self.id);
        Conversation {
            id: parse_uuid(&self.id, &context),
            participants: [
                parse_uuid(&self.user_low, &context),
                parse_uuid(&self.user_high, &context),
            ],
            created_at: parse_timestamp(&self.created_at, &context),
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub text: String,
    pub read: bool,
    pub created_at: String,
    pub from: ProfileRow,
    pub to: ProfileRow,
}

impl MessageRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            text: row.get(2)?,
            read: row.get(3)?,
            created_at: row.get(4)?,
            from: ProfileRow::from_row(row, 5)?,
            to: ProfileRow::from_row(row, 9)?,
        })
    }

    pub fn into_message(self) -> Message {
        let context = format!("message '{}'", self.id);
        Message {
            id: parse_uuid(&self.id, &context),
            conversation_id: parse_uuid(&self.conversation_id, &context),
            from: self.from.into_profile(),
            to: self.to.into_profile(),
            text: self.text,
            read: self.read,
            created_at: parse_timestamp(&self.created_at, &context),
        }
    }
}

pub struct SummaryRow {
    pub conversation_id: String,
    pub conversation_created_at: String,
    pub last_text: Option<String>,
    pub last_created_at: Option<String>,
    pub unread: i64,
    pub other: ProfileRow,
}

impl SummaryRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            conversation_id: row.get(0)?,
            conversation_created_at: row.get(1)?,
            last_text: row.get(2)?,
            last_created_at: row.get(3)?,
            unread: row.get(4)?,
            other: ProfileRow::from_row(row, 5)?,
        })
    }

    pub fn into_summary(self) -> ConversationSummary {
        let context = format!("conversation '{}'", self.conversation_id);
        let last_activity = self
            .last_created_at
            .as_deref()
            .unwrap_or(&self.conversation_created_at);
        ConversationSummary {
            conversation_id: parse_uuid(&self.conversation_id, &context),
            created_at: parse_timestamp(last_activity, &context),
            other_user: self.other.into_profile(),
            text: self.last_text.unwrap_or_default(),
            has_unread: self.unread > 0,
        }
    }
}

pub struct NotificationRow {
    pub id: String,
    pub kind: String,
    pub post_id: Option<String>,
    pub read: bool,
    pub created_at: String,
    pub actor_id: String,
    pub actor_username: String,
    pub actor_profile_image: String,
}

impl NotificationRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            post_id: row.get(2)?,
            read: row.get(3)?,
            created_at: row.get(4)?,
            actor_id: row.get(5)?,
            actor_username: row.get(6)?,
            actor_profile_image: row.get(7)?,
        })
    }

    /// Rows with an unknown kind are skipped.
    pub fn into_notification(self) -> Option<Notification> {
        let context = format!("notification '{}'", self.id);
        let kind = match self.kind.parse::<NotificationKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Skipping {}: {}", context, e);
                return None;
            }
        };
        Some(Notification {
            id: parse_uuid(&self.id, &context),
            kind,
            user: NotificationActor {
                id: parse_uuid(&self.actor_id, &context),
                username: self.actor_username,
                profile_image: self.actor_profile_image,
            },
            post_id: self.post_id.as_deref().map(|p| parse_uuid(p, &context)),
            read: self.read,
            created_at: parse_timestamp(&self.created_at, &context),
        })
    }
}

/// Order a participant pair the way the `conversations` table stores it.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (String, String) {
    let (a, b) = (a.to_string(), b.to_string());
    if a < b { (a, b) } else { (b, a) }
}
