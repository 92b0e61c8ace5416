use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use murmur_types::api::NewMessage;
use murmur_types::models::{Conversation, Message};

use crate::conversations::query_conversation;
use crate::models::{MessageRow, now_timestamp};
use crate::{Database, Result, StoreError};

/// Longest message text accepted, in characters.
pub const MAX_MESSAGE_LEN: usize = 5000;

/// Messages joined with both parties' public profiles. Column order matches
/// `MessageRow::from_row`.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.conversation_id, m.text, m.read, m.created_at,
           s.id, s.username, s.fullname, s.profile_image,
           r.id, r.username, r.fullname, r.profile_image
    FROM messages m
    JOIN users s ON s.id = m.sender_id
    JOIN users r ON r.id = m.recipient_id";

/// Result of a bulk read transition on one conversation.
#[derive(Debug)]
pub struct ConversationRead {
    pub conversation: Conversation,
    /// Messages that went from unread to read in this call.
    pub updated: Vec<Message>,
}

impl Database {
    /// Persist a new unread message from `from` and return it with both
    /// profiles attached.
    pub fn create_message(&self, from: Uuid, new: &NewMessage) -> Result<Message> {
        if new.text.trim().is_empty() {
            return Err(StoreError::invalid("text", "text is required"));
        }
        if new.text.chars().count() > MAX_MESSAGE_LEN {
            return Err(StoreError::invalid(
                "text",
                format!("text must be at most {} characters", MAX_MESSAGE_LEN),
            ));
        }

        self.with_conn(|conn| {
            let conversation = query_conversation(conn, new.conversation_id)?
                .ok_or_else(|| StoreError::invalid("conversationId", "conversation does not exist"))?;
            if !conversation.has_participant(from) {
                return Err(StoreError::Forbidden(
                    "you are not a participant of this conversation",
                ));
            }
            if conversation.other_participant(from) != Some(new.to) {
                return Err(StoreError::invalid(
                    "to",
                    "recipient is not the other participant of this conversation",
                ));
            }

            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, recipient_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    new.conversation_id.to_string(),
                    from.to_string(),
                    new.to.to_string(),
                    &new.text,
                    now_timestamp(),
                ],
            )?;

            query_message(conn, id)?.ok_or(StoreError::NotFound("message"))
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// All messages of a conversation, oldest first. Has no side effects.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id.to_string()], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(MessageRow::into_message).collect())
        })
    }

    /// Flip every unread message addressed to `recipient` in the conversation
    /// to read in a single statement. Returns the ids that changed; messages
    /// already read are left untouched, so repeating the call is harmless.
    pub fn mark_unread_as_read(&self, conversation_id: Uuid, recipient: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "UPDATE messages SET read = 1
                 WHERE conversation_id = ?1 AND recipient_id = ?2 AND read = 0
                 RETURNING id",
            )?;
            let ids = stmt
                .query_map(
                    [conversation_id.to_string(), recipient.to_string()],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids.iter().filter_map(|id| id.parse().ok()).collect())
        })
    }

    /// Read a conversation as `reader`. Marks everything addressed to the
    /// reader as read first, then returns the full history oldest first.
    pub fn list_by_conversation(&self, conversation_id: Uuid, reader: Uuid) -> Result<Vec<Message>> {
        self.participant_conversation(conversation_id, reader)?;
        self.mark_unread_as_read(conversation_id, reader)?;
        self.list_messages(conversation_id)
    }

    /// Explicit bulk read of a conversation by `reader`.
    pub fn mark_conversation_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<ConversationRead> {
        let conversation = self.participant_conversation(conversation_id, reader)?;
        let ids = self.mark_unread_as_read(conversation_id, reader)?;
        let updated = self.messages_by_ids(&ids)?;
        Ok(ConversationRead {
            conversation,
            updated,
        })
    }

    /// Mark a single message read. Only its recipient may do so; anyone else
    /// gets `NotFound`, the same as for a message that does not exist.
    pub fn mark_message_read(&self, message_id: Uuid, reader: Uuid) -> Result<Message> {
        self.with_conn(|conn| {
            let updated: Option<String> = conn
                .query_row(
                    "UPDATE messages SET read = 1 WHERE id = ?1 AND recipient_id = ?2 RETURNING id",
                    [message_id.to_string(), reader.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if updated.is_none() {
                return Err(StoreError::NotFound("message"));
            }
            query_message(conn, message_id)?.ok_or(StoreError::NotFound("message"))
        })
    }

    /// Batch-fetch messages by id, oldest first.
    pub fn messages_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "{} WHERE m.id IN ({}) ORDER BY m.created_at ASC, m.rowid ASC",
                MESSAGE_SELECT,
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(MessageRow::into_message).collect())
        })
    }
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    let row = conn
        .query_row(&sql, [id.to_string()], MessageRow::from_row)
        .optional()?;
    Ok(row.map(MessageRow::into_message))
}

#[cfg(test)]
mod tests {
    use murmur_types::api::NewMessage;
    use uuid::Uuid;

    use crate::testutil::{self, tick};
    use crate::{Database, StoreError};

    struct Pair {
        db: Database,
        a: Uuid,
        b: Uuid,
        conversation_id: Uuid,
    }

    fn pair() -> Pair {
        let db = testutil::db();
        let (a, b) = (testutil::user(&db, "a"), testutil::user(&db, "b"));
        let conversation_id = db.find_or_create_conversation(a, b).unwrap().id;
        Pair {
            db,
            a,
            b,
            conversation_id,
        }
    }

    fn new(conversation_id: Uuid, to: Uuid, text: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            to,
            text: text.to_string(),
        }
    }

    #[test]
    fn create_returns_unread_enriched_message() {
        let p = pair();
        let msg = p.db.create_message(p.a, &new(p.conversation_id, p.b, "hi")).unwrap();

        assert!(!msg.read);
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.from.id, p.a);
        assert_eq!(msg.from.username, "a");
        assert_eq!(msg.to.id, p.b);
        assert_eq!(msg.to.username, "b");
    }

    #[test]
    fn create_stores_text_verbatim() {
        let p = pair();
        let sent = "    fn main() {}\n";
        let msg = p.db.create_message(p.a, &new(p.conversation_id, p.b, sent)).unwrap();

        assert_eq!(msg.text, sent);
        assert_eq!(p.db.get_message(msg.id).unwrap().unwrap().text, sent);
    }

    #[test]
    fn create_validates_text_conversation_and_parties() {
        let p = pair();
        let outsider = testutil::user(&p.db, "c");

        let err = p.db.create_message(p.a, &new(p.conversation_id, p.b, "  ")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { ref field, .. } if field == "text"));

        let long = "x".repeat(super::MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            p.db.create_message(p.a, &new(p.conversation_id, p.b, &long)),
            Err(StoreError::InvalidArgument { .. })
        ));

        let err = p.db.create_message(p.a, &new(Uuid::new_v4(), p.b, "hi")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { ref field, .. } if field == "conversationId"));

        let err = p.db.create_message(p.a, &new(p.conversation_id, outsider, "hi")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { ref field, .. } if field == "to"));

        assert!(matches!(
            p.db.create_message(outsider, &new(p.conversation_id, p.b, "hi")),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn listing_marks_only_the_readers_messages() {
        let p = pair();
        let to_b = p.db.create_message(p.a, &new(p.conversation_id, p.b, "hi")).unwrap();
        tick();
        let to_a = p.db.create_message(p.b, &new(p.conversation_id, p.a, "hey")).unwrap();

        let seen_by_b = p.db.list_by_conversation(p.conversation_id, p.b).unwrap();
        assert_eq!(
            seen_by_b.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![to_b.id, to_a.id],
            "oldest first"
        );
        assert!(seen_by_b[0].read);
        assert!(!seen_by_b[1].read, "b's own message is still unread for a");

        let seen_by_a = p.db.list_by_conversation(p.conversation_id, p.a).unwrap();
        assert!(seen_by_a.iter().all(|m| m.read));
    }

    #[test]
    fn listing_requires_participation() {
        let p = pair();
        let outsider = testutil::user(&p.db, "c");
        p.db.create_message(p.a, &new(p.conversation_id, p.b, "hi")).unwrap();

        assert!(matches!(
            p.db.list_by_conversation(p.conversation_id, outsider),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            p.db.list_by_conversation(Uuid::new_v4(), p.a),
            Err(StoreError::NotFound("conversation"))
        ));
        assert!(!p.db.list_messages(p.conversation_id).unwrap()[0].read);
    }

    #[test]
    fn undelivered_message_stays_unread_until_listed() {
        let p = pair();
        p.db.create_message(p.a, &new(p.conversation_id, p.b, "hi")).unwrap();

        // The sender reading the conversation does not mark it read.
        let for_a = p.db.list_by_conversation(p.conversation_id, p.a).unwrap();
        assert!(!for_a[0].read);

        let for_b = p.db.list_by_conversation(p.conversation_id, p.b).unwrap();
        assert!(for_b[0].read);
    }

    #[test]
    fn mark_conversation_read_returns_only_the_delta() {
        let p = pair();
        let first = p.db.create_message(p.a, &new(p.conversation_id, p.b, "1")).unwrap();
        p.db.mark_message_read(first.id, p.b).unwrap();
        tick();
        let second = p.db.create_message(p.a, &new(p.conversation_id, p.b, "2")).unwrap();
        tick();
        let third = p.db.create_message(p.a, &new(p.conversation_id, p.b, "3")).unwrap();

        let read = p.db.mark_conversation_read(p.conversation_id, p.b).unwrap();
        assert_eq!(read.conversation.id, p.conversation_id);
        assert_eq!(
            read.updated.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![second.id, third.id]
        );
        assert!(read.updated.iter().all(|m| m.read));

        let again = p.db.mark_conversation_read(p.conversation_id, p.b).unwrap();
        assert!(again.updated.is_empty());
    }

    #[test]
    fn read_flag_never_reverts() {
        let p = pair();
        let msg = p.db.create_message(p.a, &new(p.conversation_id, p.b, "hi")).unwrap();
        p.db.mark_conversation_read(p.conversation_id, p.b).unwrap();

        // Every read path afterwards keeps it read.
        assert!(p.db.mark_message_read(msg.id, p.b).unwrap().read);
        p.db.list_by_conversation(p.conversation_id, p.a).unwrap();
        p.db.mark_conversation_read(p.conversation_id, p.a).unwrap();
        assert!(p.db.get_message(msg.id).unwrap().unwrap().read);
    }

    #[test]
    fn mark_message_read_hides_messages_from_non_recipients() {
        let p = pair();
        let msg = p.db.create_message(p.a, &new(p.conversation_id, p.b, "hi")).unwrap();

        assert!(matches!(
            p.db.mark_message_read(msg.id, p.a),
            Err(StoreError::NotFound("message"))
        ));
        assert!(matches!(
            p.db.mark_message_read(Uuid::new_v4(), p.b),
            Err(StoreError::NotFound("message"))
        ));
        assert!(!p.db.get_message(msg.id).unwrap().unwrap().read);

        let read = p.db.mark_message_read(msg.id, p.b).unwrap();
        assert!(read.read);
        assert_eq!(read.id, msg.id);
    }
}
