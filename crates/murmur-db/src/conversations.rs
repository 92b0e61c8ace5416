use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use murmur_types::models::{Conversation, ConversationSummary};

use crate::models::{ConversationRow, SummaryRow, now_timestamp, ordered_pair};
use crate::users::query_profile;
use crate::{Database, Result, StoreError};

/// Outcome of a successful conversation delete.
#[derive(Debug)]
pub struct DeletedConversation {
    pub conversation: Conversation,
    pub deleted_messages: usize,
}

impl Database {
    /// Return the conversation between `user_id` and `other_id`, creating it
    /// on first use. The unique index on the normalised pair makes concurrent
    /// callers converge on a single row.
    pub fn find_or_create_conversation(&self, user_id: Uuid, other_id: Uuid) -> Result<Conversation> {
        if user_id == other_id {
            return Err(StoreError::invalid(
                "userId",
                "cannot start a conversation with yourself",
            ));
        }

        self.with_conn(|conn| {
            for id in [user_id, other_id] {
                if query_profile(conn, id)?.is_none() {
                    return Err(StoreError::NotFound("user"));
                }
            }

            let (low, high) = ordered_pair(user_id, other_id);
            let inserted = conn.execute(
                "INSERT INTO conversations (id, user_low, user_high, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_low, user_high) DO NOTHING",
                rusqlite::params![Uuid::new_v4().to_string(), &low, &high, now_timestamp()],
            )?;

            let row = conn.query_row(
                "SELECT id, user_low, user_high, created_at
                 FROM conversations WHERE user_low = ?1 AND user_high = ?2",
                [&low, &high],
                ConversationRow::from_row,
            )?;

            if inserted > 0 {
                debug!("created conversation {} for {} <-> {}", row.id, low, high);
            }
            Ok(row.into_conversation())
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Load a conversation the caller takes part in.
    /// `NotFound` if it does not exist, `Forbidden` if the caller is not a participant.
    pub fn participant_conversation(&self, id: Uuid, user_id: Uuid) -> Result<Conversation> {
        let conversation = self
            .get_conversation(id)?
            .ok_or(StoreError::NotFound("conversation"))?;
        if !conversation.has_participant(user_id) {
            return Err(StoreError::Forbidden(
                "you are not a participant of this conversation",
            ));
        }
        Ok(conversation)
    }

    /// Delete a conversation and its messages.
    ///
    /// Runs as two independent steps, messages first and then the
    /// conversation row, with no enclosing transaction. The parent row
    /// outlives its children, so if the second step fails the whole call can
    /// simply be repeated.
    pub fn delete_conversation(&self, id: Uuid, requesting_user: Uuid) -> Result<DeletedConversation> {
        let conversation = self.participant_conversation(id, requesting_user)?;

        let deleted_messages = self.delete_conversation_messages(id)?;
        self.delete_conversation_row(id)?;

        info!(
            "conversation {} deleted by {} ({} messages)",
            id, requesting_user, deleted_messages
        );
        Ok(DeletedConversation {
            conversation,
            deleted_messages,
        })
    }

    /// First delete step. Deleting from an already-empty conversation is a no-op.
    pub fn delete_conversation_messages(&self, id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                [id.to_string()],
            )?)
        })
    }

    /// Second delete step. Returns whether a row was removed; an absent row is not an error.
    pub fn delete_conversation_row(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM conversations WHERE id = ?1", [id.to_string()])?;
            Ok(removed > 0)
        })
    }

    /// Inbox view for `user_id`: one entry per conversation with the other
    /// participant's profile, the latest message and whether anything
    /// addressed to the user is still unread. Most recent activity first.
    ///
    /// Latest message and unread count come from one windowed pass over the
    /// user's messages, not a query per conversation.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH mine AS (
                     SELECT rowid AS seq, id, created_at,
                            CASE WHEN user_low = ?1 THEN user_high ELSE user_low END AS other_id
                     FROM conversations
                     WHERE user_low = ?1 OR user_high = ?1
                 ),
                 ranked AS (
                     SELECT m.conversation_id, m.text, m.created_at,
                            ROW_NUMBER() OVER (
                                PARTITION BY m.conversation_id
                                ORDER BY m.created_at DESC, m.rowid DESC
                            ) AS rn,
                            SUM(CASE WHEN m.recipient_id = ?1 AND m.read = 0 THEN 1 ELSE 0 END) OVER (
                                PARTITION BY m.conversation_id
                            ) AS unread
                     FROM messages m
                     JOIN mine ON mine.id = m.conversation_id
                 )
                 SELECT mine.id, mine.created_at, r.text, r.created_at, COALESCE(r.unread, 0),
                        u.id, u.username, u.fullname, u.profile_image
                 FROM mine
                 JOIN users u ON u.id = mine.other_id
                 LEFT JOIN ranked r ON r.conversation_id = mine.id AND r.rn = 1
                 ORDER BY COALESCE(r.created_at, mine.created_at) DESC, mine.seq DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], SummaryRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(SummaryRow::into_summary).collect())
        })
    }
}

pub(crate) fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let row = conn
        .query_row(
            "SELECT id, user_low, user_high, created_at FROM conversations WHERE id = ?1",
            [id.to_string()],
            ConversationRow::from_row,
        )
        .optional()?;
    Ok(row.map(ConversationRow::into_conversation))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use murmur_types::api::NewMessage;
    use uuid::Uuid;

    use crate::testutil::{self, tick};
    use crate::{Database, StoreError};

    fn send(db: &Database, conversation_id: Uuid, from: Uuid, to: Uuid, text: &str) {
        db.create_message(
            from,
            &NewMessage {
                conversation_id,
                to,
                text: text.to_string(),
            },
        )
        .unwrap();
    }

    #[test]
    fn find_or_create_is_symmetric() {
        let db = testutil::db();
        let (a, b) = (testutil::user(&db, "a"), testutil::user(&db, "b"));

        let first = db.find_or_create_conversation(a, b).unwrap();
        let second = db.find_or_create_conversation(b, a).unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.has_participant(a) && first.has_participant(b));
    }

    #[test]
    fn find_or_create_rejects_self_and_unknown_users() {
        let db = testutil::db();
        let a = testutil::user(&db, "a");

        assert!(matches!(
            db.find_or_create_conversation(a, a),
            Err(StoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            db.find_or_create_conversation(a, Uuid::new_v4()),
            Err(StoreError::NotFound("user"))
        ));
    }

    #[test]
    fn find_or_create_rejects_unknown_caller() {
        let db = testutil::db();
        let b = testutil::user(&db, "b");

        assert!(matches!(
            db.find_or_create_conversation(Uuid::new_v4(), b),
            Err(StoreError::NotFound("user"))
        ));
        assert!(db.list_conversations(b).unwrap().is_empty());
    }

    #[test]
    fn summaries_with_equal_activity_list_newest_conversation_first() {
        let db = testutil::db();
        let (me, b, c) = (
            testutil::user(&db, "me"),
            testutil::user(&db, "b"),
            testutil::user(&db, "c"),
        );
        let first = db.find_or_create_conversation(me, b).unwrap();
        let second = db.find_or_create_conversation(me, c).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET created_at = '2024-01-01T00:00:00.000000Z'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let order: Vec<Uuid> = db
            .list_conversations(me)
            .unwrap()
            .iter()
            .map(|s| s.conversation_id)
            .collect();
        assert_eq!(order, vec![second.id, first.id]);
    }

    #[test]
    fn concurrent_find_or_create_yields_one_conversation() {
        let db = Arc::new(testutil::db());
        let (a, b) = (testutil::user(&db, "a"), testutil::user(&db, "b"));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        db.find_or_create_conversation(a, b).unwrap().id
                    } else {
                        db.find_or_create_conversation(b, a).unwrap().id
                    }
                })
            })
            .collect();
        let ids: Vec<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.iter().all(|id| *id == ids[0]));
        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_by_non_participant_is_forbidden_and_keeps_data() {
        let db = testutil::db();
        let (a, b, c) = (
            testutil::user(&db, "a"),
            testutil::user(&db, "b"),
            testutil::user(&db, "c"),
        );
        let conv = db.find_or_create_conversation(a, b).unwrap();
        send(&db, conv.id, a, b, "hi");

        assert!(matches!(
            db.delete_conversation(conv.id, c),
            Err(StoreError::Forbidden(_))
        ));
        assert!(db.get_conversation(conv.id).unwrap().is_some());
        assert_eq!(db.list_messages(conv.id).unwrap().len(), 1);
    }

    #[test]
    fn delete_cascades_to_messages() {
        let db = testutil::db();
        let (a, b) = (testutil::user(&db, "a"), testutil::user(&db, "b"));
        let conv = db.find_or_create_conversation(a, b).unwrap();
        send(&db, conv.id, a, b, "one");
        send(&db, conv.id, b, a, "two");

        let deleted = db.delete_conversation(conv.id, b).unwrap();
        assert_eq!(deleted.deleted_messages, 2);
        assert!(db.get_conversation(conv.id).unwrap().is_none());
        assert!(db.list_messages(conv.id).unwrap().is_empty());

        assert!(matches!(
            db.delete_conversation(conv.id, a),
            Err(StoreError::NotFound("conversation"))
        ));
    }

    #[test]
    fn interrupted_delete_can_be_repeated() {
        let db = testutil::db();
        let (a, b) = (testutil::user(&db, "a"), testutil::user(&db, "b"));
        let conv = db.find_or_create_conversation(a, b).unwrap();
        send(&db, conv.id, a, b, "hi");

        // First step completed, second never ran.
        assert_eq!(db.delete_conversation_messages(conv.id).unwrap(), 1);
        assert_eq!(db.delete_conversation_messages(conv.id).unwrap(), 0);

        let deleted = db.delete_conversation(conv.id, a).unwrap();
        assert_eq!(deleted.deleted_messages, 0);
        assert!(!db.delete_conversation_row(conv.id).unwrap());
    }

    #[test]
    fn summaries_order_by_latest_activity_and_track_unread() {
        let db = testutil::db();
        let (me, b, c, d) = (
            testutil::user(&db, "me"),
            testutil::user(&db, "b"),
            testutil::user(&db, "c"),
            testutil::user(&db, "d"),
        );

        let with_b = db.find_or_create_conversation(me, b).unwrap();
        tick();
        let with_c = db.find_or_create_conversation(me, c).unwrap();
        tick();
        send(&db, with_b.id, b, me, "from b");
        tick();
        let with_d = db.find_or_create_conversation(d, me).unwrap();
        tick();
        send(&db, with_c.id, me, c, "to c");

        let summaries = db.list_conversations(me).unwrap();
        let order: Vec<Uuid> = summaries.iter().map(|s| s.conversation_id).collect();
        assert_eq!(order, vec![with_c.id, with_d.id, with_b.id]);

        let by_id = |id| summaries.iter().find(|s| s.conversation_id == id).unwrap();
        assert_eq!(by_id(with_c.id).text, "to c");
        assert!(!by_id(with_c.id).has_unread, "own messages are never unread for the sender");
        assert_eq!(by_id(with_b.id).text, "from b");
        assert!(by_id(with_b.id).has_unread);
        assert_eq!(by_id(with_b.id).other_user.username, "b");
        assert_eq!(by_id(with_d.id).text, "");
        assert_eq!(by_id(with_d.id).created_at, with_d.created_at);

        db.list_by_conversation(with_b.id, me).unwrap();
        let summaries = db.list_conversations(me).unwrap();
        assert!(summaries.iter().all(|s| !s.has_unread));
    }

    #[test]
    fn summaries_exclude_other_users_conversations() {
        let db = testutil::db();
        let (a, b, c) = (
            testutil::user(&db, "a"),
            testutil::user(&db, "b"),
            testutil::user(&db, "c"),
        );
        db.find_or_create_conversation(b, c).unwrap();
        assert!(db.list_conversations(a).unwrap().is_empty());
    }
}
