use tracing::debug;
use uuid::Uuid;

use murmur_types::models::{Notification, NotificationKind};

use crate::models::{NotificationRow, now_timestamp};
use crate::{Database, Result, StoreError};

/// Notifications kept per recipient once a retention sweep runs.
pub const DEFAULT_NOTIFICATION_CAP: usize = 30;

impl Database {
    /// Append an unread notification. Called by the like/comment/follow flows.
    pub fn record_notification(
        &self,
        kind: NotificationKind,
        actor: Uuid,
        recipient: Uuid,
        post_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, kind, actor_id, recipient_id, post_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    kind.as_str(),
                    actor.to_string(),
                    recipient.to_string(),
                    post_id.map(|p| p.to_string()),
                    now_timestamp(),
                ],
            )?;
            Ok(())
        })?;
        debug!("{} notification {} for {} from {}", kind, id, recipient, actor);
        Ok(id)
    }

    /// Newest first, with the actor's public fields attached.
    pub fn list_notifications(&self, recipient: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.kind, n.post_id, n.read, n.created_at,
                        u.id, u.username, u.profile_image
                 FROM notifications n
                 JOIN users u ON u.id = n.actor_id
                 WHERE n.recipient_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC",
            )?;
            let rows = stmt
                .query_map([recipient.to_string()], NotificationRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().filter_map(NotificationRow::into_notification).collect())
        })
    }

    pub fn count_notifications(&self, recipient: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
                [recipient.to_string()],
                |r| r.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Returns how many notifications changed state.
    pub fn mark_all_notifications_read(&self, recipient: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
                [recipient.to_string()],
            )?)
        })
    }

    /// Delete the oldest notifications until at most `max_count` remain.
    /// Age is creation time, ties broken by insertion order. Returns the
    /// number deleted.
    pub fn enforce_notification_retention(&self, recipient: Uuid, max_count: usize) -> Result<usize> {
        if max_count == 0 {
            return Err(StoreError::invalid("maxCount", "must be at least 1"));
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
                [recipient.to_string()],
                |r| r.get(0),
            )?;
            let excess = count - max_count as i64;
            if excess <= 0 {
                return Ok(0);
            }

            let deleted = tx.execute(
                "DELETE FROM notifications WHERE id IN (
                     SELECT id FROM notifications
                     WHERE recipient_id = ?1
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?2
                 )",
                rusqlite::params![recipient.to_string(), excess],
            )?;
            tx.commit()?;

            debug!("retention purged {} notifications for {}", deleted, recipient);
            Ok(deleted)
        })
    }

    pub fn clear_notifications(&self, recipient: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM notifications WHERE recipient_id = ?1",
                [recipient.to_string()],
            )?)
        })
    }
}
