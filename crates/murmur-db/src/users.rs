use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use murmur_types::models::PublicProfile;

use crate::models::{ProfileRow, now_timestamp};
use crate::{Database, Result};

/// Fields needed to create an account row. Registration itself lives
/// outside this service; this is the seam operators and tests use.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub fullname: &'a str,
    pub password_hash: &'a str,
    pub profile_image: &'a str,
}

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, fullname, password_hash, profile_image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id.to_string(),
                    user.email,
                    user.username,
                    user.fullname,
                    user.password_hash,
                    user.profile_image,
                    now_timestamp(),
                ],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn public_profile(&self, id: Uuid) -> Result<Option<PublicProfile>> {
        self.with_conn(|conn| query_profile(conn, id))
    }
}

pub(crate) fn query_profile(conn: &Connection, id: Uuid) -> Result<Option<PublicProfile>> {
    let row = conn
        .query_row(
            "SELECT id, username, fullname, profile_image FROM users WHERE id = ?1",
            [id.to_string()],
            |row| ProfileRow::from_row(row, 0),
        )
        .optional()?;
    Ok(row.map(ProfileRow::into_profile))
}
