use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub created_at: String,
}

impl User {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            bio: row.get(3)?,
            profile_picture_url: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn fetch(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            "SELECT id, name, email, bio, profile_picture_url, created_at
             FROM users WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .optional()
    }

    pub fn fetch_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            "SELECT id, name, email, bio, profile_picture_url, created_at
             FROM users WHERE email = ?1",
            params![email],
            Self::from_row,
        )
        .optional()
    }
}
