//! Database row types. These map directly to SQLite rows; conversions into
//! the template-facing warbler-types models live here too so the view layer
//! never sees a password hash.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use warbler_types::models::{Message, User};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub password: String,
}

/// A message joined with its author's username and avatar.
pub struct MessageRow {
    pub id: i64,
    pub text: String,
    pub timestamp: String,
    pub user_id: i64,
    pub username: String,
    pub user_image_url: String,
}

/// Insert payload for `users`. `image_url: None` takes the column default.
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub image_url: Option<&'a str>,
}

/// Insert payload for `messages`. `text` stays optional so a missing body is
/// rejected by the NOT NULL constraint rather than silently defaulted.
pub struct NewMessage<'a> {
    pub text: Option<&'a str>,
    pub user_id: i64,
}

/// Profile fields a user may change. `None` image fields reset to defaults.
pub struct UserUpdate<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub image_url: Option<&'a str>,
    pub header_image_url: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub location: Option<&'a str>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            image_url: row.image_url,
            header_image_url: row.header_image_url,
            bio: row.bio,
            location: row.location,
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let timestamp = parse_timestamp(&row.timestamp).unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", row.timestamp, row.id, e);
            DateTime::default()
        });

        Message {
            id: row.id,
            text: row.text,
            posted_on: Message::posted_on(&timestamp),
            timestamp,
            user_id: row.user_id,
            username: row.username,
            user_image_url: row.user_image_url,
        }
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS.SSS" without a timezone;
/// they are always UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc())
}
