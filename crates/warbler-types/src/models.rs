use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.png";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/warbler-hero.jpg";

/// Maximum length of a message body, in characters.
pub const MESSAGE_MAX_LEN: usize = 140;

/// A user as exposed to templates. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<User #{}: {}, {}>", self.id, self.username, self.email)
    }
}

/// Profile sidebar counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub messages: i64,
    pub following: i64,
    pub followers: i64,
    pub likes: i64,
}

/// A message together with the author fields every listing shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// `timestamp` rendered as e.g. "19 October 2026".
    pub posted_on: String,
    pub user_id: i64,
    pub username: String,
    pub user_image_url: String,
}

impl Message {
    pub fn posted_on(timestamp: &DateTime<Utc>) -> String {
        timestamp.format("%d %B %Y").to_string()
    }
}

/// Category attached to a flashed notice; maps onto the alert CSS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn user_display_matches_debug_listing_format() {
        let user = User {
            id: 1,
            username: "testuser1".into(),
            email: "test1@test.com".into(),
            image_url: DEFAULT_IMAGE_URL.into(),
            header_image_url: DEFAULT_HEADER_IMAGE_URL.into(),
            bio: None,
            location: None,
        };

        assert_eq!(user.to_string(), "<User #1: testuser1, test1@test.com>");
    }

    #[test]
    fn posted_on_uses_day_month_year() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 9, 8, 30, 0).unwrap();
        assert_eq!(Message::posted_on(&ts), "09 October 2026");
    }
}
