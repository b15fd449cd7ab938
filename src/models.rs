use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub total_points: i32,
    #[serde(rename = "profilePictureURL", default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_target: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub community_id: String,
    pub community_name: String,
    pub community_code: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geohash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub community_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}

/// A community member as shown in the member list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub total_points: i32,
    #[serde(rename = "profilePictureURL", skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl From<User> for Member {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            username: u.username,
            total_points: u.total_points,
            profile_picture_url: u.profile_picture_url.filter(|url| !url.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub username: String,
    pub total_points: i32,
}
