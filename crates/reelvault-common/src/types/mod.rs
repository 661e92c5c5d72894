//! Normalized entity records
//!
//! Every record the fetcher produces is one of four kinds. Records are built
//! once, stamped with the time they were fetched, and then only read: storage
//! backends take them by reference and write copies.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReelError, Result};

/// Timestamp part of the key assigned to trending batches (microsecond
/// precision); the page number is appended as `_p<page>`
pub const TRENDING_KEY_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

// ============================================================================
// Entity Kinds
// ============================================================================

/// The unit of fetch and persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Video,
    User,
    Trending,
    Hashtag,
}

/// Type of a filterable scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
}

const VIDEO_FIELDS: &[(&str, FieldType)] = &[
    ("id", FieldType::Text),
    ("title", FieldType::Text),
    ("author", FieldType::Text),
    ("like_count", FieldType::Integer),
    ("comment_count", FieldType::Integer),
    ("share_count", FieldType::Integer),
];

const USER_FIELDS: &[(&str, FieldType)] = &[
    ("id", FieldType::Text),
    ("username", FieldType::Text),
    ("follower_count", FieldType::Integer),
    ("following_count", FieldType::Integer),
    ("video_count", FieldType::Integer),
];

const TRENDING_FIELDS: &[(&str, FieldType)] =
    &[("id", FieldType::Text), ("page", FieldType::Integer)];

const HASHTAG_FIELDS: &[(&str, FieldType)] = &[
    ("tag", FieldType::Text),
    ("challenge_id", FieldType::Text),
    ("challenge_name", FieldType::Text),
];

impl EntityKind {
    /// All kinds, in pipeline order
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Video,
        EntityKind::User,
        EntityKind::Trending,
        EntityKind::Hashtag,
    ];

    /// Lowercase name, used as storage namespace and filename prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Video => "video",
            EntityKind::User => "user",
            EntityKind::Trending => "trending",
            EntityKind::Hashtag => "hashtag",
        }
    }

    /// Name of the field holding the record key
    pub fn key_field(&self) -> &'static str {
        match self {
            EntityKind::Hashtag => "tag",
            _ => "id",
        }
    }

    /// Filterable scalar fields published by this kind
    pub fn fields(&self) -> &'static [(&'static str, FieldType)] {
        match self {
            EntityKind::Video => VIDEO_FIELDS,
            EntityKind::User => USER_FIELDS,
            EntityKind::Trending => TRENDING_FIELDS,
            EntityKind::Hashtag => HASHTAG_FIELDS,
        }
    }

    /// Type of the named field, if this kind publishes it
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields()
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, ty)| *ty)
    }
}

impl std::str::FromStr for EntityKind {
    type Err = ReelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" | "videos" => Ok(EntityKind::Video),
            "user" | "users" | "account" => Ok(EntityKind::User),
            "trending" => Ok(EntityKind::Trending),
            "hashtag" | "hashtags" | "tag" => Ok(EntityKind::Hashtag),
            _ => Err(ReelError::UnknownKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// List-item view of a video, as returned by trending, hashtag and search pages
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub thumbnail: String,
    /// Duration in seconds
    pub duration: u64,
    pub play_count: u64,
}

/// Full video details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub author: String,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub fetched_at: DateTime<Utc>,
}

/// User profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub follower_count: u64,
    pub following_count: u64,
    pub video_count: u64,
    pub fetched_at: DateTime<Utc>,
}

/// One page of the trending list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingBatch {
    /// Ordered as returned by the platform
    pub items: Vec<VideoSummary>,
    pub page: u32,
    pub fetched_at: DateTime<Utc>,
}

impl TrendingBatch {
    /// Key derived from the fetch timestamp and page
    pub fn key(&self) -> String {
        format!("{}_p{}", self.fetched_at.format(TRENDING_KEY_FORMAT), self.page)
    }
}

/// A hashtag challenge and one page of its videos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashtag {
    pub tag: String,
    pub challenge_id: String,
    pub challenge_name: String,
    pub videos: Vec<VideoSummary>,
    pub fetched_at: DateTime<Utc>,
}

/// Value of a scalar record field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Text(_) => FieldType::Text,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

fn count(value: u64) -> FieldValue {
    FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

/// A normalized entity record of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    Video(Video),
    User(User),
    Trending(TrendingBatch),
    Hashtag(Hashtag),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Video(_) => EntityKind::Video,
            EntityRecord::User(_) => EntityKind::User,
            EntityRecord::Trending(_) => EntityKind::Trending,
            EntityRecord::Hashtag(_) => EntityKind::Hashtag,
        }
    }

    /// Unique key of the record within its kind's namespace
    pub fn key(&self) -> String {
        match self {
            EntityRecord::Video(v) => v.id.clone(),
            EntityRecord::User(u) => u.id.clone(),
            EntityRecord::Trending(t) => t.key(),
            EntityRecord::Hashtag(h) => h.tag.clone(),
        }
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        match self {
            EntityRecord::Video(v) => v.fetched_at,
            EntityRecord::User(u) => u.fetched_at,
            EntityRecord::Trending(t) => t.fetched_at,
            EntityRecord::Hashtag(h) => h.fetched_at,
        }
    }

    /// Value of a published scalar field, `None` for unknown fields
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match (self, name) {
            (EntityRecord::Video(v), "id") => text(&v.id),
            (EntityRecord::Video(v), "title") => text(&v.title),
            (EntityRecord::Video(v), "author") => text(&v.author),
            (EntityRecord::Video(v), "like_count") => count(v.like_count),
            (EntityRecord::Video(v), "comment_count") => count(v.comment_count),
            (EntityRecord::Video(v), "share_count") => count(v.share_count),
            (EntityRecord::User(u), "id") => text(&u.id),
            (EntityRecord::User(u), "username") => text(&u.username),
            (EntityRecord::User(u), "follower_count") => count(u.follower_count),
            (EntityRecord::User(u), "following_count") => count(u.following_count),
            (EntityRecord::User(u), "video_count") => count(u.video_count),
            (EntityRecord::Trending(t), "id") => FieldValue::Text(t.key()),
            (EntityRecord::Trending(t), "page") => count(u64::from(t.page)),
            (EntityRecord::Hashtag(h), "tag") => text(&h.tag),
            (EntityRecord::Hashtag(h), "challenge_id") => text(&h.challenge_id),
            (EntityRecord::Hashtag(h), "challenge_name") => text(&h.challenge_name),
            _ => return None,
        };
        Some(value)
    }

    /// Serialize to pretty-printed, human-diffable JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Timestamp Encoding
// ============================================================================

/// Encode a timestamp as RFC 3339 text without losing precision
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp written by [`encode_timestamp`]
pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ReelError::InvalidTimestamp(format!("{}: {}", raw, e)))
}
