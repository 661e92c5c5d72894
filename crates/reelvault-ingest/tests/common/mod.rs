//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use reelvault_common::types::{EntityRecord, Hashtag, TrendingBatch, User, Video, VideoSummary};
use std::path::Path;

/// A fixed fetch time with sub-microsecond precision
pub fn fetched_at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_739_779_200 + offset_secs, 123_456_789)
        .single()
        .expect("valid timestamp")
}

pub fn video(id: &str, likes: u64) -> EntityRecord {
    EntityRecord::Video(Video {
        id: id.to_string(),
        title: format!("Video {}", id),
        author: "creator".to_string(),
        like_count: likes,
        comment_count: likes / 10,
        share_count: 3,
        fetched_at: fetched_at(0),
    })
}

pub fn user(id: &str, followers: u64) -> EntityRecord {
    EntityRecord::User(User {
        id: id.to_string(),
        username: format!("user_{}", id),
        follower_count: followers,
        following_count: 12,
        video_count: 40,
        fetched_at: fetched_at(0),
    })
}

pub fn summary(id: &str) -> VideoSummary {
    VideoSummary {
        id: id.to_string(),
        title: format!("Clip {}", id),
        author: "creator".to_string(),
        thumbnail: format!("https://img.test/{}.jpg", id),
        duration: 15,
        play_count: 1_000,
    }
}

pub fn trending(page: u32, offset_secs: i64) -> EntityRecord {
    EntityRecord::Trending(TrendingBatch {
        items: vec![summary("t1"), summary("t2"), summary("t3")],
        page,
        fetched_at: fetched_at(offset_secs),
    })
}

pub fn hashtag(tag: &str) -> EntityRecord {
    EntityRecord::Hashtag(Hashtag {
        tag: tag.to_string(),
        challenge_id: "c-100".to_string(),
        challenge_name: "Summer Dance".to_string(),
        videos: vec![summary("h1"), summary("h2")],
        fetched_at: fetched_at(0),
    })
}

/// One record of every kind
pub fn one_of_each() -> Vec<EntityRecord> {
    vec![video("v1", 500), user("u1", 2_000), trending(1, 0), hashtag("dance")]
}

/// sqlx URL for a fresh sqlite database file under `dir`
pub fn sqlite_url(dir: &Path, name: &str) -> String {
    format!("sqlite://{}?mode=rwc", dir.join(name).display())
}
