//! Response normalization
//!
//! Platform pages are loosely shaped: any individual field may be missing or
//! formatted differently from one response to the next. Missing fields become
//! defaults (empty string, zero). Only a body with nothing recognizable in it
//! is reported as malformed.

use chrono::{DateTime, Utc};
use reelvault_common::types::{User, Video, VideoSummary};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::error::FetchError;

/// Parsed list response shared by trending, hashtag and search endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub items: Vec<VideoSummary>,
    pub challenge_id: String,
    pub challenge_name: String,
}

/// Parse a human-formatted count such as `1,234`, `3.5w`, `12万` or `8k`
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.char_indices().last() {
        Some((idx, 'w' | 'W' | '万')) => (&cleaned[..idx], 10_000.0),
        Some((idx, 'k' | 'K')) => (&cleaned[..idx], 1_000.0),
        Some((idx, '亿')) => (&cleaned[..idx], 100_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    if let Ok(n) = number.parse::<u64>() {
        return Some(n.saturating_mul(multiplier as u64));
    }

    let value = number.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

fn first_match<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn nth_match<'a>(document: &'a Html, css: &str, n: usize) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).nth(n)
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn select_text(document: &Html, css: &str) -> Option<String> {
    first_match(document, css).map(element_text)
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    first_match(document, css)
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
}

fn select_count(document: &Html, css: &str) -> Option<u64> {
    select_text(document, css).and_then(|t| parse_count(&t))
}

fn ensure_non_empty(body: &str) -> Result<(), FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::Malformed("empty response body".to_string()));
    }
    Ok(())
}

/// Normalize a video detail page
pub fn parse_video_page(
    id: &str,
    html: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Video, FetchError> {
    ensure_non_empty(html)?;
    let document = Html::parse_document(html);

    let title = select_text(&document, "title");
    let author = select_attr(&document, r#"meta[name="author"]"#, "content");
    let likes = select_count(&document, "#like-count");
    let comments = select_count(&document, "#comment-count");
    let shares = select_count(&document, "#share-count");

    if title.is_none()
        && author.is_none()
        && likes.is_none()
        && comments.is_none()
        && shares.is_none()
    {
        return Err(FetchError::Malformed(format!(
            "video page for '{}' has no recognizable fields",
            id
        )));
    }

    Ok(Video {
        id: id.to_string(),
        title: title.unwrap_or_default(),
        author: author.unwrap_or_default(),
        like_count: likes.unwrap_or(0),
        comment_count: comments.unwrap_or(0),
        share_count: shares.unwrap_or(0),
        fetched_at,
    })
}

/// Normalize a user profile page
pub fn parse_user_page(
    id: &str,
    html: &str,
    fetched_at: DateTime<Utc>,
) -> Result<User, FetchError> {
    ensure_non_empty(html)?;
    let document = Html::parse_document(html);

    let username = select_text(&document, "title");
    let followers = nth_match(&document, ".profile-follow-info span", 0)
        .and_then(|el| parse_count(&element_text(el)));
    let following = nth_match(&document, ".profile-follow-info span", 1)
        .and_then(|el| parse_count(&element_text(el)));
    let videos = select_count(&document, ".profile-video-info span");

    if username.is_none() && followers.is_none() && following.is_none() && videos.is_none() {
        return Err(FetchError::Malformed(format!(
            "profile page for '{}' has no recognizable fields",
            id
        )));
    }

    Ok(User {
        id: id.to_string(),
        username: username.unwrap_or_default(),
        follower_count: followers.unwrap_or(0),
        following_count: following.unwrap_or(0),
        video_count: videos.unwrap_or(0),
        fetched_at,
    })
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn count_field(obj: &Map<String, Value>, key: &str) -> u64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_count(s).unwrap_or(0),
        _ => 0,
    }
}

fn summary(item: &Value) -> VideoSummary {
    let Some(obj) = item.as_object() else {
        return VideoSummary::default();
    };

    VideoSummary {
        id: text_field(obj, "id"),
        title: text_field(obj, "title"),
        author: text_field(obj, "author"),
        thumbnail: text_field(obj, "thumbnail"),
        duration: count_field(obj, "duration"),
        play_count: count_field(obj, "play_count"),
    }
}

/// Normalize a JSON list response (`{"items": [...], ...}`)
pub fn parse_listing(body: &str) -> Result<Listing, FetchError> {
    ensure_non_empty(body)?;

    let root: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("invalid JSON: {}", e)))?;
    let obj = root
        .as_object()
        .ok_or_else(|| FetchError::Malformed("expected a JSON object".to_string()))?;

    let items = obj
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(summary).collect())
        .unwrap_or_default();

    Ok(Listing {
        items,
        challenge_id: text_field(obj, "challenge_id"),
        challenge_name: text_field(obj, "challenge_name"),
    })
}
