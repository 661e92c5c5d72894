//! Relational backend over an sqlx `AnyPool`
//!
//! Postgres in production; any sqlx `Any` driver works, which lets the tests
//! run against sqlite files. Counts are `BIGINT`, `created_at` holds the
//! record's fetch time as RFC 3339 text so no precision is lost on either
//! database.
//!
//! Tables:
//!
//! | table              | key                    | content                          |
//! |--------------------|------------------------|----------------------------------|
//! | `videos`           | `id`                   | video details                    |
//! | `accounts`         | `id`                   | user profiles                    |
//! | `trending_batches` | `id` (timestamp, page) | page number                      |
//! | `trending_items`   | `(batch_id, position)` | one row per listed video         |
//! | `hashtags`         | `tag`                  | challenge id and name            |
//! | `hashtag_videos`   | `(tag, position)`      | one row per listed video         |

use async_trait::async_trait;
use reelvault_common::types::{
    decode_timestamp, encode_timestamp, EntityKind, EntityRecord, Hashtag, TrendingBatch, User,
    Video, VideoSummary,
};
use sqlx::any::AnyRow;
use sqlx::{Any, AnyPool, Row, Transaction};
use tracing::{debug, info};

use super::sql::{bind_value, open_pool, run_ddl, save_error, to_db_count};
use super::{validate_key, Filter, StorageBackend};
use crate::error::{ConnectError, QueryError, SaveError, SchemaError};

const BACKEND: &str = "relational";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS videos (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        like_count BIGINT NOT NULL,
        comment_count BIGINT NOT NULL,
        share_count BIGINT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        follower_count BIGINT NOT NULL,
        following_count BIGINT NOT NULL,
        video_count BIGINT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trending_batches (
        id TEXT PRIMARY KEY,
        page BIGINT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trending_items (
        batch_id TEXT NOT NULL REFERENCES trending_batches (id),
        position BIGINT NOT NULL,
        video_id TEXT NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        thumbnail TEXT NOT NULL,
        duration BIGINT NOT NULL,
        play_count BIGINT NOT NULL,
        PRIMARY KEY (batch_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS hashtags (
        tag TEXT PRIMARY KEY,
        challenge_id TEXT NOT NULL,
        challenge_name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS hashtag_videos (
        tag TEXT NOT NULL REFERENCES hashtags (tag),
        position BIGINT NOT NULL,
        video_id TEXT NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        thumbnail TEXT NOT NULL,
        duration BIGINT NOT NULL,
        play_count BIGINT NOT NULL,
        PRIMARY KEY (tag, position)
    )",
    "CREATE INDEX IF NOT EXISTS idx_videos_author ON videos (author)",
    "CREATE INDEX IF NOT EXISTS idx_accounts_username ON accounts (username)",
];

/// Table holding the parent row of each kind, and its key column
fn table_for(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Video => ("videos", "id"),
        EntityKind::User => ("accounts", "id"),
        EntityKind::Trending => ("trending_batches", "id"),
        EntityKind::Hashtag => ("hashtags", "tag"),
    }
}

#[derive(Debug)]
pub struct RelationalBackend {
    url: String,
    pool: Option<AnyPool>,
}

impl RelationalBackend {
    /// `url` is any sqlx connection URL, e.g. `postgres://user:pw@host:5432/db`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: None,
        }
    }

    fn pool(&self) -> Option<&AnyPool> {
        self.pool.as_ref()
    }

    async fn insert_video(&self, pool: &AnyPool, video: &Video) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO videos (id, title, author, like_count, comment_count, share_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(video.id.clone())
        .bind(video.title.clone())
        .bind(video.author.clone())
        .bind(count(video.like_count))
        .bind(count(video.comment_count))
        .bind(count(video.share_count))
        .bind(encode_timestamp(&video.fetched_at))
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn insert_user(&self, pool: &AnyPool, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO accounts (id, username, follower_count, following_count, video_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id.clone())
        .bind(user.username.clone())
        .bind(count(user.follower_count))
        .bind(count(user.following_count))
        .bind(count(user.video_count))
        .bind(encode_timestamp(&user.fetched_at))
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn insert_trending(&self, pool: &AnyPool, batch: &TrendingBatch) -> Result<(), sqlx::Error> {
        let key = batch.key();
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO trending_batches (id, page, created_at) VALUES ($1, $2, $3)")
            .bind(key.clone())
            .bind(i64::from(batch.page))
            .bind(encode_timestamp(&batch.fetched_at))
            .execute(&mut *tx)
            .await?;

        insert_items(&mut tx, "trending_items", "batch_id", &key, &batch.items).await?;

        tx.commit().await
    }

    async fn insert_hashtag(&self, pool: &AnyPool, hashtag: &Hashtag) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO hashtags (tag, challenge_id, challenge_name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(hashtag.tag.clone())
            .bind(hashtag.challenge_id.clone())
            .bind(hashtag.challenge_name.clone())
            .bind(encode_timestamp(&hashtag.fetched_at))
            .execute(&mut *tx)
            .await?;

        insert_items(&mut tx, "hashtag_videos", "tag", &hashtag.tag, &hashtag.videos).await?;

        tx.commit().await
    }

    async fn load_items(
        &self,
        pool: &AnyPool,
        table: &str,
        parent_column: &str,
        parent: &str,
    ) -> Result<Vec<VideoSummary>, QueryError> {
        let sql = format!(
            "SELECT video_id, title, author, thumbnail, duration, play_count FROM {} WHERE {} = $1 ORDER BY position",
            table, parent_column
        );
        let rows = sqlx::query(&sql).bind(parent.to_string()).fetch_all(pool).await?;

        rows.iter().map(read_summary).collect()
    }

    async fn decode_row(
        &self,
        pool: &AnyPool,
        kind: EntityKind,
        row: &AnyRow,
    ) -> Result<EntityRecord, QueryError> {
        let created_at: String = row.try_get("created_at")?;
        let fetched_at = decode_timestamp(&created_at)?;

        let record = match kind {
            EntityKind::Video => EntityRecord::Video(Video {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                author: row.try_get("author")?,
                like_count: read_count(row, "like_count")?,
                comment_count: read_count(row, "comment_count")?,
                share_count: read_count(row, "share_count")?,
                fetched_at,
            }),
            EntityKind::User => EntityRecord::User(User {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                follower_count: read_count(row, "follower_count")?,
                following_count: read_count(row, "following_count")?,
                video_count: read_count(row, "video_count")?,
                fetched_at,
            }),
            EntityKind::Trending => {
                let id: String = row.try_get("id")?;
                let page = u32::try_from(row.try_get::<i64, _>("page")?)
                    .map_err(|_| QueryError::Backend(format!("trending batch {} has an invalid page", id)))?;
                EntityRecord::Trending(TrendingBatch {
                    items: self.load_items(pool, "trending_items", "batch_id", &id).await?,
                    page,
                    fetched_at,
                })
            },
            EntityKind::Hashtag => {
                let tag: String = row.try_get("tag")?;
                EntityRecord::Hashtag(Hashtag {
                    videos: self.load_items(pool, "hashtag_videos", "tag", &tag).await?,
                    challenge_id: row.try_get("challenge_id")?,
                    challenge_name: row.try_get("challenge_name")?,
                    tag,
                    fetched_at,
                })
            },
        };
        Ok(record)
    }
}

/// Counts are checked against the column range before any SQL runs
fn count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn read_count(row: &AnyRow, column: &str) -> Result<u64, QueryError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| QueryError::Backend(format!("negative value in {}", column)))
}

fn read_summary(row: &AnyRow) -> Result<VideoSummary, QueryError> {
    Ok(VideoSummary {
        id: row.try_get("video_id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        thumbnail: row.try_get("thumbnail")?,
        duration: read_count(row, "duration")?,
        play_count: read_count(row, "play_count")?,
    })
}

async fn insert_items(
    tx: &mut Transaction<'_, Any>,
    table: &str,
    parent_column: &str,
    parent: &str,
    items: &[VideoSummary],
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} ({}, position, video_id, title, author, thumbnail, duration, play_count)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        table, parent_column
    );

    for (position, item) in items.iter().enumerate() {
        sqlx::query(&sql)
            .bind(parent.to_string())
            .bind(position as i64)
            .bind(item.id.clone())
            .bind(item.title.clone())
            .bind(item.author.clone())
            .bind(item.thumbnail.clone())
            .bind(count(item.duration))
            .bind(count(item.play_count))
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Reject counts that do not fit a BIGINT column
fn check_ranges(record: &EntityRecord) -> Result<(), SaveError> {
    let summaries: &[VideoSummary] = match record {
        EntityRecord::Video(v) => {
            to_db_count(v.like_count, "like_count")?;
            to_db_count(v.comment_count, "comment_count")?;
            to_db_count(v.share_count, "share_count")?;
            &[]
        },
        EntityRecord::User(u) => {
            to_db_count(u.follower_count, "follower_count")?;
            to_db_count(u.following_count, "following_count")?;
            to_db_count(u.video_count, "video_count")?;
            &[]
        },
        EntityRecord::Trending(t) => &t.items,
        EntityRecord::Hashtag(h) => &h.videos,
    };
    for item in summaries {
        to_db_count(item.duration, "duration")?;
        to_db_count(item.play_count, "play_count")?;
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.pool.is_some() {
            return Ok(());
        }
        self.pool = Some(open_pool(BACKEND, &self.url).await?);
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), SchemaError> {
        let pool = self.pool().ok_or(SchemaError::NotConnected)?;
        run_ddl(BACKEND, pool, SCHEMA).await?;
        info!(tables = 6, "Relational schema ready");
        Ok(())
    }

    async fn save(&self, record: &EntityRecord) -> Result<(), SaveError> {
        let pool = self.pool().ok_or(SaveError::NotConnected)?;
        let key = validate_key(record)?;
        check_ranges(record)?;

        let result = match record {
            EntityRecord::Video(v) => self.insert_video(pool, v).await,
            EntityRecord::User(u) => self.insert_user(pool, u).await,
            EntityRecord::Trending(t) => self.insert_trending(pool, t).await,
            EntityRecord::Hashtag(h) => self.insert_hashtag(pool, h).await,
        };
        result.map_err(|e| save_error(e, record.kind(), &key))?;

        debug!(kind = %record.kind(), key = %key, "Inserted record");
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<EntityRecord>, QueryError> {
        let pool = self.pool().ok_or(QueryError::NotConnected)?;
        filter.validate()?;

        // Column names are published field names, checked by validate() above
        let (table, key_column) = table_for(filter.kind);
        let sql = format!(
            "SELECT * FROM {} WHERE {} {} $1 ORDER BY {}",
            table,
            filter.field,
            filter.op.sql(),
            key_column
        );
        let rows = bind_value(sqlx::query(&sql), &filter.value)
            .fetch_all(pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.decode_row(pool, filter.kind, row).await?);
        }
        Ok(records)
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Relational pool closed");
        }
    }
}
