//! Pool and error plumbing shared by the SQL-backed variants

use reelvault_common::types::{EntityKind, FieldValue};
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::error::ErrorKind;
use sqlx::query::Query;
use sqlx::{Any, AnyPool};
use std::time::Duration;
use tracing::info;

use crate::error::{ConnectError, SaveError, SchemaError};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) async fn open_pool(backend: &'static str, url: &str) -> Result<AnyPool, ConnectError> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await
        .map_err(|e| ConnectError {
            backend,
            reason: e.to_string(),
        })?;

    info!(backend, url = %redact(url), "Connected to database");
    Ok(pool)
}

/// Execute DDL statements one at a time (sqlite rejects multi-statement strings)
pub(crate) async fn run_ddl(
    backend: &'static str,
    pool: &AnyPool,
    statements: &[&str],
) -> Result<(), SchemaError> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| SchemaError::Failed {
                backend,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Classify a write failure for one record
pub(crate) fn save_error(err: sqlx::Error, kind: EntityKind, key: &str) -> SaveError {
    match &err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => SaveError::DuplicateKey {
                kind,
                key: key.to_string(),
            },
            ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                SaveError::ConstraintViolation(db.message().to_string())
            },
            _ => SaveError::IoFailure(err.to_string()),
        },
        _ => SaveError::IoFailure(err.to_string()),
    }
}

pub(crate) fn to_db_count(value: u64, field: &str) -> Result<i64, SaveError> {
    i64::try_from(value)
        .map_err(|_| SaveError::ConstraintViolation(format!("{} {} exceeds the column range", field, value)))
}

pub(crate) fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &FieldValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        FieldValue::Integer(n) => query.bind(*n),
        FieldValue::Text(s) => query.bind(s.clone()),
    }
}

/// Hide the password in a connection URL before logging it
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        },
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}
