//! Per-entity repositories, implemented as methods on [`Store`](crate::Store).
//!
//! Each file pairs the async surface with plain `fn(&Connection)` helpers so
//! that multi-step workflows can compose them inside one transaction.

pub mod chapters;
pub mod collaborations;
pub mod feedback;
pub mod manuscripts;
pub mod notifications;
pub mod stats;
pub mod users;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

/// Current time in epoch milliseconds, the precision the schema stores.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(column)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::IntegralValueOutOfRange(idx, millis)
    })
}

pub(crate) fn optional_timestamp(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(column)?;
    millis
        .map(|millis| {
            DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                let idx = row.as_ref().column_index(column).unwrap_or_default();
                rusqlite::Error::IntegralValueOutOfRange(idx, millis)
            })
        })
        .transpose()
}

pub(crate) fn parsed<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = tales_core::Error>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|err: tales_core::Error| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
    })
}

pub(crate) fn json_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|err| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
    })
}
