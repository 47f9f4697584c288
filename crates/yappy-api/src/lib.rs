pub mod error;
pub mod messages;
pub mod passcode;
pub mod policy;
pub mod push;
pub mod reactions;
pub mod users;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ApiError;
use yappy_db::Database;

/// Run DB work off the async runtime. Every handler funnels its rusqlite
/// calls through here.
pub(crate) async fn run_blocking<T, F>(db: Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store(anyhow::anyhow!("background task failed"))
        })?
}

pub(crate) fn parse_uuid_lossy(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_time_lossy(raw: &str, what: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, raw, e);
            DateTime::default()
        })
}
