use chrono::NaiveDateTime;
use tracing::info;

use crate::{
    model::entities::{EntityId, NewTimeEntry, TimeEntry},
    storage::{Store, StoreError},
    utils::time::{diff_seconds, parse_timestamp},
};

pub const MAX_ENTRY_SECONDS: i64 = 24 * 60 * 60;

/// Messages are shown to the user as they are.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid start time format.")]
    InvalidStart,
    #[error("Invalid end time format.")]
    InvalidEnd,
    #[error("End time must be after start time.")]
    EndNotAfterStart,
    #[error("Duration cannot exceed 24 hours.")]
    TooLong,
}

#[derive(Debug, thiserror::Error)]
pub enum ManualEntryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A historical entry, start and stop supplied together.
#[derive(Debug, Clone)]
pub struct ManualEntry {
    pub description: String,
    pub project_id: Option<EntityId>,
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
    pub billable: bool,
    pub tag_ids: Vec<EntityId>,
}

/// Duration of a span ending after it starts and lasting at most [MAX_ENTRY_SECONDS].
fn checked_duration(start: NaiveDateTime, stop: NaiveDateTime) -> Result<i64, ValidationError> {
    if stop <= start {
        return Err(ValidationError::EndNotAfterStart);
    }
    let duration = diff_seconds(start, stop);
    if duration > MAX_ENTRY_SECONDS {
        return Err(ValidationError::TooLong);
    }
    Ok(duration)
}

impl ManualEntry {
    /// Returns the duration the entry would be stored with.
    pub fn validate(&self) -> Result<i64, ValidationError> {
        checked_duration(self.start, self.stop)
    }
}

/// Parses both timestamps and checks the span they form.
pub fn validate_manual_entry(
    start: &str,
    stop: &str,
) -> Result<(NaiveDateTime, NaiveDateTime), ValidationError> {
    let start = parse_timestamp(start).map_err(|_| ValidationError::InvalidStart)?;
    let stop = parse_timestamp(stop).map_err(|_| ValidationError::InvalidEnd)?;
    checked_duration(start, stop)?;
    Ok((start, stop))
}

/// Nothing is written when validation fails.
pub async fn create_manual_entry(
    store: &dyn Store,
    entry: ManualEntry,
) -> Result<TimeEntry, ManualEntryError> {
    entry.validate()?;
    let created = store
        .create_entry(NewTimeEntry {
            description: entry.description,
            project_id: entry.project_id,
            start_time: entry.start,
            stop_time: Some(entry.stop),
            billable: entry.billable,
            tag_ids: entry.tag_ids,
        })
        .await?;
    info!("Added manual entry {}", created.id);
    Ok(created)
}
