use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub type EntityId = i64;

pub const DEFAULT_PROJECT_COLOR: &str = "#4A90D9";

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Client {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(with = "timestamp_ser")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp_ser")]
    pub updated_at: NaiveDateTime,
}

/// A project may outlive its client, deleting a client only clears `client_id`.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub client_id: Option<EntityId>,
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default)]
    pub archived: bool,
    #[serde(with = "timestamp_ser")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp_ser")]
    pub updated_at: NaiveDateTime,
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
    pub id: EntityId,
    pub name: String,
    #[serde(with = "timestamp_ser")]
    pub created_at: NaiveDateTime,
}

/// A tracked span of work. `stop_time == None` means the entry is still running, in which case
/// `duration_seconds` is `None` as well. Once stopped the duration is `max(0, stop - start)`.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TimeEntry {
    pub id: EntityId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    #[serde(with = "timestamp_ser")]
    pub start_time: NaiveDateTime,
    #[serde(default, with = "timestamp_ser::option")]
    pub stop_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub billable: bool,
    #[serde(with = "timestamp_ser")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp_ser")]
    pub updated_at: NaiveDateTime,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.stop_time.is_none()
    }

    /// Calendar day the entry is attributed to, which is always the day it started.
    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }

    pub fn tracked_seconds(&self) -> i64 {
        self.duration_seconds.unwrap_or(0)
    }
}

/// Junction row between [TimeEntry] and [Tag].
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone, Copy)]
pub struct TimeEntryTag {
    pub time_entry_id: EntityId,
    pub tag_id: EntityId,
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub color: Option<String>,
    pub client_id: Option<EntityId>,
    pub billable: bool,
    pub hourly_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub archived: Option<bool>,
}

/// `Some(None)` on a nullable field clears it, `None` leaves it alone.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub client_id: Option<Option<EntityId>>,
    pub billable: Option<bool>,
    pub hourly_rate: Option<f64>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub description: String,
    pub project_id: Option<EntityId>,
    pub start_time: NaiveDateTime,
    pub stop_time: Option<NaiveDateTime>,
    pub billable: bool,
    pub tag_ids: Vec<EntityId>,
}

impl NewTimeEntry {
    pub fn running(start_time: NaiveDateTime) -> Self {
        Self {
            description: String::new(),
            project_id: None,
            start_time,
            stop_time: None,
            billable: false,
            tag_ids: vec![],
        }
    }
}

/// `tag_ids`, when present, replaces the whole tag set of the entry. The duration is never set
/// directly, storage derives it from start and stop.
#[derive(Debug, Clone, Default)]
pub struct TimeEntryUpdate {
    pub description: Option<String>,
    pub project_id: Option<Option<EntityId>>,
    pub start_time: Option<NaiveDateTime>,
    pub stop_time: Option<Option<NaiveDateTime>>,
    pub billable: Option<bool>,
    pub tag_ids: Option<Vec<EntityId>>,
}

impl TimeEntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.project_id.is_none()
            && self.start_time.is_none()
            && self.stop_time.is_none()
            && self.billable.is_none()
            && self.tag_ids.is_none()
    }
}

/// Every table of the store in one document. Used by export/import, absent tables deserialize
/// as empty.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct ExportData {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub time_entry_tags: Vec<TimeEntryTag>,
    #[serde(default)]
    pub settings: Vec<Setting>,
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub version: String,
}

impl ExportData {
    pub fn row_counts(&self) -> TableCounts {
        TableCounts {
            clients: self.clients.len(),
            projects: self.projects.len(),
            tags: self.tags.len(),
            time_entries: self.time_entries.len(),
            time_entry_tags: self.time_entry_tags.len(),
            settings: self.settings.len(),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct TableCounts {
    pub clients: usize,
    pub projects: usize,
    pub tags: usize,
    pub time_entries: usize,
    pub time_entry_tags: usize,
    pub settings: usize,
}

pub(crate) mod timestamp_ser {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    use crate::utils::time::{parse_timestamp, to_timestamp};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_timestamp(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{self, Deserialize, Deserializer, Serializer};

        use crate::utils::time::{parse_timestamp, to_timestamp};

        pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(v) => serializer.serialize_some(&to_timestamp(*v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::utils::time::parse_timestamp;

    #[test]
    fn test_entry_serializes_local_timestamps() -> Result<()> {
        let start = parse_timestamp("2024-05-06T08:30:00")?;
        let entry = TimeEntry {
            id: 1,
            description: "Writing".into(),
            project_id: None,
            start_time: start,
            stop_time: None,
            duration_seconds: None,
            billable: false,
            created_at: start,
            updated_at: start,
        };
        let json = serde_json::to_value(&entry)?;
        assert_eq!(json["start_time"], "2024-05-06T08:30:00");
        assert!(json["stop_time"].is_null());

        let back: TimeEntry = serde_json::from_value(json)?;
        assert_eq!(back, entry);
        assert!(back.is_running());
        Ok(())
    }

    #[test]
    fn test_entry_missing_optional_fields() -> Result<()> {
        let entry: TimeEntry = serde_json::from_str(
            r#"{"id": 3, "start_time": "2024-05-06T08:30:00", "stop_time": "2024-05-06T09:00:00",
                "duration_seconds": 1800, "created_at": "2024-05-06T08:30:00",
                "updated_at": "2024-05-06T09:00:00"}"#,
        )?;
        assert_eq!(entry.description, "");
        assert_eq!(entry.project_id, None);
        assert!(!entry.billable);
        assert_eq!(entry.tracked_seconds(), 1800);
        Ok(())
    }
}
