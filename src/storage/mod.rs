//! Persistence is organized through [Store], which is split into one repository per entity.
//!  - The timer and the report engine only ever see `Arc<dyn Store>`.
//!  - [local::LocalStore] keeps every table in memory and can mirror it into a JSON file.
//!  - Lookups of a missing id answer with `None`/`false`, errors are reserved for broken storage
//!    and constraint violations.

pub mod local;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::{
    model::{
        entities::{
            Client, ClientUpdate, EntityId, ExportData, NewProject, NewTimeEntry, Project,
            ProjectUpdate, Setting, TableCounts, Tag, TimeEntry, TimeEntryUpdate,
        },
        filter::ReportFilter,
    },
    utils::time::DateRange,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} named {name:?} already exists")]
    Constraint { entity: &'static str, name: String },
    #[error("{entity} {id} does not exist")]
    UnknownReference { entity: &'static str, id: EntityId },
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create_client(&self, name: &str) -> StoreResult<Client>;

    /// Sorted by name.
    async fn clients(&self, include_archived: bool) -> StoreResult<Vec<Client>>;

    async fn client(&self, id: EntityId) -> StoreResult<Option<Client>>;

    async fn update_client(&self, id: EntityId, update: ClientUpdate)
        -> StoreResult<Option<Client>>;

    /// Projects of the client stay, their `client_id` is cleared.
    async fn delete_client(&self, id: EntityId) -> StoreResult<bool>;

    async fn client_project_count(&self, id: EntityId) -> StoreResult<usize>;

    async fn client_has_active_projects(&self, id: EntityId) -> StoreResult<bool>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create_project(&self, project: NewProject) -> StoreResult<Project>;

    /// Sorted by name.
    async fn projects(&self, include_archived: bool) -> StoreResult<Vec<Project>>;

    async fn project(&self, id: EntityId) -> StoreResult<Option<Project>>;

    async fn update_project(
        &self,
        id: EntityId,
        update: ProjectUpdate,
    ) -> StoreResult<Option<Project>>;

    /// Entries of the project stay, their `project_id` is cleared.
    async fn delete_project(&self, id: EntityId) -> StoreResult<bool>;

    /// Sum of `duration_seconds` over completed entries of the project.
    async fn project_total_tracked(&self, id: EntityId) -> StoreResult<i64>;
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create_tag(&self, name: &str) -> StoreResult<Tag>;

    /// Sorted by name.
    async fn tags(&self) -> StoreResult<Vec<Tag>>;

    async fn tag(&self, id: EntityId) -> StoreResult<Option<Tag>>;

    async fn update_tag(&self, id: EntityId, name: &str) -> StoreResult<Option<Tag>>;

    /// Removes the tag together with all of its junction rows.
    async fn delete_tag(&self, id: EntityId) -> StoreResult<bool>;

    /// Number of entries carrying the tag.
    async fn tag_usage_count(&self, id: EntityId) -> StoreResult<usize>;
}

#[async_trait]
pub trait TimeEntryRepository: Send + Sync {
    async fn create_entry(&self, entry: NewTimeEntry) -> StoreResult<TimeEntry>;

    /// Most recent start first.
    async fn entries(&self) -> StoreResult<Vec<TimeEntry>>;

    async fn entry(&self, id: EntityId) -> StoreResult<Option<TimeEntry>>;

    async fn update_entry(
        &self,
        id: EntityId,
        update: TimeEntryUpdate,
    ) -> StoreResult<Option<TimeEntry>>;

    /// Removes the entry together with all of its junction rows.
    async fn delete_entry(&self, id: EntityId) -> StoreResult<bool>;

    /// Every entry without a stop time, most recent start first. More than one element means the
    /// single running entry invariant was broken by someone.
    async fn active_entries(&self) -> StoreResult<Vec<TimeEntry>>;

    /// Sets the stop time (now when `None`) and the clamped duration.
    async fn stop_entry(
        &self,
        id: EntityId,
        stop_time: Option<NaiveDateTime>,
    ) -> StoreResult<Option<TimeEntry>>;

    /// Already present associations are ignored.
    async fn add_tags(&self, entry_id: EntityId, tag_ids: &[EntityId]) -> StoreResult<()>;

    async fn remove_tags(&self, entry_id: EntityId, tag_ids: &[EntityId]) -> StoreResult<()>;

    async fn tags_for_entry(&self, entry_id: EntityId) -> StoreResult<Vec<EntityId>>;

    /// Completed entries starting inside `range`, oldest first. Applies the project, client and
    /// billable parts of `filter`; tags are left to [Self::entry_ids_with_any_tag].
    async fn completed_entries(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<TimeEntry>>;

    /// The subset of `entry_ids` that carry at least one of `tag_ids`, in a single lookup.
    async fn entry_ids_with_any_tag(
        &self,
        entry_ids: &[EntityId],
        tag_ids: &[EntityId],
    ) -> StoreResult<HashSet<EntityId>>;

    /// Tags of every entry in `entry_ids` in a single lookup.
    async fn tags_for_entries(&self, entry_ids: &[EntityId])
        -> StoreResult<Vec<(EntityId, Tag)>>;
}

#[async_trait]
pub trait SettingRepository: Send + Sync {
    /// Stored value only, defaults are applied by [crate::settings::Settings].
    async fn setting(&self, key: &str) -> StoreResult<Option<String>>;

    /// Creates or overwrites `key`.
    async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn settings(&self) -> StoreResult<Vec<Setting>>;

    async fn delete_setting(&self, key: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait BulkRepository: Send + Sync {
    async fn export_all(&self) -> StoreResult<ExportData>;

    /// Destructive. Every table is emptied (junction, entries, projects, clients, tags, settings)
    /// and refilled from `data`. Returns the number of rows written per table.
    async fn import_all(&self, data: ExportData) -> StoreResult<TableCounts>;
}

/// The whole persistence collaborator.
pub trait Store:
    ClientRepository
    + ProjectRepository
    + TagRepository
    + TimeEntryRepository
    + SettingRepository
    + BulkRepository
{
}

impl<T> Store for T where
    T: ClientRepository
        + ProjectRepository
        + TagRepository
        + TimeEntryRepository
        + SettingRepository
        + BulkRepository
{
}
