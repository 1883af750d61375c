use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use fs4::tokio::AsyncFileExt;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::RwLock,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    model::{
        entities::{
            Client, ClientUpdate, EntityId, ExportData, NewProject, NewTimeEntry, Project,
            ProjectUpdate, Setting, TableCounts, Tag, TimeEntry, TimeEntryTag, TimeEntryUpdate,
            DEFAULT_PROJECT_COLOR,
        },
        filter::ReportFilter,
    },
    utils::{
        clock::{Clock, DefaultClock},
        time::{diff_seconds, to_timestamp, DateRange},
    },
};

use super::{
    BulkRepository, ClientRepository, ProjectRepository, SettingRepository, StoreError,
    StoreResult, TagRepository, TimeEntryRepository,
};

/// Last issued id per table. Ids are never reused, even after deletes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LastIds {
    client: EntityId,
    project: EntityId,
    tag: EntityId,
    time_entry: EntityId,
}

fn issue(counter: &mut EntityId) -> EntityId {
    *counter += 1;
    *counter
}

/// Document stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    last_ids: LastIds,
    #[serde(default)]
    clients: Vec<Client>,
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    time_entries: Vec<TimeEntry>,
    #[serde(default)]
    time_entry_tags: Vec<TimeEntryTag>,
    #[serde(default)]
    settings: Vec<Setting>,
}

impl Tables {
    /// Moves counters past every id present, after loading a hand edited file or an import.
    fn normalize_ids(&mut self) {
        fn max_id(ids: impl Iterator<Item = EntityId>) -> EntityId {
            ids.max().unwrap_or(0)
        }
        let ids = &mut self.last_ids;
        ids.client = ids.client.max(max_id(self.clients.iter().map(|v| v.id)));
        ids.project = ids.project.max(max_id(self.projects.iter().map(|v| v.id)));
        ids.tag = ids.tag.max(max_id(self.tags.iter().map(|v| v.id)));
        ids.time_entry = ids
            .time_entry
            .max(max_id(self.time_entries.iter().map(|v| v.id)));
    }

    /// Imported rows get the same guarantees as rows written one by one: derived durations, no
    /// references to missing rows and no duplicate links.
    fn repair_imported(&mut self, links: Vec<TimeEntryTag>) {
        let client_ids = self.clients.iter().map(|c| c.id).collect::<HashSet<_>>();
        for project in &mut self.projects {
            if project.client_id.is_some_and(|id| !client_ids.contains(&id)) {
                warn!("Project {} referenced a missing client", project.id);
                project.client_id = None;
            }
        }
        let project_ids = self.projects.iter().map(|p| p.id).collect::<HashSet<_>>();
        for entry in &mut self.time_entries {
            entry.duration_seconds = derived_duration(entry.start_time, entry.stop_time);
            if entry.project_id.is_some_and(|id| !project_ids.contains(&id)) {
                warn!("Entry {} referenced a missing project", entry.id);
                entry.project_id = None;
            }
        }
        for link in links {
            let entry_known = self.time_entries.iter().any(|e| e.id == link.time_entry_id);
            if entry_known && self.check_tags(&[link.tag_id]).is_ok() {
                self.link_tags(link.time_entry_id, &[link.tag_id]);
            } else {
                warn!("Dropping link of entry {} to tag {}", link.time_entry_id, link.tag_id);
            }
        }
    }

    fn row_counts(&self) -> TableCounts {
        TableCounts {
            clients: self.clients.len(),
            projects: self.projects.len(),
            tags: self.tags.len(),
            time_entries: self.time_entries.len(),
            time_entry_tags: self.time_entry_tags.len(),
            settings: self.settings.len(),
        }
    }

    fn check_project(&self, project_id: Option<EntityId>) -> StoreResult<()> {
        match project_id {
            Some(id) if !self.projects.iter().any(|p| p.id == id) => {
                Err(StoreError::UnknownReference {
                    entity: "project",
                    id,
                })
            }
            _ => Ok(()),
        }
    }

    fn check_client(&self, client_id: Option<EntityId>) -> StoreResult<()> {
        match client_id {
            Some(id) if !self.clients.iter().any(|c| c.id == id) => {
                Err(StoreError::UnknownReference { entity: "client", id })
            }
            _ => Ok(()),
        }
    }

    fn check_tags(&self, tag_ids: &[EntityId]) -> StoreResult<()> {
        match tag_ids
            .iter()
            .find(|id| !self.tags.iter().any(|t| t.id == **id))
        {
            Some(id) => Err(StoreError::UnknownReference {
                entity: "tag",
                id: *id,
            }),
            None => Ok(()),
        }
    }

    fn link_tags(&mut self, entry_id: EntityId, tag_ids: &[EntityId]) {
        for tag_id in tag_ids {
            let link = TimeEntryTag {
                time_entry_id: entry_id,
                tag_id: *tag_id,
            };
            if !self.time_entry_tags.contains(&link) {
                self.time_entry_tags.push(link);
            }
        }
    }
}

fn name_taken<'a>(
    mut existing: impl Iterator<Item = (EntityId, &'a str)>,
    name: &str,
    except: Option<EntityId>,
) -> bool {
    existing.any(|(id, existing)| existing == name && Some(id) != except)
}

/// Duration is derived, never trusted from callers.
fn derived_duration(start: NaiveDateTime, stop: Option<NaiveDateTime>) -> Option<i64> {
    stop.map(|stop| diff_seconds(start, stop))
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0. {
        rate
    } else {
        0.
    }
}

/// The main realization of [super::Store].
///
/// Every mutation is applied to a copy of the tables. The copy replaces the in-memory state only
/// after it was written to the backing file, so a failed write leaves both untouched.
pub struct LocalStore {
    tables: RwLock<Tables>,
    file: Option<PathBuf>,
    clock: Box<dyn Clock>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            file: None,
            clock: Box::new(DefaultClock),
        }
    }

    /// Opens or creates a JSON backed store. A missing or empty file is an empty store.
    pub async fn open(path: PathBuf) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tables = read_tables(&path).await?;
        info!(
            "Opened store {path:?} with {} entries",
            tables.time_entries.len()
        );
        Ok(Self {
            tables: RwLock::new(tables),
            file: Some(path),
            clock: Box::new(DefaultClock),
        })
    }

    pub fn with_clock(self, clock: impl Clock) -> Self {
        Self {
            clock: Box::new(clock),
            ..self
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    async fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&Tables) -> T + Send,
    {
        let tables = self.tables.read().await;
        f(&tables)
    }

    async fn mutate<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Tables, NaiveDateTime) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let value = f(&mut next, self.clock.now())?;
        if let Some(path) = &self.file {
            write_tables(path, &next).await?;
        }
        *tables = next;
        Ok(value)
    }
}

async fn read_tables(path: &Path) -> StoreResult<Tables> {
    async fn extract(path: &Path) -> std::io::Result<String> {
        debug!("Reading store {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut content = String::new();
        let result = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        result?;
        Ok(content)
    }

    match extract(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Tables::default()),
        Ok(content) => {
            let mut tables: Tables = serde_json::from_str(&content)?;
            tables.normalize_ids();
            Ok(tables)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Tables::default()),
        Err(e) => Err(e.into()),
    }
}

async fn write_tables(path: &Path, tables: &Tables) -> StoreResult<()> {
    let buffer = serde_json::to_vec_pretty(tables)?;
    // Truncation happens under the lock, so readers never see a half emptied file.
    let mut file = File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await?;
    file.lock_exclusive()?;
    let result = write_with_file(&mut file, &buffer).await;
    file.unlock_async().await?;
    Ok(result?)
}

async fn write_with_file(file: &mut File, buffer: &[u8]) -> std::io::Result<()> {
    file.set_len(0).await?;
    file.rewind().await?;
    file.write_all(buffer).await?;
    file.flush().await?;
    file.sync_data().await
}

#[async_trait]
impl ClientRepository for LocalStore {
    #[instrument(skip(self))]
    async fn create_client(&self, name: &str) -> StoreResult<Client> {
        let name = name.to_string();
        self.mutate(move |tables, now| {
            let existing = tables.clients.iter().map(|c| (c.id, c.name.as_str()));
            if name_taken(existing, &name, None) {
                return Err(StoreError::Constraint {
                    entity: "client",
                    name,
                });
            }
            let client = Client {
                id: issue(&mut tables.last_ids.client),
                name,
                archived: false,
                created_at: now,
                updated_at: now,
            };
            tables.clients.push(client.clone());
            Ok(client)
        })
        .await
    }

    async fn clients(&self, include_archived: bool) -> StoreResult<Vec<Client>> {
        let mut clients = self
            .read(|tables| {
                tables
                    .clients
                    .iter()
                    .filter(|c| include_archived || !c.archived)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn client(&self, id: EntityId) -> StoreResult<Option<Client>> {
        Ok(self
            .read(|tables| tables.clients.iter().find(|c| c.id == id).cloned())
            .await)
    }

    async fn update_client(
        &self,
        id: EntityId,
        update: ClientUpdate,
    ) -> StoreResult<Option<Client>> {
        self.mutate(move |tables, now| {
            if let Some(name) = &update.name {
                let existing = tables.clients.iter().map(|c| (c.id, c.name.as_str()));
                if name_taken(existing, name, Some(id)) {
                    return Err(StoreError::Constraint {
                        entity: "client",
                        name: name.clone(),
                    });
                }
            }
            let Some(client) = tables.clients.iter_mut().find(|c| c.id == id) else {
                return Ok(None);
            };
            if let Some(name) = update.name {
                client.name = name;
            }
            if let Some(archived) = update.archived {
                client.archived = archived;
            }
            client.updated_at = now;
            Ok(Some(client.clone()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_client(&self, id: EntityId) -> StoreResult<bool> {
        self.mutate(move |tables, now| {
            let before = tables.clients.len();
            tables.clients.retain(|c| c.id != id);
            if tables.clients.len() == before {
                return Ok(false);
            }
            for project in tables
                .projects
                .iter_mut()
                .filter(|p| p.client_id == Some(id))
            {
                project.client_id = None;
                project.updated_at = now;
            }
            Ok(true)
        })
        .await
    }

    async fn client_project_count(&self, id: EntityId) -> StoreResult<usize> {
        Ok(self
            .read(|tables| {
                tables
                    .projects
                    .iter()
                    .filter(|p| p.client_id == Some(id))
                    .count()
            })
            .await)
    }

    async fn client_has_active_projects(&self, id: EntityId) -> StoreResult<bool> {
        Ok(self
            .read(|tables| {
                tables
                    .projects
                    .iter()
                    .any(|p| p.client_id == Some(id) && !p.archived)
            })
            .await)
    }
}

#[async_trait]
impl ProjectRepository for LocalStore {
    #[instrument(skip(self))]
    async fn create_project(&self, project: NewProject) -> StoreResult<Project> {
        self.mutate(move |tables, now| {
            let existing = tables.projects.iter().map(|p| (p.id, p.name.as_str()));
            if name_taken(existing, &project.name, None) {
                return Err(StoreError::Constraint {
                    entity: "project",
                    name: project.name,
                });
            }
            tables.check_client(project.client_id)?;
            let project = Project {
                id: issue(&mut tables.last_ids.project),
                name: project.name,
                color: project
                    .color
                    .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
                client_id: project.client_id,
                billable: project.billable,
                hourly_rate: sanitize_rate(project.hourly_rate),
                archived: false,
                created_at: now,
                updated_at: now,
            };
            tables.projects.push(project.clone());
            Ok(project)
        })
        .await
    }

    async fn projects(&self, include_archived: bool) -> StoreResult<Vec<Project>> {
        let mut projects = self
            .read(|tables| {
                tables
                    .projects
                    .iter()
                    .filter(|p| include_archived || !p.archived)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn project(&self, id: EntityId) -> StoreResult<Option<Project>> {
        Ok(self
            .read(|tables| tables.projects.iter().find(|p| p.id == id).cloned())
            .await)
    }

    async fn update_project(
        &self,
        id: EntityId,
        update: ProjectUpdate,
    ) -> StoreResult<Option<Project>> {
        self.mutate(move |tables, now| {
            if let Some(name) = &update.name {
                let existing = tables.projects.iter().map(|p| (p.id, p.name.as_str()));
                if name_taken(existing, name, Some(id)) {
                    return Err(StoreError::Constraint {
                        entity: "project",
                        name: name.clone(),
                    });
                }
            }
            if let Some(client_id) = update.client_id {
                tables.check_client(client_id)?;
            }
            let Some(project) = tables.projects.iter_mut().find(|p| p.id == id) else {
                return Ok(None);
            };
            if let Some(name) = update.name {
                project.name = name;
            }
            if let Some(color) = update.color {
                project.color = color;
            }
            if let Some(client_id) = update.client_id {
                project.client_id = client_id;
            }
            if let Some(billable) = update.billable {
                project.billable = billable;
            }
            if let Some(rate) = update.hourly_rate {
                project.hourly_rate = sanitize_rate(rate);
            }
            if let Some(archived) = update.archived {
                project.archived = archived;
            }
            project.updated_at = now;
            Ok(Some(project.clone()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_project(&self, id: EntityId) -> StoreResult<bool> {
        self.mutate(move |tables, now| {
            let before = tables.projects.len();
            tables.projects.retain(|p| p.id != id);
            if tables.projects.len() == before {
                return Ok(false);
            }
            for entry in tables
                .time_entries
                .iter_mut()
                .filter(|e| e.project_id == Some(id))
            {
                entry.project_id = None;
                entry.updated_at = now;
            }
            Ok(true)
        })
        .await
    }

    async fn project_total_tracked(&self, id: EntityId) -> StoreResult<i64> {
        Ok(self
            .read(|tables| {
                tables
                    .time_entries
                    .iter()
                    .filter(|e| e.project_id == Some(id))
                    .filter_map(|e| e.duration_seconds)
                    .sum()
            })
            .await)
    }
}

#[async_trait]
impl TagRepository for LocalStore {
    #[instrument(skip(self))]
    async fn create_tag(&self, name: &str) -> StoreResult<Tag> {
        let name = name.to_string();
        self.mutate(move |tables, now| {
            let existing = tables.tags.iter().map(|t| (t.id, t.name.as_str()));
            if name_taken(existing, &name, None) {
                return Err(StoreError::Constraint { entity: "tag", name });
            }
            let tag = Tag {
                id: issue(&mut tables.last_ids.tag),
                name,
                created_at: now,
            };
            tables.tags.push(tag.clone());
            Ok(tag)
        })
        .await
    }

    async fn tags(&self) -> StoreResult<Vec<Tag>> {
        let mut tags = self.read(|tables| tables.tags.clone()).await;
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn tag(&self, id: EntityId) -> StoreResult<Option<Tag>> {
        Ok(self
            .read(|tables| tables.tags.iter().find(|t| t.id == id).cloned())
            .await)
    }

    async fn update_tag(&self, id: EntityId, name: &str) -> StoreResult<Option<Tag>> {
        let name = name.to_string();
        self.mutate(move |tables, _| {
            let existing = tables.tags.iter().map(|t| (t.id, t.name.as_str()));
            if name_taken(existing, &name, Some(id)) {
                return Err(StoreError::Constraint { entity: "tag", name });
            }
            let Some(tag) = tables.tags.iter_mut().find(|t| t.id == id) else {
                return Ok(None);
            };
            tag.name = name;
            Ok(Some(tag.clone()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_tag(&self, id: EntityId) -> StoreResult<bool> {
        self.mutate(move |tables, _| {
            let before = tables.tags.len();
            tables.tags.retain(|t| t.id != id);
            if tables.tags.len() == before {
                return Ok(false);
            }
            tables.time_entry_tags.retain(|link| link.tag_id != id);
            Ok(true)
        })
        .await
    }

    async fn tag_usage_count(&self, id: EntityId) -> StoreResult<usize> {
        Ok(self
            .read(|tables| {
                tables
                    .time_entry_tags
                    .iter()
                    .filter(|link| link.tag_id == id)
                    .count()
            })
            .await)
    }
}

#[async_trait]
impl TimeEntryRepository for LocalStore {
    #[instrument(skip(self))]
    async fn create_entry(&self, entry: NewTimeEntry) -> StoreResult<TimeEntry> {
        self.mutate(move |tables, now| {
            tables.check_project(entry.project_id)?;
            tables.check_tags(&entry.tag_ids)?;
            let created = TimeEntry {
                id: issue(&mut tables.last_ids.time_entry),
                description: entry.description,
                project_id: entry.project_id,
                start_time: entry.start_time,
                stop_time: entry.stop_time,
                duration_seconds: derived_duration(entry.start_time, entry.stop_time),
                billable: entry.billable,
                created_at: now,
                updated_at: now,
            };
            tables.time_entries.push(created.clone());
            tables.link_tags(created.id, &entry.tag_ids);
            Ok(created)
        })
        .await
    }

    async fn entries(&self) -> StoreResult<Vec<TimeEntry>> {
        let mut entries = self.read(|tables| tables.time_entries.clone()).await;
        entries.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id)));
        Ok(entries)
    }

    async fn entry(&self, id: EntityId) -> StoreResult<Option<TimeEntry>> {
        Ok(self
            .read(|tables| tables.time_entries.iter().find(|e| e.id == id).cloned())
            .await)
    }

    #[instrument(skip(self))]
    async fn update_entry(
        &self,
        id: EntityId,
        update: TimeEntryUpdate,
    ) -> StoreResult<Option<TimeEntry>> {
        self.mutate(move |tables, now| {
            if let Some(project_id) = update.project_id {
                tables.check_project(project_id)?;
            }
            if let Some(tag_ids) = &update.tag_ids {
                tables.check_tags(tag_ids)?;
            }
            let Some(entry) = tables.time_entries.iter_mut().find(|e| e.id == id) else {
                return Ok(None);
            };
            if let Some(description) = update.description {
                entry.description = description;
            }
            if let Some(project_id) = update.project_id {
                entry.project_id = project_id;
            }
            if let Some(start_time) = update.start_time {
                entry.start_time = start_time;
            }
            if let Some(stop_time) = update.stop_time {
                entry.stop_time = stop_time;
            }
            if let Some(billable) = update.billable {
                entry.billable = billable;
            }
            entry.duration_seconds = derived_duration(entry.start_time, entry.stop_time);
            entry.updated_at = now;
            let updated = entry.clone();

            if let Some(tag_ids) = update.tag_ids {
                tables.time_entry_tags.retain(|link| link.time_entry_id != id);
                tables.link_tags(id, &tag_ids);
            }
            Ok(Some(updated))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, id: EntityId) -> StoreResult<bool> {
        self.mutate(move |tables, _| {
            let before = tables.time_entries.len();
            tables.time_entries.retain(|e| e.id != id);
            if tables.time_entries.len() == before {
                return Ok(false);
            }
            tables.time_entry_tags.retain(|link| link.time_entry_id != id);
            Ok(true)
        })
        .await
    }

    async fn active_entries(&self) -> StoreResult<Vec<TimeEntry>> {
        let mut active = self
            .read(|tables| {
                tables
                    .time_entries
                    .iter()
                    .filter(|e| e.is_running())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        active.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id)));
        Ok(active)
    }

    #[instrument(skip(self))]
    async fn stop_entry(
        &self,
        id: EntityId,
        stop_time: Option<NaiveDateTime>,
    ) -> StoreResult<Option<TimeEntry>> {
        self.mutate(move |tables, now| {
            let Some(entry) = tables.time_entries.iter_mut().find(|e| e.id == id) else {
                return Ok(None);
            };
            let stop_time = stop_time.unwrap_or(now);
            entry.stop_time = Some(stop_time);
            entry.duration_seconds = derived_duration(entry.start_time, entry.stop_time);
            entry.updated_at = now;
            Ok(Some(entry.clone()))
        })
        .await
    }

    async fn add_tags(&self, entry_id: EntityId, tag_ids: &[EntityId]) -> StoreResult<()> {
        self.mutate(move |tables, _| {
            if !tables.time_entries.iter().any(|e| e.id == entry_id) {
                return Err(StoreError::UnknownReference {
                    entity: "time entry",
                    id: entry_id,
                });
            }
            tables.check_tags(tag_ids)?;
            tables.link_tags(entry_id, tag_ids);
            Ok(())
        })
        .await
    }

    async fn remove_tags(&self, entry_id: EntityId, tag_ids: &[EntityId]) -> StoreResult<()> {
        self.mutate(move |tables, _| {
            tables
                .time_entry_tags
                .retain(|link| link.time_entry_id != entry_id || !tag_ids.contains(&link.tag_id));
            Ok(())
        })
        .await
    }

    async fn tags_for_entry(&self, entry_id: EntityId) -> StoreResult<Vec<EntityId>> {
        Ok(self
            .read(|tables| {
                tables
                    .time_entry_tags
                    .iter()
                    .filter(|link| link.time_entry_id == entry_id)
                    .map(|link| link.tag_id)
                    .collect()
            })
            .await)
    }

    async fn completed_entries(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<TimeEntry>> {
        let mut entries = self
            .read(|tables| {
                let client_of = tables
                    .projects
                    .iter()
                    .map(|p| (p.id, p.client_id))
                    .collect::<HashMap<_, _>>();
                tables
                    .time_entries
                    .iter()
                    .filter(|e| !e.is_running() && range.contains(e.start_time))
                    .filter(|e| filter.projects.matches(e.project_id))
                    .filter(|e| {
                        filter.clients.is_any()
                            || filter.clients.matches(
                                e.project_id
                                    .and_then(|id| client_of.get(&id).copied().flatten()),
                            )
                    })
                    .filter(|e| !filter.billable_only || e.billable)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        entries.sort_by_key(|e| (e.start_time, e.id));
        Ok(entries)
    }

    async fn entry_ids_with_any_tag(
        &self,
        entry_ids: &[EntityId],
        tag_ids: &[EntityId],
    ) -> StoreResult<HashSet<EntityId>> {
        let entry_ids = entry_ids.iter().copied().collect::<HashSet<_>>();
        let tag_ids = tag_ids.iter().copied().collect::<HashSet<_>>();
        Ok(self
            .read(|tables| {
                tables
                    .time_entry_tags
                    .iter()
                    .filter(|link| {
                        entry_ids.contains(&link.time_entry_id) && tag_ids.contains(&link.tag_id)
                    })
                    .map(|link| link.time_entry_id)
                    .collect()
            })
            .await)
    }

    async fn tags_for_entries(
        &self,
        entry_ids: &[EntityId],
    ) -> StoreResult<Vec<(EntityId, Tag)>> {
        let entry_ids = entry_ids.iter().copied().collect::<HashSet<_>>();
        Ok(self
            .read(|tables| {
                let tags = tables
                    .tags
                    .iter()
                    .map(|t| (t.id, t))
                    .collect::<HashMap<_, _>>();
                tables
                    .time_entry_tags
                    .iter()
                    .filter(|link| entry_ids.contains(&link.time_entry_id))
                    .filter_map(|link| {
                        tags.get(&link.tag_id)
                            .map(|tag| (link.time_entry_id, (*tag).clone()))
                    })
                    .collect()
            })
            .await)
    }
}

#[async_trait]
impl SettingRepository for LocalStore {
    async fn setting(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .read(|tables| {
                tables
                    .settings
                    .iter()
                    .find(|s| s.key == key)
                    .map(|s| s.value.clone())
            })
            .await)
    }

    async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.mutate(move |tables, _| {
            match tables.settings.iter_mut().find(|s| s.key == key) {
                Some(setting) => setting.value = value.to_string(),
                None => tables.settings.push(Setting {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
            Ok(())
        })
        .await
    }

    async fn settings(&self) -> StoreResult<Vec<Setting>> {
        let mut settings = self.read(|tables| tables.settings.clone()).await;
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(settings)
    }

    async fn delete_setting(&self, key: &str) -> StoreResult<bool> {
        self.mutate(move |tables, _| {
            let before = tables.settings.len();
            tables.settings.retain(|s| s.key != key);
            Ok(tables.settings.len() != before)
        })
        .await
    }
}

#[async_trait]
impl BulkRepository for LocalStore {
    async fn export_all(&self) -> StoreResult<ExportData> {
        let exported_at = to_timestamp(self.clock.now());
        Ok(self
            .read(|tables| ExportData {
                clients: tables.clients.clone(),
                projects: tables.projects.clone(),
                tags: tables.tags.clone(),
                time_entries: tables.time_entries.clone(),
                time_entry_tags: tables.time_entry_tags.clone(),
                settings: tables.settings.clone(),
                exported_at,
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await)
    }

    #[instrument(skip_all)]
    async fn import_all(&self, data: ExportData) -> StoreResult<TableCounts> {
        let counts = self
            .mutate(move |tables, _| {
                // Previous rows go away wholesale, only the id counters survive.
                tables.clients = data.clients;
                tables.projects = data.projects;
                tables.tags = data.tags;
                tables.time_entries = data.time_entries;
                tables.time_entry_tags = vec![];
                tables.settings = data.settings;
                tables.repair_imported(data.time_entry_tags);
                tables.normalize_ids();
                Ok(tables.row_counts())
            })
            .await?;
        info!("Imported {counts:?}");
        Ok(counts)
    }
}
