//! Turns stored entries into reports. Every report is built from [ReportEngine::entries_in_range],
//! which only ever sees completed entries.

pub mod billing;
pub mod dashboard;
pub mod detailed;
pub mod summary;
pub mod weekly;

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    model::{
        entities::{Client, EntityId, Project, TimeEntry},
        filter::ReportFilter,
    },
    storage::{Store, StoreResult},
    utils::time::DateRange,
};

use billing::billable_amount;

pub const NO_PROJECT: &str = "No Project";
pub const NO_CLIENT: &str = "No Client";

pub struct ReportEngine {
    store: Arc<dyn Store>,
}

impl ReportEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Completed entries starting within `range` that pass `filter`, oldest first.
    ///
    /// Tags are matched in a single batch lookup over the entries the other filters kept.
    pub async fn entries_in_range(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<TimeEntry>> {
        let entries = self.store.completed_entries(range, filter).await?;
        if filter.tags.is_any() || entries.is_empty() {
            return Ok(entries);
        }
        let entry_ids = entries.iter().map(|e| e.id).collect::<Vec<_>>();
        let tagged = self
            .store
            .entry_ids_with_any_tag(&entry_ids, &filter.tags.ids())
            .await?;
        debug!("{} of {} entries carry a wanted tag", tagged.len(), entries.len());
        Ok(entries
            .into_iter()
            .filter(|e| tagged.contains(&e.id))
            .collect())
    }

    async fn catalog(&self) -> StoreResult<Catalog> {
        let (projects, clients) =
            futures::try_join!(self.store.projects(true), self.store.clients(true))?;
        Ok(Catalog {
            projects: projects.into_iter().map(|p| (p.id, p)).collect(),
            clients: clients.into_iter().map(|c| (c.id, c)).collect(),
        })
    }
}

/// Projects and clients by id, archived ones included since old entries still point at them.
struct Catalog {
    projects: HashMap<EntityId, Project>,
    clients: HashMap<EntityId, Client>,
}

impl Catalog {
    fn project(&self, entry: &TimeEntry) -> Option<&Project> {
        entry.project_id.and_then(|id| self.projects.get(&id))
    }

    fn client(&self, entry: &TimeEntry) -> Option<&Client> {
        self.project(entry)
            .and_then(|p| p.client_id)
            .and_then(|id| self.clients.get(&id))
    }

    fn amount(&self, entry: &TimeEntry) -> f64 {
        let rate = self.project(entry).map_or(0., |p| p.hourly_rate);
        billable_amount(entry.tracked_seconds(), rate, entry.billable)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::NaiveDateTime;

    use super::ReportEngine;
    use crate::{
        model::entities::{EntityId, NewProject, NewTimeEntry, Project, TimeEntry},
        storage::{local::LocalStore, ProjectRepository, StoreResult, TimeEntryRepository},
        utils::time::parse_timestamp,
    };

    pub fn at(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    pub fn engine(store: &Arc<LocalStore>) -> ReportEngine {
        ReportEngine::new(store.clone())
    }

    pub async fn project(
        store: &LocalStore,
        name: &str,
        client_id: Option<EntityId>,
        hourly_rate: f64,
    ) -> StoreResult<Project> {
        store
            .create_project(NewProject {
                name: name.into(),
                client_id,
                billable: hourly_rate > 0.,
                hourly_rate,
                ..Default::default()
            })
            .await
    }

    pub async fn entry(
        store: &LocalStore,
        project_id: Option<EntityId>,
        start: &str,
        stop: &str,
        billable: bool,
    ) -> StoreResult<TimeEntry> {
        store
            .create_entry(NewTimeEntry {
                description: format!("work at {start}"),
                project_id,
                stop_time: Some(at(stop)),
                billable,
                ..NewTimeEntry::running(at(start))
            })
            .await
    }
}
