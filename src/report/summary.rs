use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::instrument;

use crate::{
    model::{
        entities::{EntityId, TimeEntry},
        filter::ReportFilter,
    },
    storage::StoreResult,
    utils::time::{date_key, DateRange},
};

use super::{
    billing::{hours, round2},
    Catalog, ReportEngine, NO_CLIENT, NO_PROJECT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupBy {
    Project,
    Client,
    Day,
}

impl GroupBy {
    /// Column title of the group in exports.
    pub fn label(&self) -> &'static str {
        match self {
            GroupBy::Project => "Project",
            GroupBy::Client => "Client",
            GroupBy::Day => "Date",
        }
    }
}

/// `None` is the logical "No Project"/"No Client" bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKey {
    Project(Option<EntityId>),
    Client(Option<EntityId>),
    Day(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryGroup {
    pub key: GroupKey,
    pub label: String,
    /// Only project groups carry a color.
    pub color: Option<String>,
    pub entries_count: usize,
    pub total_seconds: i64,
    pub total_hours: f64,
    pub billable_amount: f64,
}

impl ReportEngine {
    #[instrument(skip(self))]
    pub async fn summary(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
        by: GroupBy,
    ) -> StoreResult<Vec<SummaryGroup>> {
        let entries = self.entries_in_range(range, filter).await?;
        let catalog = self.catalog().await?;
        Ok(summarize(&entries, &catalog, by))
    }

    pub async fn summary_by_project(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<SummaryGroup>> {
        self.summary(range, filter, GroupBy::Project).await
    }

    pub async fn summary_by_client(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<SummaryGroup>> {
        self.summary(range, filter, GroupBy::Client).await
    }

    pub async fn summary_by_day(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<SummaryGroup>> {
        self.summary(range, filter, GroupBy::Day).await
    }
}

fn summarize(entries: &[TimeEntry], catalog: &Catalog, by: GroupBy) -> Vec<SummaryGroup> {
    let mut groups = IndexMap::<GroupKey, SummaryGroup>::new();
    for entry in entries {
        let key = match by {
            GroupBy::Project => GroupKey::Project(catalog.project(entry).map(|p| p.id)),
            GroupBy::Client => GroupKey::Client(catalog.client(entry).map(|c| c.id)),
            GroupBy::Day => GroupKey::Day(entry.date()),
        };
        let group = groups.entry(key).or_insert_with(|| {
            let (label, color) = match key {
                GroupKey::Project(_) => match catalog.project(entry) {
                    Some(p) => (p.name.clone(), Some(p.color.clone())),
                    None => (NO_PROJECT.to_string(), None),
                },
                GroupKey::Client(_) => (
                    catalog
                        .client(entry)
                        .map_or_else(|| NO_CLIENT.to_string(), |c| c.name.clone()),
                    None,
                ),
                GroupKey::Day(date) => (date_key(date), None),
            };
            SummaryGroup {
                key,
                label,
                color,
                entries_count: 0,
                total_seconds: 0,
                total_hours: 0.,
                billable_amount: 0.,
            }
        });
        group.entries_count += 1;
        group.total_seconds += entry.tracked_seconds();
        group.billable_amount += catalog.amount(entry);
    }

    let mut groups = groups
        .into_values()
        .map(|group| SummaryGroup {
            total_hours: hours(group.total_seconds),
            // The sum is of already rounded cents, this only drops float noise.
            billable_amount: round2(group.billable_amount),
            ..group
        })
        .collect::<Vec<_>>();

    match by {
        // Stable, equal totals keep the order they were first seen in.
        GroupBy::Project | GroupBy::Client => {
            groups.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds))
        }
        GroupBy::Day => groups.sort_by(|a, b| a.label.cmp(&b.label)),
    }
    groups
}
