use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::instrument;

use crate::{
    model::{
        entities::{EntityId, Tag},
        filter::ReportFilter,
    },
    storage::StoreResult,
    utils::time::DateRange,
};

use super::{billing::hours, ReportEngine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRef {
    pub id: EntityId,
    pub name: String,
}

impl From<Tag> for TagRef {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
        }
    }
}

/// One completed entry with everything it points at resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedRow {
    pub entry_id: EntityId,
    pub description: String,
    pub project_id: Option<EntityId>,
    pub project_name: Option<String>,
    pub project_color: Option<String>,
    pub client_name: Option<String>,
    pub start_time: NaiveDateTime,
    pub stop_time: NaiveDateTime,
    pub duration_seconds: i64,
    pub billable: bool,
    pub billable_amount: f64,
    pub tags: Vec<TagRef>,
}

impl DetailedRow {
    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub entries_count: usize,
    pub total_seconds: i64,
    pub total_hours: f64,
    pub rows: Vec<DetailedRow>,
}

impl ReportEngine {
    /// Rows keep the oldest-first order of [ReportEngine::entries_in_range].
    #[instrument(skip(self))]
    pub async fn detailed(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<DetailedRow>> {
        let entries = self.entries_in_range(range, filter).await?;
        if entries.is_empty() {
            return Ok(vec![]);
        }
        let catalog = self.catalog().await?;

        let entry_ids = entries.iter().map(|e| e.id).collect::<Vec<_>>();
        let mut tags = HashMap::<EntityId, Vec<TagRef>>::new();
        for (entry_id, tag) in self.store.tags_for_entries(&entry_ids).await? {
            tags.entry(entry_id).or_default().push(tag.into());
        }

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                // Completed entries only, see entries_in_range.
                let stop_time = entry.stop_time?;
                let project = catalog.project(&entry);
                Some(DetailedRow {
                    entry_id: entry.id,
                    project_id: project.map(|p| p.id),
                    project_name: project.map(|p| p.name.clone()),
                    project_color: project.map(|p| p.color.clone()),
                    client_name: catalog.client(&entry).map(|c| c.name.clone()),
                    start_time: entry.start_time,
                    stop_time,
                    duration_seconds: entry.tracked_seconds(),
                    billable: entry.billable,
                    billable_amount: catalog.amount(&entry),
                    tags: tags.remove(&entry.id).unwrap_or_default(),
                    description: entry.description,
                })
            })
            .collect())
    }

    /// The detailed view split into calendar days with subtotals.
    pub async fn detailed_by_day(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<DayGroup>> {
        Ok(group_by_day(self.detailed(range, filter).await?))
    }
}

/// Days come out ascending, rows inside a day keep their order.
pub fn group_by_day(rows: Vec<DetailedRow>) -> Vec<DayGroup> {
    let mut days = Vec::<DayGroup>::new();
    for row in rows {
        let date = row.date();
        let index = match days.iter().position(|d| d.date == date) {
            Some(index) => index,
            None => {
                days.push(DayGroup {
                    date,
                    entries_count: 0,
                    total_seconds: 0,
                    total_hours: 0.,
                    rows: vec![],
                });
                days.len() - 1
            }
        };
        let day = &mut days[index];
        day.entries_count += 1;
        day.total_seconds += row.duration_seconds;
        day.total_hours = hours(day.total_seconds);
        day.rows.push(row);
    }
    days.sort_by_key(|d| d.date);
    days
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;

    use super::*;
    use crate::{
        report::test_support::{at, engine, entry, project},
        storage::{local::LocalStore, ClientRepository, TagRepository, TimeEntryRepository},
    };

    fn week() -> DateRange {
        DateRange::week(at("2024-01-10T12:00:00"))
    }

    #[tokio::test]
    async fn test_rows_are_enriched() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        let acme = store.create_client("Acme").await?;
        let web = project(&store, "Website", Some(acme.id), 60.).await?;
        let design = store.create_tag("design").await?;
        let review = store.create_tag("review").await?;

        let tagged = entry(&store, Some(web.id), "2024-01-08T09:00:00", "2024-01-08T09:30:00", true).await?;
        store.add_tags(tagged.id, &[review.id, design.id]).await?;
        let bare = entry(&store, None, "2024-01-09T09:00:00", "2024-01-09T10:00:00", true).await?;

        let rows = engine(&store).detailed(&week(), &ReportFilter::default()).await?;
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.entry_id, tagged.id);
        assert_eq!(first.project_name.as_deref(), Some("Website"));
        assert_eq!(first.client_name.as_deref(), Some("Acme"));
        assert_eq!(first.duration_seconds, 1800);
        assert_eq!(first.billable_amount, 30.);
        assert_eq!(
            first.tags,
            vec![
                TagRef { id: review.id, name: "review".into() },
                TagRef { id: design.id, name: "design".into() },
            ]
        );

        let second = &rows[1];
        assert_eq!(second.entry_id, bare.id);
        assert_eq!(second.project_name, None);
        assert_eq!(second.client_name, None);
        // No project means no rate.
        assert_eq!(second.billable_amount, 0.);
        assert!(second.tags.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_day_subtotals() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        entry(&store, None, "2024-01-08T09:00:00", "2024-01-08T10:00:00", false).await?;
        entry(&store, None, "2024-01-08T11:00:00", "2024-01-08T11:30:00", false).await?;
        entry(&store, None, "2024-01-11T09:00:00", "2024-01-11T09:15:00", false).await?;

        let days = engine(&store)
            .detailed_by_day(&week(), &ReportFilter::default())
            .await?;
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, at("2024-01-08T00:00:00").date());
        assert_eq!(days[0].entries_count, 2);
        assert_eq!(days[0].total_seconds, 5400);
        assert_eq!(days[0].total_hours, 1.5);
        assert_eq!(days[1].total_hours, 0.25);
        assert_eq!(days[1].rows.len(), 1);
        Ok(())
    }
}
