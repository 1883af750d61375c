use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::instrument;

use crate::{
    model::{
        entities::{EntityId, TimeEntry},
        filter::ReportFilter,
    },
    storage::StoreResult,
    utils::{
        percentage::{capacity_percentage, Percentage},
        time::{diff_seconds, DateRange},
    },
};

use super::{billing::hours, Catalog, ReportEngine};

const NO_PROJECT_LABEL: &str = "No project";
const NO_PROJECT_COLOR: &str = "#888888";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHours {
    pub date: NaiveDate,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectShare {
    pub project_id: Option<EntityId>,
    pub project_name: String,
    pub color: String,
    pub total_seconds: i64,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentEntry {
    pub id: EntityId,
    pub description: String,
    pub project_name: String,
    pub project_color: String,
    pub start_time: NaiveDateTime,
    pub stop_time: Option<NaiveDateTime>,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub today_seconds: i64,
    /// Today including the time of the running entry.
    pub today_running_seconds: i64,
    pub week_seconds: i64,
    pub month_seconds: i64,
    pub last_7_days: Vec<DayHours>,
    /// Current week.
    pub project_distribution: Vec<ProjectShare>,
    pub most_tracked_project: Option<ProjectShare>,
    pub recent_entries: Vec<RecentEntry>,
    pub capacity: Percentage,
}

impl ReportEngine {
    /// Seconds of completed entries starting within `range`, no other filtering.
    pub async fn period_total(&self, range: &DateRange) -> StoreResult<i64> {
        Ok(self
            .entries_in_range(range, &ReportFilter::default())
            .await?
            .iter()
            .map(TimeEntry::tracked_seconds)
            .sum())
    }

    /// Today's total plus the elapsed time of whatever is running since today.
    pub async fn today_running_total(&self, now: NaiveDateTime) -> StoreResult<i64> {
        let today = DateRange::today(now);
        let completed = self.period_total(&today).await?;
        let running = self
            .store
            .active_entries()
            .await?
            .iter()
            .filter(|e| today.contains(e.start_time))
            .map(|e| diff_seconds(e.start_time, now))
            .sum::<i64>();
        Ok(completed + running)
    }

    /// Exactly seven days ending with `today`, oldest first. Days without time are zero.
    pub async fn last_7_days(&self, today: NaiveDate) -> StoreResult<Vec<DayHours>> {
        let first = today - chrono::Duration::days(6);
        let mut seconds = first
            .iter_days()
            .take(7)
            .map(|date| (date, 0))
            .collect::<IndexMap<NaiveDate, i64>>();
        let entries = self
            .entries_in_range(&DateRange::days(first, today), &ReportFilter::default())
            .await?;
        for entry in entries {
            if let Some(total) = seconds.get_mut(&entry.date()) {
                *total += entry.tracked_seconds();
            }
        }
        Ok(seconds
            .into_iter()
            .map(|(date, seconds)| DayHours {
                date,
                hours: hours(seconds),
            })
            .collect())
    }

    /// Time per project, largest first. Projects without time are left out.
    pub async fn project_distribution(&self, range: &DateRange) -> StoreResult<Vec<ProjectShare>> {
        let entries = self
            .entries_in_range(range, &ReportFilter::default())
            .await?;
        let catalog = self.catalog().await?;
        Ok(distribution(&entries, &catalog))
    }

    pub async fn most_tracked_project(
        &self,
        range: &DateRange,
    ) -> StoreResult<Option<ProjectShare>> {
        Ok(self.project_distribution(range).await?.into_iter().next())
    }

    /// Most recently started completed entries.
    pub async fn recent_entries(&self, limit: usize) -> StoreResult<Vec<RecentEntry>> {
        let (entries, catalog) = futures::try_join!(self.store.entries(), self.catalog())?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_running())
            .take(limit)
            .map(|entry| {
                let project = catalog.project(&entry);
                RecentEntry {
                    id: entry.id,
                    project_name: project
                        .map_or_else(|| NO_PROJECT_LABEL.to_string(), |p| p.name.clone()),
                    project_color: project
                        .map_or_else(|| NO_PROJECT_COLOR.to_string(), |p| p.color.clone()),
                    start_time: entry.start_time,
                    stop_time: entry.stop_time,
                    duration_seconds: entry.tracked_seconds(),
                    description: entry.description,
                }
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn dashboard(
        &self,
        now: NaiveDateTime,
        working_hours: f64,
        recent_limit: usize,
    ) -> StoreResult<Dashboard> {
        let (today, week, month) = (
            DateRange::today(now),
            DateRange::week(now),
            DateRange::month(now),
        );
        let (today_seconds, today_running_seconds, week_seconds, month_seconds) = futures::try_join!(
            self.period_total(&today),
            self.today_running_total(now),
            self.period_total(&week),
            self.period_total(&month),
        )?;
        let (last_7_days, project_distribution, recent_entries) = futures::try_join!(
            self.last_7_days(now.date()),
            self.project_distribution(&week),
            self.recent_entries(recent_limit),
        )?;
        Ok(Dashboard {
            today_seconds,
            today_running_seconds,
            week_seconds,
            month_seconds,
            last_7_days,
            most_tracked_project: project_distribution.first().cloned(),
            project_distribution,
            recent_entries,
            capacity: capacity_percentage(today_seconds, working_hours),
        })
    }
}

fn distribution(entries: &[TimeEntry], catalog: &Catalog) -> Vec<ProjectShare> {
    let mut shares = IndexMap::<Option<EntityId>, ProjectShare>::new();
    for entry in entries {
        let project = catalog.project(entry);
        let share = shares
            .entry(project.map(|p| p.id))
            .or_insert_with(|| ProjectShare {
                project_id: project.map(|p| p.id),
                project_name: project
                    .map_or_else(|| NO_PROJECT_LABEL.to_string(), |p| p.name.clone()),
                color: project.map_or_else(|| NO_PROJECT_COLOR.to_string(), |p| p.color.clone()),
                total_seconds: 0,
                hours: 0.,
            });
        share.total_seconds += entry.tracked_seconds();
    }
    let mut shares = shares
        .into_values()
        .filter(|s| s.total_seconds > 0)
        .map(|s| ProjectShare {
            hours: hours(s.total_seconds),
            ..s
        })
        .collect::<Vec<_>>();
    shares.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds));
    shares
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;

    use super::*;
    use crate::{
        model::entities::NewTimeEntry,
        report::test_support::{at, engine, entry, project},
        storage::{local::LocalStore, TimeEntryRepository},
    };

    #[tokio::test]
    async fn test_last_7_days_zero_filled() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        entry(&store, None, "2024-01-10T09:00:00", "2024-01-10T10:30:00", false).await?;
        entry(&store, None, "2024-01-03T09:00:00", "2024-01-03T10:00:00", false).await?;

        let days = engine(&store)
            .last_7_days(at("2024-01-10T00:00:00").date())
            .await?;
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, at("2024-01-04T00:00:00").date());
        assert_eq!(days[6].hours, 1.5);
        assert!(days[..6].iter().all(|d| d.hours == 0.));
        Ok(())
    }

    #[tokio::test]
    async fn test_running_entry_counts_for_today() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        entry(&store, None, "2024-01-10T08:00:00", "2024-01-10T09:00:00", false).await?;
        store
            .create_entry(NewTimeEntry::running(at("2024-01-10T10:00:00")))
            .await?;

        let engine = engine(&store);
        let now = at("2024-01-10T10:30:00");
        assert_eq!(engine.period_total(&DateRange::today(now)).await?, 3600);
        assert_eq!(engine.today_running_total(now).await?, 5400);
        Ok(())
    }

    #[tokio::test]
    async fn test_dashboard() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        let web = project(&store, "Website", None, 0.).await?;
        project(&store, "Unused", None, 0.).await?;
        entry(&store, Some(web.id), "2024-01-10T08:00:00", "2024-01-10T12:00:00", false).await?;
        entry(&store, None, "2024-01-08T08:00:00", "2024-01-08T09:00:00", false).await?;
        entry(&store, None, "2024-01-02T08:00:00", "2024-01-02T09:00:00", false).await?;

        let dashboard = engine(&store)
            .dashboard(at("2024-01-10T18:00:00"), 8., 2)
            .await?;
        assert_eq!(dashboard.today_seconds, 4 * 3600);
        assert_eq!(dashboard.today_running_seconds, 4 * 3600);
        assert_eq!(dashboard.week_seconds, 5 * 3600);
        assert_eq!(dashboard.month_seconds, 6 * 3600);
        assert_eq!(dashboard.capacity.to_string(), "50.0%");

        let names = dashboard
            .project_distribution
            .iter()
            .map(|s| (s.project_name.as_str(), s.color.as_str(), s.hours))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![("Website", "#4A90D9", 4.), ("No project", "#888888", 1.)]
        );
        assert_eq!(
            dashboard.most_tracked_project.map(|s| s.project_id),
            Some(Some(web.id))
        );

        let recent = dashboard
            .recent_entries
            .iter()
            .map(|e| e.start_time)
            .collect::<Vec<_>>();
        assert_eq!(
            recent,
            vec![at("2024-01-10T08:00:00"), at("2024-01-08T08:00:00")]
        );
        Ok(())
    }
}
