use chrono::Datelike;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::instrument;

use crate::{
    model::{entities::EntityId, filter::ReportFilter},
    storage::StoreResult,
    utils::time::DateRange,
};

use super::{
    billing::{hours, round2},
    ReportEngine, NO_PROJECT,
};

pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Hours of one project per weekday, Monday first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyRow {
    pub project_id: Option<EntityId>,
    pub project_name: String,
    pub project_color: Option<String>,
    pub days: [f64; 7],
    pub total: f64,
}

struct PivotCell {
    project_name: String,
    project_color: Option<String>,
    seconds: [i64; 7],
}

impl ReportEngine {
    /// Project by weekday pivot. Only projects with time in the range get a row.
    #[instrument(skip(self))]
    pub async fn weekly(
        &self,
        range: &DateRange,
        filter: &ReportFilter,
    ) -> StoreResult<Vec<WeeklyRow>> {
        let entries = self.entries_in_range(range, filter).await?;
        let catalog = self.catalog().await?;

        let mut pivot = IndexMap::<Option<EntityId>, PivotCell>::new();
        for entry in &entries {
            let project = catalog.project(entry);
            let cell = pivot
                .entry(project.map(|p| p.id))
                .or_insert_with(|| PivotCell {
                    project_name: project
                        .map_or_else(|| NO_PROJECT.to_string(), |p| p.name.clone()),
                    project_color: project.map(|p| p.color.clone()),
                    seconds: [0; 7],
                });
            let weekday = entry.start_time.weekday().num_days_from_monday() as usize;
            cell.seconds[weekday] += entry.tracked_seconds();
        }

        let mut rows = pivot
            .into_iter()
            .map(|(project_id, cell)| {
                let days = cell.seconds.map(hours);
                WeeklyRow {
                    project_id,
                    project_name: cell.project_name,
                    project_color: cell.project_color,
                    days,
                    total: round2(days.iter().sum()),
                }
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.total.total_cmp(&a.total));
        Ok(rows)
    }
}
