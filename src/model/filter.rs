use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::entities::EntityId;

/// One filter dimension over ids. An empty id list is the same as no filter at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdFilter {
    #[default]
    Any,
    OneOf(BTreeSet<EntityId>),
}

impl IdFilter {
    pub fn is_any(&self) -> bool {
        matches!(self, IdFilter::Any)
    }

    /// A missing id (entry without a project, project without a client) never matches a
    /// restricting filter.
    pub fn matches(&self, id: Option<EntityId>) -> bool {
        match self {
            IdFilter::Any => true,
            IdFilter::OneOf(ids) => id.is_some_and(|id| ids.contains(&id)),
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        match self {
            IdFilter::Any => vec![],
            IdFilter::OneOf(ids) => ids.iter().copied().collect(),
        }
    }
}

impl FromIterator<EntityId> for IdFilter {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let ids = iter.into_iter().collect::<BTreeSet<_>>();
        if ids.is_empty() {
            IdFilter::Any
        } else {
            IdFilter::OneOf(ids)
        }
    }
}

/// Narrows the entries a report is built from. Tags match when the entry has any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub projects: IdFilter,
    pub clients: IdFilter,
    pub tags: IdFilter,
    pub billable_only: bool,
}

impl ReportFilter {
    pub fn with_projects(self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            projects: ids.into_iter().collect(),
            ..self
        }
    }

    pub fn with_clients(self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            clients: ids.into_iter().collect(),
            ..self
        }
    }

    pub fn with_tags(self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            tags: ids.into_iter().collect(),
            ..self
        }
    }

    pub fn billable_only(self, billable_only: bool) -> Self {
        Self {
            billable_only,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_no_filter() {
        let filter = Vec::<EntityId>::new().into_iter().collect::<IdFilter>();
        assert!(filter.is_any());
        assert!(filter.matches(None));
        assert!(filter.matches(Some(5)));
    }

    #[test]
    fn test_restricting_filter() {
        let filter = [1, 3].into_iter().collect::<IdFilter>();
        assert!(filter.matches(Some(3)));
        assert!(!filter.matches(Some(2)));
        assert!(!filter.matches(None));
        assert_eq!(filter.ids(), vec![1, 3]);
    }
}
