use std::{collections::BTreeMap, sync::Arc};

use tracing::{info, warn};

use crate::{
    model::entities::EntityId,
    storage::{Store, StoreResult},
};

pub const DEFAULT_PROJECT_ID: &str = "default_project_id";
pub const DEFAULT_BILLABLE: &str = "default_billable";
pub const TIMEZONE: &str = "timezone";
pub const WORKING_HOURS_PER_DAY: &str = "working_hours_per_day";

/// Values used for keys that were never stored.
pub const DEFAULTS: [(&str, &str); 4] = [
    (DEFAULT_PROJECT_ID, ""),
    (DEFAULT_BILLABLE, "false"),
    (TIMEZONE, "Europe/Prague"),
    (WORKING_HOURS_PER_DAY, "8.0"),
];

const FALLBACK_WORKING_HOURS: f64 = 8.;

pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Key to string settings with defaults on top of [crate::storage::SettingRepository].
pub struct Settings {
    store: Arc<dyn Store>,
}

impl Settings {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stored value, else the default, else `None`.
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .store
            .setting(key)
            .await?
            .or_else(|| default_value(key).map(str::to_string)))
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.store.set_setting(key, value).await?;
        info!("Setting {key} set to {value:?}");
        Ok(())
    }

    /// Defaults overlaid with everything stored.
    pub async fn all(&self) -> StoreResult<BTreeMap<String, String>> {
        let mut all = DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        for setting in self.store.settings().await? {
            all.insert(setting.key, setting.value);
        }
        Ok(all)
    }

    /// Drops the stored value, [Self::get] falls back to the default afterwards.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.store.delete_setting(key).await
    }

    /// Unparsable or non-positive values fall back to 8 hours.
    pub async fn working_hours(&self) -> StoreResult<f64> {
        let value = self.get(WORKING_HOURS_PER_DAY).await?;
        Ok(
            match value.as_deref().map(str::trim).map(str::parse::<f64>) {
                Some(Ok(hours)) if hours.is_finite() && hours > 0. => hours,
                Some(_) => {
                    warn!("Ignoring invalid {WORKING_HOURS_PER_DAY} {value:?}");
                    FALLBACK_WORKING_HOURS
                }
                None => FALLBACK_WORKING_HOURS,
            },
        )
    }

    pub async fn default_billable(&self) -> StoreResult<bool> {
        Ok(matches!(
            self.get(DEFAULT_BILLABLE).await?.as_deref().map(str::trim),
            Some("true" | "1" | "yes")
        ))
    }

    pub async fn default_project_id(&self) -> StoreResult<Option<EntityId>> {
        Ok(self
            .get(DEFAULT_PROJECT_ID)
            .await?
            .and_then(|v| v.trim().parse().ok()))
    }
}
