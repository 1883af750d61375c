use std::path::PathBuf;

use anyhow::Result;

use crate::utils::dir::{application_default_path, ensure_dir};

pub const DEFAULT_DB_NAME: &str = "timeflow.json";

/// Where the application keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub dir: PathBuf,
    pub db_name: String,
}

impl AppConfig {
    /// Falls back to [application_default_path] and creates the directory if needed.
    pub fn resolve(dir: Option<PathBuf>, db_name: Option<String>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir,
            None => application_default_path()?,
        };
        Ok(Self {
            dir: ensure_dir(dir)?,
            db_name: db_name.unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join(&self.db_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_resolve_explicit_dir() -> Result<()> {
        let dir = tempdir()?;
        let app_dir = dir.path().join("nested").join("timeflow");
        let config = AppConfig::resolve(Some(app_dir.clone()), None)?;

        assert!(app_dir.is_dir());
        assert_eq!(config.store_path(), app_dir.join("timeflow.json"));
        assert_eq!(config.log_dir(), app_dir.join("logs"));

        let custom = AppConfig::resolve(Some(app_dir.clone()), Some("work.json".into()))?;
        assert_eq!(custom.store_path(), app_dir.join("work.json"));
        Ok(())
    }
}
