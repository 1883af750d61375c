pub mod csv;
pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    model::entities::{ExportData, TableCounts},
    storage::Store,
};

/// Writes every table of the store as pretty JSON.
pub async fn export_to_file(store: &dyn Store, path: &Path) -> Result<TableCounts> {
    let data = store.export_all().await?;
    let counts = data.row_counts();
    let json = serde_json::to_string_pretty(&data)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write export to {path:?}"))?;
    info!("Exported {counts:?} to {path:?}");
    Ok(counts)
}

/// Replaces everything in the store with the content of `path`. Tables missing from the file end
/// up empty.
pub async fn import_from_file(store: &dyn Store, path: &Path) -> Result<TableCounts> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read import from {path:?}"))?;
    let data: ExportData =
        serde_json::from_str(&json).with_context(|| format!("{path:?} is not a valid export"))?;
    Ok(store.import_all(data).await?)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::storage::{local::LocalStore, ClientRepository, TagRepository};

    #[tokio::test]
    async fn test_file_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("export.json");

        let source = LocalStore::in_memory();
        source.create_client("Acme").await?;
        source.create_tag("design").await?;
        let exported = export_to_file(&source, &path).await?;

        let target = LocalStore::in_memory();
        let imported = import_from_file(&target, &path).await?;
        assert_eq!(exported, imported);
        assert_eq!(target.clients(true).await?[0].name, "Acme");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_file_changes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("export.json");
        tokio::fs::write(&path, "not json").await?;

        let store = LocalStore::in_memory();
        store.create_tag("kept").await?;
        assert!(import_from_file(&store, &path).await.is_err());
        assert_eq!(store.tags().await?.len(), 1);
        Ok(())
    }
}
