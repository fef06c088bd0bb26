use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::DashSet;
use tracing::debug;

use super::table_trigger_ddl;
use super::trigger_function_ddl;
use crate::config::ListenerConfig;
use crate::key::TableRef;
use crate::store::RelationalStore;
use crate::Result;
use crate::SchemaError;

/// Column lists fetched once per table, plus the set of tables whose change
/// trigger this process already ensured.
#[derive(Debug, Default)]
pub struct SchemaCache {
    columns: DashMap<TableRef, Arc<Vec<String>>>,
    triggered: DashSet<TableRef>,
    function_installed: AtomicBool,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn columns(
        &self,
        store: &dyn RelationalStore,
        table: &TableRef,
    ) -> Result<Arc<Vec<String>>> {
        if let Some(cols) = self.columns.get(table) {
            return Ok(cols.clone());
        }
        let cols = store.table_columns(table).await?;
        if cols.is_empty() {
            return Err(SchemaError::UnknownTable(table.to_string()).into());
        }
        debug!(%table, count = cols.len(), "cached table columns");
        let cols = Arc::new(cols);
        self.columns.insert(table.clone(), cols.clone());
        Ok(cols)
    }

    /// Fails with `UnknownColumn` when `column` is not part of `table`.
    pub async fn require_column(
        &self,
        store: &dyn RelationalStore,
        table: &TableRef,
        column: &str,
    ) -> Result<()> {
        let cols = self.columns(store, table).await?;
        if cols.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(SchemaError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            }
            .into())
        }
    }

    /// Drops the cached column list so the next lookup refetches it.
    pub fn invalidate(
        &self,
        table: &TableRef,
    ) {
        if self.columns.remove(table).is_some() {
            debug!(%table, "schema cache invalidated");
        }
    }

    /// Installs the change trigger on first reference to `table`.
    pub async fn ensure_trigger(
        &self,
        store: &dyn RelationalStore,
        config: &ListenerConfig,
        table: &TableRef,
    ) -> Result<()> {
        if self.triggered.contains(table) {
            return Ok(());
        }
        if !self.function_installed.load(Ordering::Acquire) {
            store.apply_ddl(&trigger_function_ddl(config)).await?;
            self.function_installed.store(true, Ordering::Release);
        }
        store.apply_ddl(&table_trigger_ddl(config, table)).await?;
        self.triggered.insert(table.clone());
        debug!(%table, "change trigger installed");
        Ok(())
    }

    pub fn has_trigger(
        &self,
        table: &TableRef,
    ) -> bool {
        self.triggered.contains(table)
    }
}
