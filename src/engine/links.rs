use dashmap::DashMap;

use crate::key::CellKey;
use crate::key::TableRef;

/// Raw text of link columns (singular relation columns on root tables and
/// one-to-many linking columns on child tables), keyed by row.
///
/// Updated before any handler runs so handlers observe resolved relations.
#[derive(Debug, Default)]
pub(crate) struct LinkTracker {
    links: DashMap<CellKey, String>,
}

impl LinkTracker {
    pub(crate) fn get(
        &self,
        key: &CellKey,
    ) -> Option<String> {
        self.links.get(key).map(|v| v.value().clone())
    }

    /// Returns the previous text.
    pub(crate) fn set(
        &self,
        key: CellKey,
        text: Option<&str>,
    ) -> Option<String> {
        match text {
            Some(text) => self.links.insert(key, text.to_string()),
            None => self.links.remove(&key).map(|(_, v)| v),
        }
    }

    pub(crate) fn remove_row(
        &self,
        table: &TableRef,
        id_column: &str,
        id: &str,
    ) {
        self.links.retain(|key, _| {
            !(&key.table == table && key.id_column == id_column && key.root_id == id)
        });
    }
}
