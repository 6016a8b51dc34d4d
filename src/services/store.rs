use parking_lot::RwLock;
use polars::frame::DataFrame;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use crate::error::AppError;

/// A parsed table plus the metadata returned to clients.
#[derive(Debug)]
pub struct StoredTable {
    pub dataframe: DataFrame,
    pub filename: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

impl StoredTable {
    pub fn new(dataframe: DataFrame, filename: impl Into<String>) -> Self {
        let columns = dataframe
            .get_column_names()
            .iter()
            .map(|&s| s.to_string())
            .collect();
        Self {
            rows: dataframe.height(),
            dataframe,
            filename: filename.into(),
            columns,
        }
    }
}

/// Process-lifetime map from table id to table. Entries are immutable once
/// inserted, so readers only ever clone the `Arc`.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: RwLock<HashMap<String, Arc<StoredTable>>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: StoredTable) -> String {
        let file_id = Uuid::new_v4().to_string();
        debug!(
            "Storing table {} ({} rows x {} columns) as {}",
            table.filename,
            table.rows,
            table.columns.len(),
            file_id
        );
        self.tables.write().insert(file_id.clone(), Arc::new(table));
        file_id
    }

    pub fn get(&self, file_id: &str) -> Result<Arc<StoredTable>, AppError> {
        self.tables
            .read()
            .get(file_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut tables = self.tables.write();
        info!("Releasing {} stored tables", tables.len());
        tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn table(name: &str) -> StoredTable {
        let df = DataFrame::new(vec![Series::new("x", vec![1.0, 2.0, 3.0])]).unwrap();
        StoredTable::new(df, name)
    }

    #[test]
    fn insert_assigns_distinct_ids() {
        let store = TableStore::new();
        let a = store.insert(table("a.csv"));
        let b = store.insert(table("b.csv"));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a).unwrap().filename, "a.csv");
        assert_eq!(store.get(&b).unwrap().rows, 3);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = TableStore::new();
        let err = store.get("missing").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(err.message(), "File missing not found");
    }

    #[test]
    fn clear_drops_everything() {
        let store = TableStore::new();
        let id = store.insert(table("a.csv"));
        let held = store.get(&id).unwrap();
        store.clear();
        assert!(store.is_empty());
        // Outstanding readers keep their snapshot.
        assert_eq!(held.columns, vec!["x".to_string()]);
    }
}
