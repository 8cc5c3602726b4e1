//! A spreadsheet held in process, for tests and local runs.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;

use super::{cell_text, A1Range, SheetStore, StoreError, StoreResult, TableInfo};

/// Tables never grow past this many rows.
pub const MAX_ROWS: usize = 1_000_000;

#[derive(Debug, Default)]
struct MemoryTable {
    id: i64,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<IndexMap<String, MemoryTable>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `{ "<table title>": [[cell, ...], ...] }`.
    pub fn from_json(json: &str) -> Result<Self> {
        let seed: IndexMap<String, Vec<Vec<serde_json::Value>>> =
            serde_json::from_str(json).context("Seed must map table titles to rows")?;

        let store = MemoryStore::new();
        for (title, rows) in seed {
            let rows = rows
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect();
            store.add_table(&title, rows);
        }
        Ok(store)
    }

    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Adds or replaces a table, returning its id.
    pub fn add_table(&self, title: &str, rows: Vec<Vec<String>>) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .insert(title.to_string(), MemoryTable { id, rows });
        id
    }

    /// Raw grid of a table, blank cells included.
    pub fn rows(&self, title: &str) -> Option<Vec<Vec<String>>> {
        self.lock().get(title).map(|table| table.rows.clone())
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, MemoryTable>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn has_data(row: &[String], range: &A1Range) -> bool {
    row.iter()
        .skip(range.start.column as usize)
        .take(range.width())
        .any(|cell| !cell.is_empty())
}

fn write_cells(row: &mut Vec<String>, column: usize, values: Vec<String>) {
    if row.len() < column + values.len() {
        row.resize(column + values.len(), String::new());
    }
    for (offset, value) in values.into_iter().enumerate() {
        row[column + offset] = value;
    }
}

#[async_trait]
impl SheetStore for MemoryStore {
    async fn get_range(&self, range: &A1Range) -> StoreResult<Vec<Vec<String>>> {
        let tables = self.lock();
        let table = tables
            .get(&range.table)
            .ok_or_else(|| StoreError::UnknownTable(range.table.clone()))?;

        let first_row = range.start.row.map_or(0, |row| (row as usize).saturating_sub(1));
        let last_row = range.end.row.map_or(table.rows.len(), |row| row as usize);

        let mut rows: Vec<Vec<String>> = table
            .rows
            .iter()
            .take(last_row)
            .skip(first_row)
            .map(|row| {
                let mut cells: Vec<String> = row
                    .iter()
                    .skip(range.start.column as usize)
                    .take(range.width())
                    .cloned()
                    .collect();
                while cells.last().map_or(false, |cell| cell.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while rows.last().map_or(false, |row| row.is_empty()) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn append_row(&self, range: &A1Range, row: Vec<String>) -> StoreResult<()> {
        let mut tables = self.lock();
        let table = tables
            .get_mut(&range.table)
            .ok_or_else(|| StoreError::UnknownTable(range.table.clone()))?;

        let after_data = table
            .rows
            .iter()
            .rposition(|existing| has_data(existing, range))
            .map_or(0, |index| index + 1);
        let index = after_data.max(range.start.row.map_or(0, |row| (row as usize).saturating_sub(1)));
        if index >= MAX_ROWS {
            return Err(StoreError::InvalidRange(range.to_string()));
        }

        if table.rows.len() < index {
            table.rows.resize(index, Vec::new());
        }
        let mut new_row = Vec::new();
        write_cells(&mut new_row, range.start.column as usize, row);
        table.rows.insert(index, new_row);
        Ok(())
    }

    async fn update_range(&self, range: &A1Range, rows: Vec<Vec<String>>) -> StoreResult<()> {
        let first_row = range
            .start
            .row
            .filter(|row| *row > 0)
            .ok_or_else(|| StoreError::InvalidRange(range.to_string()))? as usize
            - 1;
        if first_row + rows.len() > MAX_ROWS {
            return Err(StoreError::InvalidRange(range.to_string()));
        }

        let mut tables = self.lock();
        let table = tables
            .get_mut(&range.table)
            .ok_or_else(|| StoreError::UnknownTable(range.table.clone()))?;

        if table.rows.len() < first_row + rows.len() {
            table.rows.resize(first_row + rows.len(), Vec::new());
        }
        for (offset, values) in rows.into_iter().enumerate() {
            write_cells(
                &mut table.rows[first_row + offset],
                range.start.column as usize,
                values,
            );
        }
        Ok(())
    }

    async fn list_tables(&self) -> StoreResult<Vec<TableInfo>> {
        Ok(self
            .lock()
            .iter()
            .map(|(title, table)| TableInfo {
                id: table.id,
                title: title.clone(),
            })
            .collect())
    }

    async fn delete_rows(&self, table_id: i64, start_index: u32, end_index: u32) -> StoreResult<()> {
        let mut tables = self.lock();
        let table = tables
            .values_mut()
            .find(|table| table.id == table_id)
            .ok_or(StoreError::UnknownTableId(table_id))?;

        let end = (end_index as usize).min(table.rows.len());
        let start = start_index as usize;
        if start < end {
            table.rows.drain(start..end);
        }
        Ok(())
    }
}

/// Builds a grid from string slices.
#[cfg(test)]
pub(crate) fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}
