//! Tabular storage addressed by table name and A1-style range.
//!
//! [`SheetStore`] is the seam between the gateway and the spreadsheet: the
//! Google client talks to the real service, [`memory::MemoryStore`] keeps the
//! same semantics in process.

use std::fmt;
#[cfg(test)]
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

pub mod auth;
pub mod google;
pub mod memory;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table `{0}` does not exist")]
    UnknownTable(String),
    #[error("no table with id {0}")]
    UnknownTableId(i64),
    #[error("invalid range `{0}`")]
    InvalidRange(String),
    #[error("spreadsheet API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("spreadsheet API request failed")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub id: i64,
    pub title: String,
}

#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Values inside `range`. Trailing empty cells and rows are omitted.
    async fn get_range(&self, range: &A1Range) -> StoreResult<Vec<Vec<String>>>;

    /// Inserts `row` after the last row with data inside `range`.
    async fn append_row(&self, range: &A1Range, row: Vec<String>) -> StoreResult<()>;

    /// Writes `rows` starting at the top-left cell of `range`.
    async fn update_range(&self, range: &A1Range, rows: Vec<Vec<String>>) -> StoreResult<()>;

    async fn list_tables(&self) -> StoreResult<Vec<TableInfo>>;

    /// Deletes rows `start_index..end_index` (zero-based) of a table,
    /// shifting the rows below up.
    async fn delete_rows(&self, table_id: i64, start_index: u32, end_index: u32)
        -> StoreResult<()>;
}

/// A cell corner of a range. `row` is 1-based; `None` means the whole column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub column: u32,
    pub row: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub table: String,
    pub start: CellRef,
    pub end: CellRef,
}

impl A1Range {
    /// Whole columns `first..=last`, e.g. `Sheet!A:I`.
    pub fn columns(table: &str, first: u32, last: u32) -> Self {
        A1Range {
            table: table.to_string(),
            start: CellRef { column: first, row: None },
            end: CellRef { column: last, row: None },
        }
    }

    /// One row across columns `first..=last`, e.g. `Sheet!A5:I5`.
    pub fn row(table: &str, row: u32, first: u32, last: u32) -> Self {
        A1Range {
            table: table.to_string(),
            start: CellRef { column: first, row: Some(row) },
            end: CellRef { column: last, row: Some(row) },
        }
    }

    pub fn width(&self) -> usize {
        (self.end.column - self.start.column + 1) as usize
    }
}

/// `A` -> 0, `Z` -> 25, `AA` -> 26.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
    .map(|n| n - 1)
}

pub fn column_letters(index: u32) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn needs_quotes(title: &str) -> bool {
    !title
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", column_letters(self.column))?;
        if let Some(row) = self.row {
            write!(f, "{}", row)?;
        }
        Ok(())
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if needs_quotes(&self.table) {
            write!(f, "'{}'", self.table.replace('\'', "''"))?;
        } else {
            write!(f, "{}", self.table)?;
        }
        write!(f, "!{}:{}", self.start, self.end)
    }
}

#[cfg(test)]
impl FromStr for CellRef {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        let split = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        let (letters, digits) = s.split_at(split);
        let column = column_index(letters).ok_or_else(|| StoreError::InvalidRange(s.to_string()))?;
        let row = match digits {
            "" => None,
            digits => match digits.parse::<u32>() {
                Ok(row) if row > 0 => Some(row),
                _ => return Err(StoreError::InvalidRange(s.to_string())),
            },
        };
        Ok(CellRef { column, row })
    }
}

#[cfg(test)]
impl FromStr for A1Range {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        let invalid = || StoreError::InvalidRange(s.to_string());

        let (table, cells) = s.rsplit_once('!').ok_or_else(invalid)?;
        let table = match table.strip_prefix('\'') {
            Some(quoted) => quoted.strip_suffix('\'').ok_or_else(invalid)?.replace("''", "'"),
            None => table.to_string(),
        };
        if table.is_empty() {
            return Err(invalid());
        }

        let (start, end) = cells.split_once(':').unwrap_or((cells, cells));
        let start: CellRef = start.parse()?;
        let end: CellRef = end.parse()?;
        if end.column < start.column || start.row.is_some() != end.row.is_some() {
            return Err(invalid());
        }

        Ok(A1Range { table, start, end })
    }
}

/// Text of a cell as returned by the API; `null` is an empty cell.
pub(crate) fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("i"), Some(8));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(27), "AB");
    }

    #[test]
    fn test_format_ranges() {
        assert_eq!(A1Range::columns("Activity-7", 0, 8).to_string(), "Activity-7!A:I");
        assert_eq!(A1Range::row("Activity-7", 5, 0, 8).to_string(), "Activity-7!A5:I5");
        assert_eq!(A1Range::columns("Crew list", 0, 1).to_string(), "'Crew list'!A:B");
        assert_eq!(A1Range::columns("Bob's", 0, 0).to_string(), "'Bob''s'!A:A");
    }

    #[test]
    fn test_parse_ranges() {
        let range: A1Range = "Activity-7!A5:I5".parse().unwrap();
        assert_eq!(range, A1Range::row("Activity-7", 5, 0, 8));
        assert_eq!(range.width(), 9);

        let quoted: A1Range = "'Bob''s'!A:B".parse().unwrap();
        assert_eq!(quoted.table, "Bob's");
        assert_eq!(quoted.start.row, None);

        let single: A1Range = "Sheet!C3".parse().unwrap();
        assert_eq!(single.start, single.end);
    }

    #[test]
    fn test_reject_bad_ranges() {
        for bad in ["A:I", "!A:I", "Sheet!I:A", "Sheet!A0:B0", "Sheet!A1:B", "'Sheet!A:B", "Sheet!1:2"] {
            assert!(bad.parse::<A1Range>().is_err(), "{} should not parse", bad);
        }
    }
}
