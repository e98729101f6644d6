use thiserror::Error;

use crate::names::looks_like_cell_reference;
use crate::{CellRef, Range};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table name is empty")]
    EmptyName,
    #[error("table name is longer than 255 characters")]
    NameTooLong,
    #[error("table name cannot start with `{0}`")]
    BadStart(char),
    #[error("table name cannot contain `{0}`")]
    BadChar(char),
    #[error("table name is reserved or reads as a cell reference")]
    Reserved,
    #[error("table has no columns")]
    NoColumns,
    #[error("column `{0}` appears twice")]
    DuplicateColumn(String),
}

/// Excel table names: an ASCII letter or `_`, then ASCII letters, digits,
/// `_` and `.`. `TRUE`, `FALSE` and cell-reference lookalikes are refused.
pub fn validate_table_name(name: &str) -> Result<(), TableError> {
    let mut chars = name.chars();
    let first = chars.next().ok_or(TableError::EmptyName)?;
    if name.chars().count() > 255 {
        return Err(TableError::NameTooLong);
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(TableError::BadStart(first));
    }
    if let Some(bad) = chars.find(|&c| !(c.is_ascii_alphanumeric() || c == '_' || c == '.')) {
        return Err(TableError::BadChar(bad));
    }
    if name.eq_ignore_ascii_case("TRUE")
        || name.eq_ignore_ascii_case("FALSE")
        || looks_like_cell_reference(name)
    {
        return Err(TableError::Reserved);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Set when every data row holds this same formula.
    pub calculated_formula: Option<String>,
}

/// A banded table with a header row and an autofilter over its whole range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Part number, assigned by the workbook.
    pub id: u32,
    pub name: String,
    /// Header row included.
    pub range: Range,
    pub columns: Vec<TableColumn>,
    pub style_name: String,
}

impl Table {
    /// A table with its header row at `origin` and `data_rows` rows below it
    /// (at least one).
    pub fn new(
        name: &str,
        origin: CellRef,
        headers: &[String],
        data_rows: u32,
        style_name: &str,
    ) -> Result<Self, TableError> {
        validate_table_name(name)?;
        if headers.is_empty() {
            return Err(TableError::NoColumns);
        }
        for (idx, header) in headers.iter().enumerate() {
            if headers[..idx].iter().any(|h| h.eq_ignore_ascii_case(header)) {
                return Err(TableError::DuplicateColumn(header.clone()));
            }
        }
        let end = CellRef::new(
            origin.row + data_rows.max(1),
            origin.col + headers.len() as u32 - 1,
        );
        Ok(Self {
            id: 0,
            name: name.to_string(),
            range: Range::new(origin, end),
            columns: headers
                .iter()
                .map(|header| TableColumn {
                    name: header.clone(),
                    calculated_formula: None,
                })
                .collect(),
            style_name: style_name.to_string(),
        })
    }

    /// Zero-based offset of `column` from the first column.
    pub fn column_index(&self, column: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .map(|p| p as u32)
    }

    /// Data cells of the column at `index`, header excluded.
    pub fn column_cells(&self, index: u32) -> impl Iterator<Item = CellRef> + '_ {
        let col = self.range.start.col + index;
        (self.range.start.row + 1..=self.range.end.row).map(move |row| CellRef::new(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_name_rules() {
        assert!(validate_table_name("tblRound_Series_A").is_ok());
        assert!(validate_table_name("_tblLedger.v2").is_ok());
        assert_eq!(validate_table_name(""), Err(TableError::EmptyName));
        assert_eq!(validate_table_name("1tbl"), Err(TableError::BadStart('1')));
        assert_eq!(validate_table_name("tbl Round"), Err(TableError::BadChar(' ')));
        assert_eq!(validate_table_name("true"), Err(TableError::Reserved));
        assert_eq!(validate_table_name("AB1"), Err(TableError::Reserved));
    }

    #[test]
    fn geometry_follows_headers_and_rows() {
        let table = Table::new(
            "tblLedger",
            CellRef::new(2, 1),
            &headers(&["ID", "Holder", "Shares"]),
            4,
            "TableStyleMedium2",
        )
        .unwrap();
        assert_eq!(table.range.to_string(), "B3:D7");
        assert_eq!(table.column_index("shares"), Some(2));
        let cells: Vec<String> = table.column_cells(2).map(CellRef::to_a1).collect();
        assert_eq!(cells, vec!["D4", "D5", "D6", "D7"]);

        let empty = Table::new("tblEmpty", CellRef::new(0, 0), &headers(&["X"]), 0, "")
            .unwrap();
        assert_eq!(empty.range.to_string(), "A1:A2");
    }

    #[test]
    fn rejects_bad_columns() {
        let origin = CellRef::new(0, 0);
        assert_eq!(
            Table::new("tblX", origin, &[], 1, ""),
            Err(TableError::NoColumns)
        );
        assert_eq!(
            Table::new("tblX", origin, &headers(&["Shares", "SHARES"]), 1, ""),
            Err(TableError::DuplicateColumn("SHARES".to_string()))
        );
    }
}
