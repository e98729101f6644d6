use std::collections::BTreeMap;

use thiserror::Error;

use crate::cell::strip_equals;
use crate::{Cell, CellContent, CellRef, CellValue, Range, Table};

pub type WorksheetId = u32;

/// Longest worksheet name Excel accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetNameError {
    #[error("sheet name is blank")]
    Blank,
    #[error("sheet name is longer than {MAX_SHEET_NAME_LEN} characters")]
    TooLong,
    #[error("sheet name cannot contain `{0}`")]
    BadChar(char),
    #[error("sheet name cannot start or end with `'`")]
    EdgeApostrophe,
}

pub fn validate_sheet_name(name: &str) -> Result<(), SheetNameError> {
    if name.trim().is_empty() {
        return Err(SheetNameError::Blank);
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(SheetNameError::TooLong);
    }
    if let Some(bad) = name.chars().find(|c| ":\\/?*[]".contains(*c)) {
        return Err(SheetNameError::BadChar(bad));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(SheetNameError::EdgeApostrophe);
    }
    Ok(())
}

/// One worksheet: sparse cells in row-major order, its tables and any
/// explicit column widths.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub id: WorksheetId,
    pub name: String,
    cells: BTreeMap<CellRef, Cell>,
    pub tables: Vec<Table>,
    /// Widths in character units, keyed by zero-based column.
    pub col_widths: BTreeMap<u32, f64>,
}

impl Worksheet {
    pub fn new(id: WorksheetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cells: BTreeMap::new(),
            tables: Vec::new(),
            col_widths: BTreeMap::new(),
        }
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.cells.get(&at)
    }

    /// Literal value at `at`; formula and missing cells read as empty.
    pub fn value(&self, at: CellRef) -> CellValue {
        self.cell(at).map(|c| c.literal().clone()).unwrap_or_default()
    }

    pub fn formula(&self, at: CellRef) -> Option<&str> {
        self.cell(at).and_then(Cell::formula_text)
    }

    fn put(&mut self, at: CellRef, content: CellContent) {
        let cell = self.cells.entry(at).or_default();
        cell.content = content;
        if cell.is_blank() {
            self.cells.remove(&at);
        }
    }

    /// Write a literal, keeping the cell's style.
    pub fn set_value(&mut self, at: CellRef, value: impl Into<CellValue>) {
        self.put(at, CellContent::Value(value.into()));
    }

    /// Write a formula, keeping the cell's style. A leading `=` is dropped.
    pub fn set_formula(&mut self, at: CellRef, text: &str) {
        self.put(at, CellContent::Formula(strip_equals(text).to_string()));
    }

    pub fn set_style_id(&mut self, at: CellRef, style_id: u32) {
        let cell = self.cells.entry(at).or_default();
        cell.style_id = style_id;
        if cell.is_blank() {
            self.cells.remove(&at);
        }
    }

    pub fn set_col_width(&mut self, col: u32, width: f64) {
        self.col_widths.insert(col, width);
    }

    /// Populated cells, row by row.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.cells.iter().map(|(at, cell)| (*at, cell))
    }

    /// Smallest range covering every cell and table, for `<dimension>`.
    pub fn used_range(&self) -> Option<Range> {
        let corners = self
            .cells
            .keys()
            .copied()
            .chain(self.tables.iter().flat_map(|t| [t.range.start, t.range.end]));
        corners.fold(None, |acc: Option<Range>, at| {
            Some(match acc {
                None => Range::new(at, at),
                Some(r) => Range::new(
                    CellRef::new(r.start.row.min(at.row), r.start.col.min(at.col)),
                    CellRef::new(r.end.row.max(at.row), r.end.col.max(at.col)),
                ),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sheet_name_rules() {
        assert!(validate_sheet_name("Pro-Rata Allocations").is_ok());
        assert!(validate_sheet_name("Cap Table Progression").is_ok());
        assert_eq!(validate_sheet_name(" "), Err(SheetNameError::Blank));
        assert_eq!(validate_sheet_name("Q1/Q2"), Err(SheetNameError::BadChar('/')));
        assert_eq!(validate_sheet_name("'quoted"), Err(SheetNameError::EdgeApostrophe));
        assert_eq!(validate_sheet_name(&"x".repeat(32)), Err(SheetNameError::TooLong));
    }

    #[test]
    fn formulas_replace_values_and_keep_styles() {
        let mut sheet = Worksheet::new(1, "Summary");
        let b2 = CellRef::new(1, 1);
        sheet.set_style_id(b2, 3);
        sheet.set_value(b2, 42.0);
        sheet.set_formula(b2, "=SUM(tblLedger[Shares])");

        assert_eq!(sheet.formula(b2), Some("SUM(tblLedger[Shares])"));
        assert_eq!(sheet.value(b2), CellValue::Empty);
        assert_eq!(sheet.cell(b2).map(|c| c.style_id), Some(3));
    }

    #[test]
    fn cells_iterate_row_major() {
        let mut sheet = Worksheet::new(1, "Ledger");
        sheet.set_value(CellRef::new(2, 0), "c");
        sheet.set_value(CellRef::new(0, 5), "a");
        sheet.set_value(CellRef::new(0, 1), "b");
        let order: Vec<String> = sheet.iter_cells().map(|(at, _)| at.to_a1()).collect();
        assert_eq!(order, vec!["B1", "F1", "A3"]);
        assert_eq!(sheet.used_range().map(|r| r.to_string()).as_deref(), Some("A1:F3"));

        sheet.set_value(CellRef::new(2, 0), CellValue::Empty);
        assert!(sheet.cell(CellRef::new(2, 0)).is_none());
        assert_eq!(sheet.used_range().map(|r| r.to_string()).as_deref(), Some("B1:F1"));
    }
}
