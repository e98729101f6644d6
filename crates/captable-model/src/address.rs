use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::names::looks_like_cell_reference;

/// Rows per worksheet.
const MAX_ROWS: u32 = 1_048_576;
/// Columns per worksheet (`XFD`).
const MAX_COLS: u32 = 16_384;

/// Zero-based cell coordinate. Ordering is row-major, which is the order
/// cells are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// `B4` for row 3, column 1.
    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), self.row + 1)
    }

    /// `$B$4`.
    pub fn to_a1_absolute(self) -> String {
        format!("${}${}", col_to_name(self.col), self.row + 1)
    }

    /// Parse `B4` or `$B$4`.
    pub fn from_a1(text: &str) -> Result<Self, A1ParseError> {
        let invalid = || A1ParseError(text.to_string());
        let body = text.strip_prefix('$').unwrap_or(text);
        let letters = body.bytes().take_while(u8::is_ascii_alphabetic).count();
        if letters == 0 || letters > 3 {
            return Err(invalid());
        }
        let (col_part, row_part) = body.split_at(letters);
        let row_part = row_part.strip_prefix('$').unwrap_or(row_part);
        if row_part.is_empty() || !row_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let col = col_part
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A') + 1);
        let row: u32 = row_part.parse().map_err(|_| invalid())?;
        if row == 0 || row > MAX_ROWS || col > MAX_COLS {
            return Err(invalid());
        }
        Ok(CellRef::new(row - 1, col - 1))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not an A1 cell reference")]
pub struct A1ParseError(String);

/// Rectangular block of cells, corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    /// The corners may be given in any order.
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// `$A$2:$A$9`.
    pub fn to_a1_absolute(&self) -> String {
        format!("{}:{}", self.start.to_a1_absolute(), self.end.to_a1_absolute())
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Sheet name as it must appear before `!` in a formula. Names that are not
/// plain identifiers are wrapped in single quotes with inner quotes doubled.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !looks_like_cell_reference(name);
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Column letters for a zero-based index: `0` is `A`, `27` is `AB`.
pub fn col_to_name(col: u32) -> String {
    let mut name = String::new();
    let mut n = col + 1;
    while n > 0 {
        n -= 1;
        name.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn column_letters() {
        assert_eq!(col_to_name(0), "A");
        assert_eq!(col_to_name(25), "Z");
        assert_eq!(col_to_name(26), "AA");
        assert_eq!(col_to_name(701), "ZZ");
        assert_eq!(col_to_name(MAX_COLS - 1), "XFD");
    }

    #[test]
    fn parses_relative_and_absolute_cells() {
        assert_eq!(CellRef::from_a1("B4").unwrap(), CellRef::new(3, 1));
        assert_eq!(CellRef::from_a1("$B$8").unwrap(), CellRef::new(7, 1));
        assert_eq!(CellRef::from_a1("xfd1").unwrap(), CellRef::new(0, MAX_COLS - 1));
        assert_eq!(CellRef::new(12, 27).to_a1(), "AB13");
        for bad in ["", "B", "4", "B0", "XFE1", "ABCD1", "B4:C5", "B$"] {
            assert!(CellRef::from_a1(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn ranges_render_and_intersect() {
        let table = Range::new(CellRef::new(9, 2), CellRef::new(2, 0));
        assert_eq!(table.to_string(), "A3:C10");
        assert_eq!(table.to_a1_absolute(), "$A$3:$C$10");
        assert_eq!(Range::new(CellRef::new(0, 0), CellRef::new(0, 0)).to_string(), "A1");

        let below = Range::new(CellRef::new(10, 0), CellRef::new(12, 3));
        let touching = Range::new(CellRef::new(9, 2), CellRef::new(9, 5));
        assert!(!table.intersects(&below));
        assert!(table.intersects(&touching));
    }

    #[test]
    fn sheet_names_are_quoted_when_needed() {
        assert_eq!(quote_sheet_name("Rounds"), "Rounds");
        assert_eq!(quote_sheet_name("Cap Table Progression"), "'Cap Table Progression'");
        assert_eq!(quote_sheet_name("Pro-Rata Allocations"), "'Pro-Rata Allocations'");
        assert_eq!(quote_sheet_name("Founder's"), "'Founder''s'");
        assert_eq!(quote_sheet_name("Q1"), "'Q1'");
        assert_eq!(quote_sheet_name("2024"), "'2024'");
    }
}
