//! Workbook model for generated cap tables.
//!
//! Holds what the generator writes and the XLSX writer serializes: sheets of
//! literals and formulas, workbook-scoped defined names, tables and a small
//! interned style table.

mod address;
mod cell;
mod names;
mod style;
mod table;
mod workbook;
mod worksheet;

pub use address::{quote_sheet_name, A1ParseError, CellRef, Range};
pub use cell::{Cell, CellContent, CellValue};
pub use names::{looks_like_cell_reference, validate_defined_name, DefinedName, DefinedNameError};
pub use style::{Style, StyleTable};
pub use table::{validate_table_name, Table, TableColumn, TableError};
pub use workbook::{Workbook, WorkbookError};
pub use worksheet::{SheetNameError, Worksheet, WorksheetId};
