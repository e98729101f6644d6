//! XLSX export for [`captable_model::Workbook`].
//!
//! The writer emits a minimal but complete SpreadsheetML package: workbook
//! with defined names and `calcPr`, one part per worksheet, table parts,
//! shared strings and a generated `styles.xml`. Formula cells are written
//! without cached values.

mod styles;
mod tables;
mod writer;

#[cfg(not(target_arch = "wasm32"))]
pub use writer::write_workbook;
pub use writer::{write_workbook_to_vec, write_workbook_to_writer, XlsxWriteError};
