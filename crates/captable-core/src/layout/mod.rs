//! Deterministic layout map.
//!
//! During the first generation phase every sheet registers where each of its
//! values will live: defined names, table columns and plain cells, all keyed
//! by a stable [`Identifier`]. After [`LayoutMap::seal`] the map is frozen
//! and formulas resolve identifiers into reference text in one of four
//! [`ReferenceStyle`]s.

mod sanitize;

use std::collections::BTreeMap;
use std::fmt;

use captable_model::{quote_sheet_name, validate_defined_name, validate_table_name, CellRef, Range};
use serde::Serialize;

use crate::GenerationError;

pub use sanitize::{sanitize_name, SlugRegistry};

/// Stable domain key for a value in the workbook, such as
/// `round[Series A].pps` or `ledger.column[Shares]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(raw: impl Into<String>) -> Self {
        Identifier(raw.into())
    }

    pub fn company(field: &str) -> Self {
        Identifier(format!("company.{field}"))
    }

    pub fn total(field: &str) -> Self {
        Identifier(format!("totals.{field}"))
    }

    pub fn round(round: &str, field: &str) -> Self {
        Identifier(format!("round[{round}].{field}"))
    }

    pub fn scenario(scenario: &str, field: &str) -> Self {
        Identifier(format!("scenario[{scenario}].{field}"))
    }

    /// A column of the table registered under `scope`.
    pub fn column(scope: &str, header: &str) -> Self {
        Identifier(format!("{scope}.column[{header}]"))
    }

    pub fn instrument(key: &str, field: &str) -> Self {
        Identifier(format!("instrument[{key}].{field}"))
    }

    /// One column of a round's instrument block on the Rounds sheet.
    pub fn round_section(round: &str, column: SectionColumn) -> Self {
        Identifier(format!("round[{round}].section.{column}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a resolved reference is spelled in formula text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ReferenceStyle {
    /// The defined name itself (`Seed_PPS`).
    Name,
    /// `'Sheet'!$B$4`, or the absolute data range of a table column.
    Absolute,
    /// Whole table column (`tblLedger[Shares]`).
    Structured,
    /// Same-row table cell (`tblLedger[[#This Row],[Shares]]`).
    ThisRow,
}

impl fmt::Display for ReferenceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceStyle::Name => "name",
            ReferenceStyle::Absolute => "absolute",
            ReferenceStyle::Structured => "structured",
            ReferenceStyle::ThisRow => "this-row",
        })
    }
}

/// The columns a round section exposes to later sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SectionColumn {
    Holder,
    Shares,
}

impl fmt::Display for SectionColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SectionColumn::Holder => "holder",
            SectionColumn::Shares => "shares",
        })
    }
}

/// What an identifier is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Binding {
    NamedRange { name: String },
    TableColumn { table: String, column: String },
    Cell { sheet: String, cell: CellRef },
    RoundSection { round: String, column: SectionColumn },
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::NamedRange { name } => write!(f, "name {name}"),
            Binding::TableColumn { table, column } => write!(f, "{table}[{column}]"),
            Binding::Cell { sheet, cell } => write!(f, "{}!{}", quote_sheet_name(sheet), cell),
            Binding::RoundSection { round, column } => write!(f, "section {round}.{column}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRangeEntry {
    pub name: String,
    pub sheet: String,
    pub cell: CellRef,
}

impl NamedRangeEntry {
    /// Defined-name target, e.g. `'Cap Table Progression'!$B$4`.
    pub fn refers_to(&self) -> String {
        format!("{}!{}", quote_sheet_name(&self.sheet), self.cell.to_a1_absolute())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    pub table_name: String,
    pub sheet: String,
    pub header_row: u32,
    pub first_col: u32,
    pub columns: Vec<String>,
    pub data_rows: u32,
}

impl TableEntry {
    pub fn origin(&self) -> CellRef {
        CellRef::new(self.header_row, self.first_col)
    }

    /// Data cells of `column`, header excluded.
    pub fn column_range(&self, column: &str) -> Option<Range> {
        let offset = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))? as u32;
        let col = self.first_col + offset;
        Some(Range::new(
            CellRef::new(self.header_row + 1, col),
            CellRef::new(self.header_row + self.data_rows, col),
        ))
    }
}

/// A round's instrument block: the data rows of its table on the Rounds
/// sheet, with the columns later sheets aggregate over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSectionEntry {
    pub round_name: String,
    /// First and last instrument row, inclusive.
    pub row_range: (u32, u32),
    pub holder_col: u32,
    pub shares_col: u32,
    pub table_name: String,
}

impl RoundSectionEntry {
    pub fn column(&self, column: SectionColumn) -> u32 {
        match column {
            SectionColumn::Holder => self.holder_col,
            SectionColumn::Shares => self.shares_col,
        }
    }

    /// Cells of `column` across the instrument rows.
    pub fn range(&self, column: SectionColumn) -> Range {
        let col = self.column(column);
        Range::new(
            CellRef::new(self.row_range.0, col),
            CellRef::new(self.row_range.1, col),
        )
    }
}

#[derive(Debug, Default)]
pub struct LayoutMap {
    bindings: BTreeMap<Identifier, Binding>,
    /// Keyed by upper-cased name.
    named_ranges: BTreeMap<String, NamedRangeEntry>,
    /// Keyed by upper-cased table name.
    tables: BTreeMap<String, TableEntry>,
    round_sections: BTreeMap<String, RoundSectionEntry>,
    sealed: bool,
}

impl LayoutMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// End registration. Resolution is only possible afterwards.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    fn ensure_open(&self, what: &str) -> Result<(), GenerationError> {
        if self.sealed {
            return Err(GenerationError::GenerationOrder(format!(
                "cannot register {what} after the layout is sealed"
            )));
        }
        Ok(())
    }

    fn bind(&mut self, identifier: Identifier, binding: Binding) -> Result<(), GenerationError> {
        match self.bindings.get(&identifier) {
            Some(existing) if *existing == binding => Ok(()),
            Some(existing) => Err(GenerationError::NameCollision {
                name: identifier.to_string(),
                existing: existing.to_string(),
                requested: binding.to_string(),
            }),
            None => {
                self.bindings.insert(identifier, binding);
                Ok(())
            }
        }
    }

    /// Register a workbook-scoped defined name pointing at one cell.
    ///
    /// Registering the same name for the same target again is a no-op.
    pub fn register_named_range(
        &mut self,
        identifier: Identifier,
        name: &str,
        sheet: &str,
        cell: CellRef,
    ) -> Result<(), GenerationError> {
        self.ensure_open("a named range")?;
        validate_defined_name(name).map_err(|e| GenerationError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let entry = NamedRangeEntry {
            name: name.to_string(),
            sheet: sheet.to_string(),
            cell,
        };
        let key = name.to_ascii_uppercase();
        if let Some(table) = self.tables.get(&key) {
            return Err(GenerationError::NameCollision {
                name: name.to_string(),
                existing: format!("table {}", table.table_name),
                requested: entry.refers_to(),
            });
        }
        match self.named_ranges.get(&key) {
            Some(existing) if *existing == entry => {}
            Some(existing) => {
                return Err(GenerationError::NameCollision {
                    name: name.to_string(),
                    existing: existing.refers_to(),
                    requested: entry.refers_to(),
                })
            }
            None => {
                self.named_ranges.insert(key, entry);
            }
        }
        self.bind(
            identifier,
            Binding::NamedRange {
                name: name.to_string(),
            },
        )
    }

    /// Register a table whose header row starts at `origin`. Each column is
    /// bound to its identifier.
    pub fn register_table(
        &mut self,
        table_name: &str,
        sheet: &str,
        origin: CellRef,
        columns: Vec<(Identifier, String)>,
        data_rows: u32,
    ) -> Result<(), GenerationError> {
        self.ensure_open("a table")?;
        validate_table_name(table_name).map_err(|e| GenerationError::InvalidName {
            name: table_name.to_string(),
            reason: e.to_string(),
        })?;
        let key = table_name.to_ascii_uppercase();
        if let Some(existing) = self.named_ranges.get(&key) {
            return Err(GenerationError::NameCollision {
                name: table_name.to_string(),
                existing: existing.refers_to(),
                requested: format!("table on {sheet}"),
            });
        }
        if self.tables.contains_key(&key) {
            return Err(GenerationError::NameCollision {
                name: table_name.to_string(),
                existing: "an existing table".to_string(),
                requested: format!("table on {sheet}"),
            });
        }

        let mut headers: Vec<String> = Vec::with_capacity(columns.len());
        for (identifier, header) in columns {
            if headers.iter().any(|h| h.eq_ignore_ascii_case(&header)) {
                return Err(GenerationError::NameCollision {
                    name: format!("{table_name}[{header}]"),
                    existing: "a column of the same table".to_string(),
                    requested: identifier.to_string(),
                });
            }
            self.bind(
                identifier,
                Binding::TableColumn {
                    table: table_name.to_string(),
                    column: header.clone(),
                },
            )?;
            headers.push(header);
        }

        self.tables.insert(
            key,
            TableEntry {
                table_name: table_name.to_string(),
                sheet: sheet.to_string(),
                header_row: origin.row,
                first_col: origin.col,
                columns: headers,
                data_rows: data_rows.max(1),
            },
        );
        Ok(())
    }

    /// Register a round's instrument block and bind its holder and shares
    /// columns under [`Identifier::round_section`]. The block must lie inside
    /// an already registered table.
    pub fn register_round_section(&mut self, entry: RoundSectionEntry) -> Result<(), GenerationError> {
        self.ensure_open("a round section")?;
        if self.round_sections.contains_key(&entry.round_name) {
            return Err(GenerationError::NameCollision {
                name: entry.round_name.clone(),
                existing: "a registered round section".to_string(),
                requested: entry.table_name,
            });
        }
        let table = self.table(&entry.table_name).ok_or_else(|| {
            GenerationError::GenerationOrder(format!(
                "round section `{}` registered before table {}",
                entry.round_name, entry.table_name
            ))
        })?;
        let last_col = table.first_col + table.columns.len() as u32 - 1;
        let inside = entry.row_range.0 > table.header_row
            && entry.row_range.0 <= entry.row_range.1
            && entry.row_range.1 <= table.header_row + table.data_rows
            && [entry.holder_col, entry.shares_col]
                .iter()
                .all(|col| (table.first_col..=last_col).contains(col));
        if !inside {
            return Err(GenerationError::GenerationOrder(format!(
                "round section `{}` lies outside table {}",
                entry.round_name, entry.table_name
            )));
        }

        for column in [SectionColumn::Holder, SectionColumn::Shares] {
            self.bind(
                Identifier::round_section(&entry.round_name, column),
                Binding::RoundSection {
                    round: entry.round_name.clone(),
                    column,
                },
            )?;
        }
        self.round_sections.insert(entry.round_name.clone(), entry);
        Ok(())
    }

    /// Bind an identifier to a single cell, referenced absolutely.
    pub fn register_cell(
        &mut self,
        identifier: Identifier,
        sheet: &str,
        cell: CellRef,
    ) -> Result<(), GenerationError> {
        self.ensure_open("a cell")?;
        self.bind(
            identifier,
            Binding::Cell {
                sheet: sheet.to_string(),
                cell,
            },
        )
    }

    pub fn binding(&self, identifier: &Identifier) -> Option<&Binding> {
        self.bindings.get(identifier)
    }

    pub fn named_ranges(&self) -> impl Iterator<Item = &NamedRangeEntry> {
        self.named_ranges.values()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.values()
    }

    pub fn table(&self, table_name: &str) -> Option<&TableEntry> {
        self.tables.get(&table_name.to_ascii_uppercase())
    }

    pub fn round_section(&self, round_name: &str) -> Option<&RoundSectionEntry> {
        self.round_sections.get(round_name)
    }

    /// Reference text for `identifier` in `style`.
    pub fn resolve(
        &self,
        identifier: &Identifier,
        style: ReferenceStyle,
    ) -> Result<String, GenerationError> {
        if !self.sealed {
            return Err(GenerationError::GenerationOrder(format!(
                "`{identifier}` resolved before the layout was sealed"
            )));
        }
        let binding =
            self.bindings
                .get(identifier)
                .ok_or_else(|| GenerationError::UnresolvedReference {
                    identifier: identifier.to_string(),
                    placeholder: None,
                })?;
        let unsupported = || GenerationError::UnsupportedReferenceStyle {
            identifier: identifier.to_string(),
            style,
        };

        match (binding, style) {
            (Binding::NamedRange { name }, ReferenceStyle::Name) => Ok(name.clone()),
            (Binding::NamedRange { name }, ReferenceStyle::Absolute) => self
                .named_ranges
                .get(&name.to_ascii_uppercase())
                .map(NamedRangeEntry::refers_to)
                .ok_or_else(unsupported),
            (Binding::TableColumn { table, column }, ReferenceStyle::Structured) => {
                Ok(format!("{table}[{}]", escape_column(column)))
            }
            (Binding::TableColumn { table, column }, ReferenceStyle::ThisRow) => {
                Ok(format!("{table}[[#This Row],[{}]]", escape_column(column)))
            }
            (Binding::TableColumn { table, column }, ReferenceStyle::Absolute) => {
                let entry = self.table(table).ok_or_else(unsupported)?;
                let range = entry.column_range(column).ok_or_else(unsupported)?;
                Ok(format!(
                    "{}!{}",
                    quote_sheet_name(&entry.sheet),
                    range.to_a1_absolute()
                ))
            }
            (Binding::Cell { sheet, cell }, ReferenceStyle::Absolute) => Ok(format!(
                "{}!{}",
                quote_sheet_name(sheet),
                cell.to_a1_absolute()
            )),
            (Binding::RoundSection { round, column }, ReferenceStyle::Absolute) => {
                let section = self.round_section(round).ok_or_else(unsupported)?;
                let table = self.table(&section.table_name).ok_or_else(unsupported)?;
                Ok(format!(
                    "{}!{}",
                    quote_sheet_name(&table.sheet),
                    section.range(*column).to_a1_absolute()
                ))
            }
            (Binding::RoundSection { round, column }, ReferenceStyle::Structured) => {
                let section = self.round_section(round).ok_or_else(unsupported)?;
                let table = self.table(&section.table_name).ok_or_else(unsupported)?;
                let header = section
                    .column(*column)
                    .checked_sub(table.first_col)
                    .and_then(|offset| table.columns.get(offset as usize))
                    .ok_or_else(unsupported)?;
                Ok(format!("{}[{}]", table.table_name, escape_column(header)))
            }
            _ => Err(unsupported()),
        }
    }
}

/// Escape the characters structured references treat specially.
fn escape_column(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    for ch in column.chars() {
        if matches!(ch, '[' | ']' | '#' | '\'') {
            out.push('\'');
        }
        out.push(ch);
    }
    out
}
