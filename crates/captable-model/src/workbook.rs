use thiserror::Error;

use crate::names::{validate_defined_name, DefinedName, DefinedNameError};
use crate::worksheet::{validate_sheet_name, SheetNameError};
use crate::{Style, StyleTable, Table, TableError, Worksheet, WorksheetId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkbookError {
    #[error("invalid sheet name `{name}`: {source}")]
    InvalidSheetName {
        name: String,
        #[source]
        source: SheetNameError,
    },
    #[error("sheet `{0}` already exists")]
    DuplicateSheetName(String),
    #[error("sheet {0} not found")]
    SheetNotFound(WorksheetId),
    #[error("invalid defined name `{name}`: {source}")]
    InvalidDefinedName {
        name: String,
        #[source]
        source: DefinedNameError,
    },
    #[error("invalid table `{name}`: {source}")]
    InvalidTable {
        name: String,
        #[source]
        source: TableError,
    },
    /// Defined names and table names share one namespace.
    #[error("name `{0}` is already taken by a defined name or table")]
    DuplicateName(String),
    #[error("table `{new}` overlaps table `{existing}`")]
    OverlappingTables { new: String, existing: String },
    #[error("sheet order must list every sheet exactly once")]
    InvalidSheetOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    /// In tab order.
    pub sheets: Vec<Worksheet>,
    pub styles: StyleTable,
    pub defined_names: Vec<DefinedName>,
    /// Ask the consumer to recalculate every formula when the file opens.
    pub full_calc_on_load: bool,
    next_sheet_id: WorksheetId,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            styles: StyleTable::new(),
            defined_names: Vec::new(),
            full_calc_on_load: false,
            next_sheet_id: 1,
        }
    }

    pub fn add_sheet(&mut self, name: &str) -> Result<WorksheetId, WorkbookError> {
        validate_sheet_name(name).map_err(|source| WorkbookError::InvalidSheetName {
            name: name.to_string(),
            source,
        })?;
        if self.sheet_by_name(name).is_some() {
            return Err(WorkbookError::DuplicateSheetName(name.to_string()));
        }
        let id = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.sheets.push(Worksheet::new(id, name));
        Ok(id)
    }

    pub fn sheet(&self, id: WorksheetId) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.id == id)
    }

    pub fn sheet_mut(&mut self, id: WorksheetId) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|s| s.id == id)
    }

    /// Case-insensitive, like Excel.
    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Put the sheets in `order`, which must name each sheet once.
    pub fn reorder_sheets(&mut self, order: &[WorksheetId]) -> Result<(), WorkbookError> {
        // Sheet ids are unique, so equal length plus full coverage means
        // `order` is a permutation.
        let permutation = order.len() == self.sheets.len()
            && self.sheets.iter().all(|s| order.contains(&s.id));
        if !permutation {
            return Err(WorkbookError::InvalidSheetOrder);
        }
        self.sheets
            .sort_by_key(|s| order.iter().position(|id| *id == s.id));
        Ok(())
    }

    pub fn find_table(&self, name: &str) -> Option<(&Worksheet, &Table)> {
        self.sheets.iter().find_map(|sheet| {
            sheet
                .tables
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(name))
                .map(|t| (sheet, t))
        })
    }

    fn name_taken(&self, name: &str) -> bool {
        self.defined_name(name).is_some() || self.find_table(name).is_some()
    }

    /// Attach `table` to a sheet and number its part.
    pub fn add_table(&mut self, sheet_id: WorksheetId, mut table: Table) -> Result<(), WorkbookError> {
        if self.name_taken(&table.name) {
            return Err(WorkbookError::DuplicateName(table.name));
        }
        let next_id = self.sheets.iter().map(|s| s.tables.len() as u32).sum::<u32>() + 1;
        let sheet = self
            .sheet_mut(sheet_id)
            .ok_or(WorkbookError::SheetNotFound(sheet_id))?;
        if let Some(existing) = sheet.tables.iter().find(|t| t.range.intersects(&table.range)) {
            return Err(WorkbookError::OverlappingTables {
                new: table.name,
                existing: existing.name.clone(),
            });
        }
        table.id = next_id;
        sheet.tables.push(table);
        Ok(())
    }

    pub fn intern_style(&mut self, style: Style) -> u32 {
        self.styles.intern(style)
    }

    /// Add a workbook-scoped name. `refers_to` may carry a leading `=`.
    pub fn define_name(&mut self, name: &str, refers_to: &str) -> Result<(), WorkbookError> {
        validate_defined_name(name).map_err(|source| WorkbookError::InvalidDefinedName {
            name: name.to_string(),
            source,
        })?;
        if self.name_taken(name) {
            return Err(WorkbookError::DuplicateName(name.to_string()));
        }
        self.defined_names.push(DefinedName {
            name: name.to_string(),
            refers_to: crate::cell::strip_equals(refers_to).to_string(),
        });
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn defined_name(&self, name: &str) -> Option<&DefinedName> {
        self.defined_names
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }
}
