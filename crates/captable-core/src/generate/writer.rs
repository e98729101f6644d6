//! Cell writing for the second generation phase.

use std::collections::BTreeMap;

use captable_model::{CellRef, Style, Workbook, Worksheet};
use chrono::NaiveDate;

use crate::calc::RowCell;
use crate::dates::excel_serial;
use crate::formula::{Expr, FormulaEncoding, OutputStyle, RefBindings, Resolved};
use crate::generate::context::TableSpec;
use crate::layout::LayoutMap;
use crate::GenerationError;

/// Light blue, as ARGB.
const HEADER_FILL: u32 = 0xFFDD_EBF7;

/// Style ids interned once per workbook.
#[derive(Debug, Clone)]
pub(crate) struct StyleSet {
    by_output: BTreeMap<OutputStyle, u32>,
    title: u32,
    header: u32,
    label: u32,
}

impl StyleSet {
    pub fn new(workbook: &mut Workbook) -> Self {
        let mut by_output = BTreeMap::new();
        for style in OutputStyle::ALL {
            let id = match style.number_format() {
                Some(format) => workbook.intern_style(Style::number_format(format)),
                None => 0,
            };
            by_output.insert(style, id);
        }
        Self {
            by_output,
            title: workbook.intern_style(Style::default().bold()),
            header: workbook.intern_style(Style::default().bold().filled(HEADER_FILL)),
            label: workbook.intern_style(Style::default().bold()),
        }
    }

    pub fn output(&self, style: OutputStyle) -> u32 {
        self.by_output.get(&style).copied().unwrap_or(0)
    }
}

/// Writes one worksheet, resolving formulas against the sealed layout.
pub(crate) struct SheetWriter<'a> {
    sheet: &'a mut Worksheet,
    layout: &'a LayoutMap,
    styles: &'a StyleSet,
}

impl<'a> SheetWriter<'a> {
    pub fn new(sheet: &'a mut Worksheet, layout: &'a LayoutMap, styles: &'a StyleSet) -> Self {
        Self {
            sheet,
            layout,
            styles,
        }
    }

    pub fn text(&mut self, cell: CellRef, text: &str) {
        self.sheet.set_value(cell, text);
    }

    pub fn title(&mut self, cell: CellRef, text: &str) {
        self.sheet.set_value(cell, text);
        self.sheet.set_style_id(cell, self.styles.title);
    }

    /// Bold row label in column A.
    pub fn label(&mut self, row: u32, text: &str) {
        let cell = CellRef::new(row, 0);
        self.sheet.set_value(cell, text);
        self.sheet.set_style_id(cell, self.styles.label);
    }

    pub fn number(&mut self, cell: CellRef, value: f64, style: OutputStyle) {
        self.sheet.set_value(cell, value);
        self.sheet.set_style_id(cell, self.styles.output(style));
    }

    pub fn date(&mut self, cell: CellRef, date: NaiveDate) {
        self.number(cell, excel_serial(date), OutputStyle::Date);
    }

    /// Resolve and write `expr`.
    pub fn formula(
        &mut self,
        cell: CellRef,
        expr: &Expr,
        style: OutputStyle,
        bindings: &RefBindings,
    ) -> Result<(), GenerationError> {
        let encoding = FormulaEncoding::from_expr(expr, style, bindings)?;
        self.encoding(cell, &encoding)
    }

    pub fn encoding(
        &mut self,
        cell: CellRef,
        encoding: &FormulaEncoding,
    ) -> Result<(), GenerationError> {
        match encoding.resolve(self.layout)? {
            Resolved::Formula(text) => self.sheet.set_formula(cell, &text),
            Resolved::Number(value) => self.sheet.set_value(cell, value),
        }
        self.sheet
            .set_style_id(cell, self.styles.output(encoding.output_style));
        Ok(())
    }

    /// Write one table cell. `prior_holdings` stands in for
    /// [`RowCell::HolderSharesBeforeRound`].
    pub fn row_cell(
        &mut self,
        cell: CellRef,
        content: &RowCell,
        style: OutputStyle,
        bindings: &RefBindings,
        prior_holdings: &Expr,
    ) -> Result<(), GenerationError> {
        match content {
            RowCell::Empty => Ok(()),
            RowCell::Number(value) => {
                self.number(cell, *value, style);
                Ok(())
            }
            RowCell::Text(text) => {
                self.text(cell, text);
                Ok(())
            }
            RowCell::Formula(expr) => self.formula(cell, expr, style, bindings),
            RowCell::HolderSharesBeforeRound => self.formula(cell, prior_holdings, style, bindings),
        }
    }

    /// Header row of `table`, and column widths sized to the headers.
    pub fn table_header(&mut self, table: &TableSpec) {
        for (offset, column) in table.columns.iter().enumerate() {
            let cell = CellRef::new(table.origin.row, table.origin.col + offset as u32);
            self.sheet.set_value(cell, column.header.as_str());
            self.sheet.set_style_id(cell, self.styles.header);
            let width = (column.header.chars().count() as f64 + 4.0).max(12.0);
            let current = self.sheet.col_widths.get(&cell.col).copied().unwrap_or(0.0);
            if width > current {
                self.sheet.set_col_width(cell.col, width);
            }
        }
    }

    pub fn width(&mut self, col: u32, width: f64) {
        self.sheet.set_col_width(col, width);
    }
}
