//! Reference sheets: Holders, Classes and Terms. Literal inputs only; other
//! sheets look values up here by name.

use captable_model::CellRef;

use crate::formula::OutputStyle;
use crate::generate::context::{scope, Column, GenerationContext, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::SheetGenerator;
use crate::generate::writer::SheetWriter;
use crate::layout::LayoutMap;
use crate::GenerationError;

pub(crate) const HOLDER: &str = "Holder";
pub(crate) const HOLDER_TYPE: &str = "Type";
pub(crate) const CLASS: &str = "Class";
pub(crate) const CLASS_TYPE: &str = "Type";
pub(crate) const CONVERSION_RATIO: &str = "Conversion Ratio";
pub(crate) const TERMS: &str = "Terms";
pub(crate) const LIQUIDATION_MULTIPLE: &str = "Liquidation Multiple";
pub(crate) const PARTICIPATION_CAP: &str = "Participation Cap";

const ORIGIN: CellRef = CellRef::new(0, 0);

pub(crate) struct HoldersSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    table: TableSpec,
}

impl<'a> HoldersSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let table = TableSpec::new(
            "tblHolders",
            scope::HOLDERS,
            SheetKind::Holders.title(),
            ORIGIN,
            vec![
                Column::new("holder", HOLDER, OutputStyle::Plain),
                Column::new("type", HOLDER_TYPE, OutputStyle::Plain),
            ],
            ctx.doc.holders.len(),
        );
        Self { ctx, table }
    }
}

impl SheetGenerator for HoldersSheet<'_> {
    fn kind(&self) -> SheetKind {
        SheetKind::Holders
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        self.table.register(layout)
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        out.table_header(&self.table);
        for (row, holder) in self.ctx.doc.holders.iter().enumerate() {
            if let Some(cell) = self.table.cell(row, "holder") {
                out.text(cell, &holder.name);
            }
            if let Some(cell) = self.table.cell(row, "type") {
                out.text(cell, holder.holder_type.label());
            }
        }
        out.width(0, 28.0);
        Ok(())
    }
}

pub(crate) struct ClassesSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    table: TableSpec,
}

impl<'a> ClassesSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let table = TableSpec::new(
            "tblClasses",
            scope::CLASSES,
            SheetKind::Classes.title(),
            ORIGIN,
            vec![
                Column::new("class", CLASS, OutputStyle::Plain),
                Column::new("type", CLASS_TYPE, OutputStyle::Plain),
                Column::new("terms", TERMS, OutputStyle::Plain),
                Column::new("conversion_ratio", CONVERSION_RATIO, OutputStyle::Multiple),
            ],
            ctx.doc.classes.len(),
        );
        Self { ctx, table }
    }
}

impl SheetGenerator for ClassesSheet<'_> {
    fn kind(&self) -> SheetKind {
        SheetKind::Classes
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        self.table.register(layout)
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        out.table_header(&self.table);
        for (row, class) in self.ctx.doc.classes.iter().enumerate() {
            let cell = |key: &str| self.table.cell(row, key);
            if let Some(c) = cell("class") {
                out.text(c, &class.name);
            }
            if let Some(c) = cell("type") {
                out.text(c, class.class_type.label());
            }
            if let (Some(c), Some(terms)) = (cell("terms"), &class.terms) {
                out.text(c, terms);
            }
            if let Some(c) = cell("conversion_ratio") {
                out.number(c, class.conversion_ratio, OutputStyle::Multiple);
            }
        }
        out.width(0, 24.0);
        Ok(())
    }
}

pub(crate) struct TermsSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    table: TableSpec,
}

impl<'a> TermsSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let table = TableSpec::new(
            "tblTerms",
            scope::TERMS,
            SheetKind::Terms.title(),
            ORIGIN,
            vec![
                Column::new("terms", TERMS, OutputStyle::Plain),
                Column::new("multiple", LIQUIDATION_MULTIPLE, OutputStyle::Multiple),
                Column::new("participation", "Participation", OutputStyle::Plain),
                Column::new("cap", PARTICIPATION_CAP, OutputStyle::Multiple),
                Column::new("rank", "Seniority Rank", OutputStyle::Plain),
                Column::new("anti_dilution", "Anti-Dilution", OutputStyle::Plain),
            ],
            ctx.doc.terms.len(),
        );
        Self { ctx, table }
    }
}

impl SheetGenerator for TermsSheet<'_> {
    fn kind(&self) -> SheetKind {
        SheetKind::Terms
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        self.table.register(layout)
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        out.table_header(&self.table);
        for (row, terms) in self.ctx.doc.terms.iter().enumerate() {
            let cell = |key: &str| self.table.cell(row, key);
            if let Some(c) = cell("terms") {
                out.text(c, &terms.name);
            }
            if let Some(c) = cell("multiple") {
                out.number(c, terms.liquidation_multiple, OutputStyle::Multiple);
            }
            if let Some(c) = cell("participation") {
                out.text(c, terms.participation_type.label());
            }
            if let (Some(c), Some(cap)) = (cell("cap"), terms.participation_cap) {
                out.number(c, cap, OutputStyle::Multiple);
            }
            if let Some(c) = cell("rank") {
                out.number(c, terms.seniority_rank as f64, OutputStyle::Plain);
            }
            if let Some(c) = cell("anti_dilution") {
                out.text(c, terms.anti_dilution.label());
            }
        }
        out.width(0, 24.0);
        Ok(())
    }
}
