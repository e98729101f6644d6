//! Pro-Rata Allocations sheet: one table per round with participating
//! holders, plus the solved post-round total it allocates against.

use captable_model::CellRef;

use crate::calc::{pro_rata, vars};
use crate::formula::{OutputStyle, RefBindings};
use crate::generate::context::{Column, GenerationContext, RoundPlan, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::rounds::fields;
use crate::generate::sheets::SheetGenerator;
use crate::generate::writer::SheetWriter;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle};
use crate::GenerationError;

const SHEET: SheetKind = SheetKind::ProRata;
const POST_SHARES_ROW: u32 = 1;
const TABLE_OFFSET: u32 = 3;

/// The allocation table cell holding a participant's new shares.
pub(crate) fn new_shares_cell(key: &str) -> Identifier {
    Identifier::instrument(key, "new_shares")
}

struct Section {
    round: usize,
    start: u32,
    table: TableSpec,
}

pub(crate) struct ProRataSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    sections: Vec<Section>,
}

impl<'a> ProRataSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let mut sections = Vec::new();
        let mut start = 0;
        for plan in ctx.rounds.iter().filter(|p| !p.pro_rata.is_empty()) {
            let table = TableSpec::new(
                plan.pro_rata_table_name(),
                plan.pro_rata_scope(),
                SHEET.title(),
                CellRef::new(start + TABLE_OFFSET, 0),
                pro_rata::columns().into_iter().map(Column::from).collect(),
                plan.pro_rata.len(),
            );
            let next = table.end_row() + 2;
            sections.push(Section {
                round: plan.index,
                start,
                table,
            });
            start = next;
        }
        Self { ctx, sections }
    }

    fn post_shares_cell(section: &Section) -> CellRef {
        CellRef::new(section.start + POST_SHARES_ROW, 1)
    }

    fn bindings(&self, plan: &RoundPlan<'_>, section: &Section) -> RefBindings {
        let mut bindings = RefBindings::new();
        section.table.bind_columns(&mut bindings);
        bindings
            .bind(
                vars::PRE_SHARES,
                plan.id(fields::PRE_ROUND_SHARES),
                ReferenceStyle::Name,
            )
            .bind(vars::POST_MONEY, plan.id(fields::POST_MONEY), ReferenceStyle::Name)
            .bind(
                pro_rata::BASE_SHARES,
                plan.id(fields::BASE_SHARES),
                ReferenceStyle::Name,
            )
            .bind(
                pro_rata::POST_ROUND_SHARES,
                plan.id(fields::PRO_RATA_POST_SHARES),
                ReferenceStyle::Name,
            );
        self.ctx.bind_prior_holdings(&mut bindings, plan.index);
        bindings
    }
}

impl SheetGenerator for ProRataSheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        for section in &self.sections {
            let plan = &self.ctx.rounds[section.round];
            layout.register_named_range(
                plan.id(fields::PRO_RATA_POST_SHARES),
                &plan.defined_name("ProRataPostShares"),
                SHEET.title(),
                Self::post_shares_cell(section),
            )?;
            section.table.register(layout)?;
            for (row, allocation) in plan.pro_rata.iter().enumerate() {
                if let Some(cell) = section.table.cell(row, pro_rata::NEW_SHARES.key) {
                    layout.register_cell(new_shares_cell(&allocation.key), SHEET.title(), cell)?;
                }
            }
        }
        Ok(())
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        if self.sections.is_empty() {
            out.title(CellRef::new(0, 0), "No pro-rata participation");
            return Ok(());
        }
        let prior_holdings = GenerationContext::prior_holdings_expr();
        for section in &self.sections {
            let plan = &self.ctx.rounds[section.round];
            let bindings = self.bindings(plan, section);
            out.title(CellRef::new(section.start, 0), &format!("{} Pro-Rata", plan.name()));
            out.label(section.start + POST_SHARES_ROW, "Post-Round Shares (T)");
            out.formula(
                Self::post_shares_cell(section),
                &pro_rata::post_round_shares(),
                OutputStyle::Plain,
                &bindings,
            )?;

            out.table_header(&section.table);
            let columns = pro_rata::columns();
            for (row, allocation) in plan.pro_rata.iter().enumerate() {
                let cells = pro_rata::row(allocation.participation, &allocation.class);
                for (column, content) in columns.iter().zip(&cells) {
                    let Some(cell) = section.table.cell(row, column.key) else {
                        continue;
                    };
                    out.row_cell(cell, content, column.style, &bindings, &prior_holdings)?;
                }
            }
        }
        out.width(0, 24.0);
        Ok(())
    }
}
