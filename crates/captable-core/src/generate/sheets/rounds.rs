//! Rounds sheet: one section per round with its header values, exported as
//! defined names, and a table of the instruments it issues.

use captable_model::CellRef;

use crate::calc::{column_total, pro_rata as pro_rata_calc, vars, RoundValue, Strategy};
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::context::{scope, Column, GenerationContext, RoundPlan, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::{ledger, SheetGenerator};
use crate::generate::writer::SheetWriter;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle, RoundSectionEntry};
use crate::GenerationError;

/// Round-level identifier fields.
pub(crate) mod fields {
    pub const DATE: &str = "date";
    pub const PRE_MONEY: &str = "pre_money";
    pub const POST_MONEY: &str = "post_money";
    pub const PRE_ROUND_SHARES: &str = "pre_round_shares";
    pub const PPS: &str = "pps";
    pub const INVESTMENT: &str = "investment";
    pub const BASE_SHARES: &str = "base_shares";
    pub const PRO_RATA_SHARES: &str = "pro_rata_shares";
    pub const SHARES_ISSUED: &str = "shares_issued";
    /// Registered by the pro-rata sheet.
    pub const PRO_RATA_POST_SHARES: &str = "pro_rata_post_shares";
}

const SHEET: SheetKind = SheetKind::Rounds;
const VALUE_COL: u32 = 1;

/// Section rows below the round title: (offset, label, field, defined-name
/// suffix, style).
const NAMED_ROWS: [(u32, &str, &str, &str, OutputStyle); 9] = [
    (1, "Date", fields::DATE, "Date", OutputStyle::Date),
    (4, "Pre-Money Valuation", fields::PRE_MONEY, "PreMoney", OutputStyle::Currency),
    (5, "Post-Money Valuation", fields::POST_MONEY, "PostMoney", OutputStyle::Currency),
    (6, "Pre-Round Shares", fields::PRE_ROUND_SHARES, "PreRoundShares", OutputStyle::Shares),
    (7, "Price Per Share", fields::PPS, "PPS", OutputStyle::Price),
    (8, "Investment", fields::INVESTMENT, "Investment", OutputStyle::Currency),
    (9, "Base Shares", fields::BASE_SHARES, "BaseShares", OutputStyle::Shares),
    (10, "Pro-Rata Shares", fields::PRO_RATA_SHARES, "ProRataShares", OutputStyle::Shares),
    (11, "Shares Issued", fields::SHARES_ISSUED, "SharesIssued", OutputStyle::Shares),
];
const CALCULATION_TYPE_ROW: u32 = 2;
const VALUATION_BASIS_ROW: u32 = 3;
const QUALIFYING_ROUND_ROW: u32 = 12;
const TABLE_OFFSET: u32 = 14;

/// The round table cell holding an instrument's computed shares.
pub(crate) fn shares_cell(key: &str) -> Identifier {
    Identifier::instrument(key, "round_shares")
}

struct Section {
    start: u32,
    table: TableSpec,
}

impl Section {
    fn value_cell(&self, offset: u32) -> CellRef {
        CellRef::new(self.start + offset, VALUE_COL)
    }
}

pub(crate) struct RoundsSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    sections: Vec<Section>,
}

impl<'a> RoundsSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let mut sections = Vec::with_capacity(ctx.rounds.len());
        let mut start = 0;
        for plan in &ctx.rounds {
            let mut columns = vec![
                Column::new("id", "ID", OutputStyle::Plain),
                Column::new("holder", "Holder", OutputStyle::Plain),
                Column::new("class", "Class", OutputStyle::Plain),
            ];
            columns.extend(plan.strategy.columns().into_iter().map(Column::from));
            let table = TableSpec::new(
                plan.table_name(),
                plan.table_scope(),
                SHEET.title(),
                CellRef::new(start + TABLE_OFFSET, 0),
                columns,
                plan.instruments.len(),
            );
            let next = table.end_row() + 2;
            sections.push(Section { start, table });
            start = next;
        }
        Self { ctx, sections }
    }

    fn round_bindings(&self, plan: &RoundPlan<'_>, section: &Section) -> RefBindings {
        let mut bindings = RefBindings::new();
        section.table.bind_columns(&mut bindings);
        for (placeholder, field) in [
            (vars::PRE_SHARES, fields::PRE_ROUND_SHARES),
            (vars::PRE_MONEY, fields::PRE_MONEY),
            (vars::POST_MONEY, fields::POST_MONEY),
            (vars::PPS, fields::PPS),
            (vars::ROUND_DATE, fields::DATE),
        ] {
            bindings.bind(placeholder, plan.id(field), ReferenceStyle::Name);
        }
        let qualifying = plan
            .round
            .qualifying_round
            .as_deref()
            .and_then(|name| self.ctx.rounds.iter().find(|r| r.name() == name));
        if let Some(qualifying) = qualifying {
            bindings.bind(
                vars::QUALIFYING_PPS,
                qualifying.id(fields::PPS),
                ReferenceStyle::Name,
            );
        }
        self.ctx.bind_prior_holdings(&mut bindings, plan.index);
        bindings
            .bind(
                "ledger_round_order",
                Identifier::column(scope::LEDGER, ledger::ROUND_ORDER),
                ReferenceStyle::Structured,
            )
            .bind(
                "ledger_quantity",
                Identifier::column(scope::LEDGER, ledger::INITIAL_QUANTITY),
                ReferenceStyle::Structured,
            );
        if let Some(prev) = plan.index.checked_sub(1).and_then(|i| self.ctx.rounds.get(i)) {
            bindings
                .bind("prev_pre", prev.id(fields::PRE_ROUND_SHARES), ReferenceStyle::Name)
                .bind("prev_issued", prev.id(fields::SHARES_ISSUED), ReferenceStyle::Name);
        }
        for field in [fields::BASE_SHARES, fields::PRO_RATA_SHARES] {
            bindings.bind(field, plan.id(field), ReferenceStyle::Name);
        }
        if !plan.pro_rata.is_empty() {
            bindings.bind(
                "pro_rata_new_shares",
                Identifier::column(&plan.pro_rata_scope(), pro_rata_calc::NEW_SHARES.header),
                ReferenceStyle::Structured,
            );
        }
        bindings
    }

    fn write_value(
        out: &mut SheetWriter<'_>,
        cell: CellRef,
        value: RoundValue,
        style: OutputStyle,
        bindings: &RefBindings,
    ) -> Result<(), GenerationError> {
        match value {
            RoundValue::Empty => Ok(()),
            RoundValue::Literal(x) => {
                out.number(cell, x, style);
                Ok(())
            }
            RoundValue::Formula(expr) => out.formula(cell, &expr, style, bindings),
        }
    }

    fn write_section(
        &self,
        out: &mut SheetWriter<'_>,
        plan: &RoundPlan<'_>,
        section: &Section,
    ) -> Result<(), GenerationError> {
        let round = plan.round;
        let bindings = self.round_bindings(plan, section);

        out.title(CellRef::new(section.start, 0), &round.name);
        for (offset, label, _, _, _) in NAMED_ROWS {
            out.label(section.start + offset, label);
        }
        out.label(section.start + CALCULATION_TYPE_ROW, "Calculation Type");
        out.label(section.start + VALUATION_BASIS_ROW, "Valuation Basis");
        out.label(section.start + QUALIFYING_ROUND_ROW, "Qualifying Round");

        out.date(section.value_cell(1), round.date);
        out.text(
            section.value_cell(CALCULATION_TYPE_ROW),
            round.calculation_type.label(),
        );
        if let Strategy::Valuation(basis) = plan.strategy {
            out.text(section.value_cell(VALUATION_BASIS_ROW), basis.label());
        }
        if let Some(qualifying) = &round.qualifying_round {
            out.text(section.value_cell(QUALIFYING_ROUND_ROW), qualifying);
        }

        let values = plan.strategy.round_values(round);
        for (offset, value, style) in [
            (4, values.pre_money, OutputStyle::Currency),
            (5, values.post_money, OutputStyle::Currency),
            (7, values.pps, OutputStyle::Price),
        ] {
            Self::write_value(out, section.value_cell(offset), value, style, &bindings)?;
        }

        // Founding quantities are literals; summing the Shares column would
        // loop back through this round's table.
        let pre_round = if plan.index == 0 {
            Expr::sum_if(
                Expr::var("ledger_round_order"),
                Expr::num(0.0),
                Expr::var("ledger_quantity"),
            )
        } else {
            Expr::var("prev_pre") + Expr::var("prev_issued")
        };
        out.formula(section.value_cell(6), &pre_round, OutputStyle::Shares, &bindings)?;

        if plan.strategy.has_investment() {
            let invested = Expr::sum(vec![Expr::var(column_total("investment"))]);
            out.formula(section.value_cell(8), &invested, OutputStyle::Currency, &bindings)?;
        } else {
            let invested = plan.instruments.iter().map(|(_, i)| i.invested()).sum();
            out.number(section.value_cell(8), invested, OutputStyle::Currency);
        }

        let base = Expr::sum(vec![Expr::var(column_total("shares"))]);
        out.formula(section.value_cell(9), &base, OutputStyle::Shares, &bindings)?;
        if plan.pro_rata.is_empty() {
            out.number(section.value_cell(10), 0.0, OutputStyle::Shares);
        } else {
            let allocated = Expr::sum(vec![Expr::var("pro_rata_new_shares")]);
            out.formula(section.value_cell(10), &allocated, OutputStyle::Shares, &bindings)?;
        }
        let issued = Expr::var(fields::BASE_SHARES) + Expr::var(fields::PRO_RATA_SHARES);
        out.formula(section.value_cell(11), &issued, OutputStyle::Shares, &bindings)?;

        out.table_header(&section.table);
        let prior_holdings = GenerationContext::prior_holdings_expr();
        for (row, (key, instrument)) in plan.instruments.iter().enumerate() {
            let cell = |col: &str| {
                section.table.cell(row, col).ok_or_else(|| {
                    GenerationError::GenerationOrder(format!(
                        "round table {} has no `{col}` column",
                        section.table.name
                    ))
                })
            };
            out.text(cell("id")?, key);
            out.text(cell("holder")?, &instrument.holder);
            out.text(cell("class")?, &instrument.class);
            let cells = plan.strategy.row(round, key, instrument)?;
            for (column, content) in plan.strategy.columns().iter().zip(&cells) {
                out.row_cell(
                    cell(column.key)?,
                    content,
                    column.style,
                    &bindings,
                    &prior_holdings,
                )?;
            }
        }
        Ok(())
    }
}

impl SheetGenerator for RoundsSheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        for (plan, section) in self.ctx.rounds.iter().zip(&self.sections) {
            for (offset, _, field, suffix, _) in NAMED_ROWS {
                layout.register_named_range(
                    plan.id(field),
                    &plan.defined_name(suffix),
                    SHEET.title(),
                    section.value_cell(offset),
                )?;
            }
            section.table.register(layout)?;
            for (row, (key, _)) in plan.instruments.iter().enumerate() {
                if let Some(cell) = section.table.cell(row, "shares") {
                    layout.register_cell(shares_cell(key), SHEET.title(), cell)?;
                }
            }
            let (Some(holder), Some(shares)) =
                (section.table.cell(0, "holder"), section.table.cell(0, "shares"))
            else {
                return Err(GenerationError::GenerationOrder(format!(
                    "round table {} needs Holder and Shares columns",
                    section.table.name
                )));
            };
            layout.register_round_section(RoundSectionEntry {
                round_name: plan.name().to_string(),
                row_range: (holder.row, section.table.end_row() - 1),
                holder_col: holder.col,
                shares_col: shares.col,
                table_name: section.table.name.clone(),
            })?;
        }
        Ok(())
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        if self.ctx.rounds.is_empty() {
            out.title(CellRef::new(0, 0), "No financing rounds");
            return Ok(());
        }
        for (plan, section) in self.ctx.rounds.iter().zip(&self.sections) {
            log::debug!("writing round `{}`", plan.name());
            self.write_section(out, plan, section)?;
        }
        out.width(0, 26.0);
        out.width(1, 18.0);
        Ok(())
    }
}
