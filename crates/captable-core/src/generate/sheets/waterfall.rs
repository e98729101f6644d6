//! Waterfall sheet: one section per exit scenario. Preference classes are
//! paid most senior first, each from what the previous row left; the
//! residual is shared by the classes without terms.

use captable_model::CellRef;

use crate::calc::waterfall::{self, PreferenceClass};
use crate::document::SecurityClass;
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::context::{scope, Column, GenerationContext, ScenarioPlan, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::{ledger, masters, SheetGenerator};
use crate::generate::writer::SheetWriter;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle};
use crate::GenerationError;

const SHEET: SheetKind = SheetKind::Waterfall;
const REMAINING_AFTER: &str = "remaining_after";
const PRIOR_REMAINING: &str = "prior_remaining";
const PAYOUT_HEADER: &str = "Payout";

struct Section {
    start: u32,
    preference: TableSpec,
    common: TableSpec,
}

impl Section {
    fn exit_cell(&self) -> CellRef {
        CellRef::new(self.start + 1, 1)
    }

    fn residual_row(&self) -> u32 {
        self.preference.end_row() + 1
    }

    fn residual_cell(&self) -> CellRef {
        CellRef::new(self.residual_row(), 1)
    }

    fn distributed_row(&self) -> u32 {
        self.common.end_row() + 1
    }
}

fn distributed_cell(plan: &ScenarioPlan<'_>) -> Identifier {
    plan.id("distributed")
}

pub(crate) struct WaterfallSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    preferences: Vec<PreferenceClass<'a>>,
    commons: Vec<&'a SecurityClass>,
    sections: Vec<Section>,
}

impl<'a> WaterfallSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Result<Self, GenerationError> {
        let preferences = waterfall::preference_stack(ctx.doc)?;
        let commons = waterfall::common_classes(ctx.doc);
        let mut sections = Vec::with_capacity(ctx.scenarios.len());
        let mut start = 0;
        for plan in &ctx.scenarios {
            let preference = TableSpec::new(
                plan.pref_table(),
                plan.pref_scope(),
                SHEET.title(),
                CellRef::new(start + 3, 0),
                vec![
                    Column::new("class", "Class", OutputStyle::Plain),
                    Column::new("terms", "Terms", OutputStyle::Plain),
                    Column::new("participation", "Participation", OutputStyle::Plain),
                    Column::new(waterfall::SHARES, "Shares", OutputStyle::Shares),
                    Column::new(waterfall::INVESTMENT, "Investment", OutputStyle::Currency),
                    Column::new(
                        waterfall::ORIGINAL_ISSUE_PRICE,
                        "Original Issue Price",
                        OutputStyle::Price,
                    ),
                    Column::new(
                        waterfall::LIQUIDATION_MULTIPLE,
                        "Liquidation Multiple",
                        OutputStyle::Multiple,
                    ),
                    Column::new(
                        waterfall::PARTICIPATION_CAP,
                        "Participation Cap",
                        OutputStyle::Multiple,
                    ),
                    Column::new(waterfall::OWNERSHIP, "Ownership % (FD)", OutputStyle::Percent),
                    Column::new(
                        waterfall::LIQUIDATION_PREFERENCE,
                        "Liquidation Preference",
                        OutputStyle::Currency,
                    ),
                    Column::new(
                        waterfall::REMAINING_BEFORE,
                        "Remaining Before",
                        OutputStyle::Currency,
                    ),
                    Column::new(waterfall::PAYOUT, PAYOUT_HEADER, OutputStyle::Currency),
                    Column::new(REMAINING_AFTER, "Remaining After", OutputStyle::Currency),
                ],
                preferences.len(),
            );
            let common_origin = CellRef::new(preference.end_row() + 3, 0);
            let common = TableSpec::new(
                plan.common_table(),
                plan.common_scope(),
                SHEET.title(),
                common_origin,
                vec![
                    Column::new("class", "Class", OutputStyle::Plain),
                    Column::new(waterfall::OWNERSHIP, "Ownership % (FD)", OutputStyle::Percent),
                    Column::new(waterfall::SHARE_OF_POOL, "Share of Pool", OutputStyle::Percent),
                    Column::new(waterfall::PAYOUT, PAYOUT_HEADER, OutputStyle::Currency),
                ],
                commons.len(),
            );
            let next = common.end_row() + 4;
            sections.push(Section {
                start,
                preference,
                common,
            });
            start = next;
        }
        Ok(Self {
            ctx,
            preferences,
            commons,
            sections,
        })
    }

    fn ledger_bindings(bindings: &mut RefBindings) {
        let ledger_column = |header: &str| Identifier::column(scope::LEDGER, header);
        bindings
            .bind("ledger_class", ledger_column(ledger::CLASS), ReferenceStyle::Structured)
            .bind("ledger_shares", ledger_column(ledger::SHARES), ReferenceStyle::Structured)
            .bind(
                "ledger_investment",
                ledger_column(ledger::INVESTMENT),
                ReferenceStyle::Structured,
            )
            .bind(
                "ledger_ownership",
                ledger_column(ledger::OWNERSHIP),
                ReferenceStyle::Structured,
            );
    }

    fn by_class(column: &str) -> Expr {
        Expr::sum_if(Expr::var("ledger_class"), Expr::var("class"), Expr::var(column))
    }

    fn write_preferences(
        &self,
        out: &mut SheetWriter<'_>,
        plan: &ScenarioPlan<'_>,
        section: &Section,
    ) -> Result<(), GenerationError> {
        let table = &section.preference;
        out.table_header(table);
        for (row, pref) in self.preferences.iter().enumerate() {
            let mut bindings = RefBindings::new();
            table.bind_columns(&mut bindings);
            Self::ledger_bindings(&mut bindings);
            let terms_column = |header: &str| Identifier::column(scope::TERMS, header);
            bindings
                .bind(waterfall::EXIT_VALUE, plan.id(waterfall::EXIT_VALUE), ReferenceStyle::Name)
                .bind("terms_name", terms_column(masters::TERMS), ReferenceStyle::Structured)
                .bind(
                    "terms_multiple",
                    terms_column(masters::LIQUIDATION_MULTIPLE),
                    ReferenceStyle::Structured,
                )
                .bind(
                    "terms_cap",
                    terms_column(masters::PARTICIPATION_CAP),
                    ReferenceStyle::Structured,
                );
            match row.checked_sub(1) {
                None => bindings.bind(
                    PRIOR_REMAINING,
                    plan.id(waterfall::EXIT_VALUE),
                    ReferenceStyle::Name,
                ),
                Some(prev) => bindings.bind(
                    PRIOR_REMAINING,
                    plan.remaining_after(prev),
                    ReferenceStyle::Absolute,
                ),
            };

            let cell = |key: &str| {
                table.cell(row, key).ok_or_else(|| {
                    GenerationError::GenerationOrder(format!("{} has no `{key}` column", table.name))
                })
            };
            out.text(cell("class")?, &pref.class.name);
            out.text(cell("terms")?, &pref.terms.name);
            out.text(cell("participation")?, pref.terms.participation_type.label());

            let terms_lookup = |result: &str| {
                Expr::lookup(Expr::var("terms"), Expr::var("terms_name"), Expr::var(result))
            };
            let formulas = [
                (waterfall::SHARES, Self::by_class("ledger_shares")),
                (waterfall::INVESTMENT, Self::by_class("ledger_investment")),
                (waterfall::ORIGINAL_ISSUE_PRICE, waterfall::original_issue_price()),
                (waterfall::LIQUIDATION_MULTIPLE, terms_lookup("terms_multiple")),
                (waterfall::PARTICIPATION_CAP, terms_lookup("terms_cap")),
                (waterfall::OWNERSHIP, Self::by_class("ledger_ownership")),
                (waterfall::LIQUIDATION_PREFERENCE, waterfall::liquidation_preference()),
                (waterfall::REMAINING_BEFORE, Expr::var(PRIOR_REMAINING)),
                (
                    waterfall::PAYOUT,
                    waterfall::payout(pref.terms.participation_type),
                ),
                (REMAINING_AFTER, waterfall::remaining_after()),
            ];
            for (key, expr) in formulas {
                out.formula(cell(key)?, &expr, table.style(key), &bindings)?;
            }
        }
        Ok(())
    }

    fn write_common(
        &self,
        out: &mut SheetWriter<'_>,
        plan: &ScenarioPlan<'_>,
        section: &Section,
    ) -> Result<(), GenerationError> {
        let table = &section.common;
        out.table_header(table);
        let mut bindings = RefBindings::new();
        table.bind_columns(&mut bindings);
        Self::ledger_bindings(&mut bindings);
        bindings
            .bind(
                waterfall::TOTAL_OWNERSHIP,
                table.column_id("Ownership % (FD)"),
                ReferenceStyle::Structured,
            )
            .bind(
                waterfall::RESIDUAL,
                plan.id(waterfall::RESIDUAL),
                ReferenceStyle::Absolute,
            );
        for (row, class) in self.commons.iter().enumerate() {
            if let Some(cell) = table.cell(row, "class") {
                out.text(cell, &class.name);
            }
            let formulas = [
                (waterfall::OWNERSHIP, Self::by_class("ledger_ownership")),
                (waterfall::SHARE_OF_POOL, waterfall::share_of_pool()),
                (waterfall::PAYOUT, waterfall::common_payout()),
            ];
            for (key, expr) in formulas {
                if let Some(cell) = table.cell(row, key) {
                    out.formula(cell, &expr, table.style(key), &bindings)?;
                }
            }
        }
        Ok(())
    }
}

impl SheetGenerator for WaterfallSheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        for (plan, section) in self.ctx.scenarios.iter().zip(&self.sections) {
            layout.register_named_range(
                plan.id(waterfall::EXIT_VALUE),
                &plan.exit_name(),
                SHEET.title(),
                section.exit_cell(),
            )?;
            section.preference.register(layout)?;
            for row in 0..self.preferences.len() {
                if let Some(cell) = section.preference.cell(row, REMAINING_AFTER) {
                    layout.register_cell(plan.remaining_after(row), SHEET.title(), cell)?;
                }
            }
            layout.register_cell(
                plan.id(waterfall::RESIDUAL),
                SHEET.title(),
                section.residual_cell(),
            )?;
            section.common.register(layout)?;
            layout.register_cell(
                distributed_cell(plan),
                SHEET.title(),
                CellRef::new(section.distributed_row(), 1),
            )?;
        }
        Ok(())
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        if self.ctx.scenarios.is_empty() {
            out.title(CellRef::new(0, 0), "No exit scenarios");
            return Ok(());
        }
        for (plan, section) in self.ctx.scenarios.iter().zip(&self.sections) {
            out.title(
                CellRef::new(section.start, 0),
                &format!("Scenario: {}", plan.scenario.name),
            );
            out.label(section.start + 1, "Exit Value");
            out.number(section.exit_cell(), plan.scenario.exit_value, OutputStyle::Currency);

            self.write_preferences(out, plan, section)?;

            let mut bindings = RefBindings::new()
                .with(waterfall::EXIT_VALUE, plan.id(waterfall::EXIT_VALUE), ReferenceStyle::Name)
                .with(
                    "pref_payouts",
                    section.preference.column_id(PAYOUT_HEADER),
                    ReferenceStyle::Structured,
                )
                .with(
                    "common_payouts",
                    section.common.column_id(PAYOUT_HEADER),
                    ReferenceStyle::Structured,
                );
            let residual = match self.preferences.len().checked_sub(1) {
                Some(last) => {
                    bindings.bind(
                        "last_remaining",
                        plan.remaining_after(last),
                        ReferenceStyle::Absolute,
                    );
                    Expr::var("last_remaining")
                }
                None => Expr::var(waterfall::EXIT_VALUE),
            };
            out.label(section.residual_row(), "Residual");
            out.formula(section.residual_cell(), &residual, OutputStyle::Currency, &bindings)?;

            self.write_common(out, plan, section)?;

            let distributed_row = section.distributed_row();
            let total = Expr::sum(vec![Expr::var("pref_payouts")])
                + Expr::sum(vec![Expr::var("common_payouts")]);
            out.label(distributed_row, "Total Distributed");
            out.formula(
                CellRef::new(distributed_row, 1),
                &total,
                OutputStyle::Currency,
                &bindings,
            )?;
            bindings.bind("distributed", distributed_cell(plan), ReferenceStyle::Absolute);
            out.label(distributed_row + 1, "Unallocated");
            out.formula(
                CellRef::new(distributed_row + 1, 1),
                &(Expr::var(waterfall::EXIT_VALUE) - Expr::var("distributed")),
                OutputStyle::Currency,
                &bindings,
            )?;
        }
        out.width(0, 24.0);
        Ok(())
    }
}
