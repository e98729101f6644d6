//! Cap Table Progression: every holder's cumulative shares after each round,
//! and the matching ownership percentages.

use captable_model::CellRef;

use crate::calc::{column_total, pro_rata};
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::context::{scope, Column, GenerationContext, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::{ledger, masters, SheetGenerator};
use crate::generate::writer::SheetWriter;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle, SectionColumn};
use crate::GenerationError;

const HOLDER: &str = "Holder";
const FOUNDING: &str = "Founding";

const SHEET: SheetKind = SheetKind::Progression;

fn shares_key(position: usize) -> String {
    format!("after_{position}")
}

fn percent_key(key: &str) -> String {
    format!("pct_{key}")
}

pub(crate) struct ProgressionSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    table: TableSpec,
    /// Keys of the share columns, founding first.
    share_keys: Vec<String>,
}

impl<'a> ProgressionSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let mut share_keys = vec!["founding".to_string()];
        let mut columns = vec![
            Column::new("holder", HOLDER, OutputStyle::Plain),
            Column::new("type", "Type", OutputStyle::Plain),
            Column::new("founding", FOUNDING, OutputStyle::Shares),
        ];
        for (position, plan) in ctx.rounds.iter().enumerate() {
            let key = shares_key(position);
            columns.push(Column::new(&key, plan.progression_header(), OutputStyle::Shares));
            share_keys.push(key);
        }
        columns.push(Column::new(
            percent_key("founding"),
            format!("% {FOUNDING}"),
            OutputStyle::Percent,
        ));
        for (position, plan) in ctx.rounds.iter().enumerate() {
            columns.push(Column::new(
                percent_key(&shares_key(position)),
                format!("% {}", plan.progression_header()),
                OutputStyle::Percent,
            ));
        }
        let table = TableSpec::new(
            "tblProgression",
            scope::PROGRESSION,
            SHEET.title(),
            CellRef::new(2, 0),
            columns,
            ctx.doc.holders.len(),
        );
        Self {
            ctx,
            table,
            share_keys,
        }
    }

    fn bindings(&self) -> RefBindings {
        let mut bindings = RefBindings::new();
        self.table.bind_columns(&mut bindings);
        let ledger_column = |header: &str| Identifier::column(scope::LEDGER, header);
        bindings
            .bind("ledger_holder", ledger_column(ledger::HOLDER), ReferenceStyle::Structured)
            .bind(
                "ledger_round_order",
                ledger_column(ledger::ROUND_ORDER),
                ReferenceStyle::Structured,
            )
            .bind(
                "ledger_quantity",
                ledger_column(ledger::INITIAL_QUANTITY),
                ReferenceStyle::Structured,
            )
            .bind(
                "holders_holder",
                Identifier::column(scope::HOLDERS, masters::HOLDER),
                ReferenceStyle::Structured,
            )
            .bind(
                "holders_type",
                Identifier::column(scope::HOLDERS, masters::HOLDER_TYPE),
                ReferenceStyle::Structured,
            );
        for (position, plan) in self.ctx.rounds.iter().enumerate() {
            // Round issuances are summed over the instrument block the Rounds
            // sheet registered for the round.
            bindings
                .bind(
                    format!("round{position}_holder"),
                    Identifier::round_section(plan.name(), SectionColumn::Holder),
                    ReferenceStyle::Absolute,
                )
                .bind(
                    format!("round{position}_shares"),
                    Identifier::round_section(plan.name(), SectionColumn::Shares),
                    ReferenceStyle::Absolute,
                );
            if !plan.pro_rata.is_empty() {
                let pro_rata_scope = plan.pro_rata_scope();
                bindings
                    .bind(
                        format!("pro_rata{position}_holder"),
                        Identifier::column(&pro_rata_scope, pro_rata::HOLDER.header),
                        ReferenceStyle::Structured,
                    )
                    .bind(
                        format!("pro_rata{position}_new"),
                        Identifier::column(&pro_rata_scope, pro_rata::NEW_SHARES.header),
                        ReferenceStyle::Structured,
                    );
            }
        }
        bindings
    }

    /// Shares held after round `position`: the previous column plus what the
    /// round and its pro-rata allocations issued to the row's holder.
    fn after_round(&self, position: usize) -> Expr {
        let holder = || Expr::var("holder");
        let mut expr = Expr::var(&self.share_keys[position])
            + Expr::sum_if(
                Expr::var(format!("round{position}_holder")),
                holder(),
                Expr::var(format!("round{position}_shares")),
            );
        if !self.ctx.rounds[position].pro_rata.is_empty() {
            expr = expr
                + Expr::sum_if(
                    Expr::var(format!("pro_rata{position}_holder")),
                    holder(),
                    Expr::var(format!("pro_rata{position}_new")),
                );
        }
        expr
    }
}

impl SheetGenerator for ProgressionSheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        self.table.register(layout)
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        out.title(CellRef::new(0, 0), "Cap Table Progression");
        out.table_header(&self.table);
        let bindings = self.bindings();

        let founding = Expr::sum_ifs(
            Expr::var("ledger_quantity"),
            vec![
                (Expr::var("ledger_holder"), Expr::var("holder")),
                (Expr::var("ledger_round_order"), Expr::num(0.0)),
            ],
        );
        let holder_type = Expr::lookup(
            Expr::var("holder"),
            Expr::var("holders_holder"),
            Expr::var("holders_type"),
        );
        let mut formulas = vec![("type".to_string(), holder_type, OutputStyle::Plain)];
        formulas.push(("founding".to_string(), founding, OutputStyle::Shares));
        for position in 0..self.ctx.rounds.len() {
            formulas.push((
                self.share_keys[position + 1].clone(),
                self.after_round(position),
                OutputStyle::Shares,
            ));
        }
        for key in &self.share_keys {
            let percent = Expr::div(
                Expr::var(key),
                Expr::sum(vec![Expr::var(column_total(key))]),
            );
            formulas.push((percent_key(key), percent, OutputStyle::Percent));
        }

        for (row, holder) in self.ctx.doc.holders.iter().enumerate() {
            if let Some(cell) = self.table.cell(row, "holder") {
                out.text(cell, &holder.name);
            }
            for (key, expr, style) in &formulas {
                if let Some(cell) = self.table.cell(row, key) {
                    out.formula(cell, expr, *style, &bindings)?;
                }
            }
        }

        let total_row = self.table.end_row();
        out.label(total_row, "Total");
        for column in self.table.columns.iter().skip(2) {
            let Some(cell) = self.table.cell(0, &column.key) else {
                continue;
            };
            let total = Expr::sum(vec![Expr::var(column_total(&column.key))]);
            out.formula(
                CellRef::new(total_row, cell.col),
                &total,
                column.style,
                &bindings,
            )?;
        }
        out.width(0, 28.0);
        Ok(())
    }
}
