//! Summary sheet: company inputs, ledger totals and one line per round.

use captable_model::CellRef;

use crate::calc::vars;
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::context::{scope, Column, CurrentPps, GenerationContext, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::ledger;
use crate::generate::sheets::rounds::fields;
use crate::generate::sheets::SheetGenerator;
use crate::generate::writer::SheetWriter;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle};
use crate::GenerationError;

pub(crate) fn evaluation_date() -> Identifier {
    Identifier::company("evaluation_date")
}

pub(crate) fn current_pps() -> Identifier {
    Identifier::company("current_pps")
}

pub(crate) fn fully_diluted_shares() -> Identifier {
    Identifier::total("fully_diluted_shares")
}

const SHEET: SheetKind = SheetKind::Summary;

/// (row, label, identifier, defined name)
const COMPANY_ROWS: [(u32, &str, &str, &str); 4] = [
    (1, "Company", "name", "CompanyName"),
    (2, "Incorporation Date", "incorporation_date", "IncorporationDate"),
    (3, "Evaluation Date", "evaluation_date", "EvaluationDate"),
    (4, "Current Price Per Share", "current_pps", "CurrentPPS"),
];

/// (row, label, identifier, defined name, summed ledger column)
const TOTAL_ROWS: [(u32, &str, &str, &str, &str); 3] = [
    (7, "Outstanding Shares", "outstanding_shares", "OutstandingShares", ledger::OUTSTANDING),
    (8, "Net Dilution", "net_dilution", "NetDilution", ledger::NET_DILUTION),
    (10, "Total Invested", "total_invested", "TotalInvested", ledger::INVESTMENT),
];
const FULLY_DILUTED_ROW: u32 = 9;
const VALUE_COL: u32 = 1;

pub(crate) struct SummarySheet<'a> {
    ctx: &'a GenerationContext<'a>,
    rounds: TableSpec,
}

impl<'a> SummarySheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let rounds = TableSpec::new(
            "tblRoundSummary",
            scope::ROUND_SUMMARY,
            SHEET.title(),
            CellRef::new(13, 0),
            vec![
                Column::new("round", "Round", OutputStyle::Plain),
                Column::new("date", "Date", OutputStyle::Date),
                Column::new("calculation_type", "Calculation Type", OutputStyle::Plain),
                Column::new("pre_money", "Pre-Money", OutputStyle::Currency),
                Column::new("post_money", "Post-Money", OutputStyle::Currency),
                Column::new("pps", "Price Per Share", OutputStyle::Price),
                Column::new("pre_round_shares", "Pre-Round Shares", OutputStyle::Shares),
                Column::new("shares_issued", "Shares Issued", OutputStyle::Shares),
                Column::new("post_round_shares", "Post-Round Shares", OutputStyle::Shares),
            ],
            ctx.rounds.len(),
        );
        Self { ctx, rounds }
    }

    fn value_cell(row: u32) -> CellRef {
        CellRef::new(row, VALUE_COL)
    }
}

impl SheetGenerator for SummarySheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        for (row, _, field, name) in COMPANY_ROWS {
            layout.register_named_range(
                Identifier::company(field),
                name,
                SHEET.title(),
                Self::value_cell(row),
            )?;
        }
        for (row, _, field, name, _) in TOTAL_ROWS {
            layout.register_named_range(
                Identifier::total(field),
                name,
                SHEET.title(),
                Self::value_cell(row),
            )?;
        }
        layout.register_named_range(
            fully_diluted_shares(),
            "FullyDilutedShares",
            SHEET.title(),
            Self::value_cell(FULLY_DILUTED_ROW),
        )?;
        self.rounds.register(layout)
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        let company = &self.ctx.doc.company;
        out.title(CellRef::new(0, 0), &format!("{} Cap Table", company.name));
        for (row, label, _, _) in COMPANY_ROWS {
            out.label(row, label);
        }
        out.text(Self::value_cell(1), &company.name);
        out.date(Self::value_cell(2), company.incorporation_date);
        match company.evaluation_date {
            Some(date) => out.date(Self::value_cell(3), date),
            None => out.formula(
                Self::value_cell(3),
                &Expr::today(),
                OutputStyle::Date,
                &RefBindings::new(),
            )?,
        }
        let pps_cell = Self::value_cell(4);
        match self.ctx.current_pps {
            CurrentPps::Literal(pps) => out.number(pps_cell, pps, OutputStyle::Price),
            CurrentPps::Zero => out.number(pps_cell, 0.0, OutputStyle::Price),
            CurrentPps::Round(index) => {
                let round = &self.ctx.rounds[index];
                let bindings =
                    RefBindings::new().with(vars::PPS, round.id(fields::PPS), ReferenceStyle::Name);
                out.formula(pps_cell, &Expr::var(vars::PPS), OutputStyle::Price, &bindings)?;
            }
        }

        out.title(CellRef::new(6, 0), "Totals");
        for (row, label, _, _, column) in TOTAL_ROWS {
            out.label(row, label);
            let bindings = RefBindings::new().with(
                "column",
                Identifier::column(scope::LEDGER, column),
                ReferenceStyle::Structured,
            );
            let style = if column == ledger::INVESTMENT {
                OutputStyle::Currency
            } else {
                OutputStyle::Shares
            };
            let sum = Expr::sum(vec![Expr::var("column")]);
            out.formula(Self::value_cell(row), &sum, style, &bindings)?;
        }
        out.label(FULLY_DILUTED_ROW, "Fully Diluted Shares");
        let bindings = RefBindings::new()
            .with(
                "outstanding",
                Identifier::total("outstanding_shares"),
                ReferenceStyle::Name,
            )
            .with("net", Identifier::total("net_dilution"), ReferenceStyle::Name);
        out.formula(
            Self::value_cell(FULLY_DILUTED_ROW),
            &(Expr::var("outstanding") + Expr::var("net")),
            OutputStyle::Shares,
            &bindings,
        )?;

        out.title(CellRef::new(12, 0), "Rounds");
        out.table_header(&self.rounds);
        for (row, round) in self.ctx.rounds.iter().enumerate() {
            let mut bindings = RefBindings::new();
            self.rounds.bind_columns(&mut bindings);
            for field in [
                fields::DATE,
                fields::PRE_MONEY,
                fields::POST_MONEY,
                fields::PPS,
                fields::PRE_ROUND_SHARES,
                fields::SHARES_ISSUED,
            ] {
                bindings.bind(format!("round_{field}"), round.id(field), ReferenceStyle::Name);
            }
            for column in &self.rounds.columns {
                let Some(cell) = self.rounds.cell(row, &column.key) else {
                    continue;
                };
                match column.key.as_str() {
                    "round" => out.text(cell, round.name()),
                    "calculation_type" => out.text(cell, round.round.calculation_type.label()),
                    "post_round_shares" => out.formula(
                        cell,
                        &(Expr::var("pre_round_shares") + Expr::var("shares_issued")),
                        column.style,
                        &bindings,
                    )?,
                    key => out.formula(
                        cell,
                        &Expr::var(format!("round_{key}")),
                        column.style,
                        &bindings,
                    )?,
                }
            }
        }
        out.width(0, 28.0);
        out.width(1, 20.0);
        Ok(())
    }
}
