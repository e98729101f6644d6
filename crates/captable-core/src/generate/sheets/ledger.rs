//! Ledger sheet: one row per instrument and pro-rata allocation, with
//! treasury-stock dilution and fully diluted ownership.

use captable_model::CellRef;

use crate::calc::tsm;
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::context::{scope, Column, GenerationContext, LedgerRow, LedgerSource, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::rounds::{self, fields};
use crate::generate::sheets::{masters, pro_rata, summary, SheetGenerator};
use crate::generate::writer::SheetWriter;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle};
use crate::GenerationError;

pub(crate) const HOLDER: &str = "Holder";
pub(crate) const CLASS: &str = "Class";
pub(crate) const ROUND: &str = "Round";
pub(crate) const ROUND_ORDER: &str = "Round Order";
pub(crate) const INITIAL_QUANTITY: &str = "Initial Quantity";
pub(crate) const INVESTMENT: &str = "Investment";
pub(crate) const SHARES: &str = "Shares";
pub(crate) const NET_DILUTION: &str = "Net Dilution";
pub(crate) const OUTSTANDING: &str = "Outstanding Shares";
pub(crate) const OWNERSHIP: &str = "Ownership % (FD)";

const SHEET: SheetKind = SheetKind::Ledger;

/// The ledger cell holding an instrument's share count.
pub(crate) fn shares_cell(key: &str) -> Identifier {
    Identifier::instrument(key, "ledger_shares")
}

pub(crate) struct LedgerSheet<'a> {
    ctx: &'a GenerationContext<'a>,
    table: TableSpec,
}

impl<'a> LedgerSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let table = TableSpec::new(
            "tblLedger",
            scope::LEDGER,
            SHEET.title(),
            CellRef::new(2, 0),
            vec![
                Column::new("id", "ID", OutputStyle::Plain),
                Column::new("holder", HOLDER, OutputStyle::Plain),
                Column::new("holder_type", "Holder Type", OutputStyle::Plain),
                Column::new("class", CLASS, OutputStyle::Plain),
                Column::new("class_type", "Class Type", OutputStyle::Plain),
                Column::new("round", ROUND, OutputStyle::Plain),
                Column::new("round_order", ROUND_ORDER, OutputStyle::Plain),
                Column::new("initial_quantity", INITIAL_QUANTITY, OutputStyle::Shares),
                Column::new("investment", INVESTMENT, OutputStyle::Currency),
                Column::new(tsm::SHARES, SHARES, OutputStyle::Shares),
                Column::new("conversion_ratio", "Conversion Ratio", OutputStyle::Multiple),
                Column::new(tsm::STRIKE_PRICE, "Strike Price", OutputStyle::Price),
                Column::new(tsm::ITM_SHARES, "ITM Shares", OutputStyle::Shares),
                Column::new(tsm::EXERCISE_PROCEEDS, "Exercise Proceeds", OutputStyle::Currency),
                Column::new(tsm::REPURCHASED_SHARES, "Repurchased Shares", OutputStyle::Shares),
                Column::new("net_dilution", NET_DILUTION, OutputStyle::Shares),
                Column::new("outstanding", OUTSTANDING, OutputStyle::Shares),
                Column::new("fd_shares", "FD Shares", OutputStyle::Shares),
                Column::new("ownership", OWNERSHIP, OutputStyle::Percent),
            ],
            ctx.ledger.len(),
        );
        Self { ctx, table }
    }

    fn bindings(&self, row: &LedgerRow<'_>) -> RefBindings {
        let mut bindings = RefBindings::new();
        self.table.bind_columns(&mut bindings);
        let structured = |table: &str, header: &str| Identifier::column(table, header);
        bindings
            .bind(
                "holders_holder",
                structured(scope::HOLDERS, masters::HOLDER),
                ReferenceStyle::Structured,
            )
            .bind(
                "holders_type",
                structured(scope::HOLDERS, masters::HOLDER_TYPE),
                ReferenceStyle::Structured,
            )
            .bind(
                "classes_class",
                structured(scope::CLASSES, masters::CLASS),
                ReferenceStyle::Structured,
            )
            .bind(
                "classes_type",
                structured(scope::CLASSES, masters::CLASS_TYPE),
                ReferenceStyle::Structured,
            )
            .bind(
                "classes_ratio",
                structured(scope::CLASSES, masters::CONVERSION_RATIO),
                ReferenceStyle::Structured,
            )
            .bind(tsm::CURRENT_PPS, summary::current_pps(), ReferenceStyle::Name)
            .bind(
                "fully_diluted",
                summary::fully_diluted_shares(),
                ReferenceStyle::Name,
            );
        match row.source {
            LedgerSource::Founding => {}
            LedgerSource::Round(_) => {
                bindings.bind(
                    "round_shares",
                    rounds::shares_cell(&row.key),
                    ReferenceStyle::Absolute,
                );
            }
            LedgerSource::ProRata { round, .. } => {
                bindings
                    .bind(
                        "new_shares",
                        pro_rata::new_shares_cell(&row.key),
                        ReferenceStyle::Absolute,
                    )
                    .bind(
                        "round_pps",
                        self.ctx.rounds[round].id(fields::PPS),
                        ReferenceStyle::Name,
                    );
            }
        }
        bindings
    }

    fn cell(&self, index: usize, key: &str) -> Result<CellRef, GenerationError> {
        self.table
            .cell(index, key)
            .ok_or_else(|| GenerationError::GenerationOrder(format!("ledger has no `{key}` column")))
    }

    fn put(
        &self,
        out: &mut SheetWriter<'_>,
        index: usize,
        key: &str,
        expr: Expr,
        bindings: &RefBindings,
    ) -> Result<(), GenerationError> {
        out.formula(self.cell(index, key)?, &expr, self.table.style(key), bindings)
    }

    fn write_row(
        &self,
        out: &mut SheetWriter<'_>,
        index: usize,
        row: &LedgerRow<'_>,
    ) -> Result<(), GenerationError> {
        let b = self.bindings(row);
        let lookup = |key: &str, range: &str, result: &str| {
            Expr::lookup(Expr::var(key), Expr::var(range), Expr::var(result))
        };

        out.text(self.cell(index, "id")?, &row.key);
        out.text(self.cell(index, "holder")?, row.holder);
        out.text(self.cell(index, "class")?, row.class);
        self.put(out, index, "holder_type", lookup("holder", "holders_holder", "holders_type"), &b)?;
        self.put(out, index, "class_type", lookup("class", "classes_class", "classes_type"), &b)?;
        let order = match row.round_index() {
            Some(round) => {
                out.text(self.cell(index, "round")?, self.ctx.rounds[round].name());
                round as f64 + 1.0
            }
            None => 0.0,
        };
        out.number(self.cell(index, "round_order")?, order, OutputStyle::Plain);

        let instrument = row.instrument;
        if let Some(quantity) = instrument.and_then(|i| i.initial_quantity) {
            out.number(self.cell(index, "initial_quantity")?, quantity, OutputStyle::Shares);
        }
        let shares = match row.source {
            LedgerSource::Founding => Expr::var("initial_quantity"),
            LedgerSource::Round(_) => Expr::var("round_shares"),
            LedgerSource::ProRata { .. } => Expr::var("new_shares"),
        };
        self.put(out, index, tsm::SHARES, shares, &b)?;
        match (row.source, instrument) {
            (LedgerSource::ProRata { .. }, _) => {
                let paid = Expr::var(tsm::SHARES) * Expr::var("round_pps");
                self.put(out, index, "investment", paid, &b)?;
            }
            (_, Some(instrument)) => {
                let cell = self.cell(index, "investment")?;
                out.number(cell, instrument.invested(), OutputStyle::Currency);
            }
            (_, None) => out.number(self.cell(index, "investment")?, 0.0, OutputStyle::Currency),
        }
        self.put(
            out,
            index,
            "conversion_ratio",
            lookup("class", "classes_class", "classes_ratio"),
            &b,
        )?;

        let dilutive = self
            .ctx
            .doc
            .class(row.class)
            .is_some_and(|c| c.class_type.is_dilutive_security());
        if let Some(strike) = instrument.and_then(|i| i.strike_price) {
            out.number(self.cell(index, tsm::STRIKE_PRICE)?, strike, OutputStyle::Price);
        }
        if dilutive {
            self.put(out, index, tsm::ITM_SHARES, tsm::itm_shares(), &b)?;
            self.put(out, index, tsm::EXERCISE_PROCEEDS, tsm::exercise_proceeds(), &b)?;
            self.put(out, index, tsm::REPURCHASED_SHARES, tsm::repurchased_shares(), &b)?;
            self.put(out, index, "net_dilution", tsm::net_dilution(), &b)?;
            out.number(self.cell(index, "outstanding")?, 0.0, OutputStyle::Shares);
        } else {
            for key in [
                tsm::ITM_SHARES,
                tsm::EXERCISE_PROCEEDS,
                tsm::REPURCHASED_SHARES,
                "net_dilution",
            ] {
                out.number(self.cell(index, key)?, 0.0, self.table.style(key));
            }
            let converted =
                Expr::round(Expr::var(tsm::SHARES) * Expr::var("conversion_ratio"), 0);
            self.put(out, index, "outstanding", converted, &b)?;
        }
        let fd = Expr::var("outstanding") + Expr::var("net_dilution");
        self.put(out, index, "fd_shares", fd, &b)?;
        let ownership = Expr::div(Expr::var("fd_shares"), Expr::var("fully_diluted"));
        self.put(out, index, "ownership", ownership, &b)
    }
}

impl SheetGenerator for LedgerSheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        self.table.register(layout)?;
        for (index, row) in self.ctx.ledger.iter().enumerate() {
            if let Some(cell) = self.table.cell(index, tsm::SHARES) {
                layout.register_cell(shares_cell(&row.key), SHEET.title(), cell)?;
            }
        }
        Ok(())
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        out.title(CellRef::new(0, 0), "Ledger");
        out.table_header(&self.table);
        for (index, row) in self.ctx.ledger.iter().enumerate() {
            self.write_row(out, index, row)?;
        }
        Ok(())
    }
}
