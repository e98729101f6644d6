//! Vesting sheet: vested and unvested shares of every grant with a vesting
//! schedule, as of the evaluation date.

use captable_model::CellRef;

use crate::calc::vesting;
use crate::document::{Instrument, VestingTerms};
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::context::{scope, Column, GenerationContext, TableSpec};
use crate::generate::options::SheetKind;
use crate::generate::sheets::{ledger, summary, SheetGenerator};
use crate::generate::writer::SheetWriter;
use crate::layout::{LayoutMap, ReferenceStyle};
use crate::GenerationError;

const SHEET: SheetKind = SheetKind::Vesting;
const UNVESTED_SHARES: &str = "unvested_shares";

struct Grant<'a> {
    key: &'a str,
    instrument: &'a Instrument,
    terms: &'a VestingTerms,
}

pub(crate) struct VestingSheet<'a> {
    grants: Vec<Grant<'a>>,
    table: TableSpec,
}

impl<'a> VestingSheet<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        let grants: Vec<Grant<'a>> = ctx
            .ledger
            .iter()
            .filter_map(|row| {
                let instrument = row.instrument?;
                let terms = instrument.vesting.as_ref()?;
                Some(Grant {
                    key: &row.key,
                    instrument,
                    terms,
                })
            })
            .collect();
        let table = TableSpec::new(
            "tblVesting",
            scope::VESTING,
            SHEET.title(),
            CellRef::new(2, 0),
            vec![
                Column::new("id", "ID", OutputStyle::Plain),
                Column::new("holder", "Holder", OutputStyle::Plain),
                Column::new("class", "Class", OutputStyle::Plain),
                Column::new(vesting::GRANT_DATE, "Grant Date", OutputStyle::Date),
                Column::new(vesting::CLIFF_DAYS, "Cliff (Days)", OutputStyle::Plain),
                Column::new(vesting::VESTING_DAYS, "Vesting Period (Days)", OutputStyle::Plain),
                Column::new(vesting::TOTAL_GRANTED, "Total Granted", OutputStyle::Shares),
                Column::new(vesting::DAYS_ELAPSED, "Days Elapsed", OutputStyle::Plain),
                Column::new(vesting::VESTED_FRACTION, "Vested %", OutputStyle::Percent),
                Column::new(vesting::VESTED_SHARES, "Vested Shares", OutputStyle::Shares),
                Column::new(UNVESTED_SHARES, "Unvested Shares", OutputStyle::Shares),
            ],
            grants.len(),
        );
        Self { grants, table }
    }
}

impl SheetGenerator for VestingSheet<'_> {
    fn kind(&self) -> SheetKind {
        SHEET
    }

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        self.table.register(layout)
    }

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError> {
        out.title(CellRef::new(0, 0), "Vesting");
        out.table_header(&self.table);

        for (row, grant) in self.grants.iter().enumerate() {
            let cell = |key: &str| {
                self.table.cell(row, key).ok_or_else(|| {
                    GenerationError::GenerationOrder(format!("vesting table has no `{key}` column"))
                })
            };
            let mut bindings = RefBindings::new();
            self.table.bind_columns(&mut bindings);
            bindings
                .bind(
                    vesting::EVALUATION_DATE,
                    summary::evaluation_date(),
                    ReferenceStyle::Name,
                )
                .bind("ledger_shares", ledger::shares_cell(grant.key), ReferenceStyle::Absolute);

            out.text(cell("id")?, grant.key);
            out.text(cell("holder")?, &grant.instrument.holder);
            out.text(cell("class")?, &grant.instrument.class);
            out.date(cell(vesting::GRANT_DATE)?, grant.terms.grant_date);
            out.number(
                cell(vesting::CLIFF_DAYS)?,
                f64::from(grant.terms.cliff_days),
                OutputStyle::Plain,
            );
            out.number(
                cell(vesting::VESTING_DAYS)?,
                f64::from(grant.terms.vesting_period_days),
                OutputStyle::Plain,
            );

            let zero_period = grant.terms.vesting_period_days == 0;
            let formulas = [
                (vesting::TOTAL_GRANTED, Expr::var("ledger_shares")),
                (vesting::DAYS_ELAPSED, vesting::days_elapsed()),
                (vesting::VESTED_FRACTION, vesting::vested_fraction(zero_period)),
                (vesting::VESTED_SHARES, vesting::vested_shares()),
                (UNVESTED_SHARES, vesting::unvested_shares()),
            ];
            for (key, expr) in formulas {
                out.formula(cell(key)?, &expr, self.table.style(key), &bindings)?;
            }
        }
        out.width(0, 16.0);
        Ok(())
    }
}
