//! Per-call generation plan shared by every sheet.

use captable_model::CellRef;

use crate::calc::{column_total, ColumnDef, Strategy};
use crate::document::{CapTable, Instrument, ProRataParticipation, Round, WaterfallScenario};
use crate::formula::{Expr, OutputStyle, RefBindings};
use crate::generate::options::GenerateOptions;
use crate::layout::{Identifier, LayoutMap, ReferenceStyle, SlugRegistry};
use crate::{calc, GenerationError};

/// Table scopes and well-known headers other sheets reference.
pub(crate) mod scope {
    pub const HOLDERS: &str = "holders";
    pub const CLASSES: &str = "classes";
    pub const TERMS: &str = "terms";
    pub const LEDGER: &str = "ledger";
    pub const ROUND_SUMMARY: &str = "round_summary";
    pub const PROGRESSION: &str = "progression";
    pub const VESTING: &str = "vesting";
}

/// Placeholders for the holder's shares before the current round.
pub(crate) const PROGRESSION_HOLDERS: &str = "progression_holders";
pub(crate) const PROGRESSION_PRIOR: &str = "progression_prior";
pub(crate) const ROW_HOLDER: &str = "holder";

/// Where the current price per share comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CurrentPps {
    Literal(f64),
    /// The price per share of the round at this index.
    Round(usize),
    Zero,
}

#[derive(Debug)]
pub(crate) struct ProRataPlan<'a> {
    pub participation: &'a ProRataParticipation,
    pub class: String,
    /// Ledger key of the allocation.
    pub key: String,
}

#[derive(Debug)]
pub(crate) struct RoundPlan<'a> {
    pub index: usize,
    pub round: &'a Round,
    pub slug: String,
    pub strategy: Strategy,
    pub instruments: Vec<(String, &'a Instrument)>,
    pub pro_rata: Vec<ProRataPlan<'a>>,
}

impl RoundPlan<'_> {
    pub fn name(&self) -> &str {
        &self.round.name
    }

    pub fn id(&self, field: &str) -> Identifier {
        Identifier::round(&self.round.name, field)
    }

    /// Defined name of a round value, e.g. `Series_A_PPS`.
    pub fn defined_name(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.slug)
    }

    pub fn table_name(&self) -> String {
        format!("tblRound_{}", self.slug)
    }

    pub fn table_scope(&self) -> String {
        format!("round[{}]", self.round.name)
    }

    pub fn pro_rata_table_name(&self) -> String {
        format!("tblProRata_{}", self.slug)
    }

    pub fn pro_rata_scope(&self) -> String {
        format!("pro_rata[{}]", self.round.name)
    }

    pub fn progression_header(&self) -> String {
        format!("After {}", self.round.name)
    }
}

#[derive(Debug)]
pub(crate) struct ScenarioPlan<'a> {
    pub scenario: &'a WaterfallScenario,
    pub slug: String,
}

impl ScenarioPlan<'_> {
    pub fn id(&self, field: &str) -> Identifier {
        Identifier::scenario(&self.scenario.name, field)
    }

    pub fn exit_name(&self) -> String {
        format!("Exit_{}_Value", self.slug)
    }

    pub fn pref_table(&self) -> String {
        format!("tblWaterfall_{}_Pref", self.slug)
    }

    pub fn common_table(&self) -> String {
        format!("tblWaterfall_{}_Common", self.slug)
    }

    pub fn pref_scope(&self) -> String {
        format!("waterfall[{}].pref", self.scenario.name)
    }

    pub fn common_scope(&self) -> String {
        format!("waterfall[{}].common", self.scenario.name)
    }

    /// Cell holding what is left after the preference class at `position`.
    pub fn remaining_after(&self, position: usize) -> Identifier {
        Identifier::new(format!(
            "scenario[{}].pref[{position}].remaining_after",
            self.scenario.name
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LedgerSource {
    Founding,
    Round(usize),
    ProRata { round: usize, slot: usize },
}

#[derive(Debug)]
pub(crate) struct LedgerRow<'a> {
    pub key: String,
    pub holder: &'a str,
    pub class: &'a str,
    pub instrument: Option<&'a Instrument>,
    pub source: LedgerSource,
}

impl LedgerRow<'_> {
    pub fn round_index(&self) -> Option<usize> {
        match self.source {
            LedgerSource::Founding => None,
            LedgerSource::Round(round) | LedgerSource::ProRata { round, .. } => Some(round),
        }
    }
}

/// Everything the sheets need to agree on, computed once per call.
#[derive(Debug)]
pub(crate) struct GenerationContext<'a> {
    pub doc: &'a CapTable,
    pub options: &'a GenerateOptions,
    pub rounds: Vec<RoundPlan<'a>>,
    pub scenarios: Vec<ScenarioPlan<'a>>,
    pub ledger: Vec<LedgerRow<'a>>,
    pub current_pps: CurrentPps,
}

impl<'a> GenerationContext<'a> {
    /// Build the plan for a checked document; `strategies` has one entry per
    /// round.
    pub fn new(
        doc: &'a CapTable,
        options: &'a GenerateOptions,
        strategies: &[Strategy],
    ) -> Result<Self, GenerationError> {
        let mut round_slugs = SlugRegistry::new();
        let mut rounds = Vec::with_capacity(doc.rounds.len());
        for (index, (round, strategy)) in doc.rounds.iter().zip(strategies).enumerate() {
            let instruments: Vec<(String, &Instrument)> =
                doc.round_instruments(&round.name).collect();
            let mut pro_rata = Vec::new();
            let participants = round.pro_rata.iter().filter(|p| calc::pro_rata::participates(p));
            for participation in participants {
                let class = match (&participation.class, instruments.first()) {
                    (Some(class), _) => class.clone(),
                    (None, Some((_, first))) => first.class.clone(),
                    (None, None) => {
                        return Err(GenerationError::missing(
                            Some(&round.name),
                            Some(&participation.holder),
                            "class",
                        ))
                    }
                };
                pro_rata.push(ProRataPlan {
                    participation,
                    class,
                    key: format!("{}/pro-rata/{}", round.name, participation.holder),
                });
            }
            rounds.push(RoundPlan {
                index,
                round,
                slug: round_slugs.slug(&round.name),
                strategy: *strategy,
                instruments,
                pro_rata,
            });
        }

        let mut scenario_slugs = SlugRegistry::new();
        let scenarios = doc
            .waterfall_scenarios
            .iter()
            .map(|scenario| ScenarioPlan {
                scenario,
                slug: scenario_slugs.slug(&scenario.name),
            })
            .collect();

        let mut ledger = Vec::new();
        for (index, instrument) in doc.instruments.iter().enumerate() {
            let source = match &instrument.round {
                None => LedgerSource::Founding,
                Some(round) => LedgerSource::Round(doc.round_index(round).ok_or_else(|| {
                    GenerationError::unknown(
                        "round",
                        round,
                        format!("instrument `{}`", instrument.key(index)),
                    )
                })?),
            };
            ledger.push(LedgerRow {
                key: instrument.key(index),
                holder: &instrument.holder,
                class: &instrument.class,
                instrument: Some(instrument),
                source,
            });
        }
        for plan in &rounds {
            for (slot, allocation) in plan.pro_rata.iter().enumerate() {
                ledger.push(LedgerRow {
                    key: allocation.key.clone(),
                    holder: &allocation.participation.holder,
                    class: doc
                        .class(&allocation.class)
                        .map(|c| c.name.as_str())
                        .ok_or_else(|| {
                            GenerationError::unknown(
                                "class",
                                &allocation.class,
                                format!("pro-rata `{}`", allocation.key),
                            )
                        })?,
                    instrument: None,
                    source: LedgerSource::ProRata {
                        round: plan.index,
                        slot,
                    },
                });
            }
        }

        let current_pps = match doc.company.current_price_per_share {
            Some(pps) => CurrentPps::Literal(pps),
            None => match doc.rounds.iter().rposition(Round::is_priced) {
                Some(index) => CurrentPps::Round(index),
                None => {
                    let has_dilutive = ledger.iter().any(|row| {
                        doc.class(row.class)
                            .is_some_and(|c| c.class_type.is_dilutive_security())
                    });
                    if has_dilutive {
                        return Err(GenerationError::missing(None, None, "current_price_per_share"));
                    }
                    CurrentPps::Zero
                }
            },
        };

        Ok(Self {
            doc,
            options,
            rounds,
            scenarios,
            ledger,
            current_pps,
        })
    }

    /// Progression column holding every holder's shares before round
    /// `index`.
    pub fn prior_progression_column(&self, index: usize) -> Identifier {
        match index.checked_sub(1).and_then(|prev| self.rounds.get(prev)) {
            Some(prev) => Identifier::column(scope::PROGRESSION, &prev.progression_header()),
            None => Identifier::column(scope::PROGRESSION, "Founding"),
        }
    }

    /// `SUMIF(progression holders, this row's holder, prior column)`.
    pub fn prior_holdings_expr() -> Expr {
        Expr::sum_if(
            Expr::var(PROGRESSION_HOLDERS),
            Expr::var(ROW_HOLDER),
            Expr::var(PROGRESSION_PRIOR),
        )
    }

    pub fn bind_prior_holdings(&self, bindings: &mut RefBindings, round_index: usize) {
        bindings
            .bind(
                PROGRESSION_HOLDERS,
                Identifier::column(scope::PROGRESSION, "Holder"),
                ReferenceStyle::Structured,
            )
            .bind(
                PROGRESSION_PRIOR,
                self.prior_progression_column(round_index),
                ReferenceStyle::Structured,
            );
    }
}

/// A table column whose header may be built at run time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Column {
    pub key: String,
    pub header: String,
    pub style: OutputStyle,
}

impl Column {
    pub fn new(key: impl Into<String>, header: impl Into<String>, style: OutputStyle) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            style,
        }
    }
}

impl From<ColumnDef> for Column {
    fn from(def: ColumnDef) -> Self {
        Column::new(def.key, def.header, def.style)
    }
}

/// A table's position and columns, shared by the register and write phases.
#[derive(Debug, Clone)]
pub(crate) struct TableSpec {
    pub name: String,
    pub scope: String,
    pub sheet: &'static str,
    pub origin: CellRef,
    pub columns: Vec<Column>,
    /// Number of data rows, at least one.
    pub rows: u32,
}

impl TableSpec {
    pub fn new(
        name: impl Into<String>,
        scope: impl Into<String>,
        sheet: &'static str,
        origin: CellRef,
        columns: Vec<Column>,
        rows: usize,
    ) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            sheet,
            origin,
            columns,
            rows: (rows as u32).max(1),
        }
    }

    pub fn column_id(&self, header: &str) -> Identifier {
        Identifier::column(&self.scope, header)
    }

    pub fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError> {
        let columns = self
            .columns
            .iter()
            .map(|c| (self.column_id(&c.header), c.header.clone()))
            .collect();
        layout.register_table(&self.name, self.sheet, self.origin, columns, self.rows)
    }

    /// Data cell `row` of column `key`.
    pub fn cell(&self, row: usize, key: &str) -> Option<CellRef> {
        let col = self.columns.iter().position(|c| c.key == key)? as u32;
        Some(CellRef::new(
            self.origin.row + 1 + row as u32,
            self.origin.col + col,
        ))
    }

    /// Row after the last data row.
    pub fn end_row(&self) -> u32 {
        self.origin.row + self.rows + 1
    }

    /// Bind every column under its key (same row) and under
    /// [`column_total`] of its key (whole column).
    pub fn bind_columns(&self, bindings: &mut RefBindings) {
        for column in &self.columns {
            bindings
                .bind(&column.key, self.column_id(&column.header), ReferenceStyle::ThisRow)
                .bind(
                    column_total(&column.key),
                    self.column_id(&column.header),
                    ReferenceStyle::Structured,
                );
        }
    }

    pub fn style(&self, key: &str) -> OutputStyle {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .map_or(OutputStyle::Plain, |c| c.style)
    }
}
