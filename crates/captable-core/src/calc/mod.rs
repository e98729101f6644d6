//! Calculation strategies.
//!
//! Each algorithm is expressed as [`Expr`] trees over named placeholders.
//! The sheet generators bind those placeholders to layout identifiers; the
//! preview binds them to numbers.

pub mod pro_rata;
mod strategy;
pub mod tsm;
pub mod vesting;
pub mod waterfall;

use crate::formula::{Expr, OutputStyle};

pub use strategy::{ConversionKind, Requirement, Strategy};

/// Round-level placeholders shared by the strategies.
pub mod vars {
    pub const PRE_SHARES: &str = "pre_shares";
    pub const PRE_MONEY: &str = "pre_money";
    pub const POST_MONEY: &str = "post_money";
    pub const PPS: &str = "pps";
    pub const ROUND_DATE: &str = "round_date";
    pub const QUALIFYING_PPS: &str = "qualifying_pps";
}

/// Placeholder for the whole column `key` of the current table, used inside
/// `SUM(...)`.
pub fn column_total(key: &str) -> String {
    format!("all_{key}")
}

/// One column of a generated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Placeholder name other cells in the same row use for this column.
    pub key: &'static str,
    pub header: &'static str,
    pub style: OutputStyle,
}

impl ColumnDef {
    pub const fn new(key: &'static str, header: &'static str, style: OutputStyle) -> Self {
        Self { key, header, style }
    }
}

/// Content of one table cell before layout resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum RowCell {
    Empty,
    Number(f64),
    Text(String),
    Formula(Expr),
    /// The row holder's cumulative shares before the current round.
    HolderSharesBeforeRound,
}

/// Value of a round header cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundValue {
    Empty,
    Literal(f64),
    Formula(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundValues {
    pub pre_money: RoundValue,
    pub post_money: RoundValue,
    pub pps: RoundValue,
}
