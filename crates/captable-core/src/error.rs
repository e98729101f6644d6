use captable_model::WorkbookError;
use captable_xlsx::XlsxWriteError;
use thiserror::Error;

use crate::formula::EvalError;
use crate::layout::ReferenceStyle;

/// Every failure a generation call can produce. All of them are fatal: a
/// failed call writes nothing.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unresolved reference `{identifier}`{}", placeholder_suffix(.placeholder))]
    UnresolvedReference {
        identifier: String,
        placeholder: Option<String>,
    },
    #[error("name collision on `{name}`: already bound to {existing}, requested {requested}")]
    NameCollision {
        name: String,
        existing: String,
        requested: String,
    },
    #[error("missing calculation input `{field}`{}", location_suffix(.round, .instrument))]
    MissingCalculationInput {
        round: Option<String>,
        instrument: Option<String>,
        field: &'static str,
    },
    #[error("generation order violation: {0}")]
    GenerationOrder(String),
    #[error("invalid calculation input in {context}: {reason}")]
    InvalidCalculationInput { context: String, reason: String },
    #[error("round `{round}` computes {shares} shares for `{holder}`")]
    NegativeShares {
        round: String,
        holder: String,
        shares: f64,
    },
    #[error("round `{round}` cannot qualify on `{qualifying_round}`: it is not an earlier round")]
    CircularRoundReference {
        round: String,
        qualifying_round: String,
    },
    #[error("unknown {kind} `{name}` referenced by {referenced_by}")]
    UnknownEntity {
        kind: &'static str,
        name: String,
        referenced_by: String,
    },
    #[error("`{identifier}` cannot be referenced in {style} style")]
    UnsupportedReferenceStyle {
        identifier: String,
        style: ReferenceStyle,
    },
    #[error("placeholder `{{{placeholder}}}` has no binding")]
    UnboundPlaceholder { placeholder: String },
    #[error("template `{template}` does not match its dependencies: {detail}")]
    TemplateMismatch { template: String, detail: String },
    #[error("formula `{template}` divides outside IFERROR")]
    UnguardedDivision { template: String },
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("invalid generate options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Evaluation(#[from] EvalError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error(transparent)]
    Write(#[from] XlsxWriteError),
}

impl GenerationError {
    pub(crate) fn missing(
        round: Option<&str>,
        instrument: Option<&str>,
        field: &'static str,
    ) -> Self {
        GenerationError::MissingCalculationInput {
            round: round.map(str::to_string),
            instrument: instrument.map(str::to_string),
            field,
        }
    }

    pub(crate) fn invalid(context: impl Into<String>, reason: impl Into<String>) -> Self {
        GenerationError::InvalidCalculationInput {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(
        kind: &'static str,
        name: impl Into<String>,
        referenced_by: impl Into<String>,
    ) -> Self {
        GenerationError::UnknownEntity {
            kind,
            name: name.into(),
            referenced_by: referenced_by.into(),
        }
    }
}

fn placeholder_suffix(placeholder: &Option<String>) -> String {
    match placeholder {
        Some(p) => format!(" (placeholder `{{{p}}}`)"),
        None => String::new(),
    }
}

fn location_suffix(round: &Option<String>, instrument: &Option<String>) -> String {
    match (round, instrument) {
        (Some(r), Some(i)) => format!(" for instrument `{i}` in round `{r}`"),
        (Some(r), None) => format!(" for round `{r}`"),
        (None, Some(i)) => format!(" for instrument `{i}`"),
        (None, None) => String::new(),
    }
}
