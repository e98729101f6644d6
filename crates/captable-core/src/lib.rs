//! Cap table workbook generation.
//!
//! [`generate`] turns a [`CapTable`] document into a workbook in which every
//! derived number is a live formula. Generation runs in two phases: every
//! sheet first registers the cells, named ranges and tables it owns in a
//! [`LayoutMap`], then writes its cells with formulas resolved against the
//! sealed map. A formula naming anything the map does not know is an error,
//! not a broken reference in the output.
//!
//! [`Preview`] evaluates the same expression trees numerically.

pub mod calc;
pub mod dates;
pub mod document;
mod error;
pub mod formula;
mod generate;
pub mod layout;
mod preview;

pub use document::{
    AntiDilution, CalculationType, CapTable, ClassType, Company, ConvertibleTerms, Holder,
    HolderType, Instrument, InterestType, ParticipationType, ProRataExercise,
    ProRataParticipation, ProRataRights, Round, SecurityClass, TermsPackage, ValuationBasis,
    ValuationCapType, VestingTerms, WaterfallScenario,
};
pub use error::GenerationError;
pub use formula::{EvalError, Expr, FormulaEncoding, OutputStyle, RefBindings};
#[cfg(not(target_arch = "wasm32"))]
pub use generate::generate_to_path;
pub use generate::options::{GenerateOptions, SheetKind};
pub use generate::{generate, generate_to_vec};
pub use layout::{Identifier, LayoutMap, ReferenceStyle};
pub use preview::{Holding, IssuedShares, Preview, RoundPreview};
