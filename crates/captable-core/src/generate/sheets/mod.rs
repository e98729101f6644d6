//! One generator per output sheet.

mod ledger;
mod masters;
mod pro_rata;
mod progression;
mod rounds;
mod summary;
mod vesting;
mod waterfall;

use crate::generate::context::GenerationContext;
use crate::generate::options::SheetKind;
use crate::generate::writer::SheetWriter;
use crate::layout::LayoutMap;
use crate::GenerationError;

/// A sheet takes part in both generation phases: it first registers every
/// layout entry it will occupy, then writes its cells once the layout is
/// sealed.
pub(crate) trait SheetGenerator {
    fn kind(&self) -> SheetKind;

    fn register(&self, layout: &mut LayoutMap) -> Result<(), GenerationError>;

    fn write(&self, out: &mut SheetWriter<'_>) -> Result<(), GenerationError>;
}

/// Every sheet, in write order.
pub(crate) fn in_write_order<'a>(
    ctx: &'a GenerationContext<'a>,
) -> Result<Vec<Box<dyn SheetGenerator + 'a>>, GenerationError> {
    let mut sheets: Vec<Box<dyn SheetGenerator + 'a>> =
        Vec::with_capacity(SheetKind::WRITE_ORDER.len());
    for kind in SheetKind::WRITE_ORDER {
        let sheet: Box<dyn SheetGenerator + 'a> = match kind {
            SheetKind::Holders => Box::new(masters::HoldersSheet::new(ctx)),
            SheetKind::Classes => Box::new(masters::ClassesSheet::new(ctx)),
            SheetKind::Terms => Box::new(masters::TermsSheet::new(ctx)),
            SheetKind::Summary => Box::new(summary::SummarySheet::new(ctx)),
            SheetKind::Ledger => Box::new(ledger::LedgerSheet::new(ctx)),
            SheetKind::Rounds => Box::new(rounds::RoundsSheet::new(ctx)),
            SheetKind::ProRata => Box::new(pro_rata::ProRataSheet::new(ctx)),
            SheetKind::Progression => Box::new(progression::ProgressionSheet::new(ctx)),
            SheetKind::Vesting => Box::new(vesting::VestingSheet::new(ctx)),
            SheetKind::Waterfall => Box::new(waterfall::WaterfallSheet::new(ctx)?),
        };
        sheets.push(sheet);
    }
    Ok(sheets)
}
