use serde::{Deserialize, Serialize};

use crate::GenerationError;

/// The sheets of a generated workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SheetKind {
    Summary,
    Ledger,
    Rounds,
    #[serde(rename = "Pro-Rata Allocations")]
    ProRata,
    #[serde(rename = "Cap Table Progression")]
    Progression,
    Vesting,
    Waterfall,
    Holders,
    Classes,
    Terms,
}

impl SheetKind {
    /// Dependency order: every sheet only references sheets before it, or
    /// sheets whose entries it reads through the sealed layout.
    pub const WRITE_ORDER: [SheetKind; 10] = [
        SheetKind::Holders,
        SheetKind::Classes,
        SheetKind::Terms,
        SheetKind::Summary,
        SheetKind::Ledger,
        SheetKind::Rounds,
        SheetKind::ProRata,
        SheetKind::Progression,
        SheetKind::Vesting,
        SheetKind::Waterfall,
    ];

    pub const DEFAULT_PRESENTATION_ORDER: [SheetKind; 10] = [
        SheetKind::Summary,
        SheetKind::Ledger,
        SheetKind::Rounds,
        SheetKind::ProRata,
        SheetKind::Progression,
        SheetKind::Vesting,
        SheetKind::Waterfall,
        SheetKind::Holders,
        SheetKind::Classes,
        SheetKind::Terms,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SheetKind::Summary => "Summary",
            SheetKind::Ledger => "Ledger",
            SheetKind::Rounds => "Rounds",
            SheetKind::ProRata => "Pro-Rata Allocations",
            SheetKind::Progression => "Cap Table Progression",
            SheetKind::Vesting => "Vesting",
            SheetKind::Waterfall => "Waterfall",
            SheetKind::Holders => "Holders",
            SheetKind::Classes => "Classes",
            SheetKind::Terms => "Terms",
        }
    }
}

/// Knobs for a generation call.
///
/// Loaded from JSON by the command line; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerateOptions {
    /// Tab order of the output. Sheets left out follow in default order.
    pub presentation_order: Option<Vec<SheetKind>>,
    /// Built-in table style applied to every table.
    pub table_style: String,
    /// Mark the workbook for a full recalculation when it is opened.
    pub force_full_calc: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            presentation_order: None,
            table_style: "TableStyleMedium2".to_string(),
            force_full_calc: true,
        }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.table_style.trim().is_empty() {
            return Err(GenerationError::InvalidOptions(
                "table_style must not be empty".to_string(),
            ));
        }
        if let Some(order) = &self.presentation_order {
            for (idx, kind) in order.iter().enumerate() {
                if order[..idx].contains(kind) {
                    return Err(GenerationError::InvalidOptions(format!(
                        "sheet `{}` appears more than once in presentation_order",
                        kind.title()
                    )));
                }
            }
        }
        Ok(())
    }

    /// The full tab order.
    pub fn sheet_order(&self) -> Vec<SheetKind> {
        let mut order: Vec<SheetKind> = self.presentation_order.clone().unwrap_or_default();
        for kind in SheetKind::DEFAULT_PRESENTATION_ORDER {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_follow_the_standard_tab_order() {
        let options = GenerateOptions::default();
        assert!(options.force_full_calc);
        assert_eq!(options.sheet_order(), SheetKind::DEFAULT_PRESENTATION_ORDER.to_vec());
    }

    #[test]
    fn partial_order_is_completed() {
        let options: GenerateOptions =
            serde_json::from_str(r#"{"presentation_order": ["Waterfall", "Cap Table Progression"]}"#)
                .unwrap();
        let order = options.sheet_order();
        assert_eq!(&order[..3], &[SheetKind::Waterfall, SheetKind::Progression, SheetKind::Summary]);
        assert_eq!(order.len(), 10);
        assert_eq!(options.table_style, "TableStyleMedium2");
    }

    #[test]
    fn duplicates_and_unknown_fields_are_rejected() {
        let options = GenerateOptions {
            presentation_order: Some(vec![SheetKind::Ledger, SheetKind::Ledger]),
            ..GenerateOptions::default()
        };
        assert!(matches!(
            options.validate().unwrap_err(),
            GenerationError::InvalidOptions(_)
        ));
        assert!(serde_json::from_str::<GenerateOptions>(r#"{"tab_order": []}"#).is_err());
    }
}
