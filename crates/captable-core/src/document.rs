//! The input document: a company's capitalization as plain data.
//!
//! The types deserialize from the JSON the CLI reads. Referential integrity
//! is checked by the generator, which reports dangling names as
//! [`GenerationError::UnknownEntity`](crate::GenerationError::UnknownEntity).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapTable {
    pub company: Company,
    #[serde(default)]
    pub holders: Vec<Holder>,
    #[serde(default)]
    pub classes: Vec<SecurityClass>,
    #[serde(default)]
    pub terms: Vec<TermsPackage>,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub rounds: Vec<Round>,
    #[serde(default)]
    pub waterfall_scenarios: Vec<WaterfallScenario>,
}

impl CapTable {
    pub fn holder(&self, name: &str) -> Option<&Holder> {
        self.holders.iter().find(|h| h.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&SecurityClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn terms_package(&self, name: &str) -> Option<&TermsPackage> {
        self.terms.iter().find(|t| t.name == name)
    }

    /// Index of the round called `name`, in document order.
    pub fn round_index(&self, name: &str) -> Option<usize> {
        self.rounds.iter().position(|r| r.name == name)
    }

    /// Instruments issued in `round`, with their display keys.
    pub fn round_instruments<'a>(
        &'a self,
        round: &'a str,
    ) -> impl Iterator<Item = (String, &'a Instrument)> + 'a {
        self.instruments
            .iter()
            .enumerate()
            .filter(move |(_, i)| i.round.as_deref() == Some(round))
            .map(|(idx, i)| (i.key(idx), i))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub incorporation_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price_per_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub name: String,
    #[serde(rename = "type")]
    pub holder_type: HolderType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderType {
    Founder,
    Employee,
    Investor,
    Advisor,
    OptionPool,
}

impl HolderType {
    pub fn label(self) -> &'static str {
        match self {
            HolderType::Founder => "Founder",
            HolderType::Employee => "Employee",
            HolderType::Investor => "Investor",
            HolderType::Advisor => "Advisor",
            HolderType::OptionPool => "Option Pool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityClass {
    pub name: String,
    #[serde(rename = "type")]
    pub class_type: ClassType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    #[serde(default = "one")]
    pub conversion_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    Common,
    Preferred,
    Option,
    Warrant,
    Safe,
    ConvertibleNote,
}

impl ClassType {
    pub fn label(self) -> &'static str {
        match self {
            ClassType::Common => "Common",
            ClassType::Preferred => "Preferred",
            ClassType::Option => "Option",
            ClassType::Warrant => "Warrant",
            ClassType::Safe => "SAFE",
            ClassType::ConvertibleNote => "Convertible Note",
        }
    }

    /// Options and warrants dilute through the treasury stock method instead
    /// of counting as outstanding shares.
    pub fn is_dilutive_security(self) -> bool {
        matches!(self, ClassType::Option | ClassType::Warrant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsPackage {
    pub name: String,
    #[serde(default = "one")]
    pub liquidation_multiple: f64,
    pub participation_type: ParticipationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participation_cap: Option<f64>,
    pub seniority_rank: i64,
    #[serde(default)]
    pub anti_dilution: AntiDilution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationType {
    NonParticipating,
    Participating,
    CappedParticipating,
}

impl ParticipationType {
    pub fn label(self) -> &'static str {
        match self {
            ParticipationType::NonParticipating => "Non-Participating",
            ParticipationType::Participating => "Participating",
            ParticipationType::CappedParticipating => "Capped Participating",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiDilution {
    #[default]
    None,
    BroadBasedWeightedAverage,
    NarrowBasedWeightedAverage,
    FullRatchet,
}

impl AntiDilution {
    pub fn label(self) -> &'static str {
        match self {
            AntiDilution::None => "None",
            AntiDilution::BroadBasedWeightedAverage => "Broad-Based Weighted Average",
            AntiDilution::NarrowBasedWeightedAverage => "Narrow-Based Weighted Average",
            AntiDilution::FullRatchet => "Full Ratchet",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub holder: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrued_interest: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting: Option<VestingTerms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convertible: Option<ConvertibleTerms>,
}

impl Instrument {
    /// Display key: the explicit id, or `#<1-based position>`.
    pub fn key(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("#{}", index + 1),
        }
    }

    /// Cash invested, whether held directly or through convertible terms.
    pub fn invested(&self) -> f64 {
        self.investment_amount
            .or_else(|| self.convertible.as_ref().map(|c| c.investment_amount))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Round {
    pub name: String,
    pub date: NaiveDate,
    pub calculation_type: CalculationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_basis: Option<ValuationBasis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_money_valuation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_money_valuation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_share: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifying_round: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pro_rata: Vec<ProRataParticipation>,
}

impl Round {
    /// Whether the round sets a price of its own, making it usable as a
    /// qualifying round and as the source of the current share price.
    pub fn is_priced(&self) -> bool {
        self.calculation_type == CalculationType::ValuationBased || self.price_per_share.is_some()
    }

    /// Whether the round's post-money valuation cell carries a value.
    pub fn has_post_money(&self) -> bool {
        self.calculation_type == CalculationType::ValuationBased
            || self.post_money_valuation.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    FixedShares,
    TargetPercentage,
    ValuationBased,
    Convertible,
    Safe,
}

impl CalculationType {
    pub fn label(self) -> &'static str {
        match self {
            CalculationType::FixedShares => "Fixed Shares",
            CalculationType::TargetPercentage => "Target Percentage",
            CalculationType::ValuationBased => "Valuation Based",
            CalculationType::Convertible => "Convertible",
            CalculationType::Safe => "SAFE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationBasis {
    PreMoney,
    PostMoney,
}

impl ValuationBasis {
    pub fn label(self) -> &'static str {
        match self {
            ValuationBasis::PreMoney => "Pre-Money",
            ValuationBasis::PostMoney => "Post-Money",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingTerms {
    pub grant_date: NaiveDate,
    pub cliff_days: u32,
    pub vesting_period_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertibleTerms {
    pub investment_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_cap: Option<f64>,
    #[serde(default)]
    pub valuation_cap_type: ValuationCapType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub interest_type: InterestType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationCapType {
    #[default]
    PreConversion,
    PostConversionOwn,
    PostConversionTotal,
}

impl ValuationCapType {
    pub fn label(self) -> &'static str {
        match self {
            ValuationCapType::PreConversion => "Pre-Conversion",
            ValuationCapType::PostConversionOwn => "Post-Conversion (Own)",
            ValuationCapType::PostConversionTotal => "Post-Conversion (Total)",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestType {
    #[default]
    Simple,
    Compound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProRataParticipation {
    pub holder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub rights: ProRataRights,
    #[serde(default)]
    pub exercise: ProRataExercise,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_pro_rata_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_percentage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProRataRights {
    None,
    Standard,
    Super,
}

impl ProRataRights {
    pub fn label(self) -> &'static str {
        match self {
            ProRataRights::None => "None",
            ProRataRights::Standard => "Standard",
            ProRataRights::Super => "Super",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProRataExercise {
    #[default]
    Full,
    Partial,
}

impl ProRataExercise {
    pub fn label(self) -> &'static str {
        match self {
            ProRataExercise::Full => "Full",
            ProRataExercise::Partial => "Partial",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallScenario {
    pub name: String,
    pub exit_value: f64,
}

fn one() -> f64 {
    1.0
}
