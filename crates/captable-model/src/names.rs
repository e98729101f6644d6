use thiserror::Error;

/// Longest defined name Excel accepts, in characters.
pub const MAX_DEFINED_NAME_LEN: usize = 255;

/// A workbook-scoped defined name pointing at a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedName {
    pub name: String,
    /// Target without a leading `=`, e.g. `Rounds!$B$8`.
    pub refers_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinedNameError {
    #[error("name is empty")]
    Empty,
    #[error("name has {0} characters, more than {MAX_DEFINED_NAME_LEN}")]
    TooLong(usize),
    #[error("name cannot start with `{0}`")]
    BadStart(char),
    #[error("name cannot contain `{0}`")]
    BadChar(char),
    #[error("name reads as a cell reference")]
    CellReference,
}

/// Whether `text` would be read as an A1 (`AB12`) or R1C1 (`R`, `C3`,
/// `R1C2`) reference instead of a name.
pub fn looks_like_cell_reference(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    a1_like(&upper) || r1c1_like(&upper)
}

fn a1_like(upper: &str) -> bool {
    let digits = upper.trim_start_matches(|c: char| c.is_ascii_uppercase());
    let letters = upper.len() - digits.len();
    (1..=3).contains(&letters) && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn r1c1_like(upper: &str) -> bool {
    let rest = match upper.strip_prefix('R') {
        Some(after_r) => {
            let rest = after_r.trim_start_matches(|c: char| c.is_ascii_digit());
            if rest.is_empty() {
                return true;
            }
            rest
        }
        None => upper,
    };
    rest.strip_prefix('C')
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Check a defined name against Excel's rules: a letter, `_` or `\` first,
/// then letters, digits, `_` and `.`, and nothing that reads as a cell
/// reference.
pub fn validate_defined_name(name: &str) -> Result<(), DefinedNameError> {
    let mut chars = name.chars();
    let first = chars.next().ok_or(DefinedNameError::Empty)?;
    let len = name.chars().count();
    if len > MAX_DEFINED_NAME_LEN {
        return Err(DefinedNameError::TooLong(len));
    }
    if !(first.is_alphabetic() || first == '_' || first == '\\') {
        return Err(DefinedNameError::BadStart(first));
    }
    if let Some(bad) = chars.find(|&c| !(c.is_alphanumeric() || c == '_' || c == '.')) {
        return Err(DefinedNameError::BadChar(bad));
    }
    if looks_like_cell_reference(name) {
        return Err(DefinedNameError::CellReference);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cell_reference_lookalikes() {
        for text in ["A1", "xfd99", "R1C1", "r12", "R", "C", "rc", "C7"] {
            assert!(looks_like_cell_reference(text), "{text}");
        }
        for text in ["Seed_PPS", "ABCD1", "Round1_PPS", "Rounds", "Classes", "R1X"] {
            assert!(!looks_like_cell_reference(text), "{text}");
        }
    }

    #[test]
    fn generated_names_validate() {
        for name in ["CompanyName", "Series_A_PPS", "_2024_Seed_PreMoney", "Name.With.Dots"] {
            assert_eq!(validate_defined_name(name), Ok(()), "{name}");
        }
        assert_eq!(validate_defined_name(""), Err(DefinedNameError::Empty));
        assert_eq!(validate_defined_name("1Name"), Err(DefinedNameError::BadStart('1')));
        assert_eq!(validate_defined_name("My Name"), Err(DefinedNameError::BadChar(' ')));
        assert_eq!(validate_defined_name("AB12"), Err(DefinedNameError::CellReference));
        assert_eq!(
            validate_defined_name(&"a".repeat(MAX_DEFINED_NAME_LEN + 1)),
            Err(DefinedNameError::TooLong(MAX_DEFINED_NAME_LEN + 1))
        );
    }
}
