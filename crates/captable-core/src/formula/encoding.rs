//! Formula encodings and their resolution against a sealed layout.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::formula::expr::{format_number, Expr};
use crate::layout::{Identifier, LayoutMap, ReferenceStyle};
use crate::GenerationError;

/// How a value is presented, and for shares, how it is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum OutputStyle {
    Shares,
    Currency,
    Percent,
    Price,
    Plain,
    Date,
    Multiple,
}

impl OutputStyle {
    pub const ALL: [OutputStyle; 7] = [
        OutputStyle::Shares,
        OutputStyle::Currency,
        OutputStyle::Percent,
        OutputStyle::Price,
        OutputStyle::Plain,
        OutputStyle::Date,
        OutputStyle::Multiple,
    ];

    pub fn number_format(self) -> Option<&'static str> {
        match self {
            OutputStyle::Shares => Some("#,##0"),
            OutputStyle::Currency => Some("$#,##0"),
            OutputStyle::Percent => Some("0.00%"),
            OutputStyle::Price => Some("$#,##0.0000"),
            OutputStyle::Plain => None,
            OutputStyle::Date => Some("yyyy-mm-dd"),
            OutputStyle::Multiple => Some("0.00\"x\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRef {
    pub placeholder: String,
    pub identifier: Identifier,
    pub reference_style: ReferenceStyle,
}

/// Placeholder → layout identifier assignments available to a formula.
///
/// A binding set may be shared by many formulas; each encoding keeps only
/// the placeholders its expression uses.
#[derive(Debug, Clone, Default)]
pub struct RefBindings(BTreeMap<String, (Identifier, ReferenceStyle)>);

impl RefBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        placeholder: impl Into<String>,
        identifier: Identifier,
        style: ReferenceStyle,
    ) -> &mut Self {
        self.0.insert(placeholder.into(), (identifier, style));
        self
    }

    pub fn with(
        mut self,
        placeholder: impl Into<String>,
        identifier: Identifier,
        style: ReferenceStyle,
    ) -> Self {
        self.bind(placeholder, identifier, style);
        self
    }

    pub fn get(&self, placeholder: &str) -> Option<&(Identifier, ReferenceStyle)> {
        self.0.get(placeholder)
    }
}

/// A formula template plus everything needed to resolve it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaEncoding {
    pub is_calculated: bool,
    pub template: String,
    pub dependency_refs: Vec<DependencyRef>,
    pub output_style: OutputStyle,
}

/// A resolved cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Formula text without the leading `=`.
    Formula(String),
    Number(f64),
}

impl FormulaEncoding {
    /// Encode `expr`, taking a dependency for each placeholder in order of
    /// first appearance.
    pub fn from_expr(
        expr: &Expr,
        output_style: OutputStyle,
        bindings: &RefBindings,
    ) -> Result<Self, GenerationError> {
        let dependency_refs = expr
            .placeholders()
            .into_iter()
            .map(|placeholder| {
                let (identifier, reference_style) = bindings.get(&placeholder).cloned().ok_or_else(
                    || GenerationError::UnboundPlaceholder {
                        placeholder: placeholder.clone(),
                    },
                )?;
                Ok(DependencyRef {
                    placeholder,
                    identifier,
                    reference_style,
                })
            })
            .collect::<Result<Vec<_>, GenerationError>>()?;

        Ok(Self {
            is_calculated: true,
            template: expr.render(),
            dependency_refs,
            output_style,
        })
    }

    /// A literal number written as a value, not a formula.
    pub fn literal(value: f64, output_style: OutputStyle) -> Self {
        Self {
            is_calculated: false,
            template: format_number(value),
            dependency_refs: Vec::new(),
            output_style,
        }
    }

    /// Resolve against a sealed layout.
    ///
    /// Every dependency resolves before the template is touched, so a single
    /// bad reference fails the whole formula.
    pub fn resolve(&self, layout: &LayoutMap) -> Result<Resolved, GenerationError> {
        if !self.is_calculated {
            let value = self
                .template
                .parse::<f64>()
                .map_err(|_| GenerationError::TemplateMismatch {
                    template: self.template.clone(),
                    detail: "literal encoding is not a number".to_string(),
                })?;
            return Ok(Resolved::Number(value));
        }

        let mut resolved: BTreeMap<&str, String> = BTreeMap::new();
        for dep in &self.dependency_refs {
            let text = layout
                .resolve(&dep.identifier, dep.reference_style)
                .map_err(|err| match err {
                    GenerationError::UnresolvedReference { identifier, .. } => {
                        GenerationError::UnresolvedReference {
                            identifier,
                            placeholder: Some(dep.placeholder.clone()),
                        }
                    }
                    other => other,
                })?;
            if resolved.insert(dep.placeholder.as_str(), text).is_some() {
                return Err(self.mismatch(format!(
                    "placeholder `{}` has more than one dependency",
                    dep.placeholder
                )));
            }
        }

        let segments = parse_template(&self.template).map_err(|detail| self.mismatch(detail))?;
        for segment in &segments {
            if let Segment::Placeholder(name) = segment {
                if !resolved.contains_key(name.as_str()) {
                    return Err(self.mismatch(format!("placeholder `{name}` has no dependency")));
                }
            }
        }
        for dep in &self.dependency_refs {
            let used = segments
                .iter()
                .any(|s| matches!(s, Segment::Placeholder(name) if *name == dep.placeholder));
            if !used {
                return Err(self.mismatch(format!(
                    "dependency `{}` does not appear in the template",
                    dep.placeholder
                )));
            }
        }

        audit_divisions(&self.template)?;

        let mut text = String::with_capacity(self.template.len());
        for segment in &segments {
            match segment {
                Segment::Literal(s) => text.push_str(s),
                Segment::Placeholder(name) => {
                    if let Some(reference) = resolved.get(name.as_str()) {
                        text.push_str(reference);
                    }
                }
            }
        }

        if self.output_style == OutputStyle::Shares && !is_wrapped_in_round(&text) {
            text = format!("ROUND({text},0)");
        }
        Ok(Resolved::Formula(text))
    }

    fn mismatch(&self, detail: String) -> GenerationError {
        GenerationError::TemplateMismatch {
            template: self.template.clone(),
            detail,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Split a template into literal text and `{placeholder}` slots; `{{` and
/// `}}` are literal braces.
fn parse_template(template: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(format!("unterminated placeholder `{{{name}`")),
                    }
                }
                if name.is_empty() {
                    return Err("empty placeholder".to_string());
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name));
            }
            '}' => return Err("unbalanced `}`".to_string()),
            _ => literal.push(ch),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Reject any `/` that is not nested inside an `IFERROR(` call. String
/// literals and placeholder slots are skipped.
fn audit_divisions(template: &str) -> Result<(), GenerationError> {
    let bytes = template.as_bytes();
    let mut guards: Vec<bool> = Vec::new();
    let mut in_string = false;
    let mut in_placeholder = false;
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        if in_string {
            if b == b'"' {
                in_string = false;
            }
        } else if in_placeholder {
            if b == b'}' {
                in_placeholder = false;
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' if bytes.get(idx + 1) == Some(&b'{') => idx += 1,
                b'{' => in_placeholder = true,
                b'(' => guards.push(template[..idx].ends_with("IFERROR")),
                b')' => {
                    guards.pop();
                }
                b'/' if !guards.contains(&true) => {
                    return Err(GenerationError::UnguardedDivision {
                        template: template.to_string(),
                    })
                }
                _ => {}
            }
        }
        idx += 1;
    }
    Ok(())
}

/// Whether the whole formula is a single `ROUND(...)` call.
fn is_wrapped_in_round(formula: &str) -> bool {
    let Some(rest) = formula.strip_prefix("ROUND(") else {
        return false;
    };
    let mut depth = 1usize;
    let mut in_string = false;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return idx + 1 == rest.len();
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use captable_model::CellRef;
    use pretty_assertions::assert_eq;

    fn layout() -> LayoutMap {
        let mut layout = LayoutMap::new();
        layout
            .register_named_range(
                Identifier::round("Seed", "pre_round_shares"),
                "Seed_PreRoundShares",
                "Rounds",
                CellRef::new(6, 1),
            )
            .unwrap();
        layout
            .register_named_range(
                Identifier::round("Seed", "pre_money"),
                "Seed_PreMoney",
                "Rounds",
                CellRef::new(4, 1),
            )
            .unwrap();
        layout
            .register_table(
                "tblRound_Seed",
                "Rounds",
                CellRef::new(14, 0),
                vec![
                    (
                        Identifier::column("round[Seed]", "Investment"),
                        "Investment".to_string(),
                    ),
                    (
                        Identifier::column("round[Seed]", "Shares"),
                        "Shares".to_string(),
                    ),
                ],
                2,
            )
            .unwrap();
        layout.seal();
        layout
    }

    fn bindings() -> RefBindings {
        RefBindings::new()
            .with(
                "inv",
                Identifier::column("round[Seed]", "Investment"),
                ReferenceStyle::ThisRow,
            )
            .with(
                "pre_shares",
                Identifier::round("Seed", "pre_round_shares"),
                ReferenceStyle::Name,
            )
            .with(
                "pre_money",
                Identifier::round("Seed", "pre_money"),
                ReferenceStyle::Name,
            )
    }

    #[test]
    fn resolves_share_formula_with_rounding() {
        let inv = Expr::var("inv");
        let expr = Expr::div(
            inv.clone() * Expr::var("pre_shares"),
            Expr::var("pre_money") + inv,
        );
        let enc = FormulaEncoding::from_expr(&expr, OutputStyle::Shares, &bindings()).unwrap();
        let names: Vec<&str> = enc
            .dependency_refs
            .iter()
            .map(|d| d.placeholder.as_str())
            .collect();
        assert_eq!(names, vec!["inv", "pre_shares", "pre_money"]);

        let resolved = enc.resolve(&layout()).unwrap();
        assert_eq!(
            resolved,
            Resolved::Formula(
                "ROUND(IFERROR(tblRound_Seed[[#This Row],[Investment]]*Seed_PreRoundShares/(Seed_PreMoney+tblRound_Seed[[#This Row],[Investment]]),0),0)"
                    .to_string()
            )
        );
        assert_eq!(enc.resolve(&layout()).unwrap(), resolved);
    }

    #[test]
    fn already_rounded_share_formulas_are_not_wrapped_twice() {
        let expr = Expr::round(Expr::var("pre_shares"), 0);
        let enc = FormulaEncoding::from_expr(&expr, OutputStyle::Shares, &bindings()).unwrap();
        assert_eq!(
            enc.resolve(&layout()).unwrap(),
            Resolved::Formula("ROUND(Seed_PreRoundShares,0)".to_string())
        );

        let expr = Expr::round(Expr::var("pre_shares"), 0) + 1.0;
        let enc = FormulaEncoding::from_expr(&expr, OutputStyle::Shares, &bindings()).unwrap();
        assert_eq!(
            enc.resolve(&layout()).unwrap(),
            Resolved::Formula("ROUND(ROUND(Seed_PreRoundShares,0)+1,0)".to_string())
        );
    }

    #[test]
    fn literals_resolve_to_numbers() {
        let enc = FormulaEncoding::literal(1_250_000.0, OutputStyle::Shares);
        assert_eq!(enc.resolve(&layout()).unwrap(), Resolved::Number(1_250_000.0));
    }

    #[test]
    fn unbound_placeholders_fail_encoding() {
        let err = FormulaEncoding::from_expr(&Expr::var("nope"), OutputStyle::Plain, &bindings())
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnboundPlaceholder { ref placeholder } if placeholder == "nope"));
    }

    #[test]
    fn failed_dependency_reports_placeholder_and_identifier() {
        let b = RefBindings::new().with(
            "pps",
            Identifier::round("Series A", "pps"),
            ReferenceStyle::Name,
        );
        let enc = FormulaEncoding::from_expr(&Expr::var("pps"), OutputStyle::Price, &b).unwrap();
        let err = enc.resolve(&layout()).unwrap_err();
        match err {
            GenerationError::UnresolvedReference {
                identifier,
                placeholder,
            } => {
                assert_eq!(identifier, "round[Series A].pps");
                assert_eq!(placeholder.as_deref(), Some("pps"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn template_and_dependencies_must_match() {
        let mut enc = FormulaEncoding::from_expr(
            &Expr::var("pre_shares"),
            OutputStyle::Plain,
            &bindings(),
        )
        .unwrap();
        enc.template = "{pre_shares}+{other}".to_string();
        assert!(matches!(
            enc.resolve(&layout()).unwrap_err(),
            GenerationError::TemplateMismatch { .. }
        ));

        enc.template = "1".to_string();
        assert!(matches!(
            enc.resolve(&layout()).unwrap_err(),
            GenerationError::TemplateMismatch { .. }
        ));
    }

    #[test]
    fn unguarded_division_is_rejected() {
        let mut enc = FormulaEncoding::from_expr(
            &Expr::var("pre_shares"),
            OutputStyle::Plain,
            &bindings(),
        )
        .unwrap();
        enc.template = "{pre_shares}/2".to_string();
        assert!(matches!(
            enc.resolve(&layout()).unwrap_err(),
            GenerationError::UnguardedDivision { .. }
        ));

        enc.template = "IFERROR(MAX({pre_shares}/2,1),0)".to_string();
        assert!(enc.resolve(&layout()).is_ok());

        enc.template = r#"IF({pre_shares}>0,"a/b",0)"#.to_string();
        assert!(enc.resolve(&layout()).is_ok());
    }
}
