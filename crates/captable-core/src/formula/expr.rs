//! Formula expression trees.
//!
//! Calculations are written once as [`Expr`] values. Rendering produces the
//! workbook formula template with `{placeholder}` slots; evaluation against
//! numbers gives the preview the same arithmetic the workbook will run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::{Add, Mul, Neg, Sub};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 1,
            BinaryOp::Add | BinaryOp::Sub => 3,
            BinaryOp::Mul => 4,
            BinaryOp::Pow => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Round,
    Min,
    Max,
    If,
    Sum,
    SumIf,
    SumIfs,
    Index,
    Match,
    Today,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::Round => "ROUND",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::If => "IF",
            Function::Sum => "SUM",
            Function::SumIf => "SUMIF",
            Function::SumIfs => "SUMIFS",
            Function::Index => "INDEX",
            Function::Match => "MATCH",
            Function::Today => "TODAY",
        }
    }
}

const PREC_NEG: u8 = 6;
const PREC_ATOM: u8 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    /// A named slot bound to a layout identifier at encoding time.
    Ref(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Division that yields 0 instead of an error; renders as
    /// `IFERROR(a/b,0)`.
    Div { num: Box<Expr>, den: Box<Expr> },
    Call { func: Function, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("placeholder `{0}` has no value")]
    UnboundPlaceholder(String),
    #[error("text cannot be evaluated as a number")]
    Text,
    #[error("{0} is only available in the workbook")]
    Unsupported(&'static str),
}

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Text(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Ref(name.into())
    }

    pub fn div(num: impl Into<Expr>, den: impl Into<Expr>) -> Self {
        Expr::Div {
            num: Box::new(num.into()),
            den: Box::new(den.into()),
        }
    }

    pub fn pow(self, exponent: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Pow, exponent)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn call(func: Function, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    /// `ROUND(expr, digits)`.
    pub fn round(expr: Expr, digits: i32) -> Self {
        Expr::call(Function::Round, vec![expr, Expr::num(f64::from(digits))])
    }

    pub fn min(args: Vec<Expr>) -> Self {
        Expr::call(Function::Min, args)
    }

    pub fn max(args: Vec<Expr>) -> Self {
        Expr::call(Function::Max, args)
    }

    pub fn if_(cond: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Expr::call(Function::If, vec![cond, then.into(), otherwise.into()])
    }

    pub fn sum(args: Vec<Expr>) -> Self {
        Expr::call(Function::Sum, args)
    }

    pub fn sum_if(range: Expr, criteria: Expr, sum_range: Expr) -> Self {
        Expr::call(Function::SumIf, vec![range, criteria, sum_range])
    }

    pub fn sum_ifs(sum_range: Expr, criteria: Vec<(Expr, Expr)>) -> Self {
        let mut args = vec![sum_range];
        for (range, criterion) in criteria {
            args.push(range);
            args.push(criterion);
        }
        Expr::call(Function::SumIfs, args)
    }

    /// `INDEX(result_range, MATCH(key, lookup_range, 0))`.
    pub fn lookup(key: Expr, lookup_range: Expr, result_range: Expr) -> Self {
        let matched = Expr::call(Function::Match, vec![key, lookup_range, Expr::num(0.0)]);
        Expr::call(Function::Index, vec![result_range, matched])
    }

    pub fn today() -> Self {
        Expr::call(Function::Today, Vec::new())
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn placeholders(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_placeholders(&mut out);
        out
    }

    fn collect_placeholders(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ref(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Number(_) | Expr::Text(_) => {}
            Expr::Neg(inner) => inner.collect_placeholders(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_placeholders(out);
                rhs.collect_placeholders(out);
            }
            Expr::Div { num, den } => {
                num.collect_placeholders(out);
                den.collect_placeholders(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_placeholders(out);
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(n) if *n < 0.0 => PREC_NEG,
            Expr::Neg(_) => PREC_NEG,
            Expr::Binary { op, .. } => op.precedence(),
            _ => PREC_ATOM,
        }
    }

    /// Formula template text, without a leading `=`. Placeholders appear as
    /// `{name}`; literal braces inside text are doubled.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, min_prec: u8) {
        let prec = self.precedence();
        let paren = prec < min_prec;
        if paren {
            out.push('(');
        }
        match self {
            Expr::Number(n) => out.push_str(&format_number(*n)),
            Expr::Text(s) => {
                out.push('"');
                for ch in s.chars() {
                    match ch {
                        '"' => out.push_str("\"\""),
                        '{' => out.push_str("{{"),
                        '}' => out.push_str("}}"),
                        _ => out.push(ch),
                    }
                }
                out.push('"');
            }
            Expr::Ref(name) => {
                let _ = write!(out, "{{{name}}}");
            }
            Expr::Neg(inner) => {
                out.push('-');
                inner.write(out, PREC_NEG);
            }
            Expr::Binary { op, lhs, rhs } => {
                lhs.write(out, prec);
                out.push_str(op.symbol());
                rhs.write(out, prec + 1);
            }
            Expr::Div { num, den } => {
                out.push_str("IFERROR(");
                num.write(out, 4);
                out.push('/');
                den.write(out, 5);
                out.push_str(",0)");
            }
            Expr::Call { func, args } => {
                out.push_str(func.name());
                out.push('(');
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    arg.write(out, 0);
                }
                out.push(')');
            }
        }
        if paren {
            out.push(')');
        }
    }

    /// Evaluate with the same semantics the workbook applies: guarded
    /// division yields 0, `ROUND` rounds half away from zero, blank-free
    /// `MIN`/`MAX` of nothing is 0.
    pub fn eval(&self, env: &BTreeMap<String, f64>) -> Result<f64, EvalError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Text(_) => Err(EvalError::Text),
            Expr::Ref(name) => env
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UnboundPlaceholder(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(env)?),
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(env)?;
                let b = rhs.eval(env)?;
                Ok(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Pow => a.powf(b),
                    BinaryOp::Eq => truth(a == b),
                    BinaryOp::Ne => truth(a != b),
                    BinaryOp::Lt => truth(a < b),
                    BinaryOp::Le => truth(a <= b),
                    BinaryOp::Gt => truth(a > b),
                    BinaryOp::Ge => truth(a >= b),
                })
            }
            Expr::Div { num, den } => {
                let d = den.eval(env)?;
                if d == 0.0 {
                    return Ok(0.0);
                }
                let q = num.eval(env)? / d;
                Ok(if q.is_finite() { q } else { 0.0 })
            }
            Expr::Call { func, args } => eval_call(*func, args, env),
        }
    }
}

fn eval_call(func: Function, args: &[Expr], env: &BTreeMap<String, f64>) -> Result<f64, EvalError> {
    let values = |args: &[Expr]| -> Result<Vec<f64>, EvalError> {
        args.iter().map(|a| a.eval(env)).collect()
    };
    match func {
        Function::Round => {
            let vals = values(args)?;
            let x = vals.first().copied().unwrap_or(0.0);
            let digits = vals.get(1).copied().unwrap_or(0.0);
            let factor = 10f64.powi(digits as i32);
            Ok((x * factor).round() / factor)
        }
        Function::Min => Ok(values(args)?.into_iter().reduce(f64::min).unwrap_or(0.0)),
        Function::Max => Ok(values(args)?.into_iter().reduce(f64::max).unwrap_or(0.0)),
        Function::Sum => Ok(values(args)?.into_iter().sum()),
        Function::If => {
            let cond = match args.first() {
                Some(c) => c.eval(env)?,
                None => 0.0,
            };
            let branch = if cond != 0.0 { args.get(1) } else { args.get(2) };
            match branch {
                Some(b) => b.eval(env),
                None => Ok(0.0),
            }
        }
        Function::SumIf | Function::SumIfs | Function::Index | Function::Match | Function::Today => {
            Err(EvalError::Unsupported(func.name()))
        }
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Shortest round-trippable spelling; integers carry no fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(name: &str) -> Expr {
        Expr::var(name)
    }

    #[test]
    fn renders_with_minimal_parentheses() {
        let e = (v("a") + v("b")) * v("c") - v("d") * v("e");
        assert_eq!(e.render(), "({a}+{b})*{c}-{d}*{e}");

        let e = v("a") - (v("b") - v("c"));
        assert_eq!(e.render(), "{a}-({b}-{c})");

        let e = (Expr::num(1.0) + v("r")).pow(Expr::div(v("d"), 365.0)) - 1.0;
        assert_eq!(e.render(), "(1+{r})^IFERROR({d}/365,0)-1");

        let e = -(v("a") + v("b"));
        assert_eq!(e.render(), "-({a}+{b})");
    }

    #[test]
    fn division_is_always_guarded() {
        let e = Expr::round(Expr::div(v("a") * v("b"), Expr::num(1.0) - v("t")), 0);
        assert_eq!(e.render(), "ROUND(IFERROR({a}*{b}/(1-{t}),0),0)");
    }

    #[test]
    fn text_literals_escape_quotes_and_braces() {
        let e = Expr::sum_if(v("range"), Expr::text(r#"say "{hi}""#), v("sum"));
        assert_eq!(e.render(), r#"SUMIF({range},"say ""{{hi}}""",{sum})"#);
    }

    #[test]
    fn numbers_render_compactly() {
        assert_eq!(format_number(2_000_000.0), "2000000");
        assert_eq!(format_number(0.2), "0.2");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn placeholders_in_first_appearance_order() {
        let e = Expr::min(vec![v("rem"), v("lp") + v("own") * v("rem")]);
        assert_eq!(e.placeholders(), vec!["rem", "lp", "own"]);
    }

    #[test]
    fn eval_matches_workbook_semantics() {
        let env: BTreeMap<String, f64> = [("a".to_string(), 2.5), ("z".to_string(), 0.0)]
            .into_iter()
            .collect();
        assert_eq!(Expr::div(v("a"), v("z")).eval(&env).unwrap(), 0.0);
        assert_eq!(Expr::round(v("a"), 0).eval(&env).unwrap(), 3.0);
        assert_eq!(Expr::round(-v("a"), 0).eval(&env).unwrap(), -3.0);
        assert_eq!(
            Expr::if_(v("a").gt(1.0), 10.0, 20.0).eval(&env).unwrap(),
            10.0
        );
        assert_eq!(
            Expr::if_(v("z").equals(0.0), 1.0, 2.0).eval(&env).unwrap(),
            1.0
        );
        assert_eq!(
            Expr::if_(v("z").equals(0.0), 1.0, 2.0).render(),
            "IF({z}=0,1,2)"
        );
        assert_eq!(
            v("missing").eval(&env).unwrap_err(),
            EvalError::UnboundPlaceholder("missing".to_string())
        );
        assert_eq!(
            Expr::today().eval(&env).unwrap_err(),
            EvalError::Unsupported("TODAY")
        );
    }
}
