//! Formula evaluator
//!
//! Quantity formulas are small arithmetic expressions over named roof
//! measurements, written either with placeholders
//! (`{{ measure.surface_squares }} * 1.10`) or bare names
//! (`surface_squares * 1.10`). Formulas are tokenized, parsed into an AST
//! and interpreted; nothing outside numbers, the measurement names,
//! `+ - * / ( ) ,` and a handful of helper functions is accepted.

mod lexer;
mod parser;

pub use parser::{BinaryOp, Expr, Function, MAX_DEPTH};

use crate::measurement::MeasurementSet;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Longest formula accepted
pub const MAX_FORMULA_LEN: usize = 1024;

/// Measurement names a formula may reference
pub const MEASURE_FIELDS: [&str; 8] = [
    "surface_area_sf",
    "surface_squares",
    "perimeter_lf",
    "ridge_lf",
    "valley_lf",
    "hip_lf",
    "rake_lf",
    "eave_lf",
];

/// Results are rounded to this many decimal places to strip binary
/// floating-point noise (`20 * 1.10` evaluates to exactly 22)
const RESULT_DECIMALS: i32 = 6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("formula exceeds {0} characters")]
    TooLong(usize),

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unterminated placeholder starting at position {0}")]
    UnterminatedPlaceholder(usize),

    #[error("unsupported placeholder '{0}'")]
    UnsupportedPlaceholder(String),

    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{function}' called with {found} arguments")]
    Arity { function: String, found: usize },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

/// Named values a formula is evaluated against
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormulaContext {
    values: BTreeMap<String, f64>,
}

impl FormulaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context exposing the measurement names in [`MEASURE_FIELDS`]
    pub fn from_measurement(set: &MeasurementSet) -> Self {
        Self::new()
            .with("surface_area_sf", set.total_area_sqft)
            .with("surface_squares", set.total_squares)
            .with("perimeter_lf", set.perimeter_ft)
            .with("ridge_lf", set.ridge_ft)
            .with("valley_lf", set.valley_ft)
            .with("hip_lf", set.hip_ft)
            .with("rake_lf", set.rake_ft)
            .with("eave_lf", set.eave_ft)
    }

    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        values
            .into_iter()
            .fold(Self::new(), |ctx, (name, value)| ctx.with(name, value))
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into().to_ascii_lowercase(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// A parsed formula, reusable across contexts
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        if source.len() > MAX_FORMULA_LEN {
            return Err(FormulaError::TooLong(MAX_FORMULA_LEN));
        }
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse_tokens(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Measurement names the formula references, in first-use order
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.expr.collect_names(&mut names);
        names
    }

    pub fn evaluate(&self, ctx: &FormulaContext) -> Result<f64, FormulaError> {
        let value = eval(&self.expr, ctx)?;
        let scale = 10f64.powi(RESULT_DECIMALS);
        let rounded = (value * scale).round() / scale;
        if rounded.is_finite() {
            // avoid reporting -0
            Ok(rounded + 0.0)
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

fn eval(expr: &Expr, ctx: &FormulaContext) -> Result<f64, FormulaError> {
    let value = match expr {
        Expr::Number(value) => *value,
        Expr::Placeholder(name) => ctx.get(name).unwrap_or(0.0),
        Expr::Variable(name) => ctx
            .get(name)
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone()))?,
        Expr::Negate(inner) => -eval(inner, ctx)?,
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, ctx)?;
            let rhs = eval(rhs, ctx)?;
            match op {
                BinaryOp::Add => lhs + rhs,
                BinaryOp::Sub => lhs - rhs,
                BinaryOp::Mul => lhs * rhs,
                BinaryOp::Div => {
                    if rhs == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    lhs / rhs
                }
            }
        }
        Expr::Call { function, args } => {
            function.check_arity(args.len())?;
            let values = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            match function {
                Function::Ceil => values[0].ceil(),
                Function::Floor => values[0].floor(),
                Function::Round => values[0].round(),
                Function::Abs => values[0].abs(),
                Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            }
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::NonFinite)
    }
}

/// Parse and evaluate in one step
pub fn evaluate(source: &str, ctx: &FormulaContext) -> Result<f64, FormulaError> {
    Formula::parse(source)?.evaluate(ctx)
}

/// Evaluate, substituting `fallback` on any failure.
///
/// Failures are logged; callers that need to tell a failure apart from an
/// intentional value use [`evaluate`] instead.
pub fn evaluate_or(source: &str, ctx: &FormulaContext, fallback: f64) -> f64 {
    match evaluate(source, ctx) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Formula '{}' failed ({}), using {}", source, e, fallback);
            fallback
        }
    }
}

/// Textually replace every `{{ measure.<name> }}` with its value (0 when
/// absent). Used to show the expanded arithmetic alongside a result.
pub fn substitute_placeholders(source: &str, ctx: &FormulaContext) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let Some(close) = after.find("}}") else {
            out.push_str(after);
            return out;
        };

        let inner = after[2..close].trim();
        match inner.strip_prefix("measure.") {
            Some(name) => {
                let value = ctx.get(&name.trim().to_ascii_lowercase()).unwrap_or(0.0);
                out.push_str(&value.to_string());
            }
            None => out.push_str(&after[..close + 2]),
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}
