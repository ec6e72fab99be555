//! 4.C Expression/predicate language: an infix token list compiled by
//! precedence-climbing/shunting-yard to postfix, evaluated against a
//! `(key, tuple)` pair with a stack of doubles. Evaluation never panics or
//! short-circuits with an exception — any token that cannot evaluate (a
//! missing feature, a first-time `Prev`, division by zero) makes the whole
//! expression evaluate to `(false, _)` with no side effects, per spec §4.C.

mod parser;

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::edge::Tuple;
use crate::feature::{Feature, FeatureMap};

pub use parser::{parse_infix, FieldResolver, ParseError};

/// which designated or schema position a `Field`/`Prev` token reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldPosition {
    Source,
    Target,
    Time,
    Duration,
    Extra(usize),
}

impl FieldPosition {
    fn extract(&self, tuple: &Tuple) -> Option<f64> {
        match self {
            FieldPosition::Source => tuple.source.parse().ok(),
            FieldPosition::Target => tuple.target.parse().ok(),
            FieldPosition::Time => Some(tuple.time),
            FieldPosition::Duration => Some(tuple.duration),
            FieldPosition::Extra(idx) => tuple.extra.get(*idx).and_then(|v| v.as_f64()),
        }
    }
}

/// a way to pull a single number out of a [`Feature`]; `Func` tokens carry
/// one of these alongside the feature id they read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureAccessor {
    /// `SingleFeature`/`BooleanFeature` value
    Scalar,
    /// frequency of the highest-ranked key of a `TopKFeature`
    TopFrequency,
}

impl FeatureAccessor {
    fn extract(&self, feature: &Feature) -> Option<f64> {
        match (self, feature) {
            (FeatureAccessor::Scalar, Feature::Single(v)) => Some(*v),
            (FeatureAccessor::Scalar, Feature::Boolean(b)) => Some(if *b { 1.0 } else { 0.0 }),
            (FeatureAccessor::TopFrequency, Feature::TopK { frequencies, .. }) => frequencies.first().copied(),
            _ => None,
        }
    }
}

/// one token of the compiled/uncompiled expression
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Field(FieldPosition),
    Prev(FieldPosition),
    Func(String, FeatureAccessor),
    Op(Operator),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Operator {
    fn precedence(&self) -> u8 {
        match self {
            Operator::Pow => 4,
            Operator::Mul | Operator::Div => 3,
            Operator::Add | Operator::Sub => 2,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge | Operator::Eq => 1,
        }
    }

    /// only `^` is right-associative
    fn right_associative(&self) -> bool {
        matches!(self, Operator::Pow)
    }

    fn apply(&self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            Operator::Add => Some(lhs + rhs),
            Operator::Sub => Some(lhs - rhs),
            Operator::Mul => Some(lhs * rhs),
            Operator::Div => {
                if rhs == 0.0 {
                    None
                } else {
                    Some(lhs / rhs)
                }
            }
            Operator::Pow => Some(lhs.powf(rhs)),
            Operator::Lt => Some(if lhs < rhs { 1.0 } else { 0.0 }),
            Operator::Le => Some(if lhs <= rhs { 1.0 } else { 0.0 }),
            Operator::Gt => Some(if lhs > rhs { 1.0 } else { 0.0 }),
            Operator::Ge => Some(if lhs >= rhs { 1.0 } else { 0.0 }),
            Operator::Eq => Some(if (lhs - rhs).abs() < f64::EPSILON { 1.0 } else { 0.0 }),
        }
    }
}

/// per-key history of previously-seen field values, used by `Prev` tokens
#[derive(Default)]
pub struct PrevValues {
    values: Mutex<HashMap<(String, FieldPosition), f64>>,
}

impl PrevValues {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str, position: FieldPosition) -> Option<f64> {
        self.values.lock().get(&(key.to_string(), position)).copied()
    }

    /// records the current value, to be read back as `Prev` on the *next* evaluation
    pub fn record(&self, key: &str, position: FieldPosition, value: f64) {
        self.values.lock().insert((key.to_string(), position), value);
    }
}

/// a compiled expression: infix tokens converted once (at construction) to
/// reverse-Polish form via the shunting-yard algorithm
pub struct Expression {
    postfix: Vec<Token>,
}

impl Expression {
    /// compiles an infix token list to postfix using precedence climbing
    /// (shunting-yard). Operators only ever combine already-pushed operands,
    /// so malformed infix (e.g. two operators in a row) surfaces as an
    /// evaluate-time stack underflow rather than a compile error — matching
    /// the "no exception propagation" contract of this subsystem.
    pub fn compile(infix: Vec<Token>) -> Self {
        let mut output = Vec::with_capacity(infix.len());
        let mut operators: Vec<Operator> = Vec::new();

        for token in infix {
            match token {
                Token::Op(op) => {
                    while let Some(top) = operators.last() {
                        let pops = top.precedence() > op.precedence()
                            || (top.precedence() == op.precedence() && !op.right_associative());
                        if pops {
                            output.push(Token::Op(operators.pop().unwrap()));
                        } else {
                            break;
                        }
                    }
                    operators.push(op);
                }
                other => output.push(other),
            }
        }
        while let Some(op) = operators.pop() {
            output.push(Token::Op(op));
        }

        Self { postfix: output }
    }

    /// evaluates the compiled expression against `(key, tuple)`. Returns
    /// `(false, _)` without side effects if any token cannot evaluate.
    pub fn evaluate(
        &self,
        key: &str,
        tuple: &Tuple,
        features: &FeatureMap,
        prev: &PrevValues,
    ) -> (bool, f64) {
        let mut stack: Vec<f64> = Vec::with_capacity(self.postfix.len());

        for token in &self.postfix {
            let value = match token {
                Token::Number(n) => Some(*n),
                Token::Field(pos) => pos.extract(tuple),
                Token::Prev(pos) => prev.get(key, *pos),
                Token::Func(id, accessor) => features.at(key, id).ok().and_then(|f| accessor.extract(&f)),
                Token::Op(op) => {
                    let rhs = stack.pop();
                    let lhs = stack.pop();
                    match (lhs, rhs) {
                        (Some(lhs), Some(rhs)) => op.apply(lhs, rhs),
                        _ => None,
                    }
                }
            };

            match value {
                Some(v) => stack.push(v),
                None => return (false, 0.0),
            }
        }

        match stack.pop() {
            Some(result) if stack.is_empty() => (true, result),
            _ => (false, 0.0),
        }
    }
}
