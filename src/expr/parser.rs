//! Text front-end for the expression language: tokenizes an infix string via
//! the `expr.pest` grammar into the `Token` list `Expression::compile` expects.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use super::{FeatureAccessor, FieldPosition, Operator, Token};

#[derive(Parser)]
#[grammar = "expr/expr.pest"]
struct ExprGrammar;

/// resolves a bare identifier (a `field` token) to the tuple position it reads
pub trait FieldResolver {
    fn resolve_field(&self, name: &str) -> Option<FieldPosition>;
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed expression: {0}")]
    Grammar(#[from] Box<pest::error::Error<Rule>>),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("unrecognized operator `{0}`")]
    UnknownOperator(String),
}

/// parses `input` into an infix token list, ready for `Expression::compile`.
/// `resolver` maps bare identifiers (`field`, `prev(field)`) to tuple positions;
/// `func(id)` always reads a feature's scalar value.
pub fn parse_infix(input: &str, resolver: &dyn FieldResolver) -> Result<Vec<Token>, ParseError> {
    let mut pairs = ExprGrammar::parse(Rule::expression, input).map_err(|e| ParseError::Grammar(Box::new(e)))?;
    let expression = pairs.next().expect("expression rule always produced on success");

    let mut tokens = Vec::new();
    for term in expression.into_inner() {
        if term.as_rule() == Rule::EOI {
            continue;
        }
        tokens.push(token_from_term(term, resolver)?);
    }
    Ok(tokens)
}

fn token_from_term(term: Pair<Rule>, resolver: &dyn FieldResolver) -> Result<Token, ParseError> {
    let inner = term.into_inner().next().expect("term always wraps exactly one alternative");
    match inner.as_rule() {
        Rule::number => Ok(Token::Number(inner.as_str().parse().expect("number rule only matches valid floats"))),
        Rule::field => {
            let name = inner.as_str();
            resolver.resolve_field(name).map(Token::Field).ok_or_else(|| ParseError::UnknownField(name.to_string()))
        }
        Rule::prev_call => {
            let name = inner.into_inner().next().expect("prev_call always wraps one ident").as_str();
            resolver.resolve_field(name).map(Token::Prev).ok_or_else(|| ParseError::UnknownField(name.to_string()))
        }
        Rule::func_call => {
            let name = inner.into_inner().next().expect("func_call always wraps one ident").as_str();
            Ok(Token::Func(name.to_string(), FeatureAccessor::Scalar))
        }
        Rule::op => {
            let op = match inner.as_str() {
                "+" => Operator::Add,
                "-" => Operator::Sub,
                "*" => Operator::Mul,
                "/" => Operator::Div,
                "^" => Operator::Pow,
                "<" => Operator::Lt,
                "<=" => Operator::Le,
                ">" => Operator::Gt,
                ">=" => Operator::Ge,
                "==" => Operator::Eq,
                other => return Err(ParseError::UnknownOperator(other.to_string())),
            };
            Ok(Token::Op(op))
        }
        other => unreachable!("term grammar cannot produce {:?}", other),
    }
}
