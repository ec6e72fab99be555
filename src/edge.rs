//! The edge data model (spec §3): `(id, label, tuple)` with four designated
//! tuple positions (`source`, `target`, `time`, `duration`) always present,
//! plus an arbitrary schema-defined remainder.

use std::fmt;

use crate::util::types::{Timestamp, VertexType};

/// A single field of the tuple's schema-defined remainder (beyond the four
/// designated positions). Kept as a small closed set rather than a fully
/// generic parameter, per design note 9's "boxed runtime tuple with position
/// indices held in configuration" option.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Str(String),
    Num(f64),
}

impl FieldValue {
    /// casts this field to `f64`, used by the expression language's `Field<position>`
    /// tokens; non-numeric strings that don't parse fail cleanly (no panic)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Num(n) => Some(*n),
            FieldValue::Str(s) => s.parse().ok(),
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Num(n) => n.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::Num(n) => write!(f, "{}", n),
        }
    }
}

/// The heterogeneous, fixed-schema record carried by an edge. `source`,
/// `target`, `time`, `duration` are always present; `extra` holds whatever
/// else the configured schema defines, in schema order.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    pub source: VertexType,
    pub target: VertexType,
    pub time: Timestamp,
    pub duration: f64,
    pub extra: Vec<FieldValue>,
}

impl Tuple {
    pub fn new(source: impl Into<VertexType>, target: impl Into<VertexType>, time: Timestamp, duration: f64) -> Self {
        Self { source: source.into(), target: target.into(), time, duration, extra: Vec::new() }
    }

    pub fn with_extra(mut self, extra: Vec<FieldValue>) -> Self {
        self.extra = extra;
        self
    }

    pub fn end_time(&self) -> Timestamp {
        self.time + self.duration
    }
}

/// A fixed small tuple of labels (possibly empty), e.g. a protocol name plus
/// a port. Stored densely since label arity is small and known per schema.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Label(pub Vec<String>);

impl Label {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.0.get(position).map(|s| s.as_str())
    }
}

impl From<Vec<String>> for Label {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

/// `(id, label, tuple)`. `id` is locally monotonic; across workers edges are
/// identified by `(workerId, id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub id: u64,
    pub worker_id: u32,
    pub label: Label,
    pub tuple: Tuple,
}

impl Edge {
    pub fn new(id: u64, worker_id: u32, label: Label, tuple: Tuple) -> Self {
        Self { id, worker_id, label, tuple }
    }

    pub fn source(&self) -> &VertexType {
        &self.tuple.source
    }

    pub fn target(&self) -> &VertexType {
        &self.tuple.target
    }

    pub fn time(&self) -> Timestamp {
        self.tuple.time
    }

    pub fn end_time(&self) -> Timestamp {
        self.tuple.end_time()
    }

    pub fn global_id(&self) -> (u32, u64) {
        (self.worker_id, self.id)
    }
}

/// Maps raw ingestion tokens (CSV fields, socket lines) onto a [`Tuple`] and
/// [`Label`]. The engine core only needs this interface — concrete line
/// formats (CSV, VAST netflow, ...) are an out-of-scope ingestion adapter,
/// see spec §1/§6.
pub trait Tuplizer {
    /// number of leading tokens that form the label
    fn label_arity(&self) -> usize;

    /// builds a tuple from the tokens following the label; returns `None` on
    /// a malformed record (spec §7: "Malformed input record" -> drop, count)
    fn tuplize(&self, tokens: &[&str]) -> Option<Tuple>;
}
