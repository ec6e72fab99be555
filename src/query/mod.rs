//! 4.F Subgraph query compiler: a builder that accumulates edge and vertex
//! constraints and `finalize()`s them once into an ordered, time-bounded
//! `SubgraphQuery` the partial-match table can execute against.

use std::collections::HashMap;

use thiserror::Error;

use crate::feature::{Feature, FeatureMap};
use crate::util::types::TimeRange;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("query has no edges")]
    NoEdges,
    #[error("edge `{0}` has no time bound on either side and cannot be resolved")]
    UnboundedTimeRange(String),
    #[error("vertex constraint references unknown variable `{0}`")]
    UnknownVariable(String),
}

/// a constraint attached to a bound vertex variable, checked against a
/// process-wide (record key `""`) feature. Grounded in
/// `original_source/SamSrc/sam/VertexConstraintChecker.hpp`'s `In`/`NotIn`.
#[derive(Clone, Debug, PartialEq)]
pub enum VertexConstraintExpression {
    /// the vertex must be among the top-ranked keys of a `TopKFeature`
    In { feature_id: String },
    /// the vertex must NOT be among the top-ranked keys of a `TopKFeature`
    NotIn { feature_id: String },
}

impl VertexConstraintExpression {
    fn satisfied(&self, features: &FeatureMap, vertex: &str) -> bool {
        match self {
            VertexConstraintExpression::In { feature_id } => topk_contains(features, feature_id, vertex),
            VertexConstraintExpression::NotIn { feature_id } => !topk_contains(features, feature_id, vertex),
        }
    }
}

/// checks the global (record key `""`) `TopKFeature` named `feature_id` for
/// `vertex`; a missing feature fails the check, matching the original's
/// "feature doesn't exist -> false" rule
fn topk_contains(features: &FeatureMap, feature_id: &str, vertex: &str) -> bool {
    features
        .evaluate("", feature_id, |feature| match feature {
            Feature::TopK { keys, .. } => keys.iter().any(|key| key == vertex),
            _ => false,
        })
        .unwrap_or(false)
}

/// one edge of a (possibly not-yet-finalized) query, as added through the builder
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeDescription {
    pub edge_id: String,
    pub source: String,
    pub target: String,
    pub start_time_range: TimeRange,
    pub end_time_range: TimeRange,
}

/// accumulates edge and vertex-constraint expressions until `finalize()`
pub struct SubgraphQueryBuilder {
    edges: Vec<EdgeDescription>,
    vertex_constraints: HashMap<String, Vec<VertexConstraintExpression>>,
}

impl Default for SubgraphQueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubgraphQueryBuilder {
    pub fn new() -> Self {
        Self { edges: Vec::new(), vertex_constraints: HashMap::new() }
    }

    /// adds an edge with no time constraint (`EdgeExpression`)
    pub fn add_edge(&mut self, edge_id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) {
        self.add_time_edge(edge_id, source, target, TimeRange::UNBOUNDED, TimeRange::UNBOUNDED)
    }

    /// adds an edge bounded by start/end time ranges (`TimeEdgeExpression`)
    pub fn add_time_edge(
        &mut self,
        edge_id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        start_time_range: TimeRange,
        end_time_range: TimeRange,
    ) {
        self.edges.push(EdgeDescription { edge_id: edge_id.into(), source: source.into(), target: target.into(), start_time_range, end_time_range });
    }

    /// attaches a constraint to a vertex variable (`VertexConstraintExpression`)
    pub fn add_vertex_constraint(&mut self, variable: impl Into<String>, constraint: VertexConstraintExpression) {
        self.vertex_constraints.entry(variable.into()).or_insert_with(Vec::new).push(constraint);
    }

    /// resolves each edge's time bounds and freezes the query. Any endpoint
    /// still missing both `lo` and `hi` on both its start and end ranges
    /// leaves nothing to derive a finite window from, and is rejected.
    pub fn finalize(self, max_offset: f64) -> Result<SubgraphQuery, QueryError> {
        if self.edges.is_empty() {
            return Err(QueryError::NoEdges);
        }

        let mut edges = self.edges;
        for edge in &mut edges {
            let (start, end) = fix_time_range(edge.start_time_range, edge.end_time_range, max_offset)
                .ok_or_else(|| QueryError::UnboundedTimeRange(edge.edge_id.clone()))?;
            edge.start_time_range = start;
            edge.end_time_range = end;
        }

        let bound_vars: std::collections::HashSet<&str> =
            edges.iter().flat_map(|e| vec![e.source.as_str(), e.target.as_str()]).collect();
        for variable in self.vertex_constraints.keys() {
            if !bound_vars.contains(variable.as_str()) {
                return Err(QueryError::UnknownVariable(variable.clone()));
            }
        }

        edges.sort_by(|a, b| a.start_time_range.lo.partial_cmp(&b.start_time_range.lo).unwrap());

        // query-wide time span: latest end_time_range.hi across every edge
        // minus the earliest start_time_range.lo (edges are start-anchored,
        // i.e. sorted ascending by start_time_range.lo above), matching
        // `original_source/SamSrc/sam/SubgraphQuery.hpp`'s
        // `sortedEdges.back().endTimeRange.second - sortedEdges.front().startTimeRange.first`
        let earliest_start_lo = edges.first().unwrap().start_time_range.lo.unwrap();
        let latest_end_hi = edges.iter().map(|e| e.end_time_range.hi.unwrap()).fold(f64::NEG_INFINITY, f64::max);
        let max_time_extent = latest_end_hi - earliest_start_lo;

        Ok(SubgraphQuery { edges, vertex_constraints: self.vertex_constraints, max_time_extent })
    }
}

/// derives a finite `(start, end)` time range pair from whichever bounds are
/// present, extending any missing bound from the bound on the other side by
/// `max_offset`. `None` if neither range carries any bound at all.
fn fix_time_range(start: TimeRange, end: TimeRange, max_offset: f64) -> Option<(TimeRange, TimeRange)> {
    let has_any = start.lo.is_some() || start.hi.is_some() || end.lo.is_some() || end.hi.is_some();
    if !has_any {
        return None;
    }

    let start_lo = start.lo.or(end.lo.map(|v| v - max_offset)).or(end.hi.map(|v| v - max_offset));
    let start_hi = start.hi.or(end.hi.map(|v| v + max_offset)).or(end.lo.map(|v| v + max_offset));
    let end_lo = end.lo.or(start.lo.map(|v| v - max_offset)).or(start.hi.map(|v| v - max_offset));
    let end_hi = end.hi.or(start.hi.map(|v| v + max_offset)).or(start.lo.map(|v| v + max_offset));

    match (start_lo, start_hi, end_lo, end_hi) {
        (Some(sl), Some(sh), Some(el), Some(eh)) => Some((TimeRange::bounded(sl, sh), TimeRange::bounded(el, eh))),
        _ => None,
    }
}

/// a finalized, ready-to-execute query: edges ordered ascending by start time,
/// one-shot -- there is no way to mutate it back into a builder
#[derive(Debug, PartialEq)]
pub struct SubgraphQuery {
    pub edges: Vec<EdgeDescription>,
    pub vertex_constraints: HashMap<String, Vec<VertexConstraintExpression>>,
    pub max_time_extent: f64,
}

impl SubgraphQuery {
    /// checks every constraint registered on `variable` against the
    /// candidate `vertex`; a variable with no constraints always passes
    pub fn check_vertex(&self, variable: &str, vertex: &str, features: &FeatureMap) -> bool {
        match self.vertex_constraints.get(variable) {
            Some(constraints) => constraints.iter().all(|c| c.satisfied(features, vertex)),
            None => true,
        }
    }
}
