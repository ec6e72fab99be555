//! End-to-end scenarios exercising the engine through its public surface
//! rather than any one module's internals: an exponential-histogram sum
//! operator tracking a windowed aggregate, a `TopK` operator separating
//! heavy hitters from noise, and three-edge subgraph queries run through a
//! real [`Worker`] (single- and two-worker, expired, and constrained).

use std::sync::Arc;
use std::time::Duration;

use streamgraph_engine::edge::{Edge, Label, Tuple};
use streamgraph_engine::feature::{Feature, FeatureMap};
use streamgraph_engine::operator::eh_sum::ExponentialHistogramSum;
use streamgraph_engine::operator::topk::{StringSource, TopK};
use streamgraph_engine::operator::{Operator, Source};
use streamgraph_engine::query::{SubgraphQueryBuilder, VertexConstraintExpression};
use streamgraph_engine::transport::LocalChannelTransport;
use streamgraph_engine::util::types::TimeRange;
use streamgraph_engine::worker::{Worker, WorkerConfig};

fn edge(source: &str, target: &str, time: f64, duration: f64) -> Edge {
    Edge::new(0, 0, Label::empty(), Tuple::new(source, target, time, duration))
}

fn single_feature(features: &FeatureMap, key: &str, id: &str) -> f64 {
    match features.at(key, id).expect("feature present") {
        Feature::Single(v) => v,
        other => panic!("expected Single, got {:?}", other),
    }
}

/// S1: an `ExponentialHistogramSum` fed ten `1`s should settle on a positive
/// windowed estimate, and feeding it zeros afterward should never push that
/// estimate back up -- the sketch trails the true sum but never overshoots it.
#[test]
fn eh_sum_tracks_a_windowed_aggregate_and_never_increases_on_zeros() {
    let features = Arc::new(FeatureMap::new(2));
    let op = ExponentialHistogramSum::new(Arc::clone(&features), "sum", Source::Duration, 2, 10, 2);

    for _ in 0..10 {
        op.consume("k", &edge("a", "b", 0.0, 1.0));
    }
    let after_ones = single_feature(&features, "k", "sum");
    assert!(after_ones > 0.0, "expected a positive windowed sum after ten inserts of 1, got {}", after_ones);

    let mut after_zero = after_ones;
    for _ in 0..5 {
        op.consume("k", &edge("a", "b", 0.0, 0.0));
        let current = single_feature(&features, "k", "sum");
        assert!(current <= after_zero + f64::EPSILON, "sum rose from {} to {} after inserting a 0", after_zero, current);
        after_zero = current;
    }
    assert!(after_zero >= 0.0);
}

/// S2: traffic split 50/50 across two ports should rank them evenly with a
/// top-2 frequency share of the whole window; traffic split three ways
/// should rank all three evenly with a top-2 share of about two thirds.
#[test]
fn topk_separates_heavy_hitters_from_background_traffic() {
    let features = Arc::new(FeatureMap::new(2));
    let op = TopK::new(Arc::clone(&features), "ports", StringSource::Label(0), 1000, 3, 2);

    for i in 0..200 {
        let port = if i % 2 == 0 { "80" } else { "443" };
        op.consume("10.0.0.1", &Edge::new(0, 0, Label(vec![port.to_string()]), Tuple::new("client", "10.0.0.1", i as f64, 0.0)));
    }
    match features.at("10.0.0.1", "ports").unwrap() {
        Feature::TopK { keys, frequencies } => {
            assert_eq!(keys.len(), 2);
            assert!((frequencies[0] - 0.5).abs() < 1e-9);
            assert!((frequencies[0] + frequencies[1] - 1.0).abs() < 1e-9);
        }
        other => panic!("expected TopK, got {:?}", other),
    }

    for i in 0..297 {
        let port = ["21", "22", "23"][i % 3];
        op.consume("10.0.0.2", &Edge::new(0, 0, Label(vec![port.to_string()]), Tuple::new("client", "10.0.0.2", i as f64, 0.0)));
    }
    match features.at("10.0.0.2", "ports").unwrap() {
        Feature::TopK { keys, frequencies } => {
            assert_eq!(keys.len(), 3);
            assert!((frequencies[0] - 1.0 / 3.0).abs() < 1e-6);
            assert!((frequencies[0] + frequencies[1] - 2.0 / 3.0).abs() < 1e-6);
        }
        other => panic!("expected TopK, got {:?}", other),
    }
}

fn triangle_query(max_offset: f64) -> Arc<streamgraph_engine::query::SubgraphQuery> {
    let mut builder = SubgraphQueryBuilder::new();
    builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 0.0), TimeRange::UNBOUNDED);
    builder.add_time_edge("e2", "y", "z", TimeRange::bounded(0.05, max_offset), TimeRange::UNBOUNDED);
    builder.add_time_edge("e3", "z", "x", TimeRange::bounded(0.15, max_offset), TimeRange::UNBOUNDED);
    Arc::new(builder.finalize(max_offset).unwrap())
}

/// S3: a single worker holding the whole triangle query should complete it
/// the moment the closing edge arrives, binding all three variables.
#[test]
fn single_worker_detects_a_triangle() {
    let mut cluster = LocalChannelTransport::cluster(1, 8, Duration::from_millis(50));
    let transport = cluster.remove(0);
    let worker = Worker::new(WorkerConfig { num_workers: 1, worker_id: 0, ..WorkerConfig::default() }, transport, Vec::new(), vec![triangle_query(10.0)]);

    worker.ingest(edge("a", "b", 0.0, 0.0));
    worker.ingest(edge("b", "c", 0.1, 0.0));
    worker.ingest(edge("c", "a", 0.2, 0.0));

    let matches = worker.drain_matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].matched_edges().len(), 3);
    assert_eq!(matches[0].bindings().get("x"), Some(&"a".to_string()));
    assert_eq!(matches[0].bindings().get("y"), Some(&"b".to_string()));
    assert_eq!(matches[0].bindings().get("z"), Some(&"c".to_string()));
}

/// S4: the same triangle, split across two workers behind the partitioned
/// transport. Each edge is dispatched to whichever worker(s) own its source
/// and target vertex under the real partition function (one or two
/// deliveries per edge), and cross-worker edge requests fill in whatever a
/// worker can't complete from its own partition. Exactly one worker ends up
/// with exactly one completed match, regardless of how the three vertices
/// happen to hash.
#[test]
fn two_worker_cluster_detects_a_triangle_across_partitions() {
    let mut cluster = LocalChannelTransport::cluster(2, 8, Duration::from_millis(200));
    let transport1 = cluster.remove(1);
    let transport0 = cluster.remove(0);

    let query = triangle_query(10.0);
    let worker0 = Worker::new(WorkerConfig { num_workers: 2, worker_id: 0, ..WorkerConfig::default() }, transport0, Vec::new(), vec![Arc::clone(&query)]);
    let worker1 = Worker::new(WorkerConfig { num_workers: 2, worker_id: 1, ..WorkerConfig::default() }, transport1, Vec::new(), vec![Arc::clone(&query)]);

    // worker0 plays the role of whichever process observed these edges first;
    // `dispatch` decides which partition(s) actually ingest each one
    let edges = [edge("a", "b", 0.0, 0.0), edge("b", "c", 0.1, 0.0), edge("c", "a", 0.2, 0.0)];
    for e in edges {
        worker0.dispatch(e);
    }

    // give both workers a few rounds to exchange edge requests/responses:
    // a request sent this round is answered and consumed on the next
    for _ in 0..4 {
        worker0.drain_inbound(Duration::from_millis(100));
        worker1.drain_inbound(Duration::from_millis(100));
    }

    let matches0 = worker0.drain_matches();
    let matches1 = worker1.drain_matches();
    assert_eq!(matches0.len() + matches1.len(), 1, "expected exactly one completed match across the cluster, got {} on worker0 and {} on worker1", matches0.len(), matches1.len());
}

/// S5: a partial match that ages past the query's max time extent before its
/// closing edge arrives must never complete, even once that edge does show up.
#[test]
fn expired_partial_never_completes() {
    let mut cluster = LocalChannelTransport::cluster(1, 8, Duration::from_millis(50));
    let transport = cluster.remove(0);
    let query = triangle_query(1.0);
    let worker = Worker::new(WorkerConfig { num_workers: 1, worker_id: 0, ..WorkerConfig::default() }, transport, Vec::new(), vec![query]);

    worker.ingest(edge("a", "b", 0.0, 0.0));
    worker.ingest(edge("b", "c", 0.1, 0.0));
    // arrives long after max_time_extent has elapsed since the seed
    worker.ingest(edge("c", "a", 500.0, 0.0));

    assert!(worker.drain_matches().is_empty());
}

/// S6: a vertex constraint gates which bindings are even allowed to seed a
/// match. Traffic to an unlisted target never starts a partial match;
/// traffic to a target the constraint's `TopK` feature names does.
#[test]
fn vertex_constraint_gates_which_targets_seed_a_match() {
    let mut cluster = LocalChannelTransport::cluster(1, 8, Duration::from_millis(50));
    let transport = cluster.remove(0);

    let mut builder = SubgraphQueryBuilder::new();
    builder.add_time_edge("e1", "src", "dst", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
    builder.add_vertex_constraint("dst", VertexConstraintExpression::In { feature_id: "known".to_string() });
    let query = Arc::new(builder.finalize(10.0).unwrap());

    let worker = Worker::new(WorkerConfig { num_workers: 1, worker_id: 0, ..WorkerConfig::default() }, transport, Vec::new(), vec![Arc::clone(&query)]);
    worker.features().update_insert("", "known", Feature::TopK { keys: vec!["bait".to_string()], frequencies: vec![0.8] });

    worker.ingest(edge("target", "controller", 0.0, 0.0));
    assert!(worker.drain_matches().is_empty());

    worker.ingest(edge("target", "bait", 1.0, 0.0));
    let matches = worker.drain_matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].bindings().get("dst"), Some(&"bait".to_string()));
}
