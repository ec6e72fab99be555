//! Worker process entry point. Hand-parses its flags from `std::env::args()`
//! rather than pulling in an argument-parsing crate, matching the teacher's
//! own `demos/sga-runner.rs` -- CLI parsing is explicitly out of scope for
//! the engine core (spec §1), so the binary stays a thin driver over
//! [`streamgraph_engine::worker::Worker`].

use std::thread;
use std::time::Duration;

use log::{info, trace};
use metrics_runtime::Receiver;

use streamgraph_engine::edge::{Tuple, Tuplizer};
use streamgraph_engine::input::LineFileReader;
use streamgraph_engine::transport::LocalChannelTransport;
use streamgraph_engine::util::metrics::csv_builder::CSVBuilder;
use streamgraph_engine::util::metrics::csv_exporter::CSVExporter;
use streamgraph_engine::util::types::REPORTING_PERIOD_MILLISECONDS;
use streamgraph_engine::worker::{Worker, WorkerConfig};

/// minimal default line schema: `source target time duration [extra...]`,
/// with no label tokens. Concrete schemas (VastNetflow, CSV, ...) are an
/// out-of-scope ingestion adapter (spec §1) -- this is just enough to drive
/// the binary end-to-end against a plain edge list.
struct PlainTuplizer;

impl Tuplizer for PlainTuplizer {
    fn label_arity(&self) -> usize {
        0
    }

    fn tuplize(&self, tokens: &[&str]) -> Option<Tuple> {
        if tokens.len() < 4 {
            return None;
        }
        let source = tokens[0].to_string();
        let target = tokens[1].to_string();
        let time = tokens[2].parse().ok()?;
        let duration = tokens[3].parse().ok()?;
        Some(Tuple::new(source, target, time, duration))
    }
}

struct Args {
    config: WorkerConfig,
    input_file: String,
    reporting_file: String,
}

fn parse_args() -> Args {
    let mut config = WorkerConfig::default();
    let mut input_file = None;
    let mut reporting_file = "worker-metrics.csv".to_string();

    let mut args = std::env::args();
    args.next(); // binary name

    while let Some(flag) = args.next() {
        let mut value = || args.next().expect("missing value for flag");
        match flag.as_str() {
            "--num-workers" => config.num_workers = value().parse().expect("--num-workers must be an integer"),
            "--worker-id" => config.worker_id = value().parse().expect("--worker-id must be an integer"),
            "--hwm" => config.hwm = value().parse().expect("--hwm must be an integer"),
            "--queue-length" => config.queue_length = value().parse().expect("--queue-length must be an integer"),
            "--num-push-sockets" => config.num_push_sockets = value().parse().expect("--num-push-sockets must be an integer"),
            "--num-pull-threads" => config.num_pull_threads = value().parse().expect("--num-pull-threads must be an integer"),
            "--timeout-ms" => config.send_timeout = Duration::from_millis(value().parse().expect("--timeout-ms must be an integer")),
            "--graph-capacity" => config.graph_capacity = value().parse().expect("--graph-capacity must be an integer"),
            "--table-capacity" => config.table_capacity = value().parse().expect("--table-capacity must be an integer"),
            "--feature-capacity" => config.feature_capacity = value().parse().expect("--feature-capacity must be an integer"),
            "--time-window" => config.time_window = value().parse().expect("--time-window must be a number"),
            "--input" => input_file = Some(value()),
            "--reporting-file" => reporting_file = value(),
            other => panic!("unrecognized flag: {}", other),
        }
    }

    Args { config, input_file: input_file.expect("--input is required"), reporting_file }
}

fn main() {
    env_logger::init();

    let args = parse_args();
    info!("worker {} of {} starting", args.config.worker_id, args.config.num_workers);

    let receiver = Receiver::builder().build().expect("failed to create metrics receiver");
    let mut exporter = CSVExporter::new(receiver.controller(), CSVBuilder::default(), &args.reporting_file, Duration::from_millis(REPORTING_PERIOD_MILLISECONDS));
    thread::spawn(move || exporter.run());

    // single-process cluster: real multi-process deployment swaps in a
    // network-backed `Channel` implementation behind the same trait
    let mut cluster = LocalChannelTransport::cluster(args.config.num_workers, args.config.queue_length, args.config.send_timeout);
    let transport = cluster.remove(args.config.worker_id as usize);
    let worker = Worker::new(args.config, transport, Vec::new(), Vec::new());

    let reader = LineFileReader::open(&args.input_file, PlainTuplizer, worker.worker_id()).expect("cannot open input file");
    let mut sink = receiver.sink();
    let mut edge_count = 0u64;

    for edge in reader {
        trace!("dispatching edge {:?}", edge.global_id());
        worker.dispatch(edge);
        worker.drain_inbound(Duration::from_millis(1));
        edge_count += 1;
    }

    sink.record_value("edges-processed", edge_count);
    worker.metrics().report(&mut sink);
    worker.begin_shutdown();

    for completed in worker.drain_matches() {
        info!("completed match: {:?} edges", completed.matched_edges().len());
    }

    thread::sleep(Duration::from_millis(REPORTING_PERIOD_MILLISECONDS));
}
