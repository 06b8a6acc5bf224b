
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use common_error::{SkiffError, SkiffResult};
use skiff_recordbatch::RecordBatch;
use tokio::task::JoinHandle;

use crate::{
    context::{BoxedBidiStream, Distributer, ExchangeContext},
    create_channel, Exchange, Receiver, Runner,
};

/// Pairs `connect(B, uid)` issued on node A with `connect(A, uid)` issued on
/// node B into the two ends of one in-memory duplex stream, the way the
/// production transport pairs a dial with its remote acceptor.
pub(crate) struct ConnectionBroker {
    pending: Mutex<HashMap<(String, String, String), tokio::io::DuplexStream>>,
    connects: AtomicUsize,
    streams_opened: AtomicUsize,
}

impl ConnectionBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            connects: AtomicUsize::new(0),
            streams_opened: AtomicUsize::new(0),
        })
    }

    pub fn distributer_for(self: &Arc<Self>, node: &str) -> Arc<InMemoryDistributer> {
        Arc::new(InMemoryDistributer {
            node: node.to_string(),
            broker: self.clone(),
        })
    }

    /// Total `connect` calls across all nodes.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Underlying streams opened; two paired dials share one stream.
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    /// Dials that never found their remote counterpart.
    pub fn unpaired(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

pub(crate) struct InMemoryDistributer {
    node: String,
    broker: Arc<ConnectionBroker>,
}

#[async_trait]
impl Distributer for InMemoryDistributer {
    async fn connect(&self, node: &str, exchange_id: &str) -> SkiffResult<BoxedBidiStream> {
        self.broker.connects.fetch_add(1, Ordering::SeqCst);
        let mut pending = self.broker.pending.lock().unwrap();
        let from_peer = (exchange_id.to_string(), node.to_string(), self.node.clone());
        if let Some(stream) = pending.remove(&from_peer) {
            return Ok(Box::new(stream));
        }

        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        self.broker.streams_opened.fetch_add(1, Ordering::SeqCst);
        pending.insert(
            (exchange_id.to_string(), self.node.clone(), node.to_string()),
            theirs,
        );
        Ok(Box::new(ours))
    }
}

/// A dialer whose every connect attempt is refused.
pub(crate) struct FailingDistributer;

#[async_trait]
impl Distributer for FailingDistributer {
    async fn connect(&self, node: &str, _exchange_id: &str) -> SkiffResult<BoxedBidiStream> {
        Err(SkiffError::IoError(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("cannot reach {node}"),
        )))
    }
}

/// Serialized copies of one exchange, the way a planner installs the same
/// instance (same identifier, same discipline) on every node.
pub(crate) fn install_on_nodes(exchange: &Exchange, count: usize) -> Vec<Exchange> {
    let bytes = bincode::serialize(exchange).unwrap();
    (0..count)
        .map(|_| bincode::deserialize(&bytes).unwrap())
        .collect()
}

/// Runs one node's exchange over the given input stream, collecting its
/// output stream on the side.
pub(crate) fn spawn_node(
    mut exchange: Exchange,
    ctx: ExchangeContext,
    input: Receiver<RecordBatch>,
) -> (
    JoinHandle<SkiffResult<()>>,
    JoinHandle<Vec<RecordBatch>>,
) {
    let (out_tx, mut out_rx) = create_channel(64);
    let collector = tokio::spawn(async move {
        let mut collected = vec![];
        while let Some(batch) = out_rx.recv().await {
            collected.push(batch);
        }
        collected
    });
    let runner = tokio::spawn(async move { exchange.run(&ctx, input, out_tx).await });
    (runner, collector)
}

pub(crate) struct ClusterRun {
    pub outputs: HashMap<String, Vec<RecordBatch>>,
    pub results: HashMap<String, SkiffResult<()>>,
}

/// Installs `exchange` on every node, pre-feeds each node's input and closes
/// it, then runs all participants to completion.
pub(crate) async fn run_cluster(
    nodes: &[&str],
    master: &str,
    exchange: &Exchange,
    inputs: HashMap<&str, Vec<RecordBatch>>,
    broker: &Arc<ConnectionBroker>,
) -> ClusterRun {
    let all = nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let installed = install_on_nodes(exchange, nodes.len());

    let mut handles = vec![];
    for (node, node_exchange) in nodes.iter().zip(installed) {
        let ctx = ExchangeContext::new(all.clone(), *node, master)
            .with_distributer(broker.distributer_for(node));

        let node_inputs = inputs.get(node).cloned().unwrap_or_default();
        let (in_tx, in_rx) = create_channel(node_inputs.len().max(1));
        for batch in node_inputs {
            in_tx.send(batch).await.unwrap();
        }
        drop(in_tx);

        let (runner, collector) = spawn_node(node_exchange, ctx, in_rx);
        handles.push((node.to_string(), runner, collector));
    }

    let mut run = ClusterRun {
        outputs: HashMap::new(),
        results: HashMap::new(),
    };
    for (node, runner, collector) in handles {
        run.results.insert(node.clone(), join_within(runner).await);
        run.outputs.insert(node, join_within(collector).await);
    }
    run
}

/// Awaits a task, failing the test if it neither completes nor errors in
/// bounded time.
pub(crate) async fn join_within<T>(handle: JoinHandle<T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("task did not terminate in bounded time")
        .expect("task panicked")
}

/// Flattened column-0 string values across a node's output batches.
pub(crate) fn utf8_rows(batches: &[RecordBatch]) -> Vec<String> {
    batches
        .iter()
        .flat_map(|batch| batch.column(0).unwrap().string_values())
        .collect()
}

pub(crate) fn sorted(mut rows: Vec<String>) -> Vec<String> {
    rows.sort();
    rows
}
