use std::sync::Arc;

use async_trait::async_trait;
use common_error::SkiffResult;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::Error;

pub trait BidiStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> BidiStream for T {}

/// A bidirectional byte stream to a peer node, as produced by the transport.
pub type BoxedBidiStream = Box<dyn BidiStream>;

/// The transport dialer. `connect(node, exchange_id)` from one node pairs
/// with the matching `connect` on `node` carrying the same exchange id, and
/// both calls yield the two ends of a single bidirectional byte stream.
#[async_trait]
pub trait Distributer: Send + Sync {
    async fn connect(&self, node: &str, exchange_id: &str) -> SkiffResult<BoxedBidiStream>;
}

/// Execution context handed to [`Runner::run`](crate::Runner::run): the
/// cluster view, the transport dialer, and the cooperative stop signal.
///
/// The view is fixed for the duration of one run and identical on every
/// participant.
#[derive(Clone)]
pub struct ExchangeContext {
    all_nodes: Vec<String>,
    this_node: String,
    master_node: String,
    distributer: Option<Arc<dyn Distributer>>,
    cancel: CancellationToken,
    deadline: Option<tokio::time::Instant>,
}

impl ExchangeContext {
    pub fn new(
        all_nodes: Vec<String>,
        this_node: impl Into<String>,
        master_node: impl Into<String>,
    ) -> Self {
        Self {
            all_nodes,
            this_node: this_node.into(),
            master_node: master_node.into(),
            distributer: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_distributer(mut self, distributer: Arc<dyn Distributer>) -> Self {
        self.distributer = Some(distributer);
        self
    }

    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn all_nodes(&self) -> &[String] {
        &self.all_nodes
    }

    pub fn this_node(&self) -> &str {
        &self.this_node
    }

    pub fn master_node(&self) -> &str {
        &self.master_node
    }

    pub fn distributer(&self) -> Option<Arc<dyn Distributer>> {
        self.distributer.clone()
    }

    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    /// Requests cooperative shutdown of every local operator driven by this
    /// context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Validates that the view is usable: nodes exist and both the local and
    /// the master address are part of the cluster.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.all_nodes.is_empty() {
            return Err(Error::EmptyCluster);
        }
        for node in [&self.this_node, &self.master_node] {
            if !self.all_nodes.contains(node) {
                return Err(Error::UnknownNode { node: node.clone() });
            }
        }
        Ok(())
    }
}
