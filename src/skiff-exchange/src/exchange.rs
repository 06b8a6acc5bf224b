use std::collections::HashMap;

use async_trait::async_trait;
use common_error::{SkiffError, SkiffResult};
use serde::{Deserialize, Serialize};
use skiff_recordbatch::RecordBatch;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    codec::{Decoder, Encoder, StreamDecoder, StreamEncoder},
    context::{BoxedBidiStream, Distributer, ExchangeContext},
    create_channel,
    envelope::Envelope,
    router::{DecoderSet, Router},
    short_circuit::short_circuit,
    Error, Receiver, Sender,
};

/// How an exchange reroutes batches between the participating nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discipline {
    Gather,
    Scatter,
    Broadcast,
    Partition { key_column: usize },
}

/// The streaming operator contract. An operator is constructed, run exactly
/// once over an input stream of batches while producing an output stream,
/// and releases its resources when the run returns.
#[async_trait]
pub trait Runner: Send {
    async fn run(
        &mut self,
        ctx: &ExchangeContext,
        input: Receiver<RecordBatch>,
        output: Sender<RecordBatch>,
    ) -> SkiffResult<()>;
}

/// An exchange redistributes batches between peer nodes. The identity and
/// discipline serialize, so a planner can install the same instance on every
/// node; transient connection state stays local.
#[derive(Serialize, Deserialize)]
pub struct Exchange {
    uid: String,
    discipline: Discipline,
    #[serde(skip)]
    ran: bool,
    #[serde(skip)]
    router: Option<Router>,
}

impl Exchange {
    /// An exchange that funnels the input of every node to the master node.
    /// Non-master nodes produce no output.
    pub fn gather() -> Self {
        Self::with_discipline(Discipline::Gather)
    }

    /// An exchange that spreads its input uniformly over all nodes, batch by
    /// batch in round-robin order.
    pub fn scatter() -> Self {
        Self::with_discipline(Discipline::Scatter)
    }

    /// An exchange that duplicates its input to all nodes; every node's
    /// output is a union of all inputs, in no guaranteed order.
    pub fn broadcast() -> Self {
        Self::with_discipline(Discipline::Broadcast)
    }

    /// An exchange that routes each row by consistent-hashing the string
    /// value of the given key column, so rows sharing a key always land on
    /// the same node.
    pub fn partition(key_column: usize) -> Self {
        Self::with_discipline(Discipline::Partition { key_column })
    }

    fn with_discipline(discipline: Discipline) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            discipline,
            ran: false,
            router: None,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    async fn run_inner(
        &mut self,
        ctx: &ExchangeContext,
        input: &mut Receiver<RecordBatch>,
        output: Sender<RecordBatch>,
    ) -> SkiffResult<()> {
        let mut decoders = self.initialize(ctx).await?;

        // Drain peers in the background, handing their batches to the local
        // downstream. The final result (nil once every peer has declared
        // end-of-stream) arrives on the completion channel.
        let (completion_tx, mut completion_rx) = create_channel::<SkiffResult<()>>(1);
        tokio::spawn(async move {
            let result = receive_loop(&mut decoders, output).await;
            let _ = completion_tx.send(result).await;
        });

        let deadline = ctx.deadline();
        let deadline_elapsed = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => futures::future::pending().await,
            }
        };
        tokio::pin!(deadline_elapsed);

        let mut result: SkiffResult<()> = Ok(());
        let mut send_done = false;
        let mut recv_done = false;
        let mut cancelled = false;

        while result.is_ok() && !(send_done && recv_done) {
            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    // cancellation is the cooperative stop signal, not an error
                    cancelled = true;
                    break;
                }
                () = &mut deadline_elapsed => {
                    result = Err(Error::DeadlineExceeded.into());
                }
                done = completion_rx.recv(), if !recv_done => {
                    recv_done = true;
                    if let Some(Err(e)) = done {
                        result = Err(e);
                    }
                }
                item = input.recv(), if !send_done => match item {
                    Some(batch) => result = self.send(batch).await,
                    None => {
                        // input exhausted; tell every peer to stop listening
                        // to data from us
                        let _ = self.broadcast_eof().await;
                        send_done = true;
                    }
                },
            }
        }

        // Peers stop reading from this node only once they see its EOF
        // sentinel; leaving without one (cancellation, send error) would
        // block their receivers forever.
        if !send_done {
            let _ = self.broadcast_eof().await;
        }
        // reap the receive task before closing connections out from under it
        while completion_rx.recv().await.is_some() {}

        if cancelled {
            return Ok(());
        }
        result
    }

    /// Opens outbound streams to the destination set, the inbound side when
    /// this node is itself a destination, and the routing tables. On any
    /// mid-initialization failure everything opened so far is closed before
    /// the error is returned.
    async fn initialize(&mut self, ctx: &ExchangeContext) -> SkiffResult<DecoderSet> {
        let distributer = ctx.distributer().ok_or(Error::MissingDistributer)?;
        ctx.validate()?;

        let destinations: Vec<String> = match self.discipline {
            Discipline::Gather => vec![ctx.master_node().to_string()],
            _ => ctx.all_nodes().to_vec(),
        };

        let mut router = Router::new();
        match Self::open_endpoints(&self.uid, &destinations, ctx, distributer.as_ref(), &mut router)
            .await
        {
            Ok(decoders) => {
                debug!(
                    uid = %self.uid,
                    encoders = router.num_encoders(),
                    decoders = decoders.num_decoders(),
                    "exchange endpoints open"
                );
                self.router = Some(router);
                Ok(decoders)
            }
            Err(e) => {
                // one failed connection tears down everything opened before it
                let _ = router.close_all().await;
                Err(e)
            }
        }
    }

    async fn open_endpoints(
        uid: &str,
        destinations: &[String],
        ctx: &ExchangeContext,
        distributer: &dyn Distributer,
        router: &mut Router,
    ) -> SkiffResult<DecoderSet> {
        // The read half of every outbound dial is parked here: a single
        // bidirectional stream carries both directions, so the inbound side
        // below reuses it instead of opening a second stream to the peer.
        let mut parked_readers: HashMap<String, tokio::io::ReadHalf<BoxedBidiStream>> =
            HashMap::new();
        let mut loopback = None;

        for node in destinations {
            if node == ctx.this_node() {
                let (sender, receiver) = short_circuit();
                router.add(node, Encoder::Loopback(sender));
                loopback = Some(receiver);
                continue;
            }

            let stream = distributer.connect(node, uid).await?;
            let (reader, writer) = tokio::io::split(stream);
            parked_readers.insert(node.clone(), reader);
            router.add(node, Encoder::Stream(StreamEncoder::new(writer)));
        }

        // Only a destination listens back to the full node set; everyone
        // else ends with an empty decoder set and its receive side
        // completes immediately.
        let mut decoders = DecoderSet::new();
        if loopback.is_some() {
            let mut loopback = loopback;
            for node in ctx.all_nodes() {
                if node == ctx.this_node() {
                    if let Some(receiver) = loopback.take() {
                        decoders.push(Decoder::Loopback(receiver));
                    }
                } else if let Some(reader) = parked_readers.remove(node) {
                    decoders.push(Decoder::Stream(StreamDecoder::from_read_half(reader)));
                } else {
                    let stream = distributer.connect(node, uid).await?;
                    decoders.push(Decoder::Stream(StreamDecoder::from_stream(stream)));
                }
            }
        }
        Ok(decoders)
    }

    /// Dispatches one batch according to the discipline.
    async fn send(&mut self, batch: RecordBatch) -> SkiffResult<()> {
        let discipline = self.discipline;
        let router = self.router_mut()?;
        match discipline {
            Discipline::Scatter => router.encode_next(&Envelope::batch(batch)).await,
            Discipline::Partition { key_column } => {
                router.encode_partition(&batch, key_column).await
            }
            Discipline::Gather | Discipline::Broadcast => {
                router.encode_all(&Envelope::batch(batch)).await
            }
        }
    }

    /// Transmits the end-of-stream sentinel on every destination encoder.
    async fn broadcast_eof(&mut self) -> SkiffResult<()> {
        match self.router.as_mut() {
            Some(router) => router.encode_all(&Envelope::eof()).await,
            None => Ok(()),
        }
    }

    /// Closes every owned connection; the last error wins. Decoder-side
    /// resources are released by the receive task, which the run loop reaps
    /// before this is called.
    async fn close(&mut self) -> SkiffResult<()> {
        match self.router.as_mut() {
            Some(router) => router.close_all().await,
            None => Ok(()),
        }
    }

    fn router_mut(&mut self) -> SkiffResult<&mut Router> {
        self.router.as_mut().ok_or_else(|| {
            SkiffError::InternalError("exchange used before initialization".to_string())
        })
    }
}

#[async_trait]
impl Runner for Exchange {
    #[instrument(skip_all, name = "Exchange::run", fields(uid = %self.uid))]
    async fn run(
        &mut self,
        ctx: &ExchangeContext,
        mut input: Receiver<RecordBatch>,
        output: Sender<RecordBatch>,
    ) -> SkiffResult<()> {
        // A run claims this instance's identifier for connection pairing on
        // every node; a second run under the same identifier would
        // desynchronize the peers.
        if self.ran {
            return Err(Error::AlreadyRan.into());
        }
        self.ran = true;

        let result = self.run_inner(ctx, &mut input, output).await;
        let close_result = self.close().await;
        // prefer the run error over the close error
        match result {
            Ok(()) => close_result,
            Err(e) => Err(e),
        }
    }
}

async fn receive_loop(decoders: &mut DecoderSet, output: Sender<RecordBatch>) -> SkiffResult<()> {
    loop {
        match decoders.decode_next().await? {
            // every peer has declared end-of-stream
            None => return Ok(()),
            Some(batch) => {
                if output.send(batch).await.is_err() {
                    // downstream hung up; nothing left to deliver to
                    return Ok(());
                }
            }
        }
    }
}
