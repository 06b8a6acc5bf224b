use std::collections::{BTreeMap, HashMap};

use common_error::SkiffResult;
use skiff_recordbatch::RecordBatch;

use crate::{
    codec::{Decoder, Encoder},
    envelope::{Envelope, Payload},
    ring::HashRing,
    Error,
};

/// Send-side routing tables: one encoder per destination peer, in cluster
/// order, plus the lookup structures the disciplines need. Populated during
/// initialization and structurally immutable afterwards.
pub(crate) struct Router {
    encoders: Vec<Encoder>,
    by_node: HashMap<String, usize>,
    ring: HashRing,
    cursor: usize,
}

impl Router {
    pub fn new() -> Self {
        Self {
            encoders: vec![],
            by_node: HashMap::new(),
            ring: HashRing::new(),
            cursor: 0,
        }
    }

    pub fn add(&mut self, node: &str, encoder: Encoder) {
        let index = self.encoders.len();
        self.encoders.push(encoder);
        self.by_node.insert(node.to_string(), index);
        self.ring.add(node);
    }

    pub fn num_encoders(&self) -> usize {
        self.encoders.len()
    }

    /// Round-robin dispatch. The cursor pre-increments modulo N, so the
    /// first transmission goes to encoder index 1 (or the sole encoder for
    /// N = 1).
    pub async fn encode_next(&mut self, envelope: &Envelope) -> SkiffResult<()> {
        if self.encoders.is_empty() {
            return Err(Error::ClosedPipe.into());
        }
        self.cursor = (self.cursor + 1) % self.encoders.len();
        self.encoders[self.cursor].encode(envelope).await
    }

    /// Best-effort fan-out to every encoder in order. Keeps going past
    /// failures and reports the last error encountered; partial delivery is
    /// not retried.
    pub async fn encode_all(&mut self, envelope: &Envelope) -> SkiffResult<()> {
        let mut last_err = None;
        for encoder in &mut self.encoders {
            if let Err(e) = encoder.encode(envelope).await {
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Consistent-hash partitioning. Rows are grouped per owning encoder by
    /// the string values of the key column, preserving input row order
    /// within each group, then each pending batch is encoded exactly once.
    pub async fn encode_partition(
        &mut self,
        batch: &RecordBatch,
        key_column: usize,
    ) -> SkiffResult<()> {
        let keys = batch.column(key_column)?.string_values();

        let mut pending: BTreeMap<usize, RecordBatch> = BTreeMap::new();
        for (row, key) in keys.iter().enumerate() {
            let node = self
                .ring
                .get(key)
                .ok_or_else(|| Error::NoTargetNode { key: key.clone() })?;
            let index = *self
                .by_node
                .get(node)
                .ok_or_else(|| Error::NoEncoderForNode {
                    node: node.to_string(),
                })?;

            let row_batch = batch.slice(row, row + 1)?;
            let group = pending.entry(index).or_insert_with(RecordBatch::empty);
            *group = group.append(&row_batch)?;
        }

        for (index, group) in pending {
            self.encoders[index]
                .encode(&Envelope::batch(group))
                .await?;
        }
        Ok(())
    }

    /// Closes every encoder; the last error wins. Loopback closes are
    /// idempotent, stream closes flush and shut the write direction down.
    pub async fn close_all(&mut self) -> SkiffResult<()> {
        let mut result = Ok(());
        for encoder in &mut self.encoders {
            if let Err(e) = encoder.close().await {
                result = Err(e);
            }
        }
        result
    }
}

/// Receive-side decoder set with its own round-robin cursor. Only the
/// receive task touches it, so EOF removal needs no synchronization.
pub(crate) struct DecoderSet {
    decoders: Vec<Decoder>,
    cursor: usize,
}

impl DecoderSet {
    pub fn new() -> Self {
        Self {
            decoders: vec![],
            cursor: 0,
        }
    }

    pub fn push(&mut self, decoder: Decoder) {
        self.decoders.push(decoder);
    }

    pub fn num_decoders(&self) -> usize {
        self.decoders.len()
    }

    /// Decodes one batch from the next peer in round-robin order. A peer
    /// signaling end-of-stream is removed from the set and the next one is
    /// tried; once the set is empty every peer has declared done and `None`
    /// is returned. Any non-EOF decode error is returned immediately.
    pub async fn decode_next(&mut self) -> SkiffResult<Option<RecordBatch>> {
        loop {
            if self.decoders.is_empty() {
                return Ok(None);
            }
            let index = (self.cursor + 1) % self.decoders.len();
            match self.decoders[index].decode().await? {
                None => {
                    // that peer is done; drop its decoder and try the next
                    self.decoders.remove(index);
                }
                Some(envelope) => {
                    self.cursor = index;
                    return match envelope.payload {
                        Payload::Batch(batch) => Ok(Some(batch)),
                        Payload::Error(message) => Err(Error::PeerError { message }.into()),
                    };
                }
            }
        }
    }
}
