use common_error::SkiffResult;

use crate::{envelope::Envelope, Error};

/// Queue capacity for loopback traffic. Large enough that the local sender
/// rarely blocks, bounded so it still applies backpressure.
const SHORT_CIRCUIT_CAPACITY: usize = 1024;

/// Builds the in-process short-circuit used when the local node is both a
/// source and a destination: an encode half and a decode half over one
/// bounded queue, so local traffic never touches the transport.
pub(crate) fn short_circuit() -> (LoopbackSender, LoopbackReceiver) {
    let (sender, receiver) = tokio::sync::mpsc::channel(SHORT_CIRCUIT_CAPACITY);
    (
        LoopbackSender {
            sender: Some(sender),
        },
        LoopbackReceiver { receiver },
    )
}

pub(crate) struct LoopbackSender {
    sender: Option<tokio::sync::mpsc::Sender<Envelope>>,
}

impl LoopbackSender {
    pub async fn encode(&mut self, envelope: &Envelope) -> SkiffResult<()> {
        let sender = self.sender.as_ref().ok_or(Error::ClosedPipe)?;
        sender
            .send(envelope.clone())
            .await
            .map_err(|_| Error::ClosedPipe)?;
        Ok(())
    }

    /// Idempotent; the decode half drains whatever was enqueued, then
    /// observes EOF.
    pub fn close(&mut self) {
        self.sender = None;
    }
}

pub(crate) struct LoopbackReceiver {
    receiver: tokio::sync::mpsc::Receiver<Envelope>,
}

impl LoopbackReceiver {
    pub async fn decode(&mut self) -> SkiffResult<Option<Envelope>> {
        match self.receiver.recv().await {
            None => Ok(None),
            Some(envelope) if envelope.is_eof() => Ok(None),
            Some(envelope) => Ok(Some(envelope)),
        }
    }
}
