//! Cross-node data redistribution for the pipeline engine.
//!
//! An [`Exchange`] is installed identically on every participating node;
//! when run, the instances cooperate to reroute record batches according to
//! one of four disciplines (gather, scatter, broadcast, hash-partition) and
//! expose the rerouted stream to the local downstream operator.

mod codec;
mod context;
mod envelope;
mod exchange;
mod ring;
mod router;
mod short_circuit;
#[cfg(test)]
mod tests;

use common_error::SkiffError;
use snafu::Snafu;

pub use context::{BidiStream, BoxedBidiStream, Distributer, ExchangeContext};
pub use envelope::{Envelope, Payload, END_OF_STREAM};
pub use exchange::{Discipline, Exchange, Runner};

pub type Sender<T> = tokio::sync::mpsc::Sender<T>;
pub type Receiver<T> = tokio::sync::mpsc::Receiver<T>;

pub fn create_channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
    (sender, receiver)
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("exchange cannot be run more than once"))]
    AlreadyRan,
    #[snafu(display("exchange started without a distributer"))]
    MissingDistributer,
    #[snafu(display("cluster view has no nodes"))]
    EmptyCluster,
    #[snafu(display("node {node} is not in the cluster view"))]
    UnknownNode { node: String },
    #[snafu(display("cannot send on an exchange with no open encoders"))]
    ClosedPipe,
    #[snafu(display("cannot find a target node for partition key {key}"))]
    NoTargetNode { key: String },
    #[snafu(display("no encoder registered for node {node}"))]
    NoEncoderForNode { node: String },
    #[snafu(display("peer reported error: {message}"))]
    PeerError { message: String },
    #[snafu(display("exchange deadline exceeded"))]
    DeadlineExceeded,
    #[snafu(display("failed to encode envelope: {source}"))]
    EncodeEnvelope { source: bincode::Error },
    #[snafu(display("failed to decode envelope: {source}"))]
    DecodeEnvelope { source: bincode::Error },
}

impl From<Error> for SkiffError {
    fn from(err: Error) -> SkiffError {
        match err {
            Error::AlreadyRan
            | Error::MissingDistributer
            | Error::EmptyCluster
            | Error::UnknownNode { .. } => SkiffError::ValueError(err.to_string()),
            _ => SkiffError::External(err.into()),
        }
    }
}
