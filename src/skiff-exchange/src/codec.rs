use bytes::Bytes;
use common_error::SkiffResult;
use futures::{SinkExt, StreamExt};
use snafu::ResultExt;
use tokio::io::{AsyncRead, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::{
    context::BoxedBidiStream,
    envelope::Envelope,
    short_circuit::{LoopbackReceiver, LoopbackSender},
    DecodeEnvelopeSnafu, EncodeEnvelopeSnafu,
};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// The encode half of the codec layer. Picked once at initialization; the
/// loopback variant makes the local destination look identical to a remote
/// one, so routing needs no special "is it me?" branch.
pub(crate) enum Encoder {
    Stream(StreamEncoder),
    Loopback(LoopbackSender),
}

impl Encoder {
    pub async fn encode(&mut self, envelope: &Envelope) -> SkiffResult<()> {
        match self {
            Self::Stream(encoder) => encoder.encode(envelope).await,
            Self::Loopback(sender) => sender.encode(envelope).await,
        }
    }

    pub async fn close(&mut self) -> SkiffResult<()> {
        match self {
            Self::Stream(encoder) => encoder.close().await,
            Self::Loopback(sender) => {
                sender.close();
                Ok(())
            }
        }
    }
}

/// The decode half of the codec layer. `decode` returning `None` is the
/// canonical end-of-stream signal, produced from either a transport-level
/// EOF or an EOF-sentinel envelope.
pub(crate) enum Decoder {
    Stream(StreamDecoder),
    Loopback(LoopbackReceiver),
}

impl Decoder {
    pub async fn decode(&mut self) -> SkiffResult<Option<Envelope>> {
        match self {
            Self::Stream(decoder) => decoder.decode().await,
            Self::Loopback(receiver) => receiver.decode().await,
        }
    }
}

/// Length-delimited bincode frames over the write half of a peer stream, one
/// envelope per call.
pub(crate) struct StreamEncoder {
    frames: FramedWrite<WriteHalf<BoxedBidiStream>, LengthDelimitedCodec>,
}

impl StreamEncoder {
    pub fn new(writer: WriteHalf<BoxedBidiStream>) -> Self {
        Self {
            frames: FramedWrite::new(writer, LengthDelimitedCodec::new()),
        }
    }

    pub async fn encode(&mut self, envelope: &Envelope) -> SkiffResult<()> {
        let bytes = bincode::serialize(envelope).context(EncodeEnvelopeSnafu)?;
        self.frames.send(Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Flushes pending frames and shuts the write direction down, so the
    /// peer's decoder observes a transport EOF.
    pub async fn close(&mut self) -> SkiffResult<()> {
        self.frames.close().await?;
        Ok(())
    }
}

/// Length-delimited bincode frames over the read half of a peer stream.
pub(crate) struct StreamDecoder {
    frames: FramedRead<BoxedReader, LengthDelimitedCodec>,
}

impl StreamDecoder {
    /// Decoder over the read half of a stream whose write half is already
    /// serving as an encoder.
    pub fn from_read_half(reader: tokio::io::ReadHalf<BoxedBidiStream>) -> Self {
        Self::new(Box::new(reader))
    }

    /// Decoder owning a whole stream that is only ever read from.
    pub fn from_stream(stream: BoxedBidiStream) -> Self {
        Self::new(Box::new(stream))
    }

    fn new(reader: BoxedReader) -> Self {
        Self {
            frames: FramedRead::new(reader, LengthDelimitedCodec::new()),
        }
    }

    pub async fn decode(&mut self) -> SkiffResult<Option<Envelope>> {
        match self.frames.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(frame)) => {
                let envelope: Envelope =
                    bincode::deserialize(&frame).context(DecodeEnvelopeSnafu)?;
                if envelope.is_eof() {
                    Ok(None)
                } else {
                    Ok(Some(envelope))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use skiff_recordbatch::RecordBatch;

    use super::*;
    use crate::envelope::Payload;

    #[tokio::test]
    async fn test_stream_codec_round_trip() -> SkiffResult<()> {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let near: BoxedBidiStream = Box::new(near);
        let (_near_reader, near_writer) = tokio::io::split(near);

        let mut encoder = StreamEncoder::new(near_writer);
        let mut decoder = StreamDecoder::from_stream(Box::new(far));

        let first = RecordBatch::from_utf8_values(vec!["a", "b"]);
        let second = RecordBatch::from_utf8_values(vec!["c"]);
        encoder.encode(&Envelope::batch(first.clone())).await?;
        encoder.encode(&Envelope::batch(second.clone())).await?;
        encoder.encode(&Envelope::eof()).await?;

        for expected in [first, second] {
            let envelope = decoder.decode().await?.expect("expected a batch");
            match envelope.payload {
                Payload::Batch(batch) => assert_eq!(batch, expected),
                Payload::Error(message) => panic!("unexpected error payload {message}"),
            }
        }
        // the sentinel decodes to the canonical EOF
        assert!(decoder.decode().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_decoder_transport_eof() -> SkiffResult<()> {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let near: BoxedBidiStream = Box::new(near);
        let (_near_reader, near_writer) = tokio::io::split(near);

        let mut encoder = StreamEncoder::new(near_writer);
        let mut decoder = StreamDecoder::from_stream(Box::new(far));

        encoder
            .encode(&Envelope::batch(RecordBatch::from_utf8_values(vec!["x"])))
            .await?;
        encoder.close().await?;

        assert!(decoder.decode().await?.is_some());
        assert!(decoder.decode().await?.is_none());
        Ok(())
    }
}
