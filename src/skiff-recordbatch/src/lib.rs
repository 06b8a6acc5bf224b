//! Minimal columnar batches exchanged between pipeline operators.

mod record_batch;

pub use record_batch::{Column, DataType, RecordBatch};
