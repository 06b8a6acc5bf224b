mod error;

pub use error::{GenericError, SkiffError, SkiffResult};
