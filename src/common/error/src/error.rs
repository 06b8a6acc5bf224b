use std::{
    fmt::{Display, Formatter, Result},
    io,
};

pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum SkiffError {
    FieldNotFound(String),
    SchemaMismatch(String),
    TypeError(String),
    ComputeError(String),
    ValueError(String),
    IoError(io::Error),
    InternalError(String),
    External(GenericError),
}

impl std::error::Error for SkiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SkiffError::FieldNotFound(_)
            | SkiffError::SchemaMismatch(_)
            | SkiffError::TypeError(_)
            | SkiffError::ComputeError(_)
            | SkiffError::ValueError(_)
            | SkiffError::InternalError(_) => None,
            SkiffError::IoError(io_error) => Some(io_error),
            SkiffError::External(source) => Some(&**source),
        }
    }
}

impl From<io::Error> for SkiffError {
    fn from(error: io::Error) -> Self {
        SkiffError::IoError(error)
    }
}

impl From<std::fmt::Error> for SkiffError {
    fn from(error: std::fmt::Error) -> Self {
        SkiffError::ComputeError(error.to_string())
    }
}

pub type SkiffResult<T> = std::result::Result<T, SkiffError>;

impl Display for SkiffError {
    // `f` is a buffer, and this method must write the formatted string into it
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::FieldNotFound(s) => write!(f, "SkiffError::FieldNotFound {s}"),
            Self::SchemaMismatch(s) => write!(f, "SkiffError::SchemaMismatch {s}"),
            Self::TypeError(s) => write!(f, "SkiffError::TypeError {s}"),
            Self::ComputeError(s) => write!(f, "SkiffError::ComputeError {s}"),
            Self::ValueError(s) => write!(f, "SkiffError::ValueError {s}"),
            Self::InternalError(s) => write!(f, "SkiffError::InternalError {s}"),
            Self::IoError(e) => write!(f, "SkiffError::IoError {e}"),
            Self::External(e) => write!(f, "SkiffError::External {}", e),
        }
    }
}
