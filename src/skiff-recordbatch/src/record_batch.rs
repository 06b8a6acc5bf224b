use std::fmt::{Display, Formatter};

use common_error::{SkiffError, SkiffResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Utf8,
    Int64,
    Float64,
    Boolean,
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8 => write!(f, "Utf8"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Boolean => write!(f, "Boolean"),
        }
    }
}

/// A single typed column of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Utf8(Vec<String>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Boolean(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Utf8(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Utf8(_) => DataType::Utf8,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> SkiffResult<Self> {
        if start > end || end > self.len() {
            return Err(SkiffError::ValueError(format!(
                "invalid slice [{start}, {end}) for column of length {}",
                self.len()
            )));
        }
        let sliced = match self {
            Self::Utf8(v) => Self::Utf8(v[start..end].to_vec()),
            Self::Int64(v) => Self::Int64(v[start..end].to_vec()),
            Self::Float64(v) => Self::Float64(v[start..end].to_vec()),
            Self::Boolean(v) => Self::Boolean(v[start..end].to_vec()),
        };
        Ok(sliced)
    }

    pub fn concat(&self, other: &Self) -> SkiffResult<Self> {
        match (self, other) {
            (Self::Utf8(a), Self::Utf8(b)) => {
                Ok(Self::Utf8(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Self::Int64(a), Self::Int64(b)) => {
                Ok(Self::Int64(a.iter().chain(b.iter()).copied().collect()))
            }
            (Self::Float64(a), Self::Float64(b)) => {
                Ok(Self::Float64(a.iter().chain(b.iter()).copied().collect()))
            }
            (Self::Boolean(a), Self::Boolean(b)) => {
                Ok(Self::Boolean(a.iter().chain(b.iter()).copied().collect()))
            }
            (a, b) => Err(SkiffError::SchemaMismatch(format!(
                "cannot concat column of type {} with column of type {}",
                a.data_type(),
                b.data_type()
            ))),
        }
    }

    /// String rendition of every value, used to derive partition keys.
    pub fn string_values(&self) -> Vec<String> {
        match self {
            Self::Utf8(v) => v.clone(),
            Self::Int64(v) => v.iter().map(ToString::to_string).collect(),
            Self::Float64(v) => v.iter().map(ToString::to_string).collect(),
            Self::Boolean(v) => v.iter().map(ToString::to_string).collect(),
        }
    }
}

/// An ordered collection of equal-length columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    columns: Vec<Column>,
    num_rows: usize,
}

impl RecordBatch {
    pub fn new(columns: Vec<Column>) -> SkiffResult<Self> {
        let num_rows = columns.first().map_or(0, Column::len);
        for (i, column) in columns.iter().enumerate() {
            if column.len() != num_rows {
                return Err(SkiffError::ValueError(format!(
                    "column {i} has length {}, expected {num_rows}",
                    column.len()
                )));
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn empty() -> Self {
        Self {
            columns: vec![],
            num_rows: 0,
        }
    }

    /// Single Utf8-column batch, the common shape in exchange tests.
    pub fn from_utf8_values<S: Into<String>>(values: Vec<S>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<String>>();
        let num_rows = values.len();
        Self {
            columns: vec![Column::Utf8(values)],
            num_rows,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, idx: usize) -> SkiffResult<&Column> {
        self.columns.get(idx).ok_or_else(|| {
            SkiffError::FieldNotFound(format!(
                "column index {idx} out of range for batch with {} columns",
                self.columns.len()
            ))
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Concatenates `other` below `self`. Column counts and types must match.
    pub fn append(&self, other: &Self) -> SkiffResult<Self> {
        if self.columns.is_empty() {
            return Ok(other.clone());
        }
        if other.columns.is_empty() {
            return Ok(self.clone());
        }
        if self.num_columns() != other.num_columns() {
            return Err(SkiffError::SchemaMismatch(format!(
                "cannot append batch with {} columns to batch with {} columns",
                other.num_columns(),
                self.num_columns()
            )));
        }
        let columns = self
            .columns
            .iter()
            .zip(other.columns.iter())
            .map(|(a, b)| a.concat(b))
            .collect::<SkiffResult<Vec<_>>>()?;
        Self::new(columns)
    }

    /// Sub-batch for the row range `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> SkiffResult<Self> {
        if start > end || end > self.num_rows {
            return Err(SkiffError::ValueError(format!(
                "invalid slice [{start}, {end}) for batch with {} rows",
                self.num_rows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(start, end))
            .collect::<SkiffResult<Vec<_>>>()?;
        Self::new(columns)
    }
}
