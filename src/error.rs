use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Vocabulary miss without unknown-token fallback, or an unassigned index.
    NotFound(String),
    /// Split name outside of `train`, `val`, `test`.
    InvalidSplit(String),
    IndexOutOfRange { index: usize, len: usize },
    /// Loaded parameters do not match the configured layer widths.
    DimensionMismatch(String),
    InvalidData(String),
    InvalidConfig(String),
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::InvalidSplit(name) => {
                write!(f, "invalid split {name:?}; expected one of train, val, test")
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for split of size {len}")
            }
            Error::DimensionMismatch(msg) => write!(f, "dimension mismatch: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Error::InvalidData(format!("csv: {value}"))
    }
}
