use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub type MpcResult<T> = Result<T, MpcError>;

/// The error taxonomy of the core.
///
/// None of these are retried anywhere; every kernel surfaces them to the
/// caller immediately.
#[derive(Debug)]
pub enum MpcError {
    /// A caller-visible precondition does not hold (mismatched lengths,
    /// bit-width exceeding the word width, unexpected rank).
    InvalidParameters(String),
    /// The transport failed; unrecoverable at this layer.
    Io(io::Error),
    /// A pending receive was dropped by the I/O layer.
    Receive,
    /// An internal invariant over share tags or bit-split widths was
    /// violated; indicates a programming bug.
    Invariant(String),
}

impl Display for MpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MpcError::InvalidParameters(msg) => write!(f, "InvalidParameters({})", msg),
            MpcError::Io(io_err) => write!(f, "Io({})", io_err),
            MpcError::Receive => f.write_str("Receive"),
            MpcError::Invariant(msg) => write!(f, "Invariant({})", msg),
        }
    }
}

impl Error for MpcError {}

impl From<io::Error> for MpcError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<oneshot::RecvError> for MpcError {
    fn from(_err: oneshot::RecvError) -> Self {
        Self::Receive
    }
}
