use std::io;

/// The primary error type for this crate.
#[derive(thiserror::Error, Debug)]
pub enum NnError {
    /// An allocation the crate explicitly pre-sizes (rather than an ordinary
    /// `Vec` push) failed to reserve space.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A zero-sized layer, unknown activation id, non-finite hyperparameter,
    /// or missing checkpoint name format.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Wrapper for standard I/O errors (file open/read/write failures).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A network or dataset file is truncated or structurally malformed.
    #[error("format error: {0}")]
    FormatError(String),

    /// A spill file's record header was read but the promised payload bytes
    /// were not available. Distinguished from `Io` because the file is not
    /// usable for recovery past this point.
    #[error("corrupt spill file: {0}")]
    CorruptSpill(String),
}

/// A specialized `Result` type for this crate, using [`NnError`].
pub type NnResult<T> = Result<T, NnError>;
