use thiserror::Error;

/// Describes errors raised by the write-ahead log manager.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WalError {
    /// A filesystem operation on the log directory failed.
    #[error("Log directory I/O failed")]
    Io(#[from] std::io::Error),

    /// The on-disk log structure is damaged beyond tail repair.
    ///
    /// Raised for checksum mismatches, wrong magic numbers, impossible
    /// record lengths, out-of-range anchors, and unexpected presence or
    /// absence of log files.
    #[error("Invalid log: {0}")]
    InvalidLog(String),

    /// The requested log file does not exist.
    ///
    /// Used as a control-flow signal during bootstrap and scanning; it is
    /// never surfaced by [`LogManager::open`](crate::LogManager::open).
    #[error("Log file {0} does not exist")]
    NotFound(i64),
}
