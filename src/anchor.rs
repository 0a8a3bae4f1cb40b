use crate::records::LOG_FILE_HEADER_SIZE;
use std::cmp::Ordering;

/// Smallest number a user log file can have.
pub const MIN_LOG_FILE_NUMBER: i64 = 1;

/// Smallest offset a record can have within a log file
/// (the file header sits below it).
pub const MIN_LOG_OFFSET: i64 = LOG_FILE_HEADER_SIZE;

/// Sentinel LSN meaning "not known at this site".
pub const UNKNOWN_LSN: i64 = -1;

/// An ordered position in the log.
///
/// Anchors order lexicographically over (file number, offset). The LSN is
/// metadata carried along and takes no part in comparisons, which is why the
/// type offers [`LogAnchor::cmp_position`] instead of implementing `Ord`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LogAnchor {
    /// Number of the log file.
    pub log_file_number: i64,
    /// Byte offset within the log file.
    pub log_file_offset: i64,
    /// LSN of the record at this position, or [`UNKNOWN_LSN`].
    pub lsn: i64,
}

impl LogAnchor {
    /// Creates an anchor from its parts.
    #[must_use]
    pub fn new(log_file_number: i64, log_file_offset: i64, lsn: i64) -> Self {
        Self {
            log_file_number,
            log_file_offset,
            lsn,
        }
    }

    /// The anchor at the first record position of the first log file.
    #[must_use]
    pub fn start_of_log() -> Self {
        Self::new(MIN_LOG_FILE_NUMBER, MIN_LOG_OFFSET, UNKNOWN_LSN)
    }

    /// Compares two anchors by position, ignoring the LSN.
    #[must_use]
    pub fn cmp_position(&self, other: &LogAnchor) -> Ordering {
        self.log_file_number
            .cmp(&other.log_file_number)
            .then_with(|| self.log_file_offset.cmp(&other.log_file_offset))
    }
}
