#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

//! A durable write-ahead log manager for a storage engine.
//!
//! The crate owns a directory of numbered, append-only log files plus a small
//! control file that names the earliest log position any consumer still
//! needs. Once a record has been appended through the flush layer and synced,
//! it can be read back verbatim after an arbitrary crash; partially written
//! records or files are detected during recovery and truncated away; log
//! files below the persisted minimum are reclaimed.
//!
//! The main entry points are
//!
//! * [`LogManager`] — recovery on open, rotation of the current log file,
//!   checkpointing via the control file, and reclamation,
//! * [`LogScanner`] — forward iteration over the structurally valid records
//!   of the log, starting at a [`LogAnchor`],
//! * [`LogFileManager`] — the filesystem primitives both of them sit on.
//!
//! The flush layer obtains its writer with
//! [`LogManager::switch_to_next_log_file`] and appends frames produced by
//! [`encode_record`]; upstream consumers report consumed positions through
//! [`LogManager::advance_min_log_anchor`].

mod anchor;
mod file_spec;
mod log_file;
mod log_manager;
mod records;
mod scanner;
mod wal_error;

pub use crate::anchor::{LogAnchor, MIN_LOG_FILE_NUMBER, MIN_LOG_OFFSET, UNKNOWN_LSN};
pub use crate::file_spec::LogFileSpec;
pub use crate::log_file::{
    LogFileManager, LogFileReader, LogFileWriter, CONTROL_FILE_NUMBER, SHADOW_FILE_NUMBER,
};
pub use crate::log_manager::LogManager;
pub use crate::records::{
    encode_record, framed_record_len, ControlFileRecord, UserLogRecord, CONTROL_FILE_MAGIC,
    CONTROL_FILE_RECORD_SIZE, LOG_FILE_HEADER_MAGIC, LOG_FILE_HEADER_SIZE, RECORD_FOOTER_SIZE,
    RECORD_HEADER_SIZE,
};
pub use crate::scanner::LogScanner;
pub use crate::wal_error::WalError;
