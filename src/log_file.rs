//! Filesystem primitives for the numbered files of the log directory.

mod fs;

use crate::file_spec::LogFileSpec;
use crate::wal_error::WalError;
use log::{trace, warn};
use std::fs::{File, OpenOptions};
use std::io;

/// Reserved file number of the control file.
pub const CONTROL_FILE_NUMBER: i64 = -1;

/// Reserved file number of the transient shadow of the control file.
pub const SHADOW_FILE_NUMBER: i64 = -2;

/// Positioned read access to a single log file.
///
/// Any filesystem backend can provide this; the crate's own implementation
/// wraps a [`std::fs::File`].
pub trait LogFileReader: Send + std::fmt::Debug {
    /// Fills `buf` completely, starting at the absolute position `offset`.
    ///
    /// # Errors
    ///
    /// Any I/O failure, including `UnexpectedEof` when the file ends before
    /// `buf` is full.
    fn read_exact_at(&mut self, buf: &mut [u8], offset: i64) -> io::Result<()>;

    /// The current length of the file in bytes.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn length(&self) -> io::Result<i64>;

    /// Closes the reader. Closing twice is not an error.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn close(&mut self) -> io::Result<()>;
}

/// Append access to a single log file.
pub trait LogFileWriter: Send + std::fmt::Debug {
    /// Appends `buf` at the current write position.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn append(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Moves the write position to the absolute position `offset`.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn seek(&mut self, offset: i64) -> io::Result<()>;

    /// The current length of the file in bytes.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn length(&self) -> io::Result<i64>;

    /// Forces all appended bytes down to disk.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn sync(&mut self) -> io::Result<()>;

    /// Syncs and closes the writer. Closing twice is not an error.
    ///
    /// # Errors
    ///
    /// Any I/O failure, typically from the final sync.
    fn close(&mut self) -> io::Result<()>;
}

/// Creates, opens, truncates, renames and deletes the numbered files of the
/// log directory, and produces readers and writers for them.
///
/// The manager holds no open handles itself; it is cheap to clone and safe
/// to share.
#[derive(Clone, Debug)]
pub struct LogFileManager {
    file_spec: LogFileSpec,
}

impl LogFileManager {
    /// Creates a manager for the directory named by `file_spec`;
    /// the directory is created if it does not exist.
    ///
    /// # Errors
    ///
    /// `WalError::Io` if the directory cannot be created.
    pub fn new(file_spec: LogFileSpec) -> Result<Self, WalError> {
        std::fs::create_dir_all(&file_spec.directory)?;
        Ok(Self { file_spec })
    }

    /// Creates log file `log_file_number` if it is missing.
    ///
    /// Returns `true` if the file already existed; creating an existing file
    /// is not an error.
    ///
    /// # Errors
    ///
    /// `WalError::Io` on any other filesystem failure.
    pub fn create_log_file(&self, log_file_number: i64) -> Result<bool, WalError> {
        let path = self.file_spec.as_pathbuf(log_file_number);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_file) => {
                trace!("created log file {log_file_number} at {}", path.display());
                Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Truncates log file `log_file_number` to `length` bytes and syncs it.
    ///
    /// # Errors
    ///
    /// `WalError::Io` if the file cannot be opened, truncated, or synced.
    pub fn truncate_log_file(&self, log_file_number: i64, length: i64) -> Result<(), WalError> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.file_spec.as_pathbuf(log_file_number))?;
        file.set_len(fs::as_u64(length)?)?;
        file.sync_all()?;
        trace!("truncated log file {log_file_number} to {length} bytes");
        Ok(())
    }

    /// Deletes log file `log_file_number`.
    ///
    /// Best-effort: a failure is logged and swallowed, an already missing
    /// file is ignored silently.
    pub fn delete_log_file(&self, log_file_number: i64) {
        let path = self.file_spec.as_pathbuf(log_file_number);
        match std::fs::remove_file(&path) {
            Ok(()) => trace!("deleted log file {log_file_number}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot delete log file {log_file_number}: {e}"),
        }
    }

    /// Renames log file `from` over log file `to`.
    ///
    /// The rename is atomic (POSIX semantics); afterwards the containing
    /// directory is synced so the new name survives a crash.
    ///
    /// # Errors
    ///
    /// `WalError::Io` if the rename or the directory sync fails.
    pub fn rename_log_file(&self, from: i64, to: i64) -> Result<(), WalError> {
        std::fs::rename(
            self.file_spec.as_pathbuf(from),
            self.file_spec.as_pathbuf(to),
        )?;
        fs::sync_directory(&self.file_spec.directory)?;
        trace!("renamed log file {from} over {to}");
        Ok(())
    }

    /// Opens a reader on log file `log_file_number`.
    ///
    /// # Errors
    ///
    /// `WalError::NotFound` if the file does not exist, `WalError::Io` on
    /// any other failure.
    pub fn reader_for_log_file(
        &self,
        log_file_number: i64,
    ) -> Result<Box<dyn LogFileReader>, WalError> {
        match File::open(self.file_spec.as_pathbuf(log_file_number)) {
            Ok(file) => Ok(Box::new(fs::FsReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(WalError::NotFound(log_file_number))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens a writer on log file `log_file_number`, positioned at
    /// end-of-file.
    ///
    /// The file must already exist (formatted by the manager); appends land
    /// at the write position, which [`LogFileWriter::seek`] can move.
    ///
    /// # Errors
    ///
    /// `WalError::NotFound` if the file does not exist, `WalError::Io` on
    /// any other failure.
    pub fn writer_for_log_file(
        &self,
        log_file_number: i64,
    ) -> Result<Box<dyn LogFileWriter>, WalError> {
        let path = self.file_spec.as_pathbuf(log_file_number);
        match OpenOptions::new().write(true).open(&path) {
            Ok(file) => Ok(Box::new(fs::FsWriter::at_end(file)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(WalError::NotFound(log_file_number))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// True if log file `log_file_number` exists.
    ///
    /// # Errors
    ///
    /// `WalError::Io` if existence cannot be determined.
    pub fn log_file_exists(&self, log_file_number: i64) -> Result<bool, WalError> {
        match std::fs::metadata(self.file_spec.as_pathbuf(log_file_number)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The numbers of the user log files currently present, sorted ascending.
    ///
    /// Files whose names do not follow the naming scheme are ignored.
    ///
    /// # Errors
    ///
    /// `WalError::Io` if the directory cannot be read.
    pub fn existing_log_files(&self) -> Result<Vec<i64>, WalError> {
        let mut numbers = Vec::new();
        for entry in std::fs::read_dir(&self.file_spec.directory)? {
            let entry = entry?;
            if let Some(number) = self.file_spec.number_of(&entry.path()) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    pub(crate) fn sync_directory(&self) -> Result<(), WalError> {
        fs::sync_directory(&self.file_spec.directory)?;
        Ok(())
    }
}
