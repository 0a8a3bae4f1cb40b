//! Recovery, rotation, checkpointing and reclamation.

use crate::anchor::{LogAnchor, MIN_LOG_FILE_NUMBER, UNKNOWN_LSN};
use crate::file_spec::LogFileSpec;
use crate::log_file::{
    LogFileManager, LogFileWriter, CONTROL_FILE_NUMBER, SHADOW_FILE_NUMBER,
};
use crate::records::{
    encode_log_file_header, ControlFileRecord, CONTROL_FILE_RECORD_SIZE, LOG_FILE_HEADER_SIZE,
};
use crate::scanner::LogScanner;
use crate::wal_error::WalError;
use log::{debug, trace};
use std::cmp::Ordering;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The write-ahead log manager.
///
/// Owns the control file, recovers the log on [`open`](LogManager::open),
/// rotates the current log file at the flush layer's request, and reclaims
/// files no consumer still needs.
///
/// The manager is designed for a single flusher thread calling
/// [`switch_to_next_log_file`](LogManager::switch_to_next_log_file) and many
/// concurrent callers of
/// [`advance_min_log_anchor`](LogManager::advance_min_log_anchor) and
/// [`min_log_anchor`](LogManager::min_log_anchor); it can be shared behind an
/// `Arc`. Concurrent rotation is not supported.
pub struct LogManager {
    file_manager: LogFileManager,
    min_log_anchor: Mutex<LogAnchor>,
    files: Mutex<FileState>,
}

// Rotation bookkeeping. Guarded separately from the anchor so neither lock
// is ever held across an I/O call.
#[derive(Clone, Copy, Debug)]
struct FileState {
    current_log_file_number: i64,
    min_existing_log_file: i64,
}

impl LogManager {
    /// Opens the log in the directory named by `file_spec`, running recovery.
    ///
    /// With an existing control file, the log is scanned from the recorded
    /// min anchor to its end; damage at the tail is truncated or reformatted
    /// away, damage anywhere else fails the open. Without a control file the
    /// directory is bootstrapped: the first log file is formatted and a
    /// fresh control record is published.
    ///
    /// # Errors
    ///
    /// `WalError::InvalidLog` if the control record is damaged, if the log
    /// is damaged before its tail, or if the directory carries user records
    /// without a control file; `WalError::Io` on filesystem failures. Any
    /// error is fatal: no manager instance is produced.
    pub fn open(file_spec: LogFileSpec) -> Result<Self, WalError> {
        let file_manager = LogFileManager::new(file_spec)?;
        match Self::read_control_file(&file_manager) {
            Ok(control) => Self::recover(file_manager, &control),
            Err(WalError::NotFound(_)) => Self::bootstrap(file_manager),
            Err(e) => Err(e),
        }
    }

    /// Hands the flush layer the writer for the next log file.
    ///
    /// With `Some(writer)`: closes it, rewrites the control file — the
    /// checkpoint that persists any advance of the min anchor and reclaims
    /// files below it — then formats the next log file and returns a writer
    /// for it. With `None` (the handoff right after open): returns a writer
    /// for the current log file. Either writer is positioned at end-of-file.
    ///
    /// A successful return implies the control record is durably on disk
    /// before any byte is appended to the returned writer.
    ///
    /// # Errors
    ///
    /// `WalError::Io` or `WalError::InvalidLog` (unexpected file presence or
    /// absence at the rotation target). The manager stays consistent, but the
    /// caller must not keep appending through a writer whose rotation failed.
    pub fn switch_to_next_log_file(
        &self,
        current_writer: Option<Box<dyn LogFileWriter>>,
    ) -> Result<Box<dyn LogFileWriter>, WalError> {
        match current_writer {
            Some(mut writer) => {
                writer.close()?;
                self.write_control_file()?;
                let target = self.create_next_log_file()?;
                self.file_manager.writer_for_log_file(target)
            }
            None => {
                let current = self.lock_files().current_log_file_number;
                self.file_manager.writer_for_log_file(current)
            }
        }
    }

    /// Raises the min-needed anchor.
    ///
    /// Monotonic: an anchor positionally at or below the current one is
    /// silently ignored. No I/O happens here; the new anchor is persisted by
    /// the next rotation.
    pub fn advance_min_log_anchor(&self, new_anchor: LogAnchor) {
        let mut guard = self.lock_anchor();
        if new_anchor.cmp_position(&guard) == Ordering::Greater {
            *guard = new_anchor;
        }
    }

    /// Returns a copy of the current min-needed anchor.
    #[must_use]
    pub fn min_log_anchor(&self) -> LogAnchor {
        *self.lock_anchor()
    }

    /// The number of the log file the flush layer is currently writing.
    #[must_use]
    pub fn current_log_file_number(&self) -> i64 {
        self.lock_files().current_log_file_number
    }

    /// The file manager this log lives on, e.g. for constructing a
    /// [`LogScanner`].
    #[must_use]
    pub fn file_manager(&self) -> &LogFileManager {
        &self.file_manager
    }

    fn read_control_file(file_manager: &LogFileManager) -> Result<ControlFileRecord, WalError> {
        let mut reader = file_manager.reader_for_log_file(CONTROL_FILE_NUMBER)?;
        let mut buf = [0_u8; CONTROL_FILE_RECORD_SIZE];
        let result = reader.read_exact_at(&mut buf, 0);
        reader.close()?;
        match result {
            Ok(()) => ControlFileRecord::decode(&buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(WalError::InvalidLog(
                "control file is shorter than a control record".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn recover(file_manager: LogFileManager, control: &ControlFileRecord) -> Result<Self, WalError> {
        let min_anchor = control.min_anchor();
        debug!(
            "recovering from min anchor (file {}, offset {})",
            min_anchor.log_file_number, min_anchor.log_file_offset
        );

        let mut scanner = LogScanner::new(&file_manager, &min_anchor);
        let mut invalid_log = false;
        loop {
            match scanner.next_record() {
                Ok(Some(_record)) => {}
                Ok(None) => break,
                Err(WalError::InvalidLog(detail)) => {
                    debug!("scan found a damaged tail: {detail}");
                    invalid_log = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        let last_good_file_number = scanner.last_good_file_number();
        let last_good_offset = scanner.last_good_offset();
        drop(scanner);

        if last_good_file_number < MIN_LOG_FILE_NUMBER || last_good_offset < 0 {
            return Err(WalError::InvalidLog(format!(
                "scan ended at impossible position (file {last_good_file_number}, offset {last_good_offset})"
            )));
        }
        let last_good = LogAnchor::new(last_good_file_number, last_good_offset, UNKNOWN_LSN);
        if last_good.cmp_position(&min_anchor) == Ordering::Less {
            return Err(WalError::InvalidLog(format!(
                "scan ended at (file {last_good_file_number}, offset {last_good_offset}), \
                 before the recorded min anchor"
            )));
        }

        if invalid_log {
            if file_manager.log_file_exists(last_good_file_number + 1)? {
                return Err(WalError::InvalidLog(format!(
                    "log file {last_good_file_number} is damaged but file {} exists: \
                     the damage is not at the tail",
                    last_good_file_number + 1
                )));
            }
            if last_good_offset >= LOG_FILE_HEADER_SIZE {
                debug!(
                    "truncating log file {last_good_file_number} to offset {last_good_offset}"
                );
                file_manager.truncate_log_file(last_good_file_number, last_good_offset)?;
            } else {
                debug!("reformatting log file {last_good_file_number} with a torn header");
                Self::format_log_file(&file_manager, last_good_file_number, true)?;
            }
        }

        Ok(Self {
            file_manager,
            min_log_anchor: Mutex::new(min_anchor),
            files: Mutex::new(FileState {
                current_log_file_number: last_good_file_number,
                min_existing_log_file: control.min_existing_log_file,
            }),
        })
    }

    fn bootstrap(file_manager: LogFileManager) -> Result<Self, WalError> {
        if file_manager.log_file_exists(MIN_LOG_FILE_NUMBER)? {
            let mut reader = file_manager.reader_for_log_file(MIN_LOG_FILE_NUMBER)?;
            let length = reader.length()?;
            reader.close()?;
            if length > LOG_FILE_HEADER_SIZE {
                return Err(WalError::InvalidLog(format!(
                    "log file {MIN_LOG_FILE_NUMBER} carries records but there is no control file"
                )));
            }
            Self::format_log_file(&file_manager, MIN_LOG_FILE_NUMBER, true)?;
        } else {
            Self::format_log_file(&file_manager, MIN_LOG_FILE_NUMBER, false)?;
        }
        debug!("bootstrapped a fresh log directory");

        let manager = Self {
            file_manager,
            min_log_anchor: Mutex::new(LogAnchor::start_of_log()),
            files: Mutex::new(FileState {
                current_log_file_number: MIN_LOG_FILE_NUMBER,
                min_existing_log_file: MIN_LOG_FILE_NUMBER,
            }),
        };
        manager.write_control_file()?;
        Ok(manager)
    }

    // Persists the control record: reclaim superseded files, serialise,
    // write the shadow, sync it, rename it over the live control file.
    fn write_control_file(&self) -> Result<(), WalError> {
        let min_anchor = self.min_log_anchor();
        let mut min_existing = self.lock_files().min_existing_log_file;

        if min_anchor.log_file_number > min_existing {
            for number in min_existing..min_anchor.log_file_number {
                self.file_manager.delete_log_file(number);
            }
            min_existing = min_anchor.log_file_number;
        }

        let record = ControlFileRecord {
            min_existing_log_file: min_existing,
            min_needed_log_file: min_anchor.log_file_number,
            min_needed_log_file_offset: min_anchor.log_file_offset,
            min_needed_lsn: min_anchor.lsn,
        };

        if self.file_manager.create_log_file(SHADOW_FILE_NUMBER)? {
            self.file_manager.truncate_log_file(SHADOW_FILE_NUMBER, 0)?;
        }
        let mut writer = self.file_manager.writer_for_log_file(SHADOW_FILE_NUMBER)?;
        writer.append(&record.encode())?;
        writer.sync()?;
        writer.close()?;
        self.file_manager
            .rename_log_file(SHADOW_FILE_NUMBER, CONTROL_FILE_NUMBER)?;
        trace!(
            "checkpoint: min existing {min_existing}, min needed (file {}, offset {})",
            min_anchor.log_file_number,
            min_anchor.log_file_offset
        );

        self.lock_files().min_existing_log_file = min_existing;
        Ok(())
    }

    fn create_next_log_file(&self) -> Result<i64, WalError> {
        let target = self.lock_files().current_log_file_number + 1;
        Self::format_log_file(&self.file_manager, target, false)?;
        self.lock_files().current_log_file_number = target;
        Ok(target)
    }

    // Formats a log file: empty file, header, sync. `reformat_existing_file`
    // states whether the target is expected to be present already; a
    // mismatch with the filesystem is structural damage.
    fn format_log_file(
        file_manager: &LogFileManager,
        log_file_number: i64,
        reformat_existing_file: bool,
    ) -> Result<(), WalError> {
        let already_existed = file_manager.create_log_file(log_file_number)?;
        if already_existed != reformat_existing_file {
            return Err(WalError::InvalidLog(if already_existed {
                format!("log file {log_file_number} already exists but was not expected to")
            } else {
                format!("log file {log_file_number} is missing")
            }));
        }
        if reformat_existing_file {
            file_manager.truncate_log_file(log_file_number, 0)?;
        }
        let mut writer = file_manager.writer_for_log_file(log_file_number)?;
        writer.append(&encode_log_file_header(log_file_number))?;
        writer.sync()?;
        writer.close()?;
        file_manager.sync_directory()?;
        trace!("formatted log file {log_file_number}");
        Ok(())
    }

    // The critical sections around both locks are plain copies, so a
    // poisoned lock still carries consistent data and is simply taken over.
    fn lock_anchor(&self) -> MutexGuard<'_, LogAnchor> {
        self.min_log_anchor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_files(&self) -> MutexGuard<'_, FileState> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
