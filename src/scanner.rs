//! Forward scan over the records of the log.

use crate::anchor::LogAnchor;
use crate::log_file::{LogFileManager, LogFileReader};
use crate::records::{
    self, UserLogRecord, LOG_FILE_HEADER_SIZE, RECORD_FOOTER_MAGIC, RECORD_FOOTER_SIZE,
    RECORD_HEADER_SIZE,
};
use crate::wal_error::WalError;
use log::debug;
use std::io;

/// Iterates forward over the structurally valid records of the log,
/// starting at a [`LogAnchor`].
///
/// The scanner is the sole structural validator of the log. It crosses from
/// file N to file N+1 only when file N is exhausted exactly at a record
/// boundary; any other residue is corruption of file N. The first damaged
/// frame surfaces as `WalError::InvalidLog` exactly once; afterwards the
/// scanner reports end-of-log.
///
/// [`last_good_file_number`](LogScanner::last_good_file_number) and
/// [`last_good_offset`](LogScanner::last_good_offset) name the position
/// immediately after the last structurally validated element — a record, or
/// the header of a file the scan entered. They never advance past a damaged
/// frame, so recovery can truncate there.
pub struct LogScanner<'a> {
    file_manager: &'a LogFileManager,
    reader: Option<Box<dyn LogFileReader>>,
    current_file_number: i64,
    current_offset: i64,
    last_good_file_number: i64,
    last_good_offset: i64,
    invalid: bool,
}

impl<'a> LogScanner<'a> {
    /// Creates a scanner positioned at `start`.
    #[must_use]
    pub fn new(file_manager: &'a LogFileManager, start: &LogAnchor) -> Self {
        Self {
            file_manager,
            reader: None,
            current_file_number: start.log_file_number,
            current_offset: start.log_file_offset,
            last_good_file_number: start.log_file_number,
            last_good_offset: start.log_file_offset,
            invalid: false,
        }
    }

    /// File component of the position after the last validated element.
    #[must_use]
    pub fn last_good_file_number(&self) -> i64 {
        self.last_good_file_number
    }

    /// Offset component of the position after the last validated element.
    #[must_use]
    pub fn last_good_offset(&self) -> i64 {
        self.last_good_offset
    }

    /// Returns the next structurally valid record, or `None` at clean
    /// end-of-log.
    ///
    /// # Errors
    ///
    /// `WalError::InvalidLog` on the first structurally damaged frame;
    /// afterwards the scanner reports end-of-log. `WalError::Io` passes
    /// through and leaves the scanner usable.
    pub fn next_record(&mut self) -> Result<Option<UserLogRecord>, WalError> {
        if self.invalid {
            return Ok(None);
        }
        match self.read_record() {
            Err(WalError::InvalidLog(detail)) => {
                debug!(
                    "log scan stopped after file {} offset {}: {detail}",
                    self.last_good_file_number, self.last_good_offset
                );
                self.invalid = true;
                self.close();
                Err(WalError::InvalidLog(detail))
            }
            other => other,
        }
    }

    /// Closes the reader the scanner currently holds open.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close().ok();
        }
    }

    fn read_record(&mut self) -> Result<Option<UserLogRecord>, WalError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                match self.file_manager.reader_for_log_file(self.current_file_number) {
                    Ok(mut reader) => {
                        self.check_file_header(reader.as_mut())?;
                        self.last_good_file_number = self.current_file_number;
                        self.last_good_offset = self.current_offset;
                        self.reader = Some(reader);
                        continue;
                    }
                    // the previous file ended at a record boundary and no
                    // successor exists: clean end-of-log
                    Err(WalError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                }
            };

            let file_length = reader.length()?;
            if self.current_offset == file_length {
                // exhausted exactly at a record boundary; move on
                if let Some(mut exhausted) = self.reader.take() {
                    exhausted.close()?;
                }
                self.current_file_number += 1;
                self.current_offset = LOG_FILE_HEADER_SIZE;
                continue;
            }
            if self.current_offset > file_length {
                return Err(WalError::InvalidLog(format!(
                    "scan position {} is past the end of log file {}",
                    self.current_offset, self.current_file_number
                )));
            }
            if file_length - self.current_offset < RECORD_HEADER_SIZE {
                return Err(WalError::InvalidLog(format!(
                    "log file {} ends inside a record header",
                    self.current_file_number
                )));
            }

            let mut header = [0_u8; 16];
            reader.read_exact_at(&mut header, self.current_offset)?;
            let frame = records::decode_record_header(&header).map_err(|_| {
                WalError::InvalidLog(format!(
                    "record header magic mismatch in log file {} at offset {}",
                    self.current_file_number, self.current_offset
                ))
            })?;

            let framed_len = RECORD_HEADER_SIZE + frame.payload_len + RECORD_FOOTER_SIZE;
            if file_length - self.current_offset < framed_len {
                return Err(WalError::InvalidLog(format!(
                    "log file {} ends inside a record of {} payload bytes",
                    self.current_file_number, frame.payload_len
                )));
            }

            let payload_len = usize::try_from(frame.payload_len).map_err(|_| {
                WalError::InvalidLog("record payload length out of range".to_string())
            })?;
            let mut payload = vec![0_u8; payload_len];
            reader.read_exact_at(&mut payload, self.current_offset + RECORD_HEADER_SIZE)?;

            let mut footer = [0_u8; 8];
            reader.read_exact_at(
                &mut footer,
                self.current_offset + RECORD_HEADER_SIZE + frame.payload_len,
            )?;
            let stored_checksum = records::read_u32(&footer[0..4]);
            let computed_checksum = records::record_checksum(&header[4..16], &payload);
            if stored_checksum != computed_checksum {
                return Err(WalError::InvalidLog(format!(
                    "record checksum mismatch in log file {} at offset {}",
                    self.current_file_number, self.current_offset
                )));
            }
            if records::read_u32(&footer[4..8]) != RECORD_FOOTER_MAGIC {
                return Err(WalError::InvalidLog(format!(
                    "record footer magic mismatch in log file {} at offset {}",
                    self.current_file_number, self.current_offset
                )));
            }

            self.current_offset += framed_len;
            self.last_good_file_number = self.current_file_number;
            self.last_good_offset = self.current_offset;
            return Ok(Some(UserLogRecord {
                lsn: frame.lsn,
                data: payload,
            }));
        }
    }

    // Validates the header of the file the scan is entering. A damaged
    // header parks the last-good position at the file start so recovery
    // reformats the file in place.
    fn check_file_header(&mut self, reader: &mut dyn LogFileReader) -> Result<(), WalError> {
        let mut buf = [0_u8; 12];
        let fault = match reader.read_exact_at(&mut buf, 0) {
            Ok(()) => match records::decode_log_file_header(&buf) {
                Ok(stored) if stored == self.current_file_number => return Ok(()),
                Ok(stored) => format!(
                    "log file {} carries the header of file {stored}",
                    self.current_file_number
                ),
                Err(_) => format!(
                    "log file {} header magic mismatch",
                    self.current_file_number
                ),
            },
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                format!(
                    "log file {} is shorter than its header",
                    self.current_file_number
                )
            }
            Err(e) => return Err(e.into()),
        };
        reader.close().ok();
        self.last_good_file_number = self.current_file_number;
        self.last_good_offset = 0;
        Err(WalError::InvalidLog(fault))
    }
}

impl Drop for LogScanner<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
