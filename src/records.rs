//! The binary formats of the log: the control record, the log file header,
//! and the frame around every user record.
//!
//! All integers are stored big-endian. Writer and scanner consume the same
//! constant set, so a frame appended through [`encode_record`] is exactly
//! what [`LogScanner`](crate::LogScanner) validates on the way back.

use crate::anchor::{LogAnchor, MIN_LOG_FILE_NUMBER, MIN_LOG_OFFSET};
use crate::wal_error::WalError;
use adler32::RollingAdler32;

/// Magic number closing the control record.
pub const CONTROL_FILE_MAGIC: u32 = 0xFF11_FF11;

/// Size of the control record in bytes.
pub const CONTROL_FILE_RECORD_SIZE: usize = 44;

/// Magic number that follows the file number in every log file header.
pub const LOG_FILE_HEADER_MAGIC: u32 = 0xFF77_FF77;

/// Size of the log file header: 8-byte file number plus 4-byte magic.
///
/// The header is also the minimum valid length of a log file.
pub const LOG_FILE_HEADER_SIZE: i64 = 12;

/// Magic number opening every record frame.
pub(crate) const RECORD_HEADER_MAGIC: u32 = 0x010F_010F;

/// Size of the record frame header: magic, payload length, LSN.
pub const RECORD_HEADER_SIZE: i64 = 16;

/// Magic number closing every record frame.
pub(crate) const RECORD_FOOTER_MAGIC: u32 = 0x0F01_0F01;

/// Size of the record frame footer: checksum plus magic.
pub const RECORD_FOOTER_SIZE: i64 = 8;

/// A user record: opaque payload bytes plus the LSN stamped by the producer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserLogRecord {
    /// LSN stamped by the producer.
    pub lsn: i64,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
}

/// The persistent content of the control file.
///
/// Serialised as a fixed 44-byte record; see the field order in
/// [`ControlFileRecord::encode`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ControlFileRecord {
    /// Smallest log file number that still exists on disk.
    pub min_existing_log_file: i64,
    /// Smallest log file number any consumer still needs.
    pub min_needed_log_file: i64,
    /// Offset within that file of the first still-needed record.
    pub min_needed_log_file_offset: i64,
    /// LSN at that offset, or [`UNKNOWN_LSN`](crate::UNKNOWN_LSN).
    pub min_needed_lsn: i64,
}

impl ControlFileRecord {
    /// Serialises the record into its 44-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; CONTROL_FILE_RECORD_SIZE] {
        let mut buf = [0_u8; CONTROL_FILE_RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.min_existing_log_file.to_be_bytes());
        buf[8..16].copy_from_slice(&self.min_needed_log_file.to_be_bytes());
        buf[16..24].copy_from_slice(&self.min_needed_log_file_offset.to_be_bytes());
        buf[24..32].copy_from_slice(&self.min_needed_lsn.to_be_bytes());
        // Adler-32 is 32 bits wide; the slot is 8 bytes for compatibility
        // with the historic layout, so the high half stays zero.
        let checksum = u64::from(adler32_of(&buf[0..32]));
        buf[32..40].copy_from_slice(&checksum.to_be_bytes());
        buf[40..44].copy_from_slice(&CONTROL_FILE_MAGIC.to_be_bytes());
        buf
    }

    /// Deserialises and verifies a 44-byte control record.
    ///
    /// # Errors
    ///
    /// `WalError::InvalidLog` if the magic or the checksum does not match,
    /// or if the decoded fields violate the control-record invariants.
    pub fn decode(buf: &[u8; CONTROL_FILE_RECORD_SIZE]) -> Result<Self, WalError> {
        if read_u32(&buf[40..44]) != CONTROL_FILE_MAGIC {
            return Err(WalError::InvalidLog(
                "control record magic mismatch".to_string(),
            ));
        }
        let stored = read_u64(&buf[32..40]);
        let computed = u64::from(adler32_of(&buf[0..32]));
        if stored != computed {
            return Err(WalError::InvalidLog(format!(
                "control record checksum mismatch: stored {stored:#x}, computed {computed:#x}"
            )));
        }
        let record = Self {
            min_existing_log_file: read_i64(&buf[0..8]),
            min_needed_log_file: read_i64(&buf[8..16]),
            min_needed_log_file_offset: read_i64(&buf[16..24]),
            min_needed_lsn: read_i64(&buf[24..32]),
        };
        record.validate()?;
        Ok(record)
    }

    /// The min-needed position recorded here, as an anchor.
    #[must_use]
    pub fn min_anchor(&self) -> LogAnchor {
        LogAnchor::new(
            self.min_needed_log_file,
            self.min_needed_log_file_offset,
            self.min_needed_lsn,
        )
    }

    fn validate(&self) -> Result<(), WalError> {
        if self.min_existing_log_file < MIN_LOG_FILE_NUMBER {
            return Err(WalError::InvalidLog(format!(
                "control record names min existing log file {}",
                self.min_existing_log_file
            )));
        }
        if self.min_needed_log_file < self.min_existing_log_file {
            return Err(WalError::InvalidLog(format!(
                "control record needs log file {} below the min existing log file {}",
                self.min_needed_log_file, self.min_existing_log_file
            )));
        }
        if self.min_needed_log_file_offset < MIN_LOG_OFFSET {
            return Err(WalError::InvalidLog(format!(
                "control record names offset {} inside a log file header",
                self.min_needed_log_file_offset
            )));
        }
        Ok(())
    }
}

/// Encodes the header of log file `log_file_number`.
#[must_use]
pub(crate) fn encode_log_file_header(log_file_number: i64) -> [u8; 12] {
    let mut buf = [0_u8; 12];
    buf[0..8].copy_from_slice(&log_file_number.to_be_bytes());
    buf[8..12].copy_from_slice(&LOG_FILE_HEADER_MAGIC.to_be_bytes());
    buf
}

/// Decodes a log file header, returning the stored file number.
///
/// # Errors
///
/// `WalError::InvalidLog` if the magic does not match.
pub(crate) fn decode_log_file_header(buf: &[u8; 12]) -> Result<i64, WalError> {
    if read_u32(&buf[8..12]) != LOG_FILE_HEADER_MAGIC {
        return Err(WalError::InvalidLog(
            "log file header magic mismatch".to_string(),
        ));
    }
    Ok(read_i64(&buf[0..8]))
}

/// Frames a record for appending to a log file.
///
/// The frame is header (magic, payload length, LSN), payload, footer
/// (checksum, magic); appending its bytes through the flush layer's writer
/// produces exactly one scannable record.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
#[must_use]
pub fn encode_record(lsn: i64, payload: &[u8]) -> Vec<u8> {
    let length = u32::try_from(payload.len()).expect("record payload exceeds the length field");
    let mut buf = Vec::with_capacity(payload.len() + 24);
    buf.extend_from_slice(&RECORD_HEADER_MAGIC.to_be_bytes());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(&lsn.to_be_bytes());
    buf.extend_from_slice(payload);
    let checksum = record_checksum(&buf[4..16], payload);
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf.extend_from_slice(&RECORD_FOOTER_MAGIC.to_be_bytes());
    buf
}

/// The framed on-disk size of a record with a payload of `payload_len` bytes.
///
/// # Panics
///
/// Panics if `payload_len` does not fit into an `i64`.
#[must_use]
pub fn framed_record_len(payload_len: usize) -> i64 {
    let payload_len = i64::try_from(payload_len).expect("record payload exceeds the length field");
    RECORD_HEADER_SIZE + payload_len + RECORD_FOOTER_SIZE
}

/// The decoded header of a record frame.
pub(crate) struct RecordFrameHeader {
    pub payload_len: i64,
    pub lsn: i64,
}

/// Decodes a record frame header.
///
/// # Errors
///
/// `WalError::InvalidLog` if the magic does not match.
pub(crate) fn decode_record_header(buf: &[u8; 16]) -> Result<RecordFrameHeader, WalError> {
    if read_u32(&buf[0..4]) != RECORD_HEADER_MAGIC {
        return Err(WalError::InvalidLog(
            "record header magic mismatch".to_string(),
        ));
    }
    Ok(RecordFrameHeader {
        payload_len: i64::from(read_u32(&buf[4..8])),
        lsn: read_i64(&buf[8..16]),
    })
}

/// Checksum of a record frame: the 12 header bytes after the magic
/// (payload length and LSN), then the payload.
pub(crate) fn record_checksum(header_tail: &[u8], payload: &[u8]) -> u32 {
    let mut hash = RollingAdler32::new();
    hash.update_buffer(header_tail);
    hash.update_buffer(payload);
    hash.hash()
}

pub(crate) fn adler32_of(bytes: &[u8]) -> u32 {
    let mut hash = RollingAdler32::new();
    hash.update_buffer(bytes);
    hash.hash()
}

pub(crate) fn read_u32(buf: &[u8]) -> u32 {
    let mut bytes = [0_u8; 4];
    bytes.copy_from_slice(buf);
    u32::from_be_bytes(bytes)
}

fn read_u64(buf: &[u8]) -> u64 {
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(buf);
    u64::from_be_bytes(bytes)
}

fn read_i64(buf: &[u8]) -> i64 {
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(buf);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::{
        decode_log_file_header, decode_record_header, encode_log_file_header, encode_record,
        framed_record_len, read_u64, record_checksum, ControlFileRecord, CONTROL_FILE_RECORD_SIZE,
    };
    use crate::wal_error::WalError;

    fn sample_control_record() -> ControlFileRecord {
        ControlFileRecord {
            min_existing_log_file: 3,
            min_needed_log_file: 5,
            min_needed_log_file_offset: 740,
            min_needed_lsn: 123_456,
        }
    }

    #[test]
    fn control_record_round_trip() {
        let record = sample_control_record();
        let buf = record.encode();
        assert_eq!(ControlFileRecord::decode(&buf).unwrap(), record);
    }

    #[test]
    fn control_checksum_slot_keeps_high_half_zero() {
        let buf = sample_control_record().encode();
        let stored = read_u64(&buf[32..40]);
        assert_eq!(stored >> 32, 0);
    }

    #[test]
    fn control_record_rejects_flipped_byte() {
        let mut buf = sample_control_record().encode();
        buf[17] ^= 0x01;
        assert!(matches!(
            ControlFileRecord::decode(&buf),
            Err(WalError::InvalidLog(_))
        ));
    }

    #[test]
    fn control_record_rejects_bad_magic() {
        let mut buf = sample_control_record().encode();
        buf[CONTROL_FILE_RECORD_SIZE - 1] ^= 0xFF;
        assert!(matches!(
            ControlFileRecord::decode(&buf),
            Err(WalError::InvalidLog(_))
        ));
    }

    #[test]
    fn control_record_rejects_needed_below_existing() {
        let buf = ControlFileRecord {
            min_existing_log_file: 5,
            min_needed_log_file: 3,
            min_needed_log_file_offset: 12,
            min_needed_lsn: -1,
        }
        .encode();
        assert!(matches!(
            ControlFileRecord::decode(&buf),
            Err(WalError::InvalidLog(_))
        ));
    }

    #[test]
    fn control_record_rejects_offset_inside_header() {
        let buf = ControlFileRecord {
            min_existing_log_file: 1,
            min_needed_log_file: 1,
            min_needed_log_file_offset: 4,
            min_needed_lsn: -1,
        }
        .encode();
        assert!(matches!(
            ControlFileRecord::decode(&buf),
            Err(WalError::InvalidLog(_))
        ));
    }

    #[test]
    fn log_file_header_round_trip() {
        let buf = encode_log_file_header(42);
        assert_eq!(decode_log_file_header(&buf).unwrap(), 42);
    }

    #[test]
    fn log_file_header_rejects_bad_magic() {
        let mut buf = encode_log_file_header(42);
        buf[10] ^= 0x10;
        assert!(matches!(
            decode_log_file_header(&buf),
            Err(WalError::InvalidLog(_))
        ));
    }

    #[test]
    fn record_frame_round_trip() {
        let payload = b"directory entry change".to_vec();
        let frame = encode_record(77, &payload);
        assert_eq!(
            i64::try_from(frame.len()).unwrap(),
            framed_record_len(payload.len())
        );

        let mut header = [0_u8; 16];
        header.copy_from_slice(&frame[0..16]);
        let decoded = decode_record_header(&header).unwrap();
        assert_eq!(decoded.payload_len, i64::try_from(payload.len()).unwrap());
        assert_eq!(decoded.lsn, 77);

        let body = &frame[16..16 + payload.len()];
        assert_eq!(body, payload.as_slice());

        let checksum = record_checksum(&frame[4..16], body);
        let stored = &frame[16 + payload.len()..20 + payload.len()];
        assert_eq!(stored, checksum.to_be_bytes());
    }

    #[test]
    fn record_checksum_covers_the_lsn() {
        let payload = b"entry";
        let a = encode_record(1, payload);
        let b = encode_record(2, payload);
        assert_ne!(
            a[16 + payload.len()..20 + payload.len()],
            b[16 + payload.len()..20 + payload.len()]
        );
    }
}
