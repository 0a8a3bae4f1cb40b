use crate::anchor::MIN_LOG_FILE_NUMBER;
use crate::log_file::{CONTROL_FILE_NUMBER, SHADOW_FILE_NUMBER};
use std::path::{Path, PathBuf};

/// Builder object for specifying the directory and the names of the log files.
///
/// Every on-disk name derives deterministically from a file number:
///
/// ```text
/// <basename>_<n>.<suffix>          user log files, n >= 1
/// <basename>_control.<suffix>      the control file
/// <basename>_shadow.<suffix>       the transient shadow of the control file
/// ```
///
/// The defaults produce `log_1.db`, `log_control.db`, and so on in the
/// current directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogFileSpec {
    pub(crate) directory: PathBuf,
    pub(crate) basename: String,
    pub(crate) suffix: String,
}

impl Default for LogFileSpec {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            basename: String::from("log"),
            suffix: String::from("db"),
        }
    }
}

impl LogFileSpec {
    /// The specified path is used as the log directory.
    ///
    /// It is created, with its parents, when a
    /// [`LogFileManager`](crate::LogFileManager) is constructed from this spec.
    #[must_use]
    pub fn directory<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.directory = directory.into();
        self
    }

    /// The specified string is used as the first filename component,
    /// instead of `log`. Using a file separator within the argument is
    /// discouraged.
    #[must_use]
    pub fn basename<S: Into<String>>(mut self, basename: S) -> Self {
        self.basename = basename.into();
        self
    }

    /// The specified string is used as the filename suffix, instead of `db`.
    #[must_use]
    pub fn suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub(crate) fn as_pathbuf(&self, log_file_number: i64) -> PathBuf {
        let filename = match log_file_number {
            CONTROL_FILE_NUMBER => format!("{}_control.{}", self.basename, self.suffix),
            SHADOW_FILE_NUMBER => format!("{}_shadow.{}", self.basename, self.suffix),
            n => format!("{}_{n}.{}", self.basename, self.suffix),
        };
        self.directory.join(filename)
    }

    // Parses a user log file number back out of a path; unexpected files
    // yield None.
    pub(crate) fn number_of(&self, path: &Path) -> Option<i64> {
        let filename = path.file_name()?.to_str()?;
        let stem = filename.strip_suffix(&format!(".{}", self.suffix))?;
        let number = stem.strip_prefix(&format!("{}_", self.basename))?;
        let number: i64 = number.parse().ok()?;
        (number >= MIN_LOG_FILE_NUMBER).then_some(number)
    }
}

#[cfg(test)]
mod tests {
    use super::LogFileSpec;
    use crate::log_file::{CONTROL_FILE_NUMBER, SHADOW_FILE_NUMBER};
    use std::path::{Path, PathBuf};

    #[test]
    fn derives_names_from_numbers() {
        let spec = LogFileSpec::default().directory("/tmp/wal");
        assert_eq!(spec.as_pathbuf(5), PathBuf::from("/tmp/wal/log_5.db"));
        assert_eq!(
            spec.as_pathbuf(CONTROL_FILE_NUMBER),
            PathBuf::from("/tmp/wal/log_control.db")
        );
        assert_eq!(
            spec.as_pathbuf(SHADOW_FILE_NUMBER),
            PathBuf::from("/tmp/wal/log_shadow.db")
        );
    }

    #[test]
    fn honors_basename_and_suffix() {
        let spec = LogFileSpec::default().basename("txn").suffix("wal");
        assert_eq!(spec.as_pathbuf(1), PathBuf::from("./txn_1.wal"));
    }

    #[test]
    fn parses_user_file_numbers_only() {
        let spec = LogFileSpec::default();
        assert_eq!(spec.number_of(Path::new("/x/log_7.db")), Some(7));
        assert_eq!(spec.number_of(Path::new("/x/log_control.db")), None);
        assert_eq!(spec.number_of(Path::new("/x/log_shadow.db")), None);
        assert_eq!(spec.number_of(Path::new("/x/other_7.db")), None);
        assert_eq!(spec.number_of(Path::new("/x/log_7.txt")), None);
        assert_eq!(spec.number_of(Path::new("/x/log_-3.db")), None);
    }
}
