//! The filesystem-backed reader and writer.

use super::{LogFileReader, LogFileWriter};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

fn closed() -> io::Error {
    io::Error::other("log file handle is closed")
}

pub(super) fn as_u64(offset: i64) -> io::Result<u64> {
    u64::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative file position"))
}

fn as_i64(length: u64) -> io::Result<i64> {
    i64::try_from(length)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file length out of range"))
}

// Syncs a directory so renames and creations within it survive a crash.
// Directories cannot be opened for writing on windows; rename durability is
// left to the filesystem there.
pub(super) fn sync_directory(path: &Path) -> io::Result<()> {
    #[cfg(target_family = "unix")]
    {
        File::open(path)?.sync_all()
    }
    #[cfg(not(target_family = "unix"))]
    {
        let _ = path;
        Ok(())
    }
}

#[derive(Debug)]
pub(super) struct FsReader {
    file: Option<File>,
}

impl FsReader {
    pub(super) fn new(file: File) -> Self {
        Self { file: Some(file) }
    }
}

impl LogFileReader for FsReader {
    fn read_exact_at(&mut self, buf: &mut [u8], offset: i64) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.seek(SeekFrom::Start(as_u64(offset)?))?;
        file.read_exact(buf)
    }

    fn length(&self) -> io::Result<i64> {
        let file = self.file.as_ref().ok_or_else(closed)?;
        as_i64(file.metadata()?.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.file = None;
        Ok(())
    }
}

#[derive(Debug)]
pub(super) struct FsWriter {
    file: Option<File>,
}

impl FsWriter {
    pub(super) fn at_end(mut file: File) -> io::Result<Self> {
        file.seek(SeekFrom::End(0))?;
        Ok(Self { file: Some(file) })
    }
}

impl LogFileWriter for FsWriter {
    fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(buf)
    }

    fn seek(&mut self, offset: i64) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.seek(SeekFrom::Start(as_u64(offset)?))?;
        Ok(())
    }

    fn length(&self) -> io::Result<i64> {
        let file = self.file.as_ref().ok_or_else(closed)?;
        as_i64(file.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.sync_all()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }
}
