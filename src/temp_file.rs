use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tempfile::NamedTempFile;

const PREFIX: &str = ".io-capture-";

/// A uniquely named, exclusively created temporary file that lives exactly as
/// long as this value. The file is removed from disk on drop.
#[derive(Debug)]
pub struct TemporaryFile {
    inner: NamedTempFile,
}

impl TemporaryFile {
    /// Create a file in the platform temporary directory.
    pub fn new() -> io::Result<Self> {
        let inner = tempfile::Builder::new().prefix(PREFIX).tempfile()?;
        Ok(Self { inner })
    }

    /// Create a file in `dir`.
    pub fn new_in(dir: &Path) -> io::Result<Self> {
        let inner = tempfile::Builder::new().prefix(PREFIX).tempfile_in(dir)?;
        Ok(Self { inner })
    }

    /// Writable handle to the file.
    pub fn file(&self) -> &File {
        self.inner.as_file()
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Read back everything written so far.
    ///
    /// Reads through a freshly opened handle so the offset shared by the
    /// writer and any descriptor duplicated from it is left alone. Invalid
    /// UTF-8 is replaced rather than rejected.
    pub fn contents(&self) -> io::Result<String> {
        let mut reader = self.inner.reopen()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Truncate the file and rewind the shared write offset, so writers
    /// holding a duplicate of the handle continue at the start.
    pub fn clear(&self) -> io::Result<()> {
        let mut file = self.inner.as_file();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}
