//! In-process stream objects.
//!
//! [`OutputStream`] is the writer code under test goes through when it wants
//! its output to be capturable without touching the OS: its destination can be
//! swapped at runtime. Writes that go straight to `std::io::stdout()`, `print!`
//! or a raw descriptor bypass it and are only seen by descriptor capture.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

/// Destination of an [`OutputStream`].
pub type Sink = Box<dyn Write + Send>;

/// A writer with a replaceable destination.
pub struct OutputStream {
    sink: Mutex<Sink>,
}

impl OutputStream {
    pub fn new(sink: Sink) -> Self {
        Self { sink: Mutex::new(sink) }
    }

    /// Point the stream at `sink`, returning the previous destination.
    pub fn replace(&self, sink: Sink) -> Sink {
        std::mem::replace(&mut *self.sink.lock(), sink)
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream").finish_non_exhaustive()
    }
}

impl Write for &OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.sink.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.lock().flush()
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}

/// The pair of in-process streams standing in for stdout and stderr.
#[derive(Debug, Clone)]
pub struct StdStreams {
    pub out: Arc<OutputStream>,
    pub err: Arc<OutputStream>,
}

static PROCESS_STREAMS: OnceLock<StdStreams> = OnceLock::new();

impl StdStreams {
    /// A detached pair, typically fakes for tests.
    pub fn new(out: Sink, err: Sink) -> Self {
        Self {
            out: Arc::new(OutputStream::new(out)),
            err: Arc::new(OutputStream::new(err)),
        }
    }

    /// The process-wide pair, initially writing to the real stdout and stderr.
    pub fn process() -> Self {
        Self::process_ref().clone()
    }

    fn process_ref() -> &'static StdStreams {
        PROCESS_STREAMS.get_or_init(|| Self::new(Box::new(io::stdout()), Box::new(io::stderr())))
    }

    pub fn flush(&self) -> io::Result<()> {
        (&*self.out).flush()?;
        (&*self.err).flush()
    }
}

/// The process-wide in-process stdout stream.
pub fn stdout() -> &'static OutputStream {
    &StdStreams::process_ref().out
}

/// The process-wide in-process stderr stream.
pub fn stderr() -> &'static OutputStream {
    &StdStreams::process_ref().err
}

/// Growable in-memory byte sink. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, invalid UTF-8 replaced.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }

    pub fn clear(&self) {
        self.bytes.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_follow_the_current_sink() {
        let first = SharedBuffer::new();
        let second = SharedBuffer::new();
        let stream = OutputStream::new(Box::new(first.clone()));

        write!(&stream, "one ").unwrap();
        let _previous = stream.replace(Box::new(second.clone()));
        write!(&stream, "two").unwrap();

        assert_eq!(first.contents(), "one ");
        assert_eq!(second.contents(), "two");
    }

    #[test]
    fn replace_hands_back_the_previous_sink() {
        let original = SharedBuffer::new();
        let stream = OutputStream::new(Box::new(original.clone()));

        let mut previous = stream.replace(Box::new(io::sink()));
        previous.write_all(b"still the original").unwrap();

        assert_eq!(original.contents(), "still the original");
    }

    #[test]
    fn buffer_clones_share_storage() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        writer.write_all(b"abc").unwrap();

        assert_eq!(buffer.len(), 3);
        buffer.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn process_streams_are_shared() {
        let a = StdStreams::process();
        let b = StdStreams::process();
        assert!(Arc::ptr_eq(&a.out, &b.out));
        assert!(std::ptr::eq(stderr(), &*b.err));
    }
}
