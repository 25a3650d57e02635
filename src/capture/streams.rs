use crate::stream::{SharedBuffer, Sink, StdStreams};

/// Captures by re-pointing the in-process [`StdStreams`] at memory buffers.
///
/// Writes that do not go through those streams are not seen.
pub(crate) struct StreamOutputCapture {
    streams: StdStreams,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    saved: Option<(Sink, Sink)>,
}

impl StreamOutputCapture {
    pub(crate) fn new(streams: StdStreams) -> Self {
        Self {
            streams,
            stdout: SharedBuffer::new(),
            stderr: SharedBuffer::new(),
            saved: None,
        }
    }

    pub(crate) fn activate(&mut self) {
        let out = self.streams.out.replace(Box::new(self.stdout.clone()));
        let err = self.streams.err.replace(Box::new(self.stderr.clone()));
        self.saved = Some((out, err));
    }

    pub(crate) fn deactivate(&mut self) {
        if let Some((out, err)) = self.saved.take() {
            self.streams.out.replace(out);
            self.streams.err.replace(err);
        }
    }

    pub(crate) fn stdout(&self) -> String {
        self.stdout.contents()
    }

    pub(crate) fn stderr(&self) -> String {
        self.stderr.contents()
    }

    pub(crate) fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }
}
