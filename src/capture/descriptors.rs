use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{error, trace, warn};

use crate::error::{CaptureError, Result};
use crate::redirect::{self, SavedDescriptor};
use crate::stream::StdStreams;
use crate::temp_file::TemporaryFile;
use crate::{Channel, Descriptor};

/// The descriptor numbers a descriptor capture takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdDescriptors {
    pub out: Descriptor,
    pub err: Descriptor,
}

impl StdDescriptors {
    /// The process standard output and error descriptors, 1 and 2.
    pub const fn process() -> Self {
        Self { out: 1, err: 2 }
    }
}

impl Default for StdDescriptors {
    fn default() -> Self {
        Self::process()
    }
}

/// One channel pointed at a temporary file, with its original destination kept
/// open so it can be put back.
#[derive(Debug)]
struct ChannelRedirect {
    channel: Channel,
    slot: Descriptor,
    saved: SavedDescriptor,
    file: TemporaryFile,
}

impl ChannelRedirect {
    fn start(channel: Channel, slot: Descriptor, temp_dir: Option<&Path>) -> Result<Self> {
        let saved = redirect::duplicate(slot)
            .map_err(|source| CaptureError::Duplicate { channel, source })?;
        let file = match temp_dir {
            Some(dir) => TemporaryFile::new_in(dir),
            None => TemporaryFile::new(),
        }
        .map_err(|source| CaptureError::TempFile { channel, source })?;
        let target = redirect::descriptor_of(file.file())
            .map_err(|source| CaptureError::Redirect { channel, source })?;
        redirect::redirect_fd_to_fd(slot, target.as_raw())
            .map_err(|source| CaptureError::Redirect { channel, source })?;
        trace!(%channel, slot, file = %file.path().display(), "descriptor redirected");
        Ok(Self { channel, slot, saved, file })
    }

    fn restore(&self) -> Result<()> {
        let channel = self.channel;
        redirect::redirect_fd_to_fd(self.slot, self.saved.as_raw())
            .map_err(|source| CaptureError::Restore { channel, source })
    }

    fn contents(&self) -> Result<String> {
        let channel = self.channel;
        self.file
            .contents()
            .map_err(|source| CaptureError::Read { channel, source })
    }

    fn clear(&self) -> Result<()> {
        let channel = self.channel;
        self.file
            .clear()
            .map_err(|source| CaptureError::TempFile { channel, source })
    }
}

#[derive(Debug)]
struct LiveRedirect {
    out: ChannelRedirect,
    err: ChannelRedirect,
}

/// Captures by pointing the stdout/stderr descriptors at temporary files, so
/// every writer in the process is seen, including C code and raw `write`s.
#[derive(Debug)]
pub(crate) struct DescriptorOutputCapture {
    descriptors: StdDescriptors,
    streams: StdStreams,
    temp_dir: Option<PathBuf>,
    live: Option<LiveRedirect>,
    stdout: String,
    stderr: String,
}

impl DescriptorOutputCapture {
    /// `streams` are the in-process writers layered on top of `descriptors`;
    /// they are flushed before every switch.
    pub(crate) fn new(descriptors: StdDescriptors, streams: StdStreams, temp_dir: Option<PathBuf>) -> Self {
        Self {
            descriptors,
            streams,
            temp_dir,
            live: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub(crate) fn activate(&mut self) -> Result<()> {
        self.flush_all()?;
        let temp_dir = self.temp_dir.as_deref();
        let out = ChannelRedirect::start(Channel::Stdout, self.descriptors.out, temp_dir)?;
        let err = match ChannelRedirect::start(Channel::Stderr, self.descriptors.err, temp_dir) {
            Ok(err) => err,
            Err(error) => {
                out.restore().inspect_err(|_| {
                    error!(%error, "stderr redirect failed and stdout could not be restored");
                })?;
                return Err(error);
            }
        };
        self.live = Some(LiveRedirect { out, err });
        Ok(())
    }

    /// Puts both descriptors back and moves the temporary files' text into the
    /// accumulated output. Both channels are always restored; the first error
    /// encountered is returned.
    pub(crate) fn deactivate(&mut self) -> Result<()> {
        let mut outcome = self.flush_all();
        let Some(live) = self.live.take() else {
            return outcome;
        };

        outcome = outcome.and(live.out.restore());
        outcome = outcome.and(live.err.restore());

        for (channel_redirect, accumulated) in [(&live.out, &mut self.stdout), (&live.err, &mut self.stderr)] {
            match channel_redirect.contents() {
                Ok(text) => {
                    trace!(channel = %channel_redirect.channel, bytes = text.len(), "captured output read back");
                    accumulated.push_str(&text);
                }
                Err(error) => outcome = outcome.and(Err(error)),
            }
        }
        outcome
    }

    pub(crate) fn stdout(&self) -> String {
        self.snapshot(&self.stdout, self.live.as_ref().map(|live| &live.out))
    }

    pub(crate) fn stderr(&self) -> String {
        self.snapshot(&self.stderr, self.live.as_ref().map(|live| &live.err))
    }

    /// While active, flush and read the live file on top of what was
    /// accumulated by earlier windows.
    fn snapshot(&self, accumulated: &str, live: Option<&ChannelRedirect>) -> String {
        let Some(live) = live else {
            return accumulated.to_owned();
        };
        if let Err(error) = self.flush_all() {
            warn!(%error, "flush before snapshot failed");
        }
        match live.contents() {
            Ok(text) => format!("{accumulated}{text}"),
            Err(error) => {
                warn!(%error, "returning output captured before the current window only");
                accumulated.to_owned()
            }
        }
    }

    pub(crate) fn clear(&mut self) -> Result<()> {
        self.stdout.clear();
        self.stderr.clear();
        if let Some(live) = &self.live {
            self.flush_all()?;
            live.out.clear()?;
            live.err.clear()?;
        }
        Ok(())
    }

    /// `std::io` buffers only sit in front of the process descriptors, so they
    /// are flushed only when those are the ones being captured.
    fn flush_channel(&self, channel: Channel) -> Result<()> {
        let process = StdDescriptors::process();
        let result = match channel {
            Channel::Stdout => (&*self.streams.out).flush().and_then(|()| {
                if self.descriptors.out == process.out {
                    io::stdout().flush()
                } else {
                    Ok(())
                }
            }),
            Channel::Stderr => (&*self.streams.err).flush().and_then(|()| {
                if self.descriptors.err == process.err {
                    io::stderr().flush()
                } else {
                    Ok(())
                }
            }),
        };
        result.map_err(|source| CaptureError::Flush { channel, source })
    }

    /// Push every buffered layer down to the descriptors before they are
    /// switched. C stdio has no per-descriptor flush, so all of it goes.
    fn flush_all(&self) -> Result<()> {
        self.flush_channel(Channel::Stdout)?;
        self.flush_channel(Channel::Stderr)?;
        if let Err(error) = redirect::flush_c_streams() {
            warn!(%error, "failed to flush C stdio buffers");
        }
        Ok(())
    }
}
