//! The capture controller and the two strategies behind it.

mod descriptors;
mod streams;

use std::fmt;

use tracing::{debug, error};

use crate::error::Result;
use crate::CaptureKind;

pub use descriptors::StdDescriptors;
pub(crate) use descriptors::DescriptorOutputCapture;
pub(crate) use streams::StreamOutputCapture;

pub(crate) enum Capture {
    None,
    Streams(StreamOutputCapture),
    FileDescriptors(DescriptorOutputCapture),
}

/// Diverts stdout and stderr into memory while active.
///
/// `activate` and `deactivate` must alternate, starting with `activate`;
/// calling either out of turn panics. Captured text accumulates over every
/// active window until [`clear_buffers`](Self::clear_buffers) is called.
///
/// Only one controller may be active against a given pair of channels at a
/// time. Nothing here serialises concurrent controllers.
///
/// Dropping an active controller deactivates it.
pub struct CaptureController {
    active: bool,
    capture: Capture,
}

impl CaptureController {
    /// Build a controller of `kind` against the process channels, failing if
    /// the kind is not available.
    pub fn new(kind: CaptureKind) -> Result<Self> {
        crate::CaptureConfig::with_kind(kind).build()
    }

    pub(crate) fn from_capture(capture: Capture) -> Self {
        Self { active: false, capture }
    }

    pub fn kind(&self) -> CaptureKind {
        match self.capture {
            Capture::None => CaptureKind::None,
            Capture::Streams(_) => CaptureKind::Streams,
            Capture::FileDescriptors(_) => CaptureKind::FileDescriptors,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start diverting output.
    ///
    /// # Panics
    ///
    /// If the controller is already active.
    pub fn activate(&mut self) -> Result<()> {
        assert!(!self.active, "capture is already active");
        match &mut self.capture {
            Capture::None => {}
            Capture::Streams(capture) => capture.activate(),
            Capture::FileDescriptors(capture) => capture.activate()?,
        }
        self.active = true;
        debug!(kind = %self.kind(), "capture activated");
        Ok(())
    }

    /// Stop diverting output and put the channels back.
    ///
    /// The controller is inactive afterwards even when an error is returned.
    /// A [`Restore`](crate::CaptureError::Restore) error means a channel may
    /// still be redirected and should be treated as fatal.
    ///
    /// # Panics
    ///
    /// If the controller is not active.
    pub fn deactivate(&mut self) -> Result<()> {
        assert!(self.active, "capture is not active");
        self.active = false;
        let result = match &mut self.capture {
            Capture::None => Ok(()),
            Capture::Streams(capture) => {
                capture.deactivate();
                Ok(())
            }
            Capture::FileDescriptors(capture) => capture.deactivate(),
        };
        debug!(kind = %self.kind(), ok = result.is_ok(), "capture deactivated");
        result
    }

    /// Everything captured on stdout so far.
    ///
    /// A descriptor capture queried while active flushes the process writers
    /// and includes whatever has reached its temporary file.
    pub fn stdout(&self) -> String {
        match &self.capture {
            Capture::None => String::new(),
            Capture::Streams(capture) => capture.stdout(),
            Capture::FileDescriptors(capture) => capture.stdout(),
        }
    }

    /// Everything captured on stderr so far. See [`stdout`](Self::stdout).
    pub fn stderr(&self) -> String {
        match &self.capture {
            Capture::None => String::new(),
            Capture::Streams(capture) => capture.stderr(),
            Capture::FileDescriptors(capture) => capture.stderr(),
        }
    }

    /// Forget captured text without changing whether the controller is active.
    pub fn clear_buffers(&mut self) -> Result<()> {
        match &mut self.capture {
            Capture::None => Ok(()),
            Capture::Streams(capture) => {
                capture.clear();
                Ok(())
            }
            Capture::FileDescriptors(capture) => capture.clear(),
        }
    }
}

impl fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureController")
            .field("kind", &self.kind())
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(error) = self.deactivate() {
            error!(%error, "failed to restore output while dropping an active capture");
            if !std::thread::panicking() {
                panic!("failed to restore output while dropping an active capture: {error}");
            }
        }
    }
}
