//! Capture what code writes to stdout and stderr.
//!
//! Two strategies are offered. [`CaptureKind::Streams`] re-points the crate's
//! in-process streams ([`stdout()`], [`stderr()`]) at memory buffers; it is
//! cheap but only sees writes made through those streams.
//! [`CaptureKind::FileDescriptors`] redirects the process descriptors to
//! temporary files and sees everything, including native code, at the cost of
//! a filesystem round trip.
//!
//! ```no_run
//! use io_capture::{make_capture, scoped_activate};
//!
//! let mut controller = make_capture(true)?;
//! {
//!     let _guard = scoped_activate(&mut controller)?;
//!     println!("hello");
//! }
//! assert_eq!(controller.stdout(), "hello\n");
//! # Ok::<(), io_capture::CaptureError>(())
//! ```

use std::fmt;
use std::str::FromStr;

mod capture;
mod config;
mod error;
mod guard;
mod redirect;
pub mod stream;
mod temp_file;

pub use capture::{CaptureController, StdDescriptors};
pub use config::{CaptureConfig, KIND_ENV, TMPDIR_ENV};
pub use error::{CaptureError, Result};
pub use guard::{scoped_activate, scoped_deactivate, CaptureGuard};
pub use stream::{stderr, stdout, OutputStream, SharedBuffer, StdStreams};
pub use temp_file::TemporaryFile;

/// An OS-level file descriptor number.
pub type Descriptor = std::ffi::c_int;

/// How output is captured. Fixed for the lifetime of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureKind {
    /// Nothing is captured.
    None,
    /// Redirect the in-process streams to memory.
    #[default]
    Streams,
    /// Redirect the stdout/stderr descriptors to temporary files.
    FileDescriptors,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureKind::None => "none",
            CaptureKind::Streams => "streams",
            CaptureKind::FileDescriptors => "file-descriptors",
        })
    }
}

impl FromStr for CaptureKind {
    type Err = CaptureError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(CaptureKind::None),
            "streams" | "stream" => Ok(CaptureKind::Streams),
            "file-descriptors" | "fds" | "fd" => Ok(CaptureKind::FileDescriptors),
            _ => Err(CaptureError::UnknownKind(value.to_owned())),
        }
    }
}

/// One of the two standard output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        })
    }
}

/// Whether `kind` can be used in this build on this platform.
pub fn is_capture_available(kind: CaptureKind) -> bool {
    match kind {
        CaptureKind::None | CaptureKind::Streams => true,
        CaptureKind::FileDescriptors => redirect::AVAILABLE,
    }
}

/// Build an inactive controller against the process channels:
/// [`FileDescriptors`](CaptureKind::FileDescriptors) when `use_descriptors`
/// is set, [`Streams`](CaptureKind::Streams) otherwise.
///
/// Fails with [`CaptureError::Unavailable`] rather than substituting another
/// kind; use [`CaptureConfig::fallback_to_streams`] for that.
pub fn make_capture(use_descriptors: bool) -> Result<CaptureController> {
    let kind = if use_descriptors {
        CaptureKind::FileDescriptors
    } else {
        CaptureKind::Streams
    };
    CaptureConfig::with_kind(kind).build()
}
