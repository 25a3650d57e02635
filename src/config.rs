use std::path::PathBuf;

use tracing::{debug, warn};

use crate::capture::{Capture, CaptureController, DescriptorOutputCapture, StdDescriptors, StreamOutputCapture};
use crate::error::{CaptureError, Result};
use crate::stream::StdStreams;
use crate::{is_capture_available, CaptureKind};

/// Environment variable selecting the capture kind.
pub const KIND_ENV: &str = "IO_CAPTURE_KIND";
/// Environment variable selecting the directory for temporary files.
pub const TMPDIR_ENV: &str = "IO_CAPTURE_TMPDIR";

/// Settings for building a [`CaptureController`].
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// The requested strategy.
    pub kind: CaptureKind,

    /// Build a `Streams` capture instead of failing when `kind` is not
    /// available. The controller's [`kind`](CaptureController::kind) tells
    /// which one was built.
    pub fallback_to_streams: bool,

    /// Where descriptor capture creates its temporary files. Defaults to the
    /// platform temporary directory.
    pub temp_dir: Option<PathBuf>,

    /// In-process streams to capture instead of the process-wide pair.
    pub streams: Option<StdStreams>,

    /// Descriptors to capture instead of 1 and 2.
    pub descriptors: Option<StdDescriptors>,
}

impl CaptureConfig {
    pub fn with_kind(kind: CaptureKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Read [`KIND_ENV`] and [`TMPDIR_ENV`] from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a caller supplied lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(kind) = lookup(KIND_ENV).filter(|value| !value.trim().is_empty()) {
            config.kind = kind.parse()?;
        }
        config.temp_dir = lookup(TMPDIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Ok(config)
    }

    /// Build an inactive controller.
    ///
    /// Fails with [`CaptureError::Unavailable`] when `kind` cannot be provided
    /// on this platform, unless `fallback_to_streams` is set.
    pub fn build(&self) -> Result<CaptureController> {
        let kind = self.resolve_kind()?;
        let capture = match kind {
            CaptureKind::None => Capture::None,
            CaptureKind::Streams => {
                let streams = self.streams.clone().unwrap_or_else(StdStreams::process);
                Capture::Streams(StreamOutputCapture::new(streams))
            }
            CaptureKind::FileDescriptors => Capture::FileDescriptors(DescriptorOutputCapture::new(
                self.descriptors.unwrap_or_default(),
                self.streams.clone().unwrap_or_else(StdStreams::process),
                self.temp_dir.clone(),
            )),
        };
        debug!(%kind, "capture controller created");
        Ok(CaptureController::from_capture(capture))
    }

    fn resolve_kind(&self) -> Result<CaptureKind> {
        if is_capture_available(self.kind) {
            return Ok(self.kind);
        }
        if self.fallback_to_streams {
            warn!(requested = %self.kind, "capture kind unavailable, falling back to streams");
            return Ok(CaptureKind::Streams);
        }
        Err(CaptureError::Unavailable { kind: self.kind })
    }
}
