use std::io;

use thiserror::Error;

use crate::{CaptureKind, Channel};

/// Failures surfaced by capture selection, activation and deactivation.
///
/// Misuse of the activate/deactivate protocol is not represented here: it is a
/// programming error and panics.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{kind} capture is not available on this platform")]
    Unavailable { kind: CaptureKind },

    #[error("unknown capture kind `{0}`")]
    UnknownKind(String),

    #[error("failed to create temporary file for {channel} capture")]
    TempFile {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    #[error("failed to duplicate {channel} descriptor")]
    Duplicate {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    #[error("failed to redirect {channel} descriptor")]
    Redirect {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    /// The original destination could not be put back. The channel may still
    /// point at a temporary file; callers should treat this as fatal.
    #[error("failed to restore {channel} descriptor")]
    Restore {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush {channel}")]
    Flush {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    #[error("failed to read captured {channel} output")]
    Read {
        channel: Channel,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CaptureError>;
