//! Failure taxonomy for the capture and transport pipeline.
//!
//! Every variant is fatal at the point it is raised. Components return these
//! up to the runner in `main`, which reports and exits with a non-zero status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open capture device {}", path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("capability check failed ({op})")]
    CapabilityMismatch {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("pixel format rejected ({op})")]
    FormatRejected {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("buffer allocation failed ({op})")]
    BufferAllocationFailed {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("stream control failed ({op})")]
    StreamControlFailed {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("dequeue failed")]
    DequeueFailed(#[source] io::Error),

    #[error("enqueue of slot {index} failed")]
    EnqueueFailed {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("cannot connect to consumer socket {}", path.display())]
    TransportUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stream header send failed")]
    HeaderSendFailed(#[source] io::Error),

    #[error("frame send failed after {sent} of {len} bytes")]
    SendFailed {
        sent: usize,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("no Y16 capable capture device found")]
    NoDevice,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Builds an `io::Error` for conditions detected in user space rather than
/// reported by a syscall.
pub(crate) fn io_err(kind: io::ErrorKind, msg: impl Into<String>) -> io::Error {
    io::Error::new(kind, msg.into())
}
