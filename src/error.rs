//! Error types returned by pin operations.
//!
//! Every variant carries the pin index so a failure can be traced back to
//! the handle that produced it. Nothing here is retried internally; callers
//! decide their own retry policy.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::low::path::Attr;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Step of a low-level file operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Looking up the pin directory.
    Stat,
    /// Opening a control or attribute file.
    Open,
    /// Rewinding the export file.
    Seek,
    /// Reading an attribute.
    Read,
    /// Writing a control or attribute file.
    Write,
    /// Waiting in `poll` for an edge.
    Poll,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Stat => "stat",
            Stage::Open => "open",
            Stage::Seek => "seek",
            Stage::Read => "read",
            Stage::Write => "write",
            Stage::Poll => "poll",
        })
    }
}

/// An `io::Error` tagged with the step that produced it.
///
/// Backends return this so the handle can tell an open failure apart from a
/// write failure on the same attribute.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct IoFailure {
    /// Step that failed.
    pub stage: Stage,
    /// Error reported by the OS.
    #[source]
    pub source: io::Error,
}

impl IoFailure {
    /// Tag `source` with the step that produced it.
    pub fn new(stage: Stage, source: io::Error) -> Self {
        Self { stage, source }
    }

    /// Adapter for `map_err`, e.g. `.map_err(IoFailure::at(Stage::Open))`.
    pub fn at(stage: Stage) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::new(stage, source)
    }
}

/// Errors surfaced by [`Pin`](crate::Pin) operations.
///
/// Note that a short write is reported after the kernel has already seen
/// the bytes that were accepted, so the pin may have changed state even
/// though the call failed.
#[derive(Debug, Error)]
pub enum Error {
    /// Checking the pin directory failed after an export attempt.
    #[error("gpio{pin}: cannot stat pin directory: {source}")]
    Stat {
        pin: u32,
        #[source]
        source: io::Error,
    },

    /// The pin entry exists but is not a directory.
    #[error("gpio{pin}: pin entry is not a directory, pin is not exported")]
    NotADirectory { pin: u32 },

    /// Opening, seeking or writing the export control file failed.
    #[error("gpio{pin}: export failed: {source}")]
    Export {
        pin: u32,
        #[source]
        source: IoFailure,
    },

    /// The export control file accepted fewer bytes than required.
    #[error("gpio{pin}: export wrote {written} bytes")]
    ShortExport { pin: u32, written: usize },

    /// The export file could not be rewound to the start.
    #[error("gpio{pin}: export seek landed at offset {offset}")]
    ExportSeek { pin: u32, offset: u64 },

    /// I/O on a pin attribute failed.
    #[error("gpio{pin}: {attr} attribute: {source}")]
    Attribute {
        pin: u32,
        attr: Attr,
        #[source]
        source: IoFailure,
    },

    /// An attribute write was accepted only partially.
    #[error("gpio{pin}: setting {attr} failed, wrote {written} bytes")]
    ShortWrite { pin: u32, attr: Attr, written: usize },

    /// The value attribute returned something other than `0\n` or `1\n`.
    #[error("gpio{pin}: invalid value response {}", .raw.escape_ascii())]
    InvalidValue { pin: u32, raw: Vec<u8> },

    /// The read that primes an edge wait returned an unexpected byte count.
    #[error("gpio{pin}: priming read before poll returned {read} bytes")]
    PrimingRead { pin: u32, read: usize },

    /// The poll syscall itself failed.
    #[error("gpio{pin}: waiting for edge failed: {source}")]
    Wait {
        pin: u32,
        #[source]
        source: io::Error,
    },

    /// Poll returned without signalling an urgent condition.
    #[error("gpio{pin}: poll returned {ready} with events {revents:#06x}, no edge")]
    NoEdge { pin: u32, ready: i32, revents: i16 },
}

impl Error {
    /// Index of the pin the failing operation was issued on.
    pub fn pin(&self) -> u32 {
        match *self {
            Error::Stat { pin, .. }
            | Error::NotADirectory { pin }
            | Error::Export { pin, .. }
            | Error::ShortExport { pin, .. }
            | Error::ExportSeek { pin, .. }
            | Error::Attribute { pin, .. }
            | Error::ShortWrite { pin, .. }
            | Error::InvalidValue { pin, .. }
            | Error::PrimingRead { pin, .. }
            | Error::Wait { pin, .. }
            | Error::NoEdge { pin, .. } => pin,
        }
    }
}
