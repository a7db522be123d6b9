//! Mayo sysfs — a serialized handle for one Linux sysfs GPIO pin.
//!
//! This crate provides a small API to export a pin, set its direction, drive
//! and read its level, and block until an edge arrives. Each [`Pin`] owns a
//! lock that every operation takes for its whole duration, so I/O issued
//! through one handle never interleaves. Distinct pins are independent.
//!
//! The file accesses themselves go through a [`Backend`]; [`Sysfs`] is the
//! real one. The example below is included from an external markdown file
//! and shows both the real backend and a mocked one.
#![doc = include_str!("../doc/mock_example.md")]

mod error;
mod low;

use core::ops::Not;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

pub use error::{Error, IoFailure, Result, Stage};
pub use low::path::{Attr, DEFAULT_ROOT};
pub use low::sysfs::{ROOT_ENV, Sysfs, ValueWatch};
pub use low::{Backend, EdgeWatch, PollOutcome, Presence};

/// Logical level of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Logical low / 0.
    Low,
    /// Logical high / 1.
    High,
}

impl Level {
    /// True for [`Level::High`].
    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// True for [`Level::Low`].
    #[inline]
    pub fn is_low(self) -> bool {
        self == Level::Low
    }

    /// Text written to the value attribute.
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Level::Low => b"0\n",
            Level::High => b"1\n",
        }
    }

    /// Parse a value-attribute read. Only `0\n` and `1\n` are accepted.
    fn parse(raw: &[u8]) -> Option<Self> {
        match raw {
            b"0\n" => Some(Level::Low),
            b"1\n" => Some(Level::High),
            _ => None,
        }
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        level.is_high()
    }
}

/// Direction for a single GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDir {
    /// Configure the pin as input.
    In,
    /// Configure the pin as output.
    Out,
}

impl IoDir {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            IoDir::In => b"in\n",
            IoDir::Out => b"out\n",
        }
    }
}

/// Edge that wakes an edge wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low to high transition.
    Rising,
    /// High to low transition.
    Falling,
    /// Either transition.
    Both,
}

impl Edge {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Edge::Rising => b"rising\n",
            Edge::Falling => b"falling\n",
            Edge::Both => b"both\n",
        }
    }
}

/// Bytes requested from the value attribute on a level read.
const VALUE_READ_LEN: usize = 16;
/// Bytes requested by the read that primes an edge wait.
const PRIMING_READ_LEN: usize = 8;
/// A value read or write is one digit plus a newline.
const VALUE_LEN: usize = 2;
/// Smallest accepted write to the export file.
const EXPORT_MIN_WRITE: usize = 2;
/// Direction and edge writes must be longer than this.
const CONTROL_MIN_WRITE: usize = 2;

/// Handle to one exported sysfs GPIO pin.
///
/// The handle caches the last level it wrote or read at construction.
/// [`toggle`](Pin::toggle) trusts that cache; if another process changes the
/// pin, the cache goes stale and is only corrected by the next write.
/// [`state`](Pin::state) always reads the hardware and never touches it.
///
/// Dropping the handle does not unexport the pin.
#[derive(Debug)]
pub struct Pin<B: Backend = Sysfs> {
    id: u32,
    backend: B,
    level: Mutex<Level>,
}

impl Pin<Sysfs> {
    /// Open pin `id` under `/sys/class/gpio`, exporting it if needed.
    pub fn new(id: u32) -> Result<Self> {
        Self::with_backend(id, Sysfs::default())
    }
}

impl<B: Backend> Pin<B> {
    /// Open pin `id` through `backend`, exporting it if needed.
    ///
    /// The pin index is not range checked; an invalid index fails at the
    /// filesystem level.
    pub fn with_backend(id: u32, backend: B) -> Result<Self> {
        if ensure_dir(&backend, id).is_err() {
            export(&backend, id)?;
            ensure_dir(&backend, id).inspect_err(|err| {
                warn!(pin = id, error = %err, "pin directory missing after export");
            })?;
        }
        let level = read_level(&backend, id)?;
        debug!(pin = id, ?level, "pin opened");
        Ok(Self {
            id,
            backend,
            level: Mutex::new(level),
        })
    }

    /// Index of the pin this handle controls.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Level cached by the handle, without touching the pin.
    pub fn cached(&self) -> Level {
        *self.lock()
    }

    /// Configure the pin as an input.
    pub fn set_input(&self) -> Result<()> {
        self.set_direction(IoDir::In)
    }

    /// Configure the pin as an output.
    pub fn set_output(&self) -> Result<()> {
        self.set_direction(IoDir::Out)
    }

    /// Write the direction attribute.
    pub fn set_direction(&self, dir: IoDir) -> Result<()> {
        let _guard = self.lock();
        write_control(&self.backend, self.id, Attr::Direction, dir.as_bytes())?;
        debug!(pin = self.id, ?dir, "direction set");
        Ok(())
    }

    /// Drive the pin high.
    pub fn on(&self) -> Result<()> {
        self.drive(Level::High)
    }

    /// Drive the pin low.
    pub fn off(&self) -> Result<()> {
        self.drive(Level::Low)
    }

    /// Drive the pin to the opposite of the cached level.
    pub fn toggle(&self) -> Result<()> {
        let mut level = self.lock();
        let next = !*level;
        write_level(&self.backend, self.id, next)?;
        *level = next;
        Ok(())
    }

    /// Read the pin's current level from the value attribute.
    ///
    /// The cached level is neither consulted nor updated.
    pub fn state(&self) -> Result<Level> {
        let _guard = self.lock();
        read_level(&self.backend, self.id)
    }

    /// Block until a falling edge is seen on the pin.
    pub fn wait_for_falling(&self) -> Result<()> {
        self.wait_for_edge(Edge::Falling)
    }

    /// Block until a rising edge is seen on the pin.
    pub fn wait_for_rising(&self) -> Result<()> {
        self.wait_for_edge(Edge::Rising)
    }

    /// Configure the edge attribute and block until the kernel signals it.
    ///
    /// There is no timeout and no way to cancel the wait. The handle lock is
    /// held throughout, so every other operation on this handle waits too.
    pub fn wait_for_edge(&self, edge: Edge) -> Result<()> {
        let _guard = self.lock();
        let id = self.id;
        write_control(&self.backend, id, Attr::Edge, edge.as_bytes())?;

        let mut watch = self
            .backend
            .open_watch(id)
            .map_err(|source| value_failure(id, source))?;
        // The first read after open returns the current value and would
        // satisfy poll immediately; consume it.
        let mut buf = [0u8; PRIMING_READ_LEN];
        let read = watch.read(&mut buf).map_err(|source| value_failure(id, source))?;
        if read != VALUE_LEN {
            return Err(Error::PrimingRead { pin: id, read });
        }

        trace!(pin = id, ?edge, "waiting for edge");
        let outcome = watch.poll_priority().map_err(|failure| Error::Wait {
            pin: id,
            source: failure.source,
        })?;
        if !outcome.is_edge() {
            return Err(Error::NoEdge {
                pin: id,
                ready: outcome.ready,
                revents: outcome.revents,
            });
        }
        debug!(pin = id, ?edge, "edge detected");
        Ok(())
    }

    fn drive(&self, next: Level) -> Result<()> {
        let mut level = self.lock();
        write_level(&self.backend, self.id, next)?;
        *level = next;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Level> {
        // The guarded level is a plain value, valid even if a holder panicked.
        self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn value_failure(pin: u32, source: IoFailure) -> Error {
    Error::Attribute {
        pin,
        attr: Attr::Value,
        source,
    }
}

fn ensure_dir<B: Backend>(backend: &B, pin: u32) -> Result<()> {
    match backend.presence(pin) {
        Ok(Presence::Directory) => Ok(()),
        Ok(Presence::NotDirectory) => Err(Error::NotADirectory { pin }),
        Err(failure) => Err(Error::Stat {
            pin,
            source: failure.source,
        }),
    }
}

fn export<B: Backend>(backend: &B, pin: u32) -> Result<()> {
    let (offset, written) = backend
        .export(pin)
        .map_err(|source| Error::Export { pin, source })?;
    if offset != 0 {
        return Err(Error::ExportSeek { pin, offset });
    }
    if written < EXPORT_MIN_WRITE {
        return Err(Error::ShortExport { pin, written });
    }
    debug!(pin, "pin exported");
    Ok(())
}

/// Write a direction or edge keyword; anything up to `CONTROL_MIN_WRITE` is short.
fn write_control<B: Backend>(backend: &B, pin: u32, attr: Attr, bytes: &[u8]) -> Result<()> {
    let written = backend
        .write_attr(pin, attr, bytes)
        .map_err(|source| Error::Attribute { pin, attr, source })?;
    if written <= CONTROL_MIN_WRITE {
        return Err(Error::ShortWrite { pin, attr, written });
    }
    Ok(())
}

fn write_level<B: Backend>(backend: &B, pin: u32, level: Level) -> Result<()> {
    let written = backend
        .write_attr(pin, Attr::Value, level.as_bytes())
        .map_err(|source| value_failure(pin, source))?;
    if written != VALUE_LEN {
        return Err(Error::ShortWrite {
            pin,
            attr: Attr::Value,
            written,
        });
    }
    trace!(pin, ?level, "value written");
    Ok(())
}

fn read_level<B: Backend>(backend: &B, pin: u32) -> Result<Level> {
    let mut buf = [0u8; VALUE_READ_LEN];
    let read = backend
        .read_attr(pin, Attr::Value, &mut buf)
        .map_err(|source| value_failure(pin, source))?;
    // A count past the buffer means the backend lied; reject it like any
    // other malformed read.
    let Some(raw) = buf.get(..read) else {
        return Err(Error::InvalidValue {
            pin,
            raw: buf.to_vec(),
        });
    };
    let level = Level::parse(raw).ok_or_else(|| Error::InvalidValue {
        pin,
        raw: raw.to_vec(),
    })?;
    trace!(pin, ?level, "value read");
    Ok(level)
}
