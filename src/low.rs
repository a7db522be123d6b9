//! Low-level sysfs building blocks used by [`Pin`](crate::Pin).
//!
//! This module defines the small, file-facing API the handle drives. A
//! [`Backend`] performs exactly one attribute access per call and reports
//! raw byte counts; all protocol checks (thresholds, value parsing, event
//! masks) live in the handle so they behave the same for every backend.
//!
//! The real implementation is [`sysfs::Sysfs`]. Tests and alternative
//! environments can provide their own backend, which is the seam used to
//! simulate edge delivery without hardware.
//!
//! Resource notes:
//! - Every file a backend opens must be closed before the call returns,
//!   except the [`EdgeWatch`] handed out by [`Backend::open_watch`], which
//!   the caller drops at the end of the wait.
//! - Backends are shared by reference between threads holding the same
//!   handle, so they must not keep per-call state outside the watch.

use crate::error::IoFailure;
use self::path::Attr;

/// Outcome of an export-directory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// `gpio<N>` exists and is a directory.
    Directory,
    /// Something named `gpio<N>` exists but is not a directory.
    NotDirectory,
}

/// Raw result of a priority poll: the ready count and the returned events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Value returned by `poll`: the number of ready descriptors.
    pub ready: i32,
    /// Events the kernel reported for the descriptor.
    pub revents: i16,
}

impl PollOutcome {
    /// True when poll reported at least one descriptor with `POLLPRI` set.
    pub fn is_edge(&self) -> bool {
        self.ready > 0 && self.revents & libc::POLLPRI != 0
    }
}

/// An open value attribute held for the duration of one edge wait.
pub trait EdgeWatch {
    /// Single read into `buf`, returning the byte count.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoFailure>;

    /// Block until the descriptor signals an urgent condition or poll fails.
    fn poll_priority(&mut self) -> Result<PollOutcome, IoFailure>;
}

/// File-level operations on one sysfs GPIO tree.
///
/// Implementers perform the side effects only; byte counts are returned
/// untouched so the caller can apply its own thresholds.
pub trait Backend {
    type Watch: EdgeWatch;

    /// Stat `gpio<pin>`.
    fn presence(&self, pin: u32) -> Result<Presence, IoFailure>;

    /// Write `"<pin>\n"` to the export file from offset zero.
    ///
    /// Returns the seek offset and the number of bytes written.
    fn export(&self, pin: u32) -> Result<(u64, usize), IoFailure>;

    /// Open `attr` read-write and issue a single write of `bytes`.
    fn write_attr(&self, pin: u32, attr: Attr, bytes: &[u8]) -> Result<usize, IoFailure>;

    /// Open `attr` read-only and issue a single read into `buf`.
    fn read_attr(&self, pin: u32, attr: Attr, buf: &mut [u8]) -> Result<usize, IoFailure>;

    /// Open the value attribute for an edge wait.
    fn open_watch(&self, pin: u32) -> Result<Self::Watch, IoFailure>;
}

/// Pure path construction for the sysfs GPIO hierarchy.
pub mod path {
    use std::fmt;
    use std::path::{Path, PathBuf};

    /// Default mount point of the GPIO class.
    pub const DEFAULT_ROOT: &str = "/sys/class/gpio";

    /// Per-pin attribute files.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Attr {
        /// `direction`, holding `in` or `out`.
        Direction,
        /// `value`, holding `0` or `1`.
        Value,
        /// `edge`, holding `none`, `rising`, `falling` or `both`.
        Edge,
    }

    impl Attr {
        /// Name of the attribute file inside `gpio<N>/`.
        pub fn file_name(self) -> &'static str {
            match self {
                Attr::Direction => "direction",
                Attr::Value => "value",
                Attr::Edge => "edge",
            }
        }
    }

    impl fmt::Display for Attr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.file_name())
        }
    }

    /// The export control file.
    pub fn export(root: &Path) -> PathBuf {
        root.join("export")
    }

    /// Directory the kernel creates for an exported pin.
    pub fn pin_dir(root: &Path, pin: u32) -> PathBuf {
        root.join(format!("gpio{pin}"))
    }

    /// One attribute file of a pin.
    pub fn attr(root: &Path, pin: u32, attr: Attr) -> PathBuf {
        pin_dir(root, pin).join(attr.file_name())
    }

}

/// The real backend, talking to files under a sysfs root.
pub mod sysfs {
    use std::env;
    use std::fs::{self, File, OpenOptions};
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::AsRawFd;
    use std::path::{Path, PathBuf};

    use super::path::{self, Attr};
    use super::{Backend, EdgeWatch, PollOutcome, Presence};
    use crate::error::{IoFailure, Stage};

    /// Environment variable that overrides the sysfs root in [`Sysfs::from_env`].
    pub const ROOT_ENV: &str = "MAYO_GPIO_ROOT";

    /// Backend rooted at a sysfs GPIO directory.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Sysfs {
        root: PathBuf,
    }

    impl Default for Sysfs {
        fn default() -> Self {
            Self::with_root(path::DEFAULT_ROOT)
        }
    }

    impl Sysfs {
        /// Use an alternate root, e.g. a chroot mount or a fixture tree.
        pub fn with_root(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        /// Root from `MAYO_GPIO_ROOT`, falling back to `/sys/class/gpio`.
        pub fn from_env() -> Self {
            Self::from_var(ROOT_ENV)
        }

        /// Root from the variable `key`; unset or empty means the default.
        fn from_var(key: &str) -> Self {
            match env::var_os(key) {
                Some(root) if !root.is_empty() => Self::with_root(root),
                _ => Self::default(),
            }
        }

        /// Directory holding `export` and the `gpio<N>` entries.
        pub fn root(&self) -> &Path {
            &self.root
        }
    }

    impl Backend for Sysfs {
        type Watch = ValueWatch;

        fn presence(&self, pin: u32) -> Result<Presence, IoFailure> {
            let meta = fs::metadata(path::pin_dir(&self.root, pin))
                .map_err(IoFailure::at(Stage::Stat))?;
            Ok(if meta.is_dir() {
                Presence::Directory
            } else {
                Presence::NotDirectory
            })
        }

        fn export(&self, pin: u32) -> Result<(u64, usize), IoFailure> {
            let mut file = OpenOptions::new()
                .write(true)
                .open(path::export(&self.root))
                .map_err(IoFailure::at(Stage::Open))?;
            let offset = file.seek(SeekFrom::Start(0)).map_err(IoFailure::at(Stage::Seek))?;
            let written = file
                .write(format!("{pin}\n").as_bytes())
                .map_err(IoFailure::at(Stage::Write))?;
            Ok((offset, written))
        }

        fn write_attr(&self, pin: u32, attr: Attr, bytes: &[u8]) -> Result<usize, IoFailure> {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path::attr(&self.root, pin, attr))
                .map_err(IoFailure::at(Stage::Open))?;
            file.write(bytes).map_err(IoFailure::at(Stage::Write))
        }

        fn read_attr(&self, pin: u32, attr: Attr, buf: &mut [u8]) -> Result<usize, IoFailure> {
            let mut file = File::open(path::attr(&self.root, pin, attr))
                .map_err(IoFailure::at(Stage::Open))?;
            file.read(buf).map_err(IoFailure::at(Stage::Read))
        }

        fn open_watch(&self, pin: u32) -> Result<ValueWatch, IoFailure> {
            let file = File::open(path::attr(&self.root, pin, Attr::Value))
                .map_err(IoFailure::at(Stage::Open))?;
            Ok(ValueWatch { file })
        }
    }

    /// Value attribute opened for an edge wait; closed on drop.
    #[derive(Debug)]
    pub struct ValueWatch {
        file: File,
    }

    impl EdgeWatch for ValueWatch {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoFailure> {
            self.file.read(buf).map_err(IoFailure::at(Stage::Read))
        }

        fn poll_priority(&mut self) -> Result<PollOutcome, IoFailure> {
            let mut fds = libc::pollfd {
                fd: self.file.as_raw_fd(),
                events: libc::POLLPRI,
                revents: 0,
            };
            // SAFETY: `fds` is a single valid pollfd living on this stack frame
            // and the descriptor stays open for the duration of the call
            // because `self.file` is borrowed.
            let ready = unsafe { libc::poll(&mut fds, 1, -1) };
            if ready < 0 {
                return Err(IoFailure::new(Stage::Poll, std::io::Error::last_os_error()));
            }
            Ok(PollOutcome {
                ready,
                revents: fds.revents,
            })
        }
    }

}
