//! Async file primitives.
//!
//! Non-blocking positional file I/O backed by the reactor, plus scoped
//! memory mappings.
//!
//! Public API:
//! - [`File`]: exclusively owned descriptor with async read/write
//! - [`OpenMode`]: POSIX open-flag combinations
//! - [`Mapping`]: mmap view released on drop

pub mod file;

pub use file::{File, Mapping, OpenMode};
