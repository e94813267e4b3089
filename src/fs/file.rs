//! Non-blocking file handle backed by the reactor.
//!
//! `File` mirrors the networking primitives: it owns its descriptor
//! exclusively, exposes async positional read/write helpers, and closes the
//! descriptor exactly once on drop. Dropping is synchronous even though the
//! close happens inside a destructor; this asynchronous-cleanup gap is a
//! known limitation of the descriptor lifecycle.

use crate::reactor::event::Event;
use crate::reactor::future::{ReadFuture, WriteFuture};
use crate::runtime::context::ensure_fs;

use libc::{
    MAP_FAILED, MAP_SHARED, O_APPEND, O_CLOEXEC, O_CREAT, O_EXCL, O_RDONLY, O_RDWR, O_TRUNC,
    O_WRONLY, PROT_READ, PROT_WRITE, close, mmap, munmap, open,
};
use std::ffi::CString;
use std::io;

/// How a file is opened; each mode maps to one POSIX flag combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// `O_RDONLY`: existing file, no writes.
    ReadOnly,
    /// `O_RDWR | O_CREAT | O_EXCL`: create, failing if the path exists.
    ExclusiveNew,
    /// `O_WRONLY | O_CREAT | O_APPEND`: create or append.
    Append,
    /// `O_RDWR | O_CREAT | O_TRUNC`: create, discarding existing contents.
    Truncate,
    /// `O_RDWR | O_CREAT`: create or open in place.
    Overwrite,
}

impl OpenMode {
    fn flags(self) -> i32 {
        match self {
            OpenMode::ReadOnly => O_RDONLY,
            OpenMode::ExclusiveNew => O_RDWR | O_CREAT | O_EXCL,
            OpenMode::Append => O_WRONLY | O_CREAT | O_APPEND,
            OpenMode::Truncate => O_RDWR | O_CREAT | O_TRUNC,
            OpenMode::Overwrite => O_RDWR | O_CREAT,
        }
    }
}

/// An exclusively owned file descriptor with async positional I/O.
///
/// Reads and writes take an optional offset: `None` uses the handle's
/// implicit session offset and advances it; `Some(n)` is a positional
/// operation that leaves the session offset untouched.
#[derive(Debug)]
pub struct File {
    file_descriptor: i32,
    mode: OpenMode,
    current_offset: u64,
}

impl File {
    /// Opens an existing file read-only.
    pub async fn open(path: &str) -> io::Result<Self> {
        Self::create(path, OpenMode::ReadOnly).await
    }

    /// Opens a file with the given mode.
    ///
    /// Open failures propagate as the OS error; there is no retry.
    pub async fn create(path: &str, mode: OpenMode) -> io::Result<Self> {
        ensure_fs();

        let file_descriptor = open_fd(path, mode.flags() | O_CLOEXEC)?;
        Event::set_nonblocking(file_descriptor);

        Ok(Self {
            file_descriptor,
            mode,
            current_offset: 0,
        })
    }

    /// Reads into `buffer` at `offset`, or at the session offset when `None`.
    ///
    /// Returns the number of bytes read; `Ok(0)` signals end of file. A
    /// `None` offset advances the session offset by the bytes read.
    pub async fn read(&mut self, buffer: &mut [u8], offset: Option<u64>) -> io::Result<usize> {
        let position = offset.unwrap_or(self.current_offset);
        let read = ReadFuture::new(self.file_descriptor, buffer, position).await?;

        if offset.is_none() {
            self.current_offset += read as u64;
        }

        Ok(read)
    }

    /// Writes `buffer` at `offset`, or at the session offset when `None`.
    ///
    /// Returns the number of bytes written, which may be short. A `None`
    /// offset advances the session offset by the bytes written.
    pub async fn write(&mut self, buffer: &[u8], offset: Option<u64>) -> io::Result<usize> {
        let position = offset.unwrap_or(self.current_offset);
        let written = WriteFuture::new(self.file_descriptor, buffer, position).await?;

        if offset.is_none() {
            self.current_offset += written as u64;
        }

        Ok(written)
    }

    /// Writes the entire buffer at the session offset, retrying short writes.
    pub async fn write_all(&mut self, mut buffer: &[u8]) -> io::Result<()> {
        while !buffer.is_empty() {
            let written = self.write(buffer, None).await?;

            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }

            buffer = &buffer[written..];
        }

        Ok(())
    }

    /// Maps `length` bytes starting at file offset `start`.
    ///
    /// The mapping is writable only when the file was opened writable; it is
    /// unmapped when the returned [`Mapping`] is dropped. `start` must obey
    /// the platform's page-alignment rules; violations surface as the OS
    /// error.
    pub fn map(&self, start: u64, length: usize) -> io::Result<Mapping> {
        let mut prot = PROT_READ;
        if self.mode != OpenMode::ReadOnly {
            prot |= PROT_WRITE;
        }

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                length,
                prot,
                MAP_SHARED,
                self.file_descriptor,
                start as libc::off_t,
            )
        };

        if ptr == MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Mapping {
            ptr: ptr as *mut u8,
            length,
        })
    }

    /// Releases ownership of the descriptor without closing it.
    ///
    /// After this call the handle's destructor will not run, so the caller
    /// becomes responsible for closing the returned descriptor exactly once.
    pub fn into_raw_fd(self) -> i32 {
        let file_descriptor = self.file_descriptor;
        std::mem::forget(self);
        file_descriptor
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.file_descriptor >= 0 {
            unsafe {
                close(self.file_descriptor);
            }
        }
    }
}

/// A memory-mapped view of a file region, unmapped on drop.
pub struct Mapping {
    ptr: *mut u8,
    length: usize,
}

impl Mapping {
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.length) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.length) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            munmap(self.ptr as *mut _, self.length);
        }
    }
}

fn open_fd(path: &str, flags: i32) -> io::Result<i32> {
    let c_path = CString::new(path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains null byte"))?;

    let file_descriptor = unsafe {
        if flags & O_CREAT != 0 {
            open(c_path.as_ptr(), flags, 0o644)
        } else {
            open(c_path.as_ptr(), flags)
        }
    };

    if file_descriptor < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(file_descriptor)
}
