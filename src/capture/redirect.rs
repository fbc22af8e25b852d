//! Low-level stdout/stderr redirection
//!
//! Raw libc calls on fds 1 and 2. Every fd this module creates is marked
//! close-on-exec, except the copies installed on fds 1 and 2 themselves
//! (child processes are expected to inherit those).

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::thread::JoinHandle;

/// Create an anonymous pipe, returning `(read_end, write_end)`
pub(crate) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    // Owned from here on so an fcntl failure closes both ends
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    set_cloexec(read_end.as_raw_fd())?;
    set_cloexec(write_end.as_raw_fd())?;

    Ok((read_end, write_end))
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Duplicate `fd` onto a fresh close-on-exec descriptor
fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
    let new_fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if new_fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

/// Point `target` at the same open file as `source`
fn dup_onto(source: RawFd, target: RawFd) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::dup2(source, target) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        // dup2 can report EINTR/EBUSY on Linux while racing an open()
        if err.kind() != io::ErrorKind::Interrupted && err.raw_os_error() != Some(libc::EBUSY) {
            return Err(err);
        }
    }
}

/// Flush Rust's userspace buffers for fds 1 and 2
fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Saved copies of the real stdout/stderr while they point elsewhere
///
/// Dropping the guard puts the originals back if [`StdRedirect::restore`]
/// was not called, which covers early returns and unwinding.
pub(crate) struct StdRedirect {
    saved_stdout: OwnedFd,
    saved_stderr: OwnedFd,
    restored: bool,
}

impl StdRedirect {
    /// Point fds 1 and 2 at `target`
    pub(crate) fn install(target: &OwnedFd) -> io::Result<Self> {
        // Anything already buffered belongs to the real stream
        flush_std_streams();

        let saved_stdout = dup_cloexec(libc::STDOUT_FILENO)?;
        let saved_stderr = dup_cloexec(libc::STDERR_FILENO)?;

        // Built before the first dup2 so a half-done swap is undone on drop
        let guard = Self {
            saved_stdout,
            saved_stderr,
            restored: false,
        };

        dup_onto(target.as_raw_fd(), libc::STDOUT_FILENO)?;
        dup_onto(target.as_raw_fd(), libc::STDERR_FILENO)?;

        Ok(guard)
    }

    /// Put the original stdout/stderr back
    pub(crate) fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }

        // Buffered text written inside the scope still belongs to the pipe
        flush_std_streams();

        let stdout = dup_onto(self.saved_stdout.as_raw_fd(), libc::STDOUT_FILENO);
        let stderr = dup_onto(self.saved_stderr.as_raw_fd(), libc::STDERR_FILENO);
        self.restored = stdout.is_ok() && stderr.is_ok();
        stdout.and(stderr)
    }
}

impl Drop for StdRedirect {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Background reader emptying a pipe into memory
///
/// Runs for the whole scope so a writer never stalls on a full pipe buffer.
pub(crate) struct Drain {
    handle: JoinHandle<io::Result<Vec<u8>>>,
}

impl Drain {
    pub(crate) fn spawn(read_end: OwnedFd) -> io::Result<Self> {
        let handle = std::thread::Builder::new()
            .name("capture-drain".to_string())
            .spawn(move || {
                let mut file = File::from(read_end);
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                Ok(buf)
            })?;
        Ok(Self { handle })
    }

    /// Wait for EOF and return everything read
    ///
    /// Only returns once every copy of the write end has been closed.
    pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
        self.handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "capture drain thread panicked"))?
    }
}
