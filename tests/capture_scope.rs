//! Capture scope behaviour against the real process fds
//!
//! Everything lives in one test function: the harness prints results for
//! other tests on fd 1, and anything it prints while a scope is active would
//! land in that scope's capture.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};
use std::panic;

use flexplug::capture::{run_captured, run_captured_async};
use serde_json::json;

/// (device, inode) of the open file behind `fd`
fn identity(fd: RawFd) -> (u64, u64) {
    let mut stat = MaybeUninit::<libc::stat>::uninit();
    let ret = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
    assert_eq!(ret, 0, "fstat({}) failed: {}", fd, std::io::Error::last_os_error());
    let stat = unsafe { stat.assume_init() };
    (stat.st_dev as u64, stat.st_ino as u64)
}

/// Bypasses `print!`, which the test harness intercepts before it reaches fd 1
fn write_stdout(bytes: &[u8]) {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes).unwrap();
    stdout.flush().unwrap();
}

fn write_stderr(bytes: &[u8]) {
    std::io::stderr().write_all(bytes).unwrap();
}

fn read_all(file: &mut File) -> Vec<u8> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut buf).unwrap();
    buf
}

/// Points fd 1 at a temp file for the duration of the test, standing in for
/// the stream the orchestrator reads
struct FakeStdout {
    file: File,
    saved: RawFd,
}

impl FakeStdout {
    fn install() -> Self {
        let file = tempfile::tempfile().unwrap();
        let saved = unsafe { libc::dup(libc::STDOUT_FILENO) };
        assert!(saved >= 0);
        assert!(unsafe { libc::dup2(file.as_raw_fd(), libc::STDOUT_FILENO) } >= 0);
        Self { file, saved }
    }

    fn contents(&mut self) -> Vec<u8> {
        read_all(&mut self.file)
    }

    fn clear(&mut self) {
        self.file.set_len(0).unwrap();
        // fd 1 shares the file offset; rewind it with the truncation
        self.file.seek(SeekFrom::Start(0)).unwrap();
    }
}

impl Drop for FakeStdout {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
        unsafe {
            libc::dup2(self.saved, libc::STDOUT_FILENO);
            libc::close(self.saved);
        }
    }
}

#[test]
fn test_capture_scope() {
    let original_stdout = identity(libc::STDOUT_FILENO);
    let original_stderr = identity(libc::STDERR_FILENO);

    {
        let mut real = FakeStdout::install();
        let real_identity = identity(libc::STDOUT_FILENO);

        // Operation prints progress and returns its structured result as data
        let captured = run_captured(|| {
            write_stdout(b"mounting volume x\n");
            json!({"status": "ok"})
        })
        .unwrap();

        assert_eq!(captured.output, b"mounting volume x\n");
        assert!(real.contents().is_empty(), "real stdout written during capture");
        assert_eq!(identity(libc::STDOUT_FILENO), real_identity);

        // The caller writes the result after the scope ended
        let result = captured.into_value();
        assert_eq!(result, json!({"status": "ok"}));
        write_stdout(format!("{}\n", result).as_bytes());
        assert_eq!(real.contents(), b"{\"status\":\"ok\"}\n");
        real.clear();

        // stderr goes into the same buffer, in write order
        let captured = run_captured(|| {
            write_stdout(b"out ");
            write_stderr(b"err ");
            write_stdout(b"out\n");
        })
        .unwrap();
        assert_eq!(captured.output, b"out err out\n");
        assert!(real.contents().is_empty());

        // Text left in Rust's line buffer still belongs to the capture
        let captured = run_captured(|| {
            std::io::stdout().write_all(b"no newline").unwrap();
        })
        .unwrap();
        assert_eq!(captured.output, b"no newline");
        assert!(real.contents().is_empty());

        // Nothing written still yields an (empty) capture
        let captured = run_captured(|| 42).unwrap();
        assert!(captured.output.is_empty());
        assert_eq!(captured.into_value(), 42);

        // A failing operation keeps its error and the output up to the failure
        let captured = run_captured(|| -> Result<(), String> {
            write_stdout(b"formatting device\n");
            Err("mkfs exited with status 1".to_string())
        })
        .unwrap();
        assert!(captured.failed());
        assert_eq!(captured.output, b"formatting device\n");
        assert_eq!(
            captured.into_value(),
            Err("mkfs exited with status 1".to_string())
        );
        assert_eq!(identity(libc::STDOUT_FILENO), real_identity);

        // A panicking operation is drained, streams restored, panic resumed
        let captured = run_captured(|| {
            write_stdout(b"before panic\n");
            if true {
                panic!("operation blew up");
            }
        })
        .unwrap();
        assert!(captured.panicked());
        assert!(captured.output.starts_with(b"before panic\n"));
        assert_eq!(identity(libc::STDOUT_FILENO), real_identity);

        let resumed = panic::catch_unwind(panic::AssertUnwindSafe(|| captured.into_value()));
        let payload = resumed.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"operation blew up"));
        real.clear();

        // More than a pipe buffer's worth does not block the writer
        let big = vec![b'x'; 1024 * 1024];
        let captured = run_captured(|| write_stdout(&big)).unwrap();
        assert_eq!(captured.output.len(), big.len());
        assert!(real.contents().is_empty());

        // Futures are captured the same way
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let captured = runtime
            .block_on(run_captured_async(async {
                write_stdout(b"before await\n");
                tokio::task::yield_now().await;
                write_stderr(b"after await\n");
                "done"
            }))
            .unwrap();
        assert_eq!(captured.output, b"before await\nafter await\n");
        assert_eq!(captured.into_value(), "done");
        assert!(real.contents().is_empty());
    }

    assert_eq!(identity(libc::STDOUT_FILENO), original_stdout);
    assert_eq!(identity(libc::STDERR_FILENO), original_stderr);
}
