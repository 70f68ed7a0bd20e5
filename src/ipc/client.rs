//! Message transport over the engine's standard streams.
//!
//! Requests are written to the child's stdin. Responses are read from its
//! stdout by polling; whatever the engine writes to stderr is forwarded to a
//! diagnostic sink and never treated as protocol data.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::{ChildStderr, ChildStdin, ChildStdout};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::engine::multiprocess::{set_nonblocking, ProcessHandle};
use crate::error::{Error, Result};
use crate::ipc::serialization::{encode, Messages};

/// Where engine stderr output is written.
pub type DiagnosticSink = Arc<Mutex<dyn Write + Send>>;

/// Sink writing to this process's stderr.
pub fn stderr_sink() -> DiagnosticSink {
    Arc::new(Mutex::new(io::stderr()))
}

const READ_BUF_SIZE: usize = 64 * 1024;

/// Outcome of draining one stream.
struct Drained {
    bytes: Vec<u8>,
    eof: bool,
}

/// Transport bound to one running engine process.
pub struct Channel {
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    stdout_closed: bool,
    process: ProcessHandle,
    diagnostics: DiagnosticSink,
    retry_interval: Duration,
}

impl Channel {
    /// Wrap the piped streams of a freshly spawned engine.
    ///
    /// stdout and stderr are switched to non-blocking mode here.
    pub fn new(
        stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: ChildStderr,
        process: ProcessHandle,
        diagnostics: DiagnosticSink,
        retry_interval: Duration,
    ) -> io::Result<Self> {
        set_nonblocking(stdout.as_raw_fd())?;
        set_nonblocking(stderr.as_raw_fd())?;

        Ok(Self {
            stdin,
            stdout,
            stderr: Some(stderr),
            stdout_closed: false,
            process,
            diagnostics,
            retry_interval,
        })
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// Encode a message and write it to the engine.
    pub fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<()> {
        let bytes = encode(message)?;
        self.stdin.write_all(&bytes)?;
        self.stdin.flush()?;
        log::trace!("Sent {} bytes to engine {}", bytes.len(), self.process.pid());
        Ok(())
    }

    /// Wait for the engine's next batch of messages.
    ///
    /// Each wait lasts at most `timeout` (forever when `None`). With
    /// `empty_break` an expired wait returns an empty batch; otherwise the
    /// loop keeps waiting until output arrives or the engine exits, in which
    /// case whatever was collected (possibly nothing) is returned.
    pub fn receive(&mut self, timeout: Option<Duration>, empty_break: bool) -> Result<Messages> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut chunks: Vec<Vec<u8>> = Vec::new();

        loop {
            let wait = match (empty_break, deadline) {
                (true, Some(deadline)) => Some(deadline.saturating_duration_since(Instant::now())),
                _ => timeout,
            };

            let (stdout_ready, stderr_ready) = self.wait_readable(wait)?;

            if !stdout_ready && !stderr_ready && empty_break {
                return Ok(Messages::empty());
            }

            if stderr_ready {
                self.forward_stderr()?;
            }

            if stdout_ready {
                let drained = drain(&mut self.stdout)?;
                if !drained.bytes.is_empty() {
                    chunks.push(drained.bytes);
                }
                if drained.eof {
                    self.stdout_closed = true;
                }
            }

            if !chunks.is_empty() {
                break;
            }

            if self.stdout_closed || !self.process.is_alive() {
                log::warn!("Engine process {} has terminated", self.process.pid());
                break;
            }
        }

        single_chunk(chunks)
    }

    /// Send a message and block until the engine answers or exits.
    pub fn send_and_receive<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<Messages> {
        self.send(message)?;
        self.receive(None, false)
    }

    /// Receive, retrying up to `max_retries` more times while nothing arrives.
    ///
    /// Running out of retries is not an error: a warning is logged and the
    /// empty batch is returned.
    pub fn receive_with_retry(&mut self, max_retries: u32) -> Result<Messages> {
        let mut attempts = 0;

        loop {
            let messages = self.receive(Some(self.retry_interval), true)?;
            attempts += 1;

            if !messages.is_empty() {
                return Ok(messages);
            }
            if !self.process.is_alive() {
                log::warn!(
                    "Engine process {} exited before responding",
                    self.process.pid()
                );
                return Ok(messages);
            }
            if attempts > max_retries {
                log::warn!("Max retry reached after {} attempts", attempts);
                return Ok(messages);
            }
        }
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<(bool, bool)> {
        let stderr_fd: RawFd = self.stderr.as_ref().map(|s| s.as_raw_fd()).unwrap_or(-1);
        let mut fds = [
            libc::pollfd {
                fd: self.stdout.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: stderr_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let timeout_ms = poll_timeout_ms(timeout);

        loop {
            let rc =
                unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
            if rc >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        let ready =
            |fd: &libc::pollfd| fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
        Ok((ready(&fds[0]), stderr_fd >= 0 && ready(&fds[1])))
    }

    fn forward_stderr(&mut self) -> Result<()> {
        let Some(stderr) = self.stderr.as_mut() else {
            return Ok(());
        };

        let drained = drain(stderr)?;
        if !drained.bytes.is_empty() {
            let text = String::from_utf8_lossy(&drained.bytes);
            log::debug!("engine stderr: {}", text.trim_end());
            let mut sink = self
                .diagnostics
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            sink.write_all(text.as_bytes())?;
            sink.flush()?;
        }
        if drained.eof {
            self.stderr = None;
        }
        Ok(())
    }
}

/// Turn one receive cycle's output into messages.
///
/// The engine flushes one complete batch per read, so a cycle carries at
/// most one chunk. Anything more is refused rather than merged.
fn single_chunk(mut chunks: Vec<Vec<u8>>) -> Result<Messages> {
    match chunks.len() {
        0 => Ok(Messages::empty()),
        1 => Ok(Messages::new(chunks.remove(0))),
        n => Err(Error::FramingViolation { chunks: n }),
    }
}

/// Read everything currently available from a non-blocking stream.
fn drain<R: Read>(stream: &mut R) -> io::Result<Drained> {
    let mut bytes = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(Drained { bytes, eof: true }),
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(Drained { bytes, eof: false })
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn poll_timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => {
            let mut ms = t.as_millis();
            if t.subsec_nanos() % 1_000_000 != 0 {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}
