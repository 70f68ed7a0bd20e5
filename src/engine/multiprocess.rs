//! Process-level plumbing for engine children.
//!
//! Provides the shared process handle, the pool that guarantees every
//! spawned engine is terminated at shutdown, and the signal/fd setup applied
//! around `spawn`.

use std::io;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use crate::defaults;

struct HandleState {
    child: Child,
    signalled: bool,
    status: Option<ExitStatus>,
}

impl HandleState {
    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.status = status,
                Err(e) => log::debug!("try_wait on {} failed: {}", self.child.id(), e),
            }
        }
        self.status
    }
}

/// Shared handle to one spawned engine process.
///
/// Clones refer to the same child. The supervisor that spawned it and the
/// pool both hold one.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    state: Arc<Mutex<HandleState>>,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            state: Arc::new(Mutex::new(HandleState {
                child,
                signalled: false,
                status: None,
            })),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child is still running. Reaps it if it has exited.
    pub fn is_alive(&self) -> bool {
        lock(&self.state).poll_exit().is_none()
    }

    /// Exit status, once the child has exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        lock(&self.state).poll_exit()
    }

    /// Stop the child gracefully and wait for it.
    ///
    /// Sends SIGTERM, waits up to `grace`, then SIGKILL. A child that already
    /// exited or was already signalled is not signalled again.
    pub fn terminate(&self, grace: Duration) -> io::Result<ExitStatus> {
        let mut state = lock(&self.state);

        if let Some(status) = state.poll_exit() {
            return Ok(status);
        }

        if !state.signalled {
            state.signalled = true;
            if unsafe { libc::kill(self.pid as libc::pid_t, libc::SIGTERM) } != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    return Err(err);
                }
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = state.poll_exit() {
                log::debug!("Engine process {} exited with {}", self.pid, status);
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        log::warn!("Engine process {} did not respond to SIGTERM, killing", self.pid);
        state.child.kill()?;
        let status = state.child.wait()?;
        state.status = Some(status);
        Ok(status)
    }
}

struct PoolInner {
    handles: Mutex<Vec<ProcessHandle>>,
    grace: Duration,
}

impl PoolInner {
    fn shutdown(&self) -> usize {
        let handles: Vec<ProcessHandle> = lock(&self.handles).drain(..).collect();
        let mut stopped = 0;

        for handle in handles {
            if !handle.is_alive() {
                continue;
            }
            match handle.terminate(self.grace) {
                Ok(_) => stopped += 1,
                Err(e) => log::error!("Failed to stop engine process {}: {}", handle.pid(), e),
            }
        }

        if stopped > 0 {
            log::info!("Stopped {} engine process(es) at shutdown", stopped);
        }
        stopped
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Registry of every engine process spawned through it.
///
/// Cloning is cheap and shares the registry. When the last clone is dropped
/// (or `shutdown` is called) every child that is still running is
/// terminated.
#[derive(Clone)]
pub struct ProcessPool {
    inner: Arc<PoolInner>,
}

static GLOBAL_POOL: OnceLock<ProcessPool> = OnceLock::new();

extern "C" fn shutdown_global_pool() {
    if let Some(pool) = GLOBAL_POOL.get() {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool.shutdown()));
    }
}

impl ProcessPool {
    pub fn new() -> Self {
        Self::with_grace(defaults::terminate_grace())
    }

    /// Pool whose shutdown waits `grace` before killing a child.
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                handles: Mutex::new(Vec::new()),
                grace,
            }),
        }
    }

    /// The process-wide pool, shut down when the process exits.
    pub fn global() -> Self {
        GLOBAL_POOL
            .get_or_init(|| {
                if unsafe { libc::atexit(shutdown_global_pool) } != 0 {
                    log::warn!("Could not register engine cleanup at exit");
                }
                Self::new()
            })
            .clone()
    }

    pub fn register(&self, handle: ProcessHandle) {
        lock(&self.inner.handles).push(handle);
    }

    /// Number of registered handles not yet shut down.
    pub fn len(&self) -> usize {
        lock(&self.inner.handles).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminate every registered child that is still running.
    ///
    /// Returns how many children were stopped. The registry is emptied, so a
    /// second call signals nothing.
    pub fn shutdown(&self) -> usize {
        self.inner.shutdown()
    }
}

impl Default for ProcessPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal setup applied in the child between fork and exec.
///
/// The child ignores SIGHUP so closing the terminal does not take it down
/// mid-request. Its lifetime is otherwise owned by the supervisor and the
/// pool, not by the thread that spawned it.
pub fn prepare_child(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::signal(libc::SIGHUP, libc::SIG_IGN) == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Switch a file descriptor to non-blocking reads.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
