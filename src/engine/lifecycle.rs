//! Engine process lifecycle management.
//!
//! Provides the `EngineServer` struct which manages:
//! - Resolving the engine binary once per server
//! - Spawning `pkl server` with piped standard streams
//! - Routing transport calls to the active process
//! - Termination and restart

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use serde::Serialize;

use crate::defaults::DEBUG_ENV_VAR;
use crate::engine::config::EngineConfig;
use crate::engine::fetch::BinaryResolver;
use crate::engine::multiprocess::{prepare_child, ProcessHandle, ProcessPool};
use crate::error::{Error, Result};
use crate::ipc::client::{stderr_sink, Channel, DiagnosticSink};
use crate::ipc::serialization::Messages;

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Running,
    Terminated,
}

/// Supervises one Pkl engine process and talks to it.
///
/// At most one process is active at a time. Every process is registered
/// with a [`ProcessPool`] so it is stopped when the pool shuts down, even if
/// this server is leaked.
pub struct EngineServer {
    config: EngineConfig,
    binary: PathBuf,
    pool: ProcessPool,
    diagnostics: DiagnosticSink,
    channel: Option<Channel>,
    started_once: bool,
    next_request_id: u64,
}

impl EngineServer {
    /// Resolve the engine binary (downloading it if needed) for the
    /// process-wide pool.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_pool(config, ProcessPool::global())
    }

    /// Like `new`, registering children with `pool`.
    pub fn with_pool(config: EngineConfig, pool: ProcessPool) -> Result<Self> {
        let binary = BinaryResolver::new(config.clone()).resolve()?;
        Ok(Self::from_binary(config, binary, pool))
    }

    /// Use an already resolved binary.
    pub fn from_binary(
        config: EngineConfig,
        binary: impl Into<PathBuf>,
        pool: ProcessPool,
    ) -> Self {
        Self {
            config,
            binary: binary.into(),
            pool,
            diagnostics: stderr_sink(),
            channel: None,
            started_once: false,
            next_request_id: 1,
        }
    }

    /// Send engine stderr to `sink` instead of this process's stderr.
    pub fn with_diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the engine. Does nothing if one is already active.
    pub fn start(&mut self) -> Result<()> {
        self.start_process(false)
    }

    /// Start the engine with `PKL_DEBUG=1` as its only environment variable.
    pub fn start_debug(&mut self) -> Result<()> {
        self.start_process(true)
    }

    fn start_process(&mut self, debug: bool) -> Result<()> {
        if self.channel.is_some() {
            return Ok(());
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg("server")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if debug {
            cmd.env_clear().env(DEBUG_ENV_VAR, "1");
        }
        prepare_child(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            path: self.binary.clone(),
            source,
        })?;

        let stdio = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match stdio {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Spawn {
                    path: self.binary.clone(),
                    source: std::io::Error::other("child stdio was not piped"),
                });
            }
        };

        let handle = ProcessHandle::new(child);
        self.pool.register(handle.clone());

        let channel = Channel::new(
            stdin,
            stdout,
            stderr,
            handle.clone(),
            self.diagnostics.clone(),
            self.config.retry_interval,
        )
        .inspect_err(|_| {
            let _ = handle.terminate(self.config.terminate_grace);
        })?;

        log::info!("Started Pkl engine {:?} (pid {})", self.binary, handle.pid());
        self.channel = Some(channel);
        self.started_once = true;
        Ok(())
    }

    /// Stop the active engine and wait for it to exit.
    ///
    /// Returns the exit status, or `None` when nothing was running. A later
    /// `start` spawns a fresh process.
    pub fn terminate(&mut self) -> Result<Option<ExitStatus>> {
        let Some(channel) = self.channel.take() else {
            return Ok(None);
        };

        let handle = channel.process().clone();
        // Closing stdin first lets the engine see EOF before the signal lands.
        drop(channel);
        let status = handle.terminate(self.config.terminate_grace)?;
        log::info!("Pkl engine (pid {}) exited with {}", handle.pid(), status);
        Ok(Some(status))
    }

    /// Whether an engine process is active and has not exited.
    pub fn is_running(&self) -> bool {
        self.channel
            .as_ref()
            .map(|c| c.process().is_alive())
            .unwrap_or(false)
    }

    pub fn state(&self) -> ServerState {
        match (&self.channel, self.started_once) {
            (Some(_), _) => ServerState::Running,
            (None, true) => ServerState::Terminated,
            (None, false) => ServerState::NotStarted,
        }
    }

    /// Pid of the active engine process.
    pub fn pid(&self) -> Option<u32> {
        self.channel.as_ref().map(|c| c.process().pid())
    }

    /// Next request id, starting at 1. Not reset by restarts.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn channel(&mut self) -> Result<&mut Channel> {
        self.channel.as_mut().ok_or(Error::NotStarted)
    }

    pub fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<()> {
        self.channel()?.send(message)
    }

    pub fn receive(&mut self, timeout: Option<Duration>, empty_break: bool) -> Result<Messages> {
        self.channel()?.receive(timeout, empty_break)
    }

    pub fn send_and_receive<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<Messages> {
        self.channel()?.send_and_receive(message)
    }

    pub fn receive_with_retry(&mut self, max_retries: u32) -> Result<Messages> {
        self.channel()?.receive_with_retry(max_retries)
    }
}

impl Drop for EngineServer {
    fn drop(&mut self) {
        if self.channel.is_some() {
            if let Err(e) = self.terminate() {
                log::warn!("Failed to stop Pkl engine on drop: {}", e);
            }
        }
    }
}
