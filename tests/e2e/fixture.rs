use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pkll::{DiagnosticSink, EngineConfig, EngineServer, ProcessPool};
use tempfile::TempDir;

/// Echoes every request back, like an engine answering with the same bytes.
pub(crate) const ECHO: &str = "exec cat";

/// Never answers.
pub(crate) const SILENT: &str = "exec sleep 30";

/// Exits immediately without output.
pub(crate) const EXITS: &str = "exit 0";

pub(crate) struct TestFixture {
    _dir: TempDir,
    pub(crate) server: EngineServer,
    pub(crate) pool: ProcessPool,
    pub(crate) stderr: Arc<Mutex<Vec<u8>>>,
}

impl TestFixture {
    pub(crate) fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock().unwrap()).into_owned()
    }
}

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write a shell script standing in for `pkl server`.
pub(crate) fn fake_engine(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("pkl");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub(crate) fn test_config() -> EngineConfig {
    EngineConfig::new()
        .with_terminate_grace(Duration::from_secs(2))
        .with_retry_interval(Duration::from_millis(100))
}

/// A server running `body` as its engine, with its own pool and stderr buffer.
pub(crate) fn fixture(body: &str) -> TestFixture {
    fixture_with_config(body, test_config())
}

pub(crate) fn fixture_with_config(body: &str, config: EngineConfig) -> TestFixture {
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let binary = fake_engine(dir.path(), body);
    let pool = ProcessPool::with_grace(Duration::from_secs(2));
    let stderr = Arc::new(Mutex::new(Vec::new()));
    let sink: DiagnosticSink = stderr.clone();

    let server = EngineServer::from_binary(config, binary, pool.clone()).with_diagnostics(sink);

    TestFixture {
        _dir: dir,
        server,
        pool,
        stderr,
    }
}

/// Whether a pid still names a process (reaped children do not).
pub(crate) fn pid_exists(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Start the server, retrying while another test thread still holds a
/// freshly written script open across its fork (ETXTBSY).
pub(crate) fn start(server: &mut EngineServer) {
    start_with(server, EngineServer::start)
}

pub(crate) fn start_debug(server: &mut EngineServer) {
    start_with(server, EngineServer::start_debug)
}

fn start_with(server: &mut EngineServer, start: fn(&mut EngineServer) -> pkll::Result<()>) {
    for _ in 0..50 {
        match start(server) {
            Ok(()) => return,
            Err(pkll::Error::Spawn { source, .. })
                if source.raw_os_error() == Some(libc::ETXTBSY) =>
            {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("failed to start engine: {}", e),
        }
    }
    panic!("engine script stayed busy");
}

/// Poll until the engine has exited; the pipe closes a moment before the
/// child can be reaped.
pub(crate) fn wait_for_exit(server: &EngineServer) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if !server.is_running() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
