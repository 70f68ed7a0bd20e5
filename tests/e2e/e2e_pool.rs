//! Shutdown-time cleanup across servers sharing a pool.

use std::time::Duration;

use pkll::{EngineServer, ProcessPool};

use crate::fixture::{fake_engine, init_logging, pid_exists, start, test_config, SILENT};

#[test]
fn test_pool_shutdown_stops_every_server() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_engine(dir.path(), SILENT);
    let pool = ProcessPool::with_grace(Duration::from_secs(2));

    let mut servers: Vec<EngineServer> = (0..3)
        .map(|_| EngineServer::from_binary(test_config(), &binary, pool.clone()))
        .collect();
    for server in &mut servers {
        start(server);
    }
    let pids: Vec<u32> = servers.iter().map(|s| s.pid().unwrap()).collect();

    // One server already stopped its engine; the pool must not signal it again.
    servers[0].terminate().unwrap();

    assert_eq!(pool.len(), 3);
    assert_eq!(pool.shutdown(), 2);
    assert_eq!(pool.shutdown(), 0);

    for (server, pid) in servers.iter().zip(&pids) {
        assert!(!server.is_running());
        assert!(!pid_exists(*pid));
    }
}

#[test]
fn test_servers_register_with_global_pool() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_engine(dir.path(), SILENT);

    let mut server = EngineServer::from_binary(test_config(), &binary, ProcessPool::global());
    start(&mut server);
    let pid = server.pid().unwrap();

    assert!(!ProcessPool::global().is_empty());

    server.terminate().unwrap();
    assert!(!pid_exists(pid));
}
