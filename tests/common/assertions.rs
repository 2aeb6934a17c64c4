//! Custom assertions for session teardown

use media_relay::MediaRelay;
use std::path::Path;
use std::time::{Duration, Instant};

/// Wait until no worker threads are alive, failing the test after `timeout`
pub async fn assert_workers_reaped(relay: &MediaRelay, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while relay.live_workers() > 0 {
        assert!(
            Instant::now() < deadline,
            "{} worker(s) still alive after {:?}",
            relay.live_workers(),
            timeout
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Assert every per-session work directory has been removed
pub fn assert_work_dir_empty(work_dir: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(work_dir)
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    assert!(leftovers.is_empty(), "work dir not cleaned up: {leftovers:?}");
}
