//! Test relay construction with scripted extractors and temp work directories

use media_relay::extractor::{Extractor, ScriptedExtractor, Step};
use media_relay::{Config, MediaRelay};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Config suited to tests: loopback addresses, short grace periods, work dir in `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.extractor.work_dir = temp_dir.path().to_path_buf();
    config.session.cancel_grace = Duration::from_secs(2);
    config.session.event_timeout = Duration::from_secs(10);
    config.session.chunk_size = 8;
    config.server.http.bind_address = "127.0.0.1:0".parse().unwrap();
    config.server.http.sse_keep_alive = None;
    config.server.rpc.bind_address = "127.0.0.1:0".parse().unwrap();
    config
}

/// Relay backed by `extractor`; `configure` runs after the test defaults are applied
pub fn create_relay_with(
    extractor: Arc<dyn Extractor>,
    configure: impl FnOnce(&mut Config),
) -> (Arc<MediaRelay>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&temp_dir);
    configure(&mut config);

    let relay = MediaRelay::new(config, extractor).unwrap();
    (Arc::new(relay), temp_dir)
}

/// Relay whose downloads replay `steps`
pub fn create_relay(steps: Vec<Step>) -> (Arc<MediaRelay>, TempDir) {
    create_relay_with(Arc::new(ScriptedExtractor::new(steps)), |_| {})
}
