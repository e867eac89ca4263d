//! Shared fixtures for unit tests
//!
//! Only compiled in test builds.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::archive::assets::AssetStore;
use crate::archive::clock::test_clock::TestClock;
use crate::archive::records::RecordStore;
use crate::archive::service::{ArchiveObserver, ArchiveService};
use crate::archive::session::JsonSessionCodec;
use crate::config::Config;

/// Single-entry session state navigated to `url` with `title`
pub fn blob(url: &str, title: &str) -> String {
    serde_json::json!({
        "entries": [{ "url": url, "title": title }],
        "index": 1,
    })
    .to_string()
}

/// Service over a fresh archive directory, driven by a test clock
///
/// Keep the `TempDir` alive for as long as the service is used.
pub fn service() -> (ArchiveService, TestClock, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::at(temp_dir.path().join("archive"));
    config.ensure_dirs().unwrap();

    let clock = TestClock::new();
    let service = ArchiveService::with_parts(
        RecordStore::open(&config.db_path()).unwrap(),
        AssetStore::new(&config.assets_dir()).unwrap(),
        Arc::new(JsonSessionCodec),
        Arc::new(clock.clone()),
    );

    (service, clock, temp_dir)
}

/// Observer that records every notification as a line of text
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ArchiveObserver for RecordingObserver {
    fn on_save(&self, url: &str, is_new: bool) {
        self.push(format!(
            "save {} {}",
            url,
            if is_new { "new" } else { "existing" }
        ));
    }

    fn on_delete(&self, url: &str) {
        self.push(format!("delete {}", url));
    }

    fn on_undelete(&self, url: &str) {
        self.push(format!("undelete {}", url));
    }

    fn on_really_delete(&self, url: &str) {
        self.push(format!("really_delete {}", url));
    }
}
