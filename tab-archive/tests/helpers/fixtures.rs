//! Archive fixtures: manual clock, fresh archives, recording observer

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tab_archive_lib::archive::assets::AssetStore;
use tab_archive_lib::archive::clock::{from_millis, Clock};
use tab_archive_lib::archive::records::RecordStore;
use tab_archive_lib::archive::{ArchiveObserver, ArchiveService, JsonSessionCodec};
use tab_archive_lib::Config;
use tempfile::TempDir;

/// Clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn starting_at_millis(millis: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(from_millis(millis).unwrap())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A throwaway archive directory with a service over it
pub struct TestArchive {
    pub service: ArchiveService,
    pub clock: ManualClock,
    pub config: Config,
    // Dropped last so the directory outlives the service
    pub temp_dir: TempDir,
}

impl TestArchive {
    pub fn new() -> Self {
        Self::with_clock(ManualClock::starting_at_millis(1_770_000_000_000))
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::at(temp_dir.path().join("archive"));
        config.ensure_dirs().unwrap();

        let service = ArchiveService::with_parts(
            RecordStore::open(&config.db_path()).unwrap(),
            AssetStore::new(&config.assets_dir()).unwrap(),
            Arc::new(JsonSessionCodec),
            Arc::new(clock.clone()),
        );

        Self {
            service,
            clock,
            config,
            temp_dir,
        }
    }
}

/// Host tab state with a single entry
pub fn session_blob(url: &str, title: &str) -> String {
    serde_json::json!({
        "entries": [{ "url": url, "title": title }],
        "index": 1,
    })
    .to_string()
}

/// Host tab state with typed form data in its history
pub fn session_with_form_data(url: &str, title: &str) -> String {
    serde_json::json!({
        "entries": [
            { "url": "http://login.example/", "postdata": "user=me&password=hunter2" },
            {
                "url": url,
                "title": title,
                "text": "q=hunter2",
                "children": [{ "url": "http://frame.example/", "text": "hunter2" }]
            }
        ],
        "index": 2
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Save(String, bool),
    Delete(String),
    Undelete(String),
    ReallyDelete(String),
}

/// Observer that remembers every notification in order
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl ArchiveObserver for RecordingObserver {
    fn on_save(&self, url: &str, is_new: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Save(url.to_string(), is_new));
    }

    fn on_delete(&self, url: &str) {
        self.events.lock().unwrap().push(Event::Delete(url.to_string()));
    }

    fn on_undelete(&self, url: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Undelete(url.to_string()));
    }

    fn on_really_delete(&self, url: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::ReallyDelete(url.to_string()));
    }
}
