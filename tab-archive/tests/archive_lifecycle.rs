//! Integration tests for the archive save/delete/query lifecycle
//!
//! Run with: cargo test --test archive_lifecycle

mod helpers;

use std::sync::Arc;

use chrono::Duration;
use helpers::fixtures::{session_blob, Event, RecordingObserver, TestArchive};
use pretty_assertions::assert_eq;
use tab_archive_lib::archive::records::RecordStore;
use tab_archive_lib::archive::{ArchiveObserver, ArchiveService, AssetKind, TabCapture};
use tab_archive_lib::{ArchiveError, Config};

fn capture(url: &str, title: &str) -> TabCapture {
    TabCapture::new(url, session_blob(url, title), b"full".to_vec()).with_thumbnail(b"thumb".to_vec())
}

fn urls(tabs: tab_archive_lib::archive::ArchivedTabs<'_>) -> Vec<String> {
    tabs.map(|tab| tab.unwrap().record.url).collect()
}

#[test]
fn test_save_then_update_scenario() {
    let archive = TestArchive::new();
    let service = &archive.service;

    assert_eq!(service.save(&capture("http://x.com/a", "A")).unwrap(), false);
    let first = service.get_for_url("http://x.com/a").unwrap().unwrap();

    archive.clock.advance(Duration::seconds(3));
    let existed = service
        .save(&capture("http://x.com/a", "A").with_description("desc"))
        .unwrap();
    assert!(existed);

    let tab = service.retrieve("http://x.com/a").unwrap().unwrap();
    assert_eq!(tab.url(), "http://x.com/a");
    assert_eq!(tab.record.description.as_deref(), Some("desc"));
    assert_eq!(tab.record.content_hash, first.content_hash);
    assert_eq!(tab.record.created, first.created);
    assert!(tab.record.updated > first.updated);
}

#[test]
fn test_repeated_saves_at_same_instant_still_advance_updated() {
    let archive = TestArchive::new();
    let service = &archive.service;

    let mut previous = None;
    for _ in 0..3 {
        service.save(&capture("http://x.com/a", "A")).unwrap();
        let record = service.get_for_url("http://x.com/a").unwrap().unwrap();
        if let Some(previous) = previous {
            assert!(record.updated > previous);
        }
        previous = Some(record.updated);
    }
}

#[test]
fn test_soft_delete_round_trip() {
    let archive = TestArchive::new();
    let service = &archive.service;
    service.save(&capture("http://x.com/a", "A")).unwrap();
    let saved = service.get_for_url("http://x.com/a").unwrap().unwrap();

    service.delete("http://x.com/a").unwrap();
    assert!(!service.is_saved("http://x.com/a").unwrap());
    let deleted = service.get_for_url("http://x.com/a").unwrap().unwrap();
    assert!(deleted.updated > saved.updated);

    service.undelete("http://x.com/a").unwrap();
    assert!(service.is_saved("http://x.com/a").unwrap());
    let restored = service.get_for_url("http://x.com/a").unwrap().unwrap();
    assert!(restored.updated > deleted.updated);
    assert_eq!(restored.deleted, None);
}

#[test]
fn test_hard_delete_then_resave_creates_fresh_record() {
    let archive = TestArchive::new();
    let service = &archive.service;
    service.save(&capture("http://x.com/a", "A")).unwrap();
    let saved = service.get_for_url("http://x.com/a").unwrap().unwrap();

    service.really_delete("http://x.com/a").unwrap();
    assert!(service.retrieve("http://x.com/a").unwrap().is_none());
    assert!(!service.is_saved("http://x.com/a").unwrap());
    for kind in AssetKind::ALL {
        assert!(!service.assets().exists(&saved.content_hash, kind));
    }

    archive.clock.advance(Duration::minutes(1));
    assert_eq!(service.save(&capture("http://x.com/a", "A")).unwrap(), false);
    let fresh = service.get_for_url("http://x.com/a").unwrap().unwrap();
    assert!(fresh.created > saved.created);
    assert_eq!(fresh.content_hash, saved.content_hash);
}

#[test]
fn test_queries_follow_sort_and_partition_rules() {
    let archive = TestArchive::new();
    let service = &archive.service;

    for name in ["a", "b", "c", "d", "e"] {
        let url = format!("http://x.com/{}", name);
        service.save(&capture(&url, &name.to_uppercase())).unwrap();
        archive.clock.advance(Duration::seconds(1));
    }
    for name in ["b", "d", "a"] {
        service.delete(&format!("http://x.com/{}", name)).unwrap();
        archive.clock.advance(Duration::seconds(1));
    }

    assert_eq!(
        urls(service.get(None, false).unwrap()),
        vec!["http://x.com/e", "http://x.com/c"]
    );
    assert_eq!(
        urls(service.get(None, true).unwrap()),
        vec!["http://x.com/a", "http://x.com/d", "http://x.com/b"]
    );

    let records = service.records();
    assert_eq!(
        records.query(None, true, 2).unwrap(),
        vec!["http://x.com/a", "http://x.com/d"]
    );
    assert_eq!(records.query(None, false, 0).unwrap(), Vec::<String>::new());
    assert_eq!(urls(service.get_recent(1).unwrap()), vec!["http://x.com/e"]);
}

#[test]
fn test_filter_matches_url_title_or_description() {
    let archive = TestArchive::new();
    let service = &archive.service;

    service
        .save(&capture("http://rust-lang.org/", "Home"))
        .unwrap();
    service
        .save(&capture("http://x.com/ownership", "Ownership in RUST"))
        .unwrap();
    service
        .save(&capture("http://x.com/other", "Other").with_description("borrowck and rust"))
        .unwrap();
    service.save(&capture("http://x.com/go", "Go")).unwrap();

    let mut matched = urls(service.get(Some("  Rust "), false).unwrap());
    matched.sort();
    assert_eq!(
        matched,
        vec![
            "http://rust-lang.org/",
            "http://x.com/other",
            "http://x.com/ownership"
        ]
    );

    // No wildcard semantics
    assert!(urls(service.get(Some("r%t"), false).unwrap()).is_empty());
    assert_eq!(urls(service.get(Some(""), false).unwrap()).len(), 4);
}

#[test]
fn test_update_requires_active_record() {
    let archive = TestArchive::new();
    let service = &archive.service;

    let err = service.update("http://x.com/none", Some("T"), None).unwrap_err();
    assert!(matches!(err, ArchiveError::NotFound(_)));

    service.save(&capture("http://x.com/a", "A")).unwrap();
    service
        .update("http://x.com/a", Some("Renamed"), Some("notes"))
        .unwrap();
    let record = service.get_for_url("http://x.com/a").unwrap().unwrap();
    assert_eq!(record.title, "Renamed");
    assert_eq!(record.description.as_deref(), Some("notes"));
}

#[test]
fn test_observers_see_each_successful_mutation_once() {
    let archive = TestArchive::new();
    let service = &archive.service;
    let observer = Arc::new(RecordingObserver::default());
    let handle: Arc<dyn ArchiveObserver> = observer.clone();
    service.add_observer(handle.clone());
    service.add_observer(handle.clone());

    service.save(&capture("http://x.com/a", "A")).unwrap();
    service.save(&capture("http://x.com/a", "A")).unwrap();
    service.delete("http://x.com/a").unwrap();
    service.undelete("http://x.com/a").unwrap();
    service.really_delete("http://x.com/a").unwrap();
    let _ = service.update("http://x.com/a", Some("gone"), None);

    assert_eq!(
        observer.events(),
        vec![
            Event::Save("http://x.com/a".to_string(), true),
            Event::Save("http://x.com/a".to_string(), false),
            Event::Delete("http://x.com/a".to_string()),
            Event::Undelete("http://x.com/a".to_string()),
            Event::ReallyDelete("http://x.com/a".to_string()),
        ]
    );
}

#[test]
fn test_retrieve_locators_point_at_asset_files() {
    let archive = TestArchive::new();
    let service = &archive.service;
    service.save(&capture("http://x.com/a?q=1", "A")).unwrap();

    let tab = service.retrieve("http://x.com/a?q=1").unwrap().unwrap();
    let hash = RecordStore::content_hash("http://x.com/a?q=1");
    assert_eq!(hash.len(), 32);
    assert!(tab.image_url.starts_with("file://"));
    assert!(tab.image_url.contains(&format!("/{}.png?", hash)));
    assert!(tab.thumb_url.contains(&format!("/{}-thumb.png?", hash)));
}

#[test]
fn test_open_reuses_persisted_archive() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = Config::at(temp_dir.path().join("archive"));

    {
        let service = ArchiveService::open(&config).unwrap();
        service.save(&capture("http://x.com/a", "A")).unwrap();
        service.save(&capture("http://x.com/b", "B")).unwrap();
        service.delete("http://x.com/b").unwrap();
    }

    let service = ArchiveService::open(&config).unwrap();
    assert!(service.is_saved("http://x.com/a").unwrap());
    assert!(!service.is_saved("http://x.com/b").unwrap());
    assert_eq!(service.records().count().unwrap(), 2);
    assert!(config.db_path().is_file());
}
