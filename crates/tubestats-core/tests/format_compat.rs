//! Data folders written by earlier collectors must open unchanged.

use chrono::{NaiveDate, TimeZone, Utc};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tubestats_core::snapshot::SnapshotStore;
use tubestats_core::{LikeView, StatsStore, StoreConfig};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn legacy_folder() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();

    write(
        root,
        "videoDB.json",
        r#"{"12":{"id":12,"uuid":"0b3a","shortUUID":"q1w2e3","isLive":false,
            "name":"Town hall","publishedAt":"2023-11-02T09:00:00.000Z",
            "category":{"id":15,"label":"Science & Technology"},
            "language":{"id":"en","label":"English"},
            "views":88,"likes":4,"dislikes":0,"comments":1,
            "account":{"id":1,"name":"root","displayName":"root","host":"videos.example.org","avatars":[]},
            "channel":{"id":2,"name":"main","displayName":"Main","host":"videos.example.org","avatars":[]},
            "pluginData":{"ignored":true}}}"#,
    );
    write(
        root,
        "deleted.json",
        r#"{"12":{"id":12,"deleted":"2024-01-05T12:00:00Z"}}"#,
    );
    write(
        root,
        "TimeSeriesDB.json",
        "{\"VideosSaved\":[12],\"FirstItem\":\"0001-01-01T00:00:00Z\",\"LastItem\":\"0001-01-01T00:00:00Z\"}\n",
    );
    write(
        root,
        "TimeSeries/12.json",
        r#"{"items":{"1":{"date":"2024-01-01T00:00:00Z","data":{"likes":1,"views":40}},
                     "2":{"date":"2024-01-03T00:00:00Z","data":{"likes":4,"views":88}}},
            "earliest":"2024-01-01T00:00:00Z","last":"2024-01-03T00:00:00Z"}"#,
    );
    write(
        root,
        "2024/01/01.json",
        "# Peertube API Version: 5.2.1\r\n{\"total\":1,\"data\":[{\"id\":12,\"likes\":1,\"views\":40}]}",
    );
    dir
}

#[test]
fn legacy_folder_opens_and_answers() {
    let dir = legacy_folder();
    let store = StatsStore::open(StoreConfig::for_data_dir(dir.path())).expect("open");

    let video = store.video(12).expect("video");
    assert_eq!(video.short_uuid, "q1w2e3");
    assert_eq!(video.language.label, "English");

    let jan2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).single().expect("ts");
    assert_eq!(store.request_stat(12, jan2).expect("stat").metrics(), LikeView::new(1, 40));

    let jan9 = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).single().expect("ts");
    assert_eq!(store.request_stat(12, jan9).expect("stat").metrics(), LikeView::new(4, 88));
}

#[test]
fn legacy_header_version_is_read() {
    let dir = legacy_folder();
    let snapshots = SnapshotStore::new(dir.path());
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");

    assert_eq!(snapshots.read_header(day).expect("header").as_deref(), Some("5.2.1"));
    assert_eq!(snapshots.read_snapshot(day).expect("read").len(), 1);
    assert_eq!(snapshots.first_day().expect("list"), Some(day));
}
