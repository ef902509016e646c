// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the JSON configuration store

use pocketcam::config::{
    ConfigExt, ConfigProvider, FilterSettings, FlashSettings, JsonConfigStore, PowerSettings,
};
use pocketcam::flash::FlashMode;
use pocketcam::pipelines::filters::FilterKind;
use serde_json::{Value, json};
use std::fs;
use std::time::Duration;

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let store = JsonConfigStore::load(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert!(path.exists());

    let on_disk = read_json(&path);
    assert_eq!(on_disk["camera"]["preview_fps"], json!(24));
    assert_eq!(on_disk["flash"]["mode"], json!("off"));
    assert_eq!(on_disk["power"]["poweroff_command"], json!([]));
}

#[test]
fn test_persisted_values_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut store = JsonConfigStore::load(&path).unwrap();
    store.set("flash", "mode", FlashMode::Auto, true).unwrap();
    store.set("filter", "active", FilterKind::Sepia, true).unwrap();
    // Not persisted: only lives in memory until the next save
    store.set("filter", "iso_fake", 1600, false).unwrap();
    drop(store);

    let reloaded = JsonConfigStore::load(&path).unwrap();
    assert_eq!(FlashSettings::from_config(&reloaded).mode, FlashMode::Auto);
    let filter = FilterSettings::from_config(&reloaded);
    assert_eq!(filter.active, FilterKind::Sepia);
    assert_eq!(filter.iso, 400);
}

#[test]
fn test_explicit_save_writes_unpersisted_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut store = JsonConfigStore::load(&path).unwrap();
    store.set("filter", "iso_fake", 1600, false).unwrap();
    store.save().unwrap();

    assert_eq!(read_json(&path)["filter"]["iso_fake"], json!(1600));
    assert!(!dir.path().join("config.json.tmp").exists());
}

#[test]
fn test_corrupt_file_is_replaced_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ \"camera\": { \"preview_fps\": ").unwrap();

    let store = JsonConfigStore::load(&path).unwrap();
    assert_eq!(store.get::<u32>("camera", "preview_fps", 0), 24);
    assert_eq!(read_json(&path)["camera"]["preview_fps"], json!(24));
}

#[test]
fn test_non_object_root_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "[1, 2, 3]").unwrap();

    let store = JsonConfigStore::load(&path).unwrap();
    assert!(store.document().contains_key("camera"));
    assert!(read_json(&path).is_object());
}

#[test]
fn test_missing_keys_are_merged_and_user_values_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{ "power": { "standby_timeout_s": 5.0 }, "custom": { "note": "kept" } }"#,
    )
    .unwrap();

    let store = JsonConfigStore::load(&path).unwrap();
    let power = PowerSettings::from_config(&store);
    assert_eq!(power.standby_timeout, Duration::from_secs(5));
    assert_eq!(power.long_press, Duration::from_millis(1800));

    let on_disk = read_json(&path);
    assert_eq!(on_disk["power"]["standby_timeout_s"], json!(5.0));
    assert_eq!(on_disk["power"]["shutdown_long_press_s"], json!(1.8));
    assert_eq!(on_disk["custom"]["note"], json!("kept"));
    assert!(on_disk["display"].is_object());
}

#[test]
fn test_in_memory_store_never_writes() {
    let mut store = JsonConfigStore::in_memory();
    assert!(store.path().is_none());
    store.set("flash", "mode", FlashMode::On, true).unwrap();
    assert_eq!(FlashSettings::from_config(&store).mode, FlashMode::On);
}
