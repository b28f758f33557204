//! Asset synchronisation integration tests.
//!
//! Builds small asset trees in temporary directories and checks what
//! `AssetSync` copies, skips and removes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use voicenav::assets::{
    spawn_provisioning, AssetProvisioner, AssetSync, CancelFlag, ProvisioningError, SyncSummary,
    MANIFEST_FILE_NAME,
};

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn bundled_assets() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    write(&dir.path().join("menu.gram"), "#JSGF V1.0; grammar menu;");
    write(&dir.path().join("digits.gram"), "#JSGF V1.0; grammar digits;");
    write(&dir.path().join("en-us").join("mdef"), "acoustic model");
    dir
}

#[test]
fn test_first_sync_copies_everything() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(source.path(), target.path().join("assets"));

    let summary = sync.sync(&CancelFlag::new()).unwrap();
    assert_eq!(
        summary,
        SyncSummary {
            copied: 3,
            unchanged: 0,
            removed: 0
        }
    );

    let assets = target.path().join("assets");
    assert_eq!(
        fs::read_to_string(assets.join("en-us").join("mdef")).unwrap(),
        "acoustic model"
    );
    assert!(assets.join(MANIFEST_FILE_NAME).exists());
}

#[test]
fn test_second_sync_skips_unchanged_files() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(source.path(), target.path());
    sync.sync(&CancelFlag::new()).unwrap();

    write(&source.path().join("menu.gram"), "#JSGF V1.0; grammar menu2;");
    let summary = sync.sync(&CancelFlag::new()).unwrap();

    assert_eq!(summary.copied, 1);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(
        fs::read_to_string(target.path().join("menu.gram")).unwrap(),
        "#JSGF V1.0; grammar menu2;"
    );
}

#[test]
fn test_deleted_target_file_is_restored() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(source.path(), target.path());
    sync.sync(&CancelFlag::new()).unwrap();

    fs::remove_file(target.path().join("digits.gram")).unwrap();
    let summary = sync.sync(&CancelFlag::new()).unwrap();

    assert_eq!(summary.copied, 1);
    assert!(target.path().join("digits.gram").exists());
}

#[test]
fn test_files_dropped_from_bundle_are_removed() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(source.path(), target.path());
    sync.sync(&CancelFlag::new()).unwrap();

    fs::remove_file(source.path().join("digits.gram")).unwrap();
    write(&target.path().join("user-notes.txt"), "not ours");
    let summary = sync.sync(&CancelFlag::new()).unwrap();

    assert_eq!(summary.removed, 1);
    assert!(!target.path().join("digits.gram").exists());
    // Files never listed in the manifest are left alone
    assert!(target.path().join("user-notes.txt").exists());
}

#[test]
fn test_missing_source_fails() {
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(target.path().join("nope"), target.path().join("out"));

    let result = sync.provision(&CancelFlag::new());
    assert!(matches!(result, Err(ProvisioningError::SourceMissing(_))));
}

#[test]
fn test_cancelled_sync_copies_nothing() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(source.path(), target.path().join("assets"));

    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = sync.provision(&cancel);

    assert!(matches!(result, Err(ProvisioningError::Cancelled)));
    assert!(!target.path().join("assets").join("menu.gram").exists());
}

#[test]
fn test_corrupt_manifest_triggers_full_copy() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let sync = AssetSync::new(source.path(), target.path());
    sync.sync(&CancelFlag::new()).unwrap();

    fs::write(target.path().join(MANIFEST_FILE_NAME), "garbage").unwrap();
    let summary = sync.sync(&CancelFlag::new()).unwrap();
    assert_eq!(summary.copied, 3);
}

#[test]
fn test_background_provisioning_returns_target() {
    let source = bundled_assets();
    let target = TempDir::new().unwrap();
    let task = spawn_provisioning(AssetSync::new(source.path(), target.path()));

    let result = task
        .receiver()
        .recv_timeout(Duration::from_secs(5))
        .expect("Provisioning produced no result");
    assert_eq!(result.unwrap(), target.path());
    assert!(!task.is_cancelled());
}

#[test]
fn test_manifest_entries_outside_target_are_never_removed() {
    let source = bundled_assets();
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("assets");
    let sync = AssetSync::new(source.path(), &target);
    sync.sync(&CancelFlag::new()).unwrap();

    let outside = workspace.path().join("outside.txt");
    write(&outside, "keep me");
    let elsewhere = TempDir::new().unwrap();
    let absolute = elsewhere.path().join("absolute.txt");
    write(&absolute, "keep me too");

    let files: BTreeMap<String, String> = [
        ("../outside.txt".to_string(), "00".to_string()),
        (absolute.to_string_lossy().into_owned(), "00".to_string()),
    ]
    .into_iter()
    .collect();
    let manifest = serde_json::json!({ "files": files });
    fs::write(target.join(MANIFEST_FILE_NAME), manifest.to_string()).unwrap();

    let summary = sync.sync(&CancelFlag::new()).unwrap();
    assert_eq!(summary.removed, 0);
    assert!(outside.exists());
    assert!(absolute.exists());
}
