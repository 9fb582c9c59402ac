//! Manifest generation, listing, and buffered mutation round-trips.

mod support;

use std::sync::Arc;

use msc::manifest::generator::generate_and_write_manifest;
use msc::manifest::ManifestMetadataProvider;
use msc::manifest::MetadataProvider;
use msc::provider::PutOptions;
use msc::provider::StorageProvider;
use msc::types::ObjectMetadata;

use support::mem_provider::InMemoryProvider;

#[test]
fn generated_manifest_lists_every_object_in_the_data_provider() {
    let data = InMemoryProvider::new();
    data.put_object("a/1.txt", b"one", PutOptions::default()).unwrap();
    data.put_object("a/2.txt", b"two", PutOptions::default()).unwrap();
    data.put_object("b/3.txt", b"three", PutOptions::default()).unwrap();

    let manifest_store = Arc::new(InMemoryProvider::new());
    generate_and_write_manifest(&data, manifest_store.clone() as Arc<dyn StorageProvider>).unwrap();

    let provider = ManifestMetadataProvider::new(manifest_store as Arc<dyn StorageProvider>, "", false).unwrap();
    let mut keys: Vec<String> = provider.list_objects("", None, None, false).unwrap().into_iter().map(|o| o.key).collect();
    keys.sort();
    assert_eq!(keys, vec!["a/1.txt", "a/2.txt", "b/3.txt"]);
}

#[test]
fn writable_provider_buffers_adds_until_commit() {
    let store = Arc::new(InMemoryProvider::new());
    let provider = ManifestMetadataProvider::new(store.clone() as Arc<dyn StorageProvider>, "", true).unwrap();

    assert!(provider.get_object_metadata("new.txt", true).is_err());

    let metadata = ObjectMetadata::new("new.txt", 5, chrono::Utc::now());
    provider.add_file("new.txt", metadata.clone()).unwrap();

    // Pending add is visible with include_pending, but not committed yet.
    assert!(provider.get_object_metadata("new.txt", true).is_ok());
    assert!(provider.get_object_metadata("new.txt", false).is_err());

    provider.commit_updates().unwrap();
    assert!(provider.get_object_metadata("new.txt", false).is_ok());
}

#[test]
fn read_only_provider_rejects_mutations() {
    let store = Arc::new(InMemoryProvider::new());
    let provider = ManifestMetadataProvider::new(store as Arc<dyn StorageProvider>, "", false).unwrap();

    let metadata = ObjectMetadata::new("x.txt", 1, chrono::Utc::now());
    assert!(provider.add_file("x.txt", metadata).is_err());
    assert!(provider.remove_file("x.txt").is_err());
}

#[test]
fn glob_matches_against_the_committed_manifest() {
    let data = InMemoryProvider::new();
    data.put_object("logs/2024/a.log", b"x", PutOptions::default()).unwrap();
    data.put_object("logs/2024/b.log", b"x", PutOptions::default()).unwrap();
    data.put_object("logs/2025/c.log", b"x", PutOptions::default()).unwrap();

    let manifest_store = Arc::new(InMemoryProvider::new());
    generate_and_write_manifest(&data, manifest_store.clone() as Arc<dyn StorageProvider>).unwrap();

    let provider = ManifestMetadataProvider::new(manifest_store as Arc<dyn StorageProvider>, "", false).unwrap();
    let mut matches = provider.glob("logs/2024/*.log").unwrap();
    matches.sort();
    assert_eq!(matches, vec!["logs/2024/a.log", "logs/2024/b.log"]);
}
