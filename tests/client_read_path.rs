//! `StorageClient` read/write/cache composition.

mod support;

use std::sync::Arc;

use msc::cache::CacheBackend;
use msc::cache::CacheConfig;
use msc::cache::FilesystemBackend;
use msc::client::StorageClient;
use msc::client::StorageClientConfig;
use msc::error::ErrorKind;
use msc::provider::StorageProvider;

use support::mem_provider::InMemoryProvider;

fn client_with_cache(dir: &std::path::Path) -> (StorageClient, Arc<FilesystemBackend>) {
    let provider: Arc<dyn StorageProvider> = Arc::new(InMemoryProvider::new());
    let cache_config = CacheConfig {
        backend: msc::cache::CacheBackendConfig {
            cache_path: dir.to_string_lossy().into_owned(),
            storage_provider_profile: None,
        },
        ..CacheConfig::default()
    };
    let cache_backend = Arc::new(FilesystemBackend::new("default", &cache_config).unwrap());

    let client = StorageClient::new(StorageClientConfig {
        profile: "default".to_string(),
        storage_provider: provider,
        metadata_provider: None,
        cache_backend: Some(cache_backend.clone() as Arc<dyn CacheBackend>),
        retry_config: None,
        is_posix: false,
    });
    (client, cache_backend)
}

fn client_without_cache() -> StorageClient {
    let provider: Arc<dyn StorageProvider> = Arc::new(InMemoryProvider::new());
    StorageClient::new(StorageClientConfig {
        profile: "default".to_string(),
        storage_provider: provider,
        metadata_provider: None,
        cache_backend: None,
        retry_config: None,
        is_posix: false,
    })
}

#[test]
fn write_then_read_round_trips() {
    let client = client_without_cache();
    client.write("a/b.txt", b"hello world").unwrap();
    assert_eq!(client.read("a/b.txt", None).unwrap(), b"hello world");
    assert!(client.is_file("a/b.txt"));
}

#[test]
fn reading_a_missing_object_is_not_found() {
    let client = client_without_cache();
    let err = client.read("missing.txt", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn delete_removes_the_object() {
    let client = client_without_cache();
    client.write("a.txt", b"bye").unwrap();
    client.delete("a.txt").unwrap();
    assert!(!client.is_file("a.txt"));
}

#[test]
fn a_full_read_populates_the_local_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (client, cache_backend) = client_with_cache(dir.path());
    client.write("cached.txt", b"cache me").unwrap();

    assert_eq!(cache_backend.cache_size(), 0);
    let data = client.read("cached.txt", None).unwrap();
    assert_eq!(data, b"cache me");
    assert!(cache_backend.cache_size() > 0);

    // A second full read still returns the same bytes, whether served from
    // cache or the backing provider.
    assert_eq!(client.read("cached.txt", None).unwrap(), b"cache me");
}

#[test]
fn byte_range_reads_a_slice_of_the_object() {
    let client = client_without_cache();
    client.write("range.txt", b"0123456789").unwrap();
    let slice = client.read("range.txt", Some(msc::types::Range::new(2, 4))).unwrap();
    assert_eq!(slice, b"2345");
}

#[test]
fn list_returns_objects_under_a_prefix() {
    let client = client_without_cache();
    client.write("dir/a.txt", b"a").unwrap();
    client.write("dir/b.txt", b"b").unwrap();
    client.write("other/c.txt", b"c").unwrap();

    let mut keys: Vec<String> = client.list("dir/", None, None).unwrap().into_iter().map(|o| o.key).collect();
    keys.sort();
    assert_eq!(keys, vec!["dir/a.txt", "dir/b.txt"]);
}
