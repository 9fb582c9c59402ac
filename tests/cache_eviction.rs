//! Cache eviction sweep scenarios against a real temp directory.

use msc::cache::CacheBackend;
use msc::cache::CacheConfig;
use msc::cache::CacheSource;
use msc::cache::FilesystemBackend;

fn config(dir: &std::path::Path, size: &str, policy: &str) -> CacheConfig {
    CacheConfig {
        size: size.to_string(),
        use_etag: true,
        eviction_policy: msc::cache::EvictionPolicyConfig {
            policy: policy.to_string(),
            refresh_interval_secs: 300,
        },
        backend: msc::cache::CacheBackendConfig {
            cache_path: dir.to_string_lossy().into_owned(),
            storage_provider_profile: None,
        },
    }
}

#[test]
fn fifo_eviction_drops_oldest_entries_first() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new("default", &config(dir.path(), "2M", "fifo")).unwrap();

    let one_mb = vec![0u8; 1024 * 1024];
    backend.set("a.bin", CacheSource::Bytes(&one_mb)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    backend.set("b.bin", CacheSource::Bytes(&one_mb)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    backend.set("c.bin", CacheSource::Bytes(&one_mb)).unwrap();

    backend.refresh_cache();

    assert!(backend.cache_size() <= backend.max_cache_size());
    // The most recently written entry should survive a FIFO sweep.
    assert!(backend.contains("c.bin"));
}

#[test]
fn no_eviction_policy_never_shrinks_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new("default", &config(dir.path(), "0.001M", "no_eviction")).unwrap();

    backend.set("a.bin", CacheSource::Bytes(&vec![0u8; 4096])).unwrap();
    backend.refresh_cache();

    assert!(backend.contains("a.bin"));
    assert!(backend.cache_size() > backend.max_cache_size());
}

#[test]
fn etag_mismatch_is_treated_as_a_cache_miss() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new("default", &config(dir.path(), "10M", "lru")).unwrap();

    backend.set("a.bin:etag-1", CacheSource::Bytes(b"v1")).unwrap();
    assert!(backend.contains("a.bin:etag-1"));
    assert!(!backend.contains("a.bin:etag-2"));
}

#[test]
fn deleting_an_entry_removes_it_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new("default", &config(dir.path(), "10M", "lru")).unwrap();

    backend.set("nested/a.bin", CacheSource::Bytes(b"hello")).unwrap();
    assert!(backend.contains("nested/a.bin"));

    backend.delete("nested/a.bin");
    assert!(!backend.contains("nested/a.bin"));
    assert!(backend.read("nested/a.bin").is_none());
}
