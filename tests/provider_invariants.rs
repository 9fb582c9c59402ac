//! Invariants every [`StorageProvider`] implementation must uphold,
//! exercised identically against a real filesystem backend and the
//! in-memory test double.

mod support;

use msc::error::ErrorKind;
use msc::provider::posix::PosixProvider;
use msc::provider::DeleteOptions;
use msc::provider::PutOptions;
use msc::provider::StorageProvider;
use msc::types::Range;

use support::mem_provider::assert_kind;
use support::mem_provider::InMemoryProvider;

fn posix() -> (tempfile::TempDir, PosixProvider) {
    let dir = tempfile::tempdir().unwrap();
    let provider = PosixProvider::new(dir.path().to_str().unwrap()).unwrap();
    (dir, provider)
}

fn run_against(provider: &dyn StorageProvider) {
    put_then_get_round_trips(provider);
    get_on_missing_key_is_not_found(provider);
    if_match_mismatch_is_rejected_on_put(provider);
    if_none_match_any_rejects_an_existing_key(provider);
    delete_with_stale_if_match_is_rejected(provider);
    a_deleted_object_is_no_longer_a_file(provider);
    byte_range_reads_the_requested_slice(provider);
    list_objects_only_returns_matching_prefix(provider);
    glob_expands_a_wildcard_pattern(provider);
}

fn put_then_get_round_trips(provider: &dyn StorageProvider) {
    provider.put_object("a/b.txt", b"hello", PutOptions::default()).unwrap();
    assert_eq!(provider.get_object("a/b.txt", None).unwrap(), b"hello");
    assert!(provider.is_file("a/b.txt"));
}

fn get_on_missing_key_is_not_found(provider: &dyn StorageProvider) {
    let err = provider.get_object("does/not/exist.txt", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

fn if_match_mismatch_is_rejected_on_put(provider: &dyn StorageProvider) {
    provider.put_object("precond.txt", b"v1", PutOptions::default()).unwrap();
    let opts = PutOptions {
        if_match: Some("not-the-real-etag".to_string()),
        ..Default::default()
    };
    let result = provider.put_object("precond.txt", b"v2", opts);
    assert_kind(&result, ErrorKind::PreconditionFailed);
    // The mismatched write must not have taken effect.
    assert_eq!(provider.get_object("precond.txt", None).unwrap(), b"v1");
}

fn if_none_match_any_rejects_an_existing_key(provider: &dyn StorageProvider) {
    provider.put_object("create-once.txt", b"first", PutOptions::default()).unwrap();
    let result = provider.put_object("create-once.txt", b"second", PutOptions::if_none_match_any());
    assert_kind(&result, ErrorKind::PreconditionFailed);
}

fn delete_with_stale_if_match_is_rejected(provider: &dyn StorageProvider) {
    provider.put_object("deleteme.txt", b"x", PutOptions::default()).unwrap();
    let opts = DeleteOptions {
        if_match: Some("stale-etag".to_string()),
    };
    let result = provider.delete_object("deleteme.txt", opts);
    assert_kind(&result, ErrorKind::PreconditionFailed);
    assert!(provider.is_file("deleteme.txt"));
}

fn a_deleted_object_is_no_longer_a_file(provider: &dyn StorageProvider) {
    provider.put_object("gone.txt", b"x", PutOptions::default()).unwrap();
    provider.delete_object("gone.txt", DeleteOptions::default()).unwrap();
    assert!(!provider.is_file("gone.txt"));
    assert_kind(&provider.get_object("gone.txt", None), ErrorKind::NotFound);
}

fn byte_range_reads_the_requested_slice(provider: &dyn StorageProvider) {
    provider.put_object("range.txt", b"0123456789", PutOptions::default()).unwrap();
    let slice = provider.get_object("range.txt", Some(Range::new(3, 4))).unwrap();
    assert_eq!(slice, b"3456");
}

fn list_objects_only_returns_matching_prefix(provider: &dyn StorageProvider) {
    provider.put_object("listing/a.txt", b"a", PutOptions::default()).unwrap();
    provider.put_object("listing/b.txt", b"b", PutOptions::default()).unwrap();
    provider.put_object("other/c.txt", b"c", PutOptions::default()).unwrap();

    let mut keys: Vec<String> = provider
        .list_objects("listing/", None, None, false)
        .unwrap()
        .collect::<msc::error::Result<Vec<_>>>()
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["listing/a.txt", "listing/b.txt"]);
}

fn glob_expands_a_wildcard_pattern(provider: &dyn StorageProvider) {
    provider.put_object("globbed/x.log", b"x", PutOptions::default()).unwrap();
    provider.put_object("globbed/y.log", b"y", PutOptions::default()).unwrap();
    provider.put_object("globbed/z.txt", b"z", PutOptions::default()).unwrap();

    let mut matches = provider.glob("globbed/*.log").unwrap();
    matches.sort();
    assert_eq!(matches, vec!["globbed/x.log", "globbed/y.log"]);
}

#[test]
fn posix_provider_upholds_the_contract() {
    let (_dir, provider) = posix();
    run_against(&provider);
}

#[test]
fn in_memory_provider_upholds_the_contract() {
    let provider = InMemoryProvider::new();
    run_against(&provider);
}
