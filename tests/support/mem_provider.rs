//! An in-memory [`StorageProvider`] test double, standing in for a real
//! backend so integration tests can exercise the cache/manifest/client
//! layers without touching a disk or a cloud endpoint.

use std::collections::BTreeMap;
use std::io::Read;
use std::io::Write;
use std::sync::Mutex;

use chrono::Utc;

use msc::error::Error;
use msc::error::ErrorKind;
use msc::error::Result;
use msc::provider::DeleteOptions;
use msc::provider::DownloadSink;
use msc::provider::PutOptions;
use msc::provider::StorageProvider;
use msc::provider::UploadSource;
use msc::types::ObjectMetadata;
use msc::types::Range;

#[derive(Clone)]
struct Entry {
    body: Vec<u8>,
    etag: String,
}

pub struct InMemoryProvider {
    objects: Mutex<BTreeMap<String, Entry>>,
    next_etag: Mutex<u64>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            next_etag: Mutex::new(0),
        }
    }

    fn fresh_etag(&self) -> String {
        let mut counter = self.next_etag.lock().expect("lock poisoned");
        *counter += 1;
        format!("etag-{counter}")
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for InMemoryProvider {
    fn provider_name(&self) -> &str {
        "memory"
    }

    fn put_object(&self, path: &str, body: &[u8], opts: PutOptions) -> Result<()> {
        let mut objects = self.objects.lock().expect("lock poisoned");
        let existing = objects.get(path);

        if let Some(expected) = &opts.if_match {
            match existing {
                Some(entry) if &entry.etag == expected => {}
                _ => return Err(Error::precondition_failed(format!("if_match mismatch for {path}"))),
            }
        }
        if let Some(if_none_match) = &opts.if_none_match {
            if if_none_match == "*" && existing.is_some() {
                return Err(Error::precondition_failed(format!("object {path} already exists")));
            }
        }

        objects.insert(
            path.to_string(),
            Entry {
                body: body.to_vec(),
                etag: self.fresh_etag(),
            },
        );
        Ok(())
    }

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>> {
        let objects = self.objects.lock().expect("lock poisoned");
        let entry = objects
            .get(path)
            .ok_or_else(|| Error::not_found(format!("object {path} does not exist")))?;
        match byte_range {
            Some(range) => {
                let start = (range.offset as usize).min(entry.body.len());
                let end = (range.end() as usize).min(entry.body.len());
                Ok(entry.body[start..end].to_vec())
            }
            None => Ok(entry.body.clone()),
        }
    }

    fn copy_object(&self, src_path: &str, dest_path: &str) -> Result<u64> {
        let mut objects = self.objects.lock().expect("lock poisoned");
        let src = objects
            .get(src_path)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("object {src_path} does not exist")))?;
        let len = src.body.len() as u64;
        objects.insert(dest_path.to_string(), src);
        Ok(len)
    }

    fn delete_object(&self, path: &str, opts: DeleteOptions) -> Result<()> {
        let mut objects = self.objects.lock().expect("lock poisoned");
        if let Some(expected) = &opts.if_match {
            match objects.get(path) {
                Some(entry) if &entry.etag == expected => {}
                Some(_) => return Err(Error::precondition_failed(format!("if_match mismatch for {path}"))),
                None => return Err(Error::not_found(format!("object {path} does not exist"))),
            }
        }
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("object {path} does not exist")))
    }

    fn get_object_metadata(&self, path: &str, _strict: bool) -> Result<ObjectMetadata> {
        let objects = self.objects.lock().expect("lock poisoned");
        let entry = objects
            .get(path)
            .ok_or_else(|| Error::not_found(format!("object {path} does not exist")))?;
        Ok(ObjectMetadata {
            key: path.to_string(),
            content_length: entry.body.len() as u64,
            last_modified: Utc::now(),
            r#type: "file".to_string(),
            content_type: None,
            etag: Some(entry.etag.clone()),
            storage_class: None,
            metadata: None,
        })
    }

    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        _include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>> {
        let objects = self.objects.lock().expect("lock poisoned");
        let mut out = Vec::new();
        for (key, entry) in objects.iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(sa) = start_after {
                if key.as_str() <= sa {
                    continue;
                }
            }
            if let Some(ea) = end_at {
                if key.as_str() > ea {
                    continue;
                }
            }
            out.push(Ok(ObjectMetadata {
                key: key.clone(),
                content_length: entry.body.len() as u64,
                last_modified: Utc::now(),
                r#type: "file".to_string(),
                content_type: None,
                etag: Some(entry.etag.clone()),
                storage_class: None,
                metadata: None,
            }));
        }
        Ok(Box::new(out.into_iter()))
    }

    fn upload_file(&self, remote_path: &str, source: UploadSource<'_>) -> Result<u64> {
        let data = match source {
            UploadSource::Path(path) => std::fs::read(path)?,
            UploadSource::Reader(reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                buf
            }
        };
        let len = data.len() as u64;
        self.put_object(remote_path, &data, PutOptions::default())?;
        Ok(len)
    }

    fn download_file(&self, remote_path: &str, sink: DownloadSink<'_>, _metadata: Option<&ObjectMetadata>) -> Result<u64> {
        let data = self.get_object(remote_path, None)?;
        let len = data.len() as u64;
        match sink {
            DownloadSink::Path(path) => std::fs::write(path, &data)?,
            DownloadSink::Writer(writer) => writer.write_all(&data)?,
        }
        Ok(len)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let objects = self.objects.lock().expect("lock poisoned");
        let matcher = globset::Glob::new(pattern)
            .map_err(|e| Error::config_invalid(format!("invalid glob pattern {pattern}: {e}")))?
            .compile_matcher();
        let mut matches: Vec<String> = objects.keys().filter(|k| matcher.is_match(k)).cloned().collect();
        matches.sort();
        Ok(matches)
    }

    fn is_file(&self, path: &str) -> bool {
        self.get_object_metadata(path, true).is_ok()
    }
}

/// Asserts `err` is a [`msc::error::Error`] of the given kind, for tests
/// that only care about the error taxonomy, not its message text.
pub fn assert_kind(result: &Result<impl std::fmt::Debug>, kind: ErrorKind) {
    match result {
        Err(e) => assert_eq!(e.kind(), kind),
        Ok(v) => panic!("expected error of kind {kind:?}, got Ok({v:?})"),
    }
}
