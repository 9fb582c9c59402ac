// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Path and pattern helpers shared by providers and the manifest metadata
//! provider. Grounded on `original_source/src/multistorageclient/utils.py`.

use globset::GlobBuilder;

/// Splits `bucket/key/with/slashes` into `("bucket", "key/with/slashes")`.
/// If there is no `/`, the whole string is the bucket and the key is empty.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (path, ""),
    }
}

/// Returns the literal (non-wildcard) prefix of a glob pattern, i.e. the
/// portion up to the first `*`, `?`, or `[`.
pub fn extract_prefix_from_glob(pattern: &str) -> String {
    let idx = pattern
        .find(['*', '?', '['])
        .unwrap_or(pattern.len());
    let literal = &pattern[..idx];
    match literal.rfind('/') {
        Some(slash) => literal[..=slash].to_string(),
        None => String::new(),
    }
}

/// Filters `keys` to those matching `pattern`, a glob supporting `*`, `?`,
/// `[...]`, and `**` (globstar matching zero or more path segments).
pub fn glob_match<'a>(keys: impl IntoIterator<Item = &'a String>, pattern: &str) -> crate::error::Result<Vec<String>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| crate::error::Error::config_invalid(format!("invalid glob pattern: {e}")))?
        .compile_matcher();
    Ok(keys
        .into_iter()
        .filter(|k| matcher.is_match(k.as_str()))
        .cloned()
        .collect())
}

/// Joins a base path and a logical path the way `os.path.join` does,
/// stripping any leading `/` from `path` first so it's always treated as
/// relative to `base_path`.
pub fn join_base_path(base_path: &str, path: &str) -> String {
    let stripped = path.trim_start_matches('/');
    if base_path.is_empty() {
        stripped.to_string()
    } else if stripped.is_empty() {
        base_path.to_string()
    } else if base_path.ends_with('/') {
        format!("{base_path}{stripped}")
    } else {
        format!("{base_path}/{stripped}")
    }
}

/// Ensures `s` ends with `delimiter`.
pub fn append_delimiter(s: &str, delimiter: char) -> String {
    if s.ends_with(delimiter) {
        s.to_string()
    } else {
        format!("{s}{delimiter}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_separates_bucket_and_key() {
        assert_eq!(split_path("bucket/a/b"), ("bucket", "a/b"));
        assert_eq!(split_path("bucket"), ("bucket", ""));
    }

    #[test]
    fn extract_prefix_stops_at_first_wildcard() {
        assert_eq!(extract_prefix_from_glob("a/b/*.txt"), "a/b/");
        assert_eq!(extract_prefix_from_glob("*.txt"), "");
        assert_eq!(extract_prefix_from_glob("a/b/c.txt"), "a/b/");
    }

    #[test]
    fn join_base_path_strips_leading_slash() {
        assert_eq!(join_base_path("bucket/prefix", "/a/b"), "bucket/prefix/a/b");
        assert_eq!(join_base_path("", "/a/b"), "a/b");
        assert_eq!(join_base_path("bucket/prefix/", "a/b"), "bucket/prefix/a/b");
    }

    #[test]
    fn glob_match_supports_globstar() {
        let keys = vec!["a/b.txt".to_string(), "a/b/c.txt".to_string(), "a/b.csv".to_string()];
        let matched = glob_match(&keys, "**/*.txt").unwrap();
        assert_eq!(matched.len(), 2);
    }
}
