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

//! Retry wrapper for operations that can surface a retryable error.
//! Grounded on `original_source/.../retry.py`'s `retry` decorator — ported
//! as a function since Rust has no decorator syntax.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

/// Exponential backoff with jitter, matching the original's
/// `delay *= 2**attempt; delay += random.uniform(0, 1)`.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Runs `f`, retrying while it returns a retryable [`Error`], up to
/// `config.attempts` times. Non-retryable errors propagate immediately.
pub fn with_retry<T>(config: Option<&RetryConfig>, operation: &str, mut f: impl FnMut() -> Result<T, Error>) -> Result<T, Error> {
    let Some(config) = config else {
        return f();
    };

    let mut delay = config.delay;
    let mut last_err = None;
    for attempt in 0..config.attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                log::warn!("attempt {} failed for {operation}: {e}", attempt + 1);
                delay *= 2u32.pow(attempt);
                delay += Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0));
                if attempt + 1 < config.attempts {
                    std::thread::sleep(delay);
                } else {
                    log::error!("all retry attempts failed for {operation}");
                }
                last_err = Some(e);
            }
            Err(e) => {
                log::error!("non-retryable error occurred for {operation}: {e}");
                return Err(e);
            }
        }
    }
    Err(last_err.expect("loop runs at least once since attempts > 0"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::Cell;

    #[test]
    fn retries_until_success() {
        let config = RetryConfig {
            attempts: 3,
            delay: Duration::from_millis(1),
        };
        let calls = Cell::new(0);
        let result = with_retry(Some(&config), "test_op", || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(Error::retryable("flaky"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn non_retryable_errors_fail_fast() {
        let config = RetryConfig::default();
        let calls = Cell::new(0);
        let result: Result<(), Error> = with_retry(Some(&config), "test_op", || {
            calls.set(calls.get() + 1);
            Err(Error::new(ErrorKind::Unexpected, "boom"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn no_config_runs_once_without_retry() {
        let calls = Cell::new(0);
        let result: Result<(), Error> = with_retry(None, "test_op", || {
            calls.set(calls.get() + 1);
            Err(Error::retryable("flaky"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
