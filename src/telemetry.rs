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

//! Attribute collection and a minimal metrics sink, ported from
//! `original_source/.../telemetry/attributes/*.py` and
//! `instrumentation/utils.py`'s metrics helper shape. No exporter is wired
//! up — just the small interface callers attach their own sink to, and the
//! attribute providers that tag every emitted metric.

use std::collections::HashMap;

pub type Attributes = HashMap<String, String>;

/// Something that contributes key/value attributes to every metric point
/// and trace span emitted by this crate.
pub trait AttributesProvider: Send + Sync {
    fn attributes(&self) -> Attributes;
}

/// Merges attributes from several providers; later providers win on key
/// collision, matching the original's `collect_attributes`.
pub fn collect_attributes(providers: &[Box<dyn AttributesProvider>]) -> Attributes {
    let mut merged = Attributes::new();
    for provider in providers {
        merged.extend(provider.attributes());
    }
    merged
}

/// Copies selected environment variables into attributes under
/// caller-chosen keys.
pub struct EnvironmentVariablesAttributesProvider {
    attributes: HashMap<String, String>,
}

impl EnvironmentVariablesAttributesProvider {
    /// `attributes` maps the emitted attribute key to the environment
    /// variable name it's read from.
    pub fn new(attributes: HashMap<String, String>) -> Self {
        Self { attributes }
    }
}

impl AttributesProvider for EnvironmentVariablesAttributesProvider {
    fn attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .filter_map(|(attribute_key, env_key)| std::env::var(env_key).ok().map(|v| (attribute_key.clone(), v)))
            .collect()
    }
}

/// Host-derived attributes: currently just the hostname.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostAttribute {
    Name,
}

pub struct HostAttributesProvider {
    attributes: HashMap<String, HostAttribute>,
}

impl HostAttributesProvider {
    pub fn new(attributes: HashMap<String, HostAttribute>) -> Self {
        Self { attributes }
    }
}

impl AttributesProvider for HostAttributesProvider {
    fn attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|(key, attribute)| {
                let value = match attribute {
                    HostAttribute::Name => hostname(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Process-derived attributes: currently just the process ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessAttribute {
    Pid,
}

pub struct ProcessAttributesProvider {
    attributes: HashMap<String, ProcessAttribute>,
}

impl ProcessAttributesProvider {
    pub fn new(attributes: HashMap<String, ProcessAttribute>) -> Self {
        Self { attributes }
    }
}

impl AttributesProvider for ProcessAttributesProvider {
    fn attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|(key, attribute)| {
                let value = match attribute {
                    ProcessAttribute::Pid => std::process::id().to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Thread-derived attributes. Rust threads have no stable numeric ID
/// exposed without nightly APIs, so this reports the `Debug` form of
/// `std::thread::ThreadId` and the thread's name, covering the original's
/// `ident`/`native_id` with what's actually available on stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadAttribute {
    Id,
    Name,
}

pub struct ThreadAttributesProvider {
    attributes: HashMap<String, ThreadAttribute>,
}

impl ThreadAttributesProvider {
    pub fn new(attributes: HashMap<String, ThreadAttribute>) -> Self {
        Self { attributes }
    }
}

impl AttributesProvider for ThreadAttributesProvider {
    fn attributes(&self) -> Attributes {
        let current = std::thread::current();
        self.attributes
            .iter()
            .filter_map(|(key, attribute)| {
                let value = match attribute {
                    ThreadAttribute::Id => Some(format!("{:?}", current.id())),
                    ThreadAttribute::Name => current.name().map(|n| n.to_string()),
                };
                value.map(|v| (key.clone(), v))
            })
            .collect()
    }
}

/// Fixed attributes supplied at construction time.
pub struct StaticAttributesProvider {
    attributes: Attributes,
}

impl StaticAttributesProvider {
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }
}

impl AttributesProvider for StaticAttributesProvider {
    fn attributes(&self) -> Attributes {
        self.attributes.clone()
    }
}

/// A measurement point: a named counter/histogram value tagged with
/// attributes. No exporter ships in this crate — callers implement
/// [`MetricsSink`] to wire one in (OTLP, Prometheus, StatsD, whatever fits).
#[derive(Clone, Debug)]
pub struct Metric {
    pub name: &'static str,
    pub value: f64,
    pub attributes: Attributes,
}

/// Where emitted metrics go. [`NoopMetricsSink`] is the default — this
/// crate only needs the seam, not an exporter.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: Metric);
}

/// Discards every metric. Used when a caller doesn't configure telemetry.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _metric: Metric) {}
}

/// Combines a [`MetricsSink`] with the set of providers that tag every
/// metric it records.
pub struct Telemetry {
    sink: Box<dyn MetricsSink>,
    providers: Vec<Box<dyn AttributesProvider>>,
}

impl Telemetry {
    pub fn new(sink: Box<dyn MetricsSink>, providers: Vec<Box<dyn AttributesProvider>>) -> Self {
        Self { sink, providers }
    }

    pub fn noop() -> Self {
        Self::new(Box::new(NoopMetricsSink), Vec::new())
    }

    pub fn record(&self, name: &'static str, value: f64, extra: Attributes) {
        let mut attributes = collect_attributes(&self.providers);
        attributes.extend(extra);
        self.sink.record(Metric { name, value, attributes });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_returns_fixed_attributes() {
        let mut attrs = Attributes::new();
        attrs.insert("profile".to_string(), "default".to_string());
        let provider = StaticAttributesProvider::new(attrs.clone());
        assert_eq!(provider.attributes(), attrs);
    }

    #[test]
    fn collect_attributes_lets_later_providers_win() {
        let mut first = Attributes::new();
        first.insert("k".to_string(), "first".to_string());
        let mut second = Attributes::new();
        second.insert("k".to_string(), "second".to_string());

        let providers: Vec<Box<dyn AttributesProvider>> = vec![
            Box::new(StaticAttributesProvider::new(first)),
            Box::new(StaticAttributesProvider::new(second)),
        ];
        let merged = collect_attributes(&providers);
        assert_eq!(merged.get("k").unwrap(), "second");
    }

    #[test]
    fn process_attributes_provider_reports_pid() {
        let mut attrs = HashMap::new();
        attrs.insert("pid".to_string(), ProcessAttribute::Pid);
        let provider = ProcessAttributesProvider::new(attrs);
        let collected = provider.attributes();
        assert_eq!(collected.get("pid").unwrap(), &std::process::id().to_string());
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let telemetry = Telemetry::noop();
        telemetry.record("msc.read.bytes", 1024.0, Attributes::new());
    }

    #[test]
    fn environment_variables_provider_only_emits_set_vars() {
        std::env::set_var("MSC_TEST_ATTR", "value");
        let mut attrs = HashMap::new();
        attrs.insert("attr".to_string(), "MSC_TEST_ATTR".to_string());
        attrs.insert("missing".to_string(), "MSC_TEST_ATTR_UNSET".to_string());
        let provider = EnvironmentVariablesAttributesProvider::new(attrs);
        let collected = provider.attributes();
        assert_eq!(collected.get("attr").unwrap(), "value");
        assert!(!collected.contains_key("missing"));
        std::env::remove_var("MSC_TEST_ATTR");
    }
}
