//! The resolved state of one batch and the lazy attribute resolver.
//!
//! [`Events`] wraps a raw [`Batch`] together with its metadata. Reading an
//! attribute that is not a raw field runs its registered builder, which in
//! turn reads the attributes it depends on; the dependency graph is walked
//! implicitly by these nested calls. Every computed value is cached, so each
//! builder runs at most once per batch. An explicit in-progress stack turns
//! self-referencing builders into [`AnalysisError::CyclicDependency`].

use std::collections::HashMap;
use std::sync::Arc;

use hzupsilon_columnar::{Batch, Collection, Pairs};
use hzupsilon_types::{AnalysisError, BatchMetadata, Result, Year};

use crate::config::{AnalysisConfig, YearThresholds};
use crate::registry::BuilderRegistry;
use crate::value::Value;

/// Batch-scoped, exclusively owned resolution state.
pub struct Events<'r> {
    registry: &'r BuilderRegistry,
    config: &'r AnalysisConfig,
    metadata: BatchMetadata,
    n_events: usize,
    raw: HashMap<String, Value>,
    cache: HashMap<String, Value>,
    in_progress: Vec<String>,
}

impl<'r> Events<'r> {
    /// Wrap a batch. Fails if a raw field shares its name with a builder.
    pub fn new(
        batch: Batch,
        metadata: BatchMetadata,
        registry: &'r BuilderRegistry,
        config: &'r AnalysisConfig,
    ) -> Result<Self> {
        let (n_events, collections, columns) = batch.into_parts();
        let mut raw: HashMap<String, Value> = collections
            .into_iter()
            .map(|(name, collection)| (name, Value::objects(collection)))
            .collect();
        raw.extend(columns.into_iter().map(|(name, column)| (name, Value::from(column))));
        if let Some(name) = raw.keys().find(|name| registry.has(name)) {
            return Err(AnalysisError::DuplicateBuilder { name: name.clone() });
        }

        Ok(Self {
            registry,
            config,
            metadata,
            n_events,
            raw,
            cache: HashMap::new(),
            in_progress: Vec::new(),
        })
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn metadata(&self) -> &BatchMetadata {
        &self.metadata
    }

    pub fn dataset(&self) -> &str {
        &self.metadata.dataset
    }

    pub fn year(&self) -> Year {
        self.metadata.year
    }

    pub fn config(&self) -> &'r AnalysisConfig {
        self.config
    }

    /// Thresholds for this batch's year.
    pub fn thresholds(&self) -> Result<&'r YearThresholds> {
        self.config.thresholds(self.metadata.year)
    }

    /// `true` if `name` is a field of the raw batch.
    pub fn has_raw(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }

    /// `true` if `name` has already been computed for this batch.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// Names of the derived attributes computed so far, sorted.
    pub fn resolved_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.cache.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return the value of `name`, computing and caching it on first access.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        if let Some(value) = self.raw.get(name).or_else(|| self.cache.get(name)) {
            tracing::trace!(attribute = name, "Attribute served from cache");
            return Ok(value.clone());
        }

        if let Some(pos) = self.in_progress.iter().position(|n| n == name) {
            let mut chain = self.in_progress[pos..].to_vec();
            chain.push(name.to_string());
            return Err(AnalysisError::CyclicDependency { chain });
        }

        let registry = self.registry;
        let builder = registry
            .get(name)
            .ok_or_else(|| AnalysisError::UnknownAttribute {
                name: name.to_string(),
            })?;

        self.in_progress.push(name.to_string());
        tracing::debug!(
            attribute = name,
            depth = self.in_progress.len(),
            dataset = %self.metadata.dataset,
            "Resolving attribute"
        );
        let chain = self.in_progress.clone();
        let result = builder
            .build(self)
            .and_then(|value| self.check_event_axis(name, value));
        self.in_progress.pop();

        match result {
            Ok(value) => {
                self.cache.insert(name.to_string(), value.clone());
                Ok(value)
            }
            Err(err) if err.is_resolution_error() => Err(err),
            Err(err) => Err(AnalysisError::BuilderEvaluation {
                attribute: name.to_string(),
                chain,
                source: Box::new(err),
            }),
        }
    }

    fn check_event_axis(&self, name: &str, value: Value) -> Result<Value> {
        if value.n_events() != self.n_events {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("attribute '{name}'"),
                expected: self.n_events,
                actual: value.n_events(),
            });
        }
        Ok(value)
    }

    // --- typed accessors ---

    pub fn objects(&mut self, name: &str) -> Result<Arc<Collection>> {
        match self.get(name)? {
            Value::Objects(c) => Ok(c),
            other => Err(mismatch(name, "objects", &other)),
        }
    }

    pub fn pairs(&mut self, name: &str) -> Result<Arc<Pairs>> {
        match self.get(name)? {
            Value::Pairs(p) => Ok(p),
            other => Err(mismatch(name, "pairs", &other)),
        }
    }

    pub fn flags(&mut self, name: &str) -> Result<Arc<[bool]>> {
        match self.get(name)? {
            Value::Flags(f) => Ok(f),
            other => Err(mismatch(name, "flags", &other)),
        }
    }

    pub fn numbers(&mut self, name: &str) -> Result<Arc<[f64]>> {
        match self.get(name)? {
            Value::Numbers(n) => Ok(n),
            other => Err(mismatch(name, "numbers", &other)),
        }
    }
}

fn mismatch(name: &str, expected: &'static str, found: &Value) -> AnalysisError {
    AnalysisError::TypeMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzupsilon_columnar::Column;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch() -> Batch {
        Batch::new(3)
            .with_column("x", Column::Float(vec![1.0, 2.0, 3.0]))
            .unwrap()
    }

    fn meta() -> BatchMetadata {
        BatchMetadata::new("test", Year::Y2018)
    }

    fn doubled(events: &mut Events<'_>) -> Result<Value> {
        let x = events.numbers("x")?;
        Ok(Value::Numbers(x.iter().map(|v| v * 2.0).collect()))
    }

    #[test]
    fn raw_fields_are_served_directly() {
        let registry = BuilderRegistry::new();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();
        let x = events.numbers("x").unwrap();
        assert_eq!(x.as_ref(), &[1.0, 2.0, 3.0]);
        assert!(events.has_raw("x"));
        assert!(events.resolved_names().is_empty());
    }

    #[test]
    fn builder_runs_once_and_value_is_shared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = BuilderRegistry::new();
        registry
            .register("x2", move |events: &mut Events<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                doubled(events)
            })
            .unwrap();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();

        let first = events.get("x2").unwrap();
        let second = events.get("x2").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.same_allocation(&second));
        assert_eq!(first, Value::Numbers(vec![2.0, 4.0, 6.0].into()));
        assert!(events.is_resolved("x2"));
    }

    #[test]
    fn shared_dependency_is_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = BuilderRegistry::new();
        registry
            .register("base", move |events: &mut Events<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                doubled(events)
            })
            .unwrap();
        registry
            .register("left", |events: &mut Events<'_>| events.get("base"))
            .unwrap();
        registry
            .register("right", |events: &mut Events<'_>| events.get("base"))
            .unwrap();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();

        events.get("left").unwrap();
        events.get("right").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.resolved_names(), vec!["base", "left", "right"]);
    }

    #[test]
    fn unknown_attribute_is_reported() {
        let registry = BuilderRegistry::new();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();
        let err = events.get("jets").unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownAttribute { name } if name == "jets"));
    }

    #[test]
    fn cycle_is_detected_before_any_builder_reruns() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let (a_counter, b_counter) = (a_calls.clone(), b_calls.clone());
        let mut registry = BuilderRegistry::new();
        registry
            .register("a", move |events: &mut Events<'_>| {
                a_counter.fetch_add(1, Ordering::SeqCst);
                events.get("b")
            })
            .unwrap();
        registry
            .register("b", move |events: &mut Events<'_>| {
                b_counter.fetch_add(1, Ordering::SeqCst);
                events.get("a")
            })
            .unwrap();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();

        let err = events.get("a").unwrap_err();
        match err {
            AnalysisError::CyclicDependency { chain } => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("Expected CyclicDependency, got: {other:?}"),
        }
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert!(!events.is_resolved("a"));
        assert!(!events.is_resolved("b"));
    }

    #[test]
    fn domain_errors_are_wrapped_with_chain() {
        let mut registry = BuilderRegistry::new();
        registry
            .register("broken", |_: &mut Events<'_>| {
                Err(AnalysisError::MissingField {
                    collection: "Muon".into(),
                    field: "pt".into(),
                })
            })
            .unwrap();
        registry
            .register("top", |events: &mut Events<'_>| events.get("broken"))
            .unwrap();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();

        let err = events.get("top").unwrap_err();
        match err {
            AnalysisError::BuilderEvaluation {
                attribute,
                chain,
                source,
            } => {
                assert_eq!(attribute, "broken");
                assert_eq!(chain, vec!["top", "broken"]);
                assert!(matches!(*source, AnalysisError::MissingField { .. }));
            }
            other => panic!("Expected BuilderEvaluation, got: {other:?}"),
        }
    }

    #[test]
    fn wrong_event_axis_is_a_builder_error() {
        let mut registry = BuilderRegistry::new();
        registry
            .register("short", |_: &mut Events<'_>| Ok(Value::Flags(vec![true].into())))
            .unwrap();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();
        let err = events.get("short").unwrap_err();
        assert!(matches!(err, AnalysisError::BuilderEvaluation { .. }));
        assert!(!events.is_resolved("short"));
    }

    #[test]
    fn typed_accessor_reports_mismatch() {
        let registry = BuilderRegistry::new();
        let config = AnalysisConfig::default();
        let mut events = Events::new(batch(), meta(), &registry, &config).unwrap();
        let err = events.objects("x").unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::TypeMismatch { expected: "objects", found: "numbers", .. }
        ));
    }

    #[test]
    fn raw_field_shadowing_a_builder_is_rejected() {
        let mut registry = BuilderRegistry::new();
        registry.register("x", doubled).unwrap();
        let config = AnalysisConfig::default();
        let err = Events::new(batch(), meta(), &registry, &config).err().unwrap();
        assert!(matches!(err, AnalysisError::DuplicateBuilder { name } if name == "x"));
    }

    #[test]
    fn thresholds_follow_batch_year() {
        let registry = BuilderRegistry::new();
        let mut config = AnalysisConfig::default();
        config.years.remove(&Year::Y2018);
        let events = Events::new(batch(), meta(), &registry, &config).unwrap();
        assert!(matches!(
            events.thresholds(),
            Err(AnalysisError::UnsupportedYear { .. })
        ));
    }
}
