//! Builder registry: derived-attribute name -> function computing it.

use std::collections::HashMap;

use hzupsilon_types::{AnalysisError, Result};

use crate::events::Events;
use crate::value::Value;

// ---------------------------------------------------------------------------
// DynBuilder: object-safe wrapper
// ---------------------------------------------------------------------------

type BuilderFn = dyn Fn(&mut Events<'_>) -> Result<Value> + Send + Sync;

/// A builder computes one derived attribute from the resolved state.
///
/// It pulls whatever inputs it needs through [`Events::get`] and friends;
/// the resolver caches the value it returns.
pub struct DynBuilder(Box<BuilderFn>);

impl DynBuilder {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Events<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    pub fn build(&self, events: &mut Events<'_>) -> Result<Value> {
        (self.0)(events)
    }
}

// ---------------------------------------------------------------------------
// BuilderRegistry
// ---------------------------------------------------------------------------

/// Registration order is irrelevant: resolution is demand-driven.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<String, DynBuilder>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&mut Events<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.builders.contains_key(&name) {
            return Err(AnalysisError::DuplicateBuilder { name });
        }
        self.builders.insert(name, DynBuilder::new(f));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DynBuilder> {
        self.builders.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
