//! Named per-event cut outcomes for one batch.

use std::collections::HashMap;

use hzupsilon_types::{AnalysisError, Result};

/// Each recorded vector is the marginal outcome of one cut: `true` means the
/// event passes that cut in isolation.
#[derive(Debug, Clone)]
pub struct Filters {
    n_events: usize,
    names: Vec<String>,
    masks: HashMap<String, Vec<bool>>,
}

impl Filters {
    pub fn new(n_events: usize) -> Self {
        Self {
            n_events,
            names: Vec::new(),
            masks: HashMap::new(),
        }
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Record a cut. Each name may be recorded once per batch.
    pub fn record(&mut self, name: impl Into<String>, mask: Vec<bool>) -> Result<()> {
        let name = name.into();
        if self.masks.contains_key(&name) {
            return Err(AnalysisError::DuplicateFilter { name });
        }
        if mask.len() != self.n_events {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("filter '{name}'"),
                expected: self.n_events,
                actual: mask.len(),
            });
        }
        tracing::trace!(filter = %name, passed = mask.iter().filter(|p| **p).count(), "Recorded filter");
        self.names.push(name.clone());
        self.masks.insert(name, mask);
        Ok(())
    }

    /// Elementwise AND of the named cuts. No names selects every event.
    pub fn all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<bool>> {
        let mut combined = vec![true; self.n_events];
        for name in names {
            let mask = self.get(name.as_ref())?;
            for (acc, pass) in combined.iter_mut().zip(mask) {
                *acc &= *pass;
            }
        }
        Ok(combined)
    }

    pub fn get(&self, name: &str) -> Result<&[bool]> {
        self.masks
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AnalysisError::UnknownFilter {
                name: name.to_string(),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.masks.contains_key(name)
    }

    /// Recorded names, in recording order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> Filters {
        let mut f = Filters::new(4);
        f.record("a", vec![true, true, false, false]).unwrap();
        f.record("b", vec![true, false, true, false]).unwrap();
        f
    }

    #[test]
    fn empty_query_is_identity() {
        let none: [&str; 0] = [];
        assert_eq!(filters().all(&none).unwrap(), vec![true; 4]);
    }

    #[test]
    fn single_name_returns_recorded_vector() {
        assert_eq!(filters().all(&["a"]).unwrap(), vec![true, true, false, false]);
    }

    #[test]
    fn conjunction_is_commutative() {
        let f = filters();
        let ab = f.all(&["a", "b"]).unwrap();
        assert_eq!(ab, vec![true, false, false, false]);
        assert_eq!(ab, f.all(&["b", "a"]).unwrap());
    }

    #[test]
    fn recording_twice_is_rejected() {
        let mut f = filters();
        let err = f.record("a", vec![false; 4]).unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateFilter { name } if name == "a"));
        assert_eq!(f.get("a").unwrap(), &[true, true, false, false]);
    }

    #[test]
    fn unknown_and_misshaped_filters_fail() {
        let mut f = filters();
        assert!(matches!(
            f.all(&["a", "c"]),
            Err(AnalysisError::UnknownFilter { name }) if name == "c"
        ));
        assert!(matches!(
            f.record("c", vec![true]),
            Err(AnalysisError::ShapeMismatch { expected: 4, actual: 1, .. })
        ));
        assert_eq!(f.names(), &["a".to_string(), "b".to_string()]);
    }
}
