//! Per-event multiplicative weights with optional named variations.

use std::collections::BTreeMap;

use hzupsilon_types::{AnalysisError, Result};

#[derive(Debug, Clone)]
struct Component {
    name: String,
    nominal: Vec<f64>,
    variations: BTreeMap<String, Vec<f64>>,
}

/// Components keep their registration order; products iterate in that order.
#[derive(Debug, Clone)]
pub struct Weights {
    n_events: usize,
    components: Vec<Component>,
}

impl Weights {
    pub fn new(n_events: usize) -> Self {
        Self {
            n_events,
            components: Vec::new(),
        }
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Register a component with no variations.
    pub fn add(&mut self, name: impl Into<String>, nominal: Vec<f64>) -> Result<()> {
        self.add_component(name, nominal, BTreeMap::new())
    }

    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        nominal: Vec<f64>,
        variations: BTreeMap<String, Vec<f64>>,
    ) -> Result<()> {
        let name = name.into();
        if self.components.iter().any(|c| c.name == name) {
            return Err(AnalysisError::DuplicateWeight { name });
        }
        self.check_len(&name, &nominal)?;
        for (variation, values) in &variations {
            self.check_len(&format!("{name}/{variation}"), values)?;
        }
        self.components.push(Component {
            name,
            nominal,
            variations,
        });
        Ok(())
    }

    fn check_len(&self, what: &str, values: &[f64]) -> Result<()> {
        if values.len() != self.n_events {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("weight '{what}'"),
                expected: self.n_events,
                actual: values.len(),
            });
        }
        Ok(())
    }

    fn component(&self, name: &str) -> Result<&Component> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| AnalysisError::UnknownWeight {
                name: name.to_string(),
            })
    }

    /// Product of every component's nominal vector; all ones when empty.
    pub fn weight(&self) -> Vec<f64> {
        let mut total = vec![1.0; self.n_events];
        for component in &self.components {
            multiply(&mut total, &component.nominal);
        }
        total
    }

    pub fn individual_weight(&self, name: &str) -> Result<&[f64]> {
        Ok(&self.component(name)?.nominal)
    }

    /// Product over the components named in `include`, each contributing its
    /// `variation` vector if it has one and its nominal otherwise.
    ///
    /// A name listed twice contributes once.
    pub fn partial_weight_with_variation<S: AsRef<str>>(
        &self,
        variation: &str,
        include: &[S],
    ) -> Result<Vec<f64>> {
        for name in include {
            self.component(name.as_ref())?;
        }
        let mut total = vec![1.0; self.n_events];
        for component in &self.components {
            if !include.iter().any(|n| n.as_ref() == component.name) {
                continue;
            }
            let values = component
                .variations
                .get(variation)
                .unwrap_or(&component.nominal);
            multiply(&mut total, values);
        }
        Ok(total)
    }

    /// Component names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    /// Every variation name registered by any component, sorted and unique.
    pub fn variation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .components
            .iter()
            .flat_map(|c| c.variations.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

fn multiply(total: &mut [f64], factor: &[f64]) {
    for (t, f) in total.iter_mut().zip(factor) {
        *t *= f;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> Weights {
        let mut w = Weights::new(3);
        w.add_component(
            "pileup",
            vec![1.0, 0.9, 1.1],
            BTreeMap::from([("up".to_string(), vec![1.0, 1.0, 1.2])]),
        )
        .unwrap();
        w.add("generator", vec![2.0, 2.0, -2.0]).unwrap();
        w
    }

    #[test]
    fn total_is_product_of_individuals() {
        let w = weights();
        let pileup = w.individual_weight("pileup").unwrap();
        let generator = w.individual_weight("generator").unwrap();
        let expected: Vec<f64> = pileup.iter().zip(generator).map(|(a, b)| a * b).collect();
        assert_eq!(w.weight(), expected);
    }

    #[test]
    fn variation_replaces_only_its_component() {
        let w = weights();
        assert_eq!(
            w.partial_weight_with_variation("up", &["pileup"]).unwrap(),
            vec![1.0, 1.0, 1.2]
        );
        assert_eq!(
            w.partial_weight_with_variation("up", &["generator"]).unwrap(),
            vec![2.0, 2.0, -2.0]
        );
        assert_eq!(w.weight(), vec![2.0, 1.8, 1.1 * -2.0]);
    }

    #[test]
    fn missing_variation_uses_nominal() {
        let w = weights();
        assert_eq!(
            w.partial_weight_with_variation("down", &["pileup"]).unwrap(),
            vec![1.0, 0.9, 1.1]
        );
    }

    #[test]
    fn empty_include_is_all_ones() {
        let none: [&str; 0] = [];
        assert_eq!(
            weights().partial_weight_with_variation("up", &none).unwrap(),
            vec![1.0; 3]
        );
        assert_eq!(Weights::new(2).weight(), vec![1.0, 1.0]);
    }

    #[test]
    fn registration_errors() {
        let mut w = weights();
        assert!(matches!(
            w.add("pileup", vec![1.0; 3]),
            Err(AnalysisError::DuplicateWeight { .. })
        ));
        assert!(matches!(
            w.add("xsec", vec![1.0; 2]),
            Err(AnalysisError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            w.individual_weight("xsec"),
            Err(AnalysisError::UnknownWeight { .. })
        ));
        assert!(matches!(
            w.partial_weight_with_variation("up", &["xsec"]),
            Err(AnalysisError::UnknownWeight { .. })
        ));
    }

    #[test]
    fn names_and_variations() {
        let w = weights();
        assert_eq!(w.names(), vec!["pileup", "generator"]);
        assert_eq!(w.variation_names(), vec!["up"]);
    }
}
