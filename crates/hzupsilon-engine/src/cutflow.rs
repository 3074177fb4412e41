//! Cutflow histogram: summed event weight per (dataset, year, cut outcomes).
//!
//! Outcomes are the marginal per-cut booleans, so cumulative efficiencies can
//! be derived afterwards for any cut ordering.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use hzupsilon_types::{AnalysisError, BatchMetadata, Result, Year};

use crate::filters::Filters;

/// Nested on-disk form: dataset -> year -> outcome string -> summed weight.
///
/// The outcome string holds one `0`/`1` character per cut, in cut order.
pub type NestedCells = BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub dataset: String,
    pub year: Year,
    pub outcomes: Vec<bool>,
}

impl CellKey {
    fn outcome_string(&self) -> String {
        self.outcomes.iter().map(|o| if *o { '1' } else { '0' }).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CutflowRepr", into = "CutflowRepr")]
pub struct Cutflow {
    cuts: Vec<String>,
    cells: BTreeMap<CellKey, f64>,
}

#[derive(Serialize, Deserialize)]
struct CutflowRepr {
    cuts: Vec<String>,
    cells: NestedCells,
}

impl TryFrom<CutflowRepr> for Cutflow {
    type Error = AnalysisError;

    fn try_from(repr: CutflowRepr) -> Result<Self> {
        Cutflow::from_nested(repr.cuts, repr.cells)
    }
}

impl From<Cutflow> for CutflowRepr {
    fn from(cutflow: Cutflow) -> Self {
        CutflowRepr {
            cells: cutflow.to_nested(),
            cuts: cutflow.cuts,
        }
    }
}

impl Cutflow {
    pub fn new(cuts: Vec<String>) -> Self {
        Self {
            cuts,
            cells: BTreeMap::new(),
        }
    }

    pub fn cuts(&self) -> &[String] {
        &self.cuts
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Add every event of a batch: its outcome for each cut plus its weight.
    pub fn fill(&mut self, metadata: &BatchMetadata, filters: &Filters, weight: &[f64]) -> Result<()> {
        if weight.len() != filters.n_events() {
            return Err(AnalysisError::ShapeMismatch {
                what: "cutflow weight".into(),
                expected: filters.n_events(),
                actual: weight.len(),
            });
        }
        let masks = self
            .cuts
            .iter()
            .map(|cut| filters.get(cut))
            .collect::<Result<Vec<_>>>()?;

        for (event, w) in weight.iter().enumerate() {
            let key = CellKey {
                dataset: metadata.dataset.clone(),
                year: metadata.year,
                outcomes: masks.iter().map(|mask| mask[event]).collect(),
            };
            *self.cells.entry(key).or_insert(0.0) += w;
        }
        Ok(())
    }

    /// Sum `other` into `self`, cell by cell.
    pub fn merge(&mut self, other: &Cutflow) -> Result<()> {
        if self.cuts != other.cuts {
            return Err(AnalysisError::CutflowMismatch {
                left: self.cuts.clone(),
                right: other.cuts.clone(),
            });
        }
        for (key, w) in &other.cells {
            *self.cells.entry(key.clone()).or_insert(0.0) += w;
        }
        Ok(())
    }

    pub fn cell(&self, key: &CellKey) -> f64 {
        self.cells.get(key).copied().unwrap_or(0.0)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellKey, f64)> {
        self.cells.iter().map(|(k, w)| (k, *w))
    }

    /// Summed weight over all cells.
    pub fn total(&self) -> f64 {
        self.cells.values().sum()
    }

    /// Summed weight of events passing each successive prefix of `order`.
    ///
    /// Entry `i` holds the weight passing the first `i` cuts, so the first
    /// entry is the total and the result has `order.len() + 1` entries.
    pub fn cumulative<S: AsRef<str>>(&self, order: &[S]) -> Result<Vec<f64>> {
        let positions = order
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.cuts
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| AnalysisError::UnknownFilter {
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut yields = vec![0.0; positions.len() + 1];
        for (key, w) in &self.cells {
            yields[0] += w;
            for (i, pos) in positions.iter().enumerate() {
                if !key.outcomes[*pos] {
                    break;
                }
                yields[i + 1] += w;
            }
        }
        Ok(yields)
    }

    pub fn to_nested(&self) -> NestedCells {
        let mut nested = NestedCells::new();
        for (key, w) in &self.cells {
            nested
                .entry(key.dataset.clone())
                .or_default()
                .entry(key.year.to_string())
                .or_default()
                .insert(key.outcome_string(), *w);
        }
        nested
    }

    pub fn from_nested(cuts: Vec<String>, nested: NestedCells) -> Result<Self> {
        let mut cutflow = Cutflow::new(cuts);
        for (dataset, years) in nested {
            for (year, cells) in years {
                let year: Year = year.parse()?;
                for (outcome, w) in cells {
                    let outcomes = parse_outcomes(&outcome, cutflow.cuts.len())?;
                    let key = CellKey {
                        dataset: dataset.clone(),
                        year,
                        outcomes,
                    };
                    *cutflow.cells.entry(key).or_insert(0.0) += w;
                }
            }
        }
        Ok(cutflow)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cutflow: Self = serde_json::from_str(&data)?;
        Ok(cutflow)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn parse_outcomes(outcome: &str, n_cuts: usize) -> Result<Vec<bool>> {
    if outcome.len() != n_cuts {
        return Err(AnalysisError::ShapeMismatch {
            what: format!("cutflow cell '{outcome}'"),
            expected: n_cuts,
            actual: outcome.len(),
        });
    }
    outcome
        .chars()
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(AnalysisError::Other(format!(
                "invalid cutflow outcome character '{other}'"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuts() -> Vec<String> {
        vec!["trigger".into(), "nmuons".into()]
    }

    fn filters(trigger: Vec<bool>, nmuons: Vec<bool>) -> Filters {
        let mut f = Filters::new(trigger.len());
        f.record("trigger", trigger).unwrap();
        f.record("nmuons", nmuons).unwrap();
        f
    }

    fn meta() -> BatchMetadata {
        BatchMetadata::new("DoubleMuon", Year::Y2018)
    }

    fn key(outcomes: Vec<bool>) -> CellKey {
        CellKey {
            dataset: "DoubleMuon".into(),
            year: Year::Y2018,
            outcomes,
        }
    }

    #[test]
    fn fill_records_marginal_outcomes() {
        let mut cf = Cutflow::new(cuts());
        let f = filters(vec![true, false, true], vec![false, true, true]);
        cf.fill(&meta(), &f, &[1.0, 2.0, 0.5]).unwrap();
        assert_eq!(cf.cell(&key(vec![true, false])), 1.0);
        assert_eq!(cf.cell(&key(vec![false, true])), 2.0);
        assert_eq!(cf.cell(&key(vec![true, true])), 0.5);
        assert_eq!(cf.total(), 3.5);
    }

    #[test]
    fn fill_fails_on_unrecorded_cut() {
        let mut cf = Cutflow::new(vec!["photon_pt".into()]);
        let f = filters(vec![true], vec![true]);
        assert!(matches!(
            cf.fill(&meta(), &f, &[1.0]),
            Err(AnalysisError::UnknownFilter { .. })
        ));
    }

    #[test]
    fn cumulative_depends_on_order() {
        let mut cf = Cutflow::new(cuts());
        let f = filters(vec![true, false, true], vec![false, true, true]);
        cf.fill(&meta(), &f, &[1.0, 2.0, 0.5]).unwrap();
        assert_eq!(cf.cumulative(&["trigger", "nmuons"]).unwrap(), vec![3.5, 1.5, 0.5]);
        assert_eq!(cf.cumulative(&["nmuons", "trigger"]).unwrap(), vec![3.5, 2.5, 0.5]);
    }

    #[test]
    fn merge_requires_same_axes() {
        let mut a = Cutflow::new(cuts());
        let b = Cutflow::new(vec!["trigger".into()]);
        assert!(matches!(a.merge(&b), Err(AnalysisError::CutflowMismatch { .. })));
    }

    #[test]
    fn nested_form_round_trips() {
        let mut cf = Cutflow::new(cuts());
        let f = filters(vec![true, false], vec![true, true]);
        cf.fill(&meta(), &f, &[1.0, 0.25]).unwrap();

        let nested = cf.to_nested();
        assert_eq!(nested["DoubleMuon"]["2018"]["11"], 1.0);
        assert_eq!(nested["DoubleMuon"]["2018"]["01"], 0.25);

        let json = serde_json::to_string(&cf).unwrap();
        let back: Cutflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cf);
    }

    #[test]
    fn rejects_malformed_outcome_strings() {
        let nested = NestedCells::from([(
            "DoubleMuon".to_string(),
            BTreeMap::from([("2018".to_string(), BTreeMap::from([("1".to_string(), 1.0)]))]),
        )]);
        assert!(Cutflow::from_nested(cuts(), nested).is_err());
    }
}
