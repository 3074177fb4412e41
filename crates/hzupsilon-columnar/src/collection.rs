use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hzupsilon_types::{AnalysisError, Result};

use crate::column::Column;
use crate::fourvec::LorentzVector;
use crate::jagged::{
    check_event_mask, offsets_from_counts, rows_of_kept_events, rows_of_kept_objects, Jagged,
};

/// A per-event, variable-length group of objects with named fields.
///
/// Every field column holds exactly one value per object (`len()` entries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CollectionRepr", into = "CollectionRepr")]
pub struct Collection {
    label: String,
    offsets: Vec<usize>,
    fields: BTreeMap<String, Column>,
}

/// On-disk form: per-event counts rather than offsets.
#[derive(Serialize, Deserialize)]
struct CollectionRepr {
    counts: Vec<usize>,
    #[serde(default)]
    fields: BTreeMap<String, Column>,
}

impl TryFrom<CollectionRepr> for Collection {
    type Error = AnalysisError;

    fn try_from(repr: CollectionRepr) -> Result<Self> {
        let mut collection = Collection::from_counts("", &repr.counts);
        for (name, column) in repr.fields {
            collection.insert_field(name, column)?;
        }
        Ok(collection)
    }
}

impl From<Collection> for CollectionRepr {
    fn from(collection: Collection) -> Self {
        CollectionRepr {
            counts: collection.counts(),
            fields: collection.fields,
        }
    }
}

impl Jagged for Collection {
    fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

impl Collection {
    /// A collection of `n_events` events holding no objects.
    pub fn empty(label: impl Into<String>, n_events: usize) -> Self {
        Self {
            label: label.into(),
            offsets: vec![0; n_events + 1],
            fields: BTreeMap::new(),
        }
    }

    pub fn from_counts(label: impl Into<String>, counts: &[usize]) -> Self {
        Self {
            label: label.into(),
            offsets: offsets_from_counts(counts.iter().copied()),
            fields: BTreeMap::new(),
        }
    }

    /// Objects with kinematic fields `pt`, `eta`, `phi`, `mass` built from
    /// four-vectors laid out along `offsets`.
    pub fn from_four_vectors(
        label: impl Into<String>,
        offsets: Vec<usize>,
        vectors: &[LorentzVector],
    ) -> Result<Self> {
        let label = label.into();
        if offsets.last().copied().unwrap_or(0) != vectors.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("four-vectors of '{label}'"),
                expected: offsets.last().copied().unwrap_or(0),
                actual: vectors.len(),
            });
        }
        let mut collection = Collection {
            label,
            offsets,
            fields: BTreeMap::new(),
        };
        collection.insert_field("pt", Column::Float(vectors.iter().map(|v| v.pt()).collect()))?;
        collection.insert_field("eta", Column::Float(vectors.iter().map(|v| v.eta()).collect()))?;
        collection.insert_field("phi", Column::Float(vectors.iter().map(|v| v.phi()).collect()))?;
        collection.insert_field("mass", Column::Float(vectors.iter().map(|v| v.mass()).collect()))?;
        Ok(collection)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn with_field(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.insert_field(name, column)?;
        Ok(self)
    }

    pub fn insert_field(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if column.len() != self.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("{}.{}", self.label, name),
                expected: self.len(),
                actual: column.len(),
            });
        }
        self.fields.insert(name, column);
        Ok(())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Result<&Column> {
        self.fields.get(name).ok_or_else(|| self.missing(name))
    }

    /// Numeric field, integers widened to `f64`.
    pub fn float_field(&self, name: &str) -> Result<Cow<'_, [f64]>> {
        let column = self.field(name)?;
        column.as_floats().ok_or_else(|| AnalysisError::TypeMismatch {
            name: format!("{}.{}", self.label, name),
            expected: "float",
            found: column.kind(),
        })
    }

    /// Flag field; integer flags count as set when non-zero.
    pub fn flag_field(&self, name: &str) -> Result<Cow<'_, [bool]>> {
        let column = self.field(name)?;
        column.as_flags().ok_or_else(|| AnalysisError::TypeMismatch {
            name: format!("{}.{}", self.label, name),
            expected: "bool",
            found: column.kind(),
        })
    }

    fn missing(&self, name: &str) -> AnalysisError {
        AnalysisError::MissingField {
            collection: self.label.clone(),
            field: name.to_string(),
        }
    }

    /// Expand an event-level mask to one flag per object.
    pub fn broadcast(&self, event_mask: &[bool]) -> Result<Vec<bool>> {
        check_event_mask(&format!("event mask for '{}'", self.label), self.n_events(), event_mask)?;
        Ok(self
            .counts()
            .into_iter()
            .zip(event_mask)
            .flat_map(|(count, keep)| std::iter::repeat(*keep).take(count))
            .collect())
    }

    /// Number of objects per event whose flag is set.
    pub fn count_where(&self, keep: &[bool]) -> Result<Vec<usize>> {
        self.check_object_mask(keep)?;
        Ok(self
            .offsets
            .windows(2)
            .map(|w| keep[w[0]..w[1]].iter().filter(|k| **k).count())
            .collect())
    }

    /// Keep the objects whose flag is set. The event axis is unchanged; an
    /// event may end up with zero objects.
    pub fn mask(&self, keep: &[bool]) -> Result<Collection> {
        self.check_object_mask(keep)?;
        let (offsets, rows) = rows_of_kept_objects(&self.offsets, keep);
        Ok(self.take_rows(self.label.clone(), offsets, &rows))
    }

    /// Keep only the events whose flag is set, shrinking the event axis.
    pub fn select_events(&self, keep: &[bool]) -> Result<Collection> {
        check_event_mask(&format!("event mask for '{}'", self.label), self.n_events(), keep)?;
        let (offsets, rows) = rows_of_kept_events(&self.offsets, keep);
        Ok(self.take_rows(self.label.clone(), offsets, &rows))
    }

    /// Build a new collection from chosen rows laid out along `offsets`.
    ///
    /// `rows` are flat indices into this collection; the caller guarantees
    /// each chosen row belongs to the event it is placed in.
    pub fn gather(
        &self,
        label: impl Into<String>,
        offsets: Vec<usize>,
        rows: &[usize],
    ) -> Result<Collection> {
        let label = label.into();
        if offsets.len() != self.offsets.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("event axis of '{label}'"),
                expected: self.n_events(),
                actual: offsets.len().saturating_sub(1),
            });
        }
        if offsets.last().copied().unwrap_or(0) != rows.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("rows of '{label}'"),
                expected: offsets.last().copied().unwrap_or(0),
                actual: rows.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|&&r| r >= self.len()) {
            return Err(AnalysisError::Other(format!(
                "row {bad} is out of range for '{}' with {} objects",
                self.label,
                self.len()
            )));
        }
        Ok(self.take_rows(label, offsets, rows))
    }

    fn take_rows(&self, label: String, offsets: Vec<usize>, rows: &[usize]) -> Collection {
        Collection {
            label,
            offsets,
            fields: self
                .fields
                .iter()
                .map(|(name, column)| (name.clone(), column.take(rows)))
                .collect(),
        }
    }

    fn check_object_mask(&self, keep: &[bool]) -> Result<()> {
        if keep.len() != self.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("object mask for '{}'", self.label),
                expected: self.len(),
                actual: keep.len(),
            });
        }
        Ok(())
    }

    /// Four-vector of every object, from `pt`, `eta`, `phi`, `mass`.
    pub fn four_vectors(&self) -> Result<Vec<LorentzVector>> {
        let pt = self.float_field("pt")?;
        let eta = self.float_field("eta")?;
        let phi = self.float_field("phi")?;
        let mass = self.float_field("mass")?;
        Ok((0..self.len())
            .map(|i| LorentzVector::from_pt_eta_phi_m(pt[i], eta[i], phi[i], mass[i]))
            .collect())
    }
}
