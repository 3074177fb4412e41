use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use hzupsilon_types::{AnalysisError, BatchMetadata, Result};

use crate::collection::Collection;
use crate::column::Column;
use crate::jagged::{check_event_mask, Jagged};

/// A bounded slice of events: named object collections plus event-level columns.
///
/// Names are unique across collections and columns, and everything spans
/// exactly `n_events` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BatchRepr")]
pub struct Batch {
    n_events: usize,
    collections: BTreeMap<String, Collection>,
    columns: BTreeMap<String, Column>,
}

#[derive(Deserialize)]
struct BatchRepr {
    n_events: usize,
    #[serde(default)]
    collections: BTreeMap<String, Collection>,
    #[serde(default)]
    columns: BTreeMap<String, Column>,
}

impl TryFrom<BatchRepr> for Batch {
    type Error = AnalysisError;

    fn try_from(repr: BatchRepr) -> Result<Self> {
        let mut batch = Batch::new(repr.n_events);
        for (name, collection) in repr.collections {
            batch.insert_collection(name, collection)?;
        }
        for (name, column) in repr.columns {
            batch.insert_column(name, column)?;
        }
        Ok(batch)
    }
}

impl Batch {
    pub fn new(n_events: usize) -> Self {
        Self {
            n_events,
            collections: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn with_collection(mut self, name: impl Into<String>, collection: Collection) -> Result<Self> {
        self.insert_collection(name, collection)?;
        Ok(self)
    }

    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.insert_column(name, column)?;
        Ok(self)
    }

    pub fn insert_collection(&mut self, name: impl Into<String>, mut collection: Collection) -> Result<()> {
        let name = name.into();
        self.check_new_name(&name)?;
        if collection.n_events() != self.n_events {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("collection '{name}'"),
                expected: self.n_events,
                actual: collection.n_events(),
            });
        }
        collection.set_label(name.clone());
        self.collections.insert(name, collection);
        Ok(())
    }

    pub fn insert_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        self.check_new_name(&name)?;
        if column.len() != self.n_events {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("column '{name}'"),
                expected: self.n_events,
                actual: column.len(),
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            return Err(AnalysisError::Other(format!(
                "field '{name}' appears more than once in the batch"
            )));
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name) || self.columns.contains_key(name)
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &Collection)> {
        self.collections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Split into event count, collections and event-level columns.
    pub fn into_parts(
        self,
    ) -> (
        usize,
        BTreeMap<String, Collection>,
        BTreeMap<String, Column>,
    ) {
        (self.n_events, self.collections, self.columns)
    }

    /// Keep only the events whose flag is set.
    pub fn select_events(&self, keep: &[bool]) -> Result<Batch> {
        check_event_mask("batch event mask", self.n_events, keep)?;
        let collections = self
            .collections
            .iter()
            .map(|(name, c)| Ok((name.clone(), c.select_events(keep)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let columns = self
            .columns
            .iter()
            .map(|(name, c)| (name.clone(), c.filter(keep)))
            .collect();
        Ok(Batch {
            n_events: keep.iter().filter(|k| **k).count(),
            collections,
            columns,
        })
    }
}

// ---------------------------------------------------------------------------
// BatchFile: one unit of work on disk
// ---------------------------------------------------------------------------

/// A batch as handed to a worker: metadata, the optional run/luminosity mask
/// computed upstream, and the events themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    pub metadata: BatchMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lumi_mask: Option<Vec<bool>>,
    pub batch: Batch,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&data)?;
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply the luminosity mask (if any) and return the surviving events.
    pub fn into_masked(self) -> Result<(BatchMetadata, Batch)> {
        match self.lumi_mask {
            Some(mask) => {
                let batch = self.batch.select_events(&mask)?;
                tracing::debug!(
                    dataset = %self.metadata.dataset,
                    kept = batch.n_events(),
                    total = mask.len(),
                    "Applied luminosity mask"
                );
                Ok((self.metadata, batch))
            }
            None => Ok((self.metadata, self.batch)),
        }
    }
}
