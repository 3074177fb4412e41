use std::sync::Arc;

use hzupsilon_columnar::{Collection, Column, Jagged, Pairs};

/// A batch-shaped attribute value: raw field or derived by a builder.
///
/// Clones are cheap; the payload is shared, so a cached value handed out
/// twice is the same allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Per-event objects (muons, photons, candidates).
    Objects(Arc<Collection>),
    /// Per-event index pairs (dimuons, boson combinations).
    Pairs(Arc<Pairs>),
    /// One flag per event.
    Flags(Arc<[bool]>),
    /// One number per event.
    Numbers(Arc<[f64]>),
}

impl Value {
    pub fn objects(collection: Collection) -> Self {
        Value::Objects(Arc::new(collection))
    }

    pub fn pairs(pairs: Pairs) -> Self {
        Value::Pairs(Arc::new(pairs))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Objects(_) => "objects",
            Value::Pairs(_) => "pairs",
            Value::Flags(_) => "flags",
            Value::Numbers(_) => "numbers",
        }
    }

    /// Length of the event axis this value spans.
    pub fn n_events(&self) -> usize {
        match self {
            Value::Objects(c) => c.n_events(),
            Value::Pairs(p) => p.n_events(),
            Value::Flags(f) => f.len(),
            Value::Numbers(n) => n.len(),
        }
    }

    /// `true` when both values share the same underlying allocation.
    pub fn same_allocation(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Objects(a), Value::Objects(b)) => Arc::ptr_eq(a, b),
            (Value::Pairs(a), Value::Pairs(b)) => Arc::ptr_eq(a, b),
            (Value::Flags(a), Value::Flags(b)) => Arc::ptr_eq(a, b),
            (Value::Numbers(a), Value::Numbers(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Column> for Value {
    fn from(column: Column) -> Self {
        match column {
            Column::Bool(v) => Value::Flags(v.into()),
            Column::Float(v) => Value::Numbers(v.into()),
            Column::Int(v) => Value::Numbers(v.into_iter().map(|x| x as f64).collect()),
        }
    }
}
