use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A flat, typed array of values: one entry per event (event-level columns)
/// or one entry per object (fields of a [`Collection`](crate::Collection)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Float(_) => "float",
            Column::Int(_) => "int",
            Column::Bool(_) => "bool",
        }
    }

    /// Numeric view. Integer columns are widened, boolean columns are not numbers.
    pub fn as_floats(&self) -> Option<Cow<'_, [f64]>> {
        match self {
            Column::Float(v) => Some(Cow::Borrowed(v)),
            Column::Int(v) => Some(Cow::Owned(v.iter().map(|x| *x as f64).collect())),
            Column::Bool(_) => None,
        }
    }

    /// Flag view. NanoAOD stores some flags as small integers; any non-zero value is set.
    pub fn as_flags(&self) -> Option<Cow<'_, [bool]>> {
        match self {
            Column::Bool(v) => Some(Cow::Borrowed(v)),
            Column::Int(v) => Some(Cow::Owned(v.iter().map(|x| *x != 0).collect())),
            Column::Float(_) => None,
        }
    }

    /// Gather the given rows, in order.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Float(v) => Column::Float(rows.iter().map(|&i| v[i]).collect()),
            Column::Int(v) => Column::Int(rows.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(rows.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Keep the rows whose flag is set. `keep` must have the column's length.
    pub fn filter(&self, keep: &[bool]) -> Column {
        fn retain<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(keep)
                .filter_map(|(v, k)| k.then_some(*v))
                .collect()
        }
        match self {
            Column::Float(v) => Column::Float(retain(v, keep)),
            Column::Int(v) => Column::Int(retain(v, keep)),
            Column::Bool(v) => Column::Bool(retain(v, keep)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_columns_widen_to_floats() {
        let col = Column::Int(vec![-1, 1]);
        assert_eq!(col.as_floats().unwrap().as_ref(), &[-1.0, 1.0]);
    }

    #[test]
    fn int_columns_read_as_flags() {
        let col = Column::Int(vec![0, 1, 3]);
        assert_eq!(col.as_flags().unwrap().as_ref(), &[false, true, true]);
        assert!(Column::Float(vec![1.0]).as_flags().is_none());
        assert!(Column::Bool(vec![true]).as_floats().is_none());
    }

    #[test]
    fn take_and_filter_preserve_type() {
        let col = Column::Bool(vec![true, false, true]);
        assert_eq!(col.take(&[2, 1]), Column::Bool(vec![true, false]));
        assert_eq!(col.filter(&[false, true, true]), Column::Bool(vec![false, true]));
    }

    #[test]
    fn serializes_with_type_tag() {
        let col = Column::Float(vec![1.5]);
        assert_eq!(serde_json::to_string(&col).unwrap(), r#"{"float":[1.5]}"#);
        let back: Column = serde_json::from_str(r#"{"int":[1,2]}"#).unwrap();
        assert_eq!(back, Column::Int(vec![1, 2]));
    }
}
