//! Shared types and errors for the H/Z -> Upsilon + photon selection engine.
//!
//! This crate provides the foundational types used across all other crates:
//! - `AnalysisError`: unified error taxonomy
//! - `Year`: the Run 2 data-taking periods a batch can belong to
//! - `BatchMetadata`: dataset and year attached to every processed batch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unified error type for all engine subsystems.
///
/// Every variant aborts the batch being processed; no per-event recovery is
/// attempted.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    // === Resolution Errors ===
    #[error("Unknown attribute '{name}': no raw field or registered builder")]
    UnknownAttribute { name: String },

    #[error("Cyclic dependency detected: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("Builder for '{attribute}' failed (resolving {}): {source}", chain.join(" -> "))]
    BuilderEvaluation {
        attribute: String,
        chain: Vec<String>,
        source: Box<AnalysisError>,
    },

    #[error("Attribute '{name}' is {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    // === Registration Errors ===
    #[error("Builder '{name}' is already registered")]
    DuplicateBuilder { name: String },

    #[error("Filter '{name}' was already recorded for this batch")]
    DuplicateFilter { name: String },

    #[error("Filter '{name}' has not been recorded")]
    UnknownFilter { name: String },

    #[error("Weight component '{name}' is already registered")]
    DuplicateWeight { name: String },

    #[error("Weight component '{name}' is not registered")]
    UnknownWeight { name: String },

    // === Configuration Errors ===
    #[error("No thresholds configured for year '{year}'")]
    UnsupportedYear { year: String },

    // === Data Errors ===
    #[error("Field '{field}' is absent from '{collection}'")]
    MissingField { collection: String, field: String },

    #[error("Shape mismatch for '{what}': expected length {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cutflow axes differ: {left:?} vs {right:?}")]
    CutflowMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AnalysisError {
    /// Returns `true` for errors raised by the resolver itself.
    ///
    /// These pass through builders unchanged instead of being wrapped in
    /// [`AnalysisError::BuilderEvaluation`], so the caller sees the original
    /// failure of the innermost attribute.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::UnknownAttribute { .. }
                | AnalysisError::CyclicDependency { .. }
                | AnalysisError::BuilderEvaluation { .. }
                | AnalysisError::UnsupportedYear { .. }
        )
    }

    /// Returns `true` for registration misuse that is fatal at setup time,
    /// before any event is looked at.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::DuplicateBuilder { .. }
                | AnalysisError::DuplicateFilter { .. }
                | AnalysisError::DuplicateWeight { .. }
        )
    }
}

/// A convenience alias for `Result<T, AnalysisError>`.
pub type Result<T> = std::result::Result<T, AnalysisError>;

// ---------------------------------------------------------------------------
// Year: Run 2 data-taking period
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Year {
    #[serde(rename = "2016APV")]
    Y2016Apv,
    #[serde(rename = "2016")]
    Y2016,
    #[serde(rename = "2017")]
    Y2017,
    #[serde(rename = "2018")]
    Y2018,
}

impl Year {
    pub const ALL: [Year; 4] = [Year::Y2016Apv, Year::Y2016, Year::Y2017, Year::Y2018];

    pub fn as_str(&self) -> &'static str {
        match self {
            Year::Y2016Apv => "2016APV",
            Year::Y2016 => "2016",
            Year::Y2017 => "2017",
            Year::Y2018 => "2018",
        }
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Year {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Year::ALL
            .into_iter()
            .find(|y| y.as_str() == s)
            .ok_or_else(|| AnalysisError::UnsupportedYear { year: s.to_string() })
    }
}

// ---------------------------------------------------------------------------
// BatchMetadata: dataset identity of one batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub dataset: String,
    pub year: Year,
}

impl BatchMetadata {
    pub fn new(dataset: impl Into<String>, year: Year) -> Self {
        Self {
            dataset: dataset.into(),
            year,
        }
    }

    /// `<dataset>_<year>`, the key used for per-sample output naming.
    pub fn sample_key(&self) -> String {
        format!("{}_{}", self.dataset, self.year)
    }
}
