//! Event selection engine for the H/Z -> Upsilon(nS) + photon analysis.
//!
//! This crate implements the per-batch evaluation core: a registry of
//! attribute builders, the lazy demand-driven resolver ([`Events`]) that
//! computes each derived collection at most once, the [`Filters`] and
//! [`Weights`] accumulators, the [`Cutflow`] histogram, record output, and
//! the [`BatchProcessor`] tying them together.

pub mod builders;
pub mod config;
pub mod cutflow;
pub mod events;
pub mod filters;
pub mod merge;
pub mod processor;
pub mod records;
pub mod registry;
pub mod value;
pub mod weights;

pub use builders::{default_registry, register_builders};
pub use config::{
    AnalysisConfig, GeneratorMllCut, MassWindow, MuonCuts, PhotonCuts, TriggerMatch, YearThresholds,
    CUT_NAMES,
};
pub use cutflow::{CellKey, Cutflow};
pub use events::Events;
pub use filters::Filters;
pub use merge::{
    clear_buffer, merge_buffer, save_partial_cutflow, BatchStage, MergeReport, MERGED_CUTFLOW,
};
pub use processor::{weighted_yield, BatchOutput, BatchProcessor, NOMINAL};
pub use records::{
    JsonRecordWriter, RecordFile, RecordTable, RecordWriter, DIMUON_MASS_PREFIX, EVENTS_PREFIX,
    TRIGGER_STUDY_PREFIX,
};
pub use registry::{BuilderRegistry, DynBuilder};
pub use value::Value;
pub use weights::Weights;
