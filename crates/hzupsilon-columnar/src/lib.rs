//! Columnar event batches for the selection engine.
//!
//! A [`Batch`] holds a fixed number of events. Each event owns zero or more
//! objects per named [`Collection`] (muons, photons, trigger objects) plus
//! event-level [`Column`]s (trigger bits, generator weights). Every operation
//! in this crate preserves the event axis: masking objects never changes how
//! many events a collection spans, only how many objects each event holds.
//!
//! # Example
//! ```
//! use hzupsilon_columnar::{Collection, Column, Jagged};
//!
//! let muons = Collection::from_counts("Muon", &[2, 0, 1])
//!     .with_field("pt", Column::Float(vec![30.0, 4.0, 12.0]))
//!     .unwrap();
//! let hard = muons.float_field("pt").unwrap().iter().map(|pt| *pt > 5.0).collect::<Vec<_>>();
//! let selected = muons.mask(&hard).unwrap();
//! assert_eq!(selected.counts(), vec![1, 0, 1]);
//! ```

pub mod batch;
pub mod collection;
pub mod column;
pub mod fourvec;
pub mod jagged;

pub use batch::{Batch, BatchFile};
pub use collection::Collection;
pub use column::Column;
pub use fourvec::LorentzVector;
pub use jagged::{cartesian, combinations2, Jagged, Pairs};
