//! The shared event axis of variable-length data, and index pairings over it.

use std::ops::Range;

use hzupsilon_types::{AnalysisError, Result};

/// Anything laid out as "N events, each with a contiguous run of rows".
///
/// Offsets always have `n_events + 1` entries, start at 0 and never decrease.
pub trait Jagged {
    fn offsets(&self) -> &[usize];

    fn n_events(&self) -> usize {
        self.offsets().len().saturating_sub(1)
    }

    /// Total number of rows across all events.
    fn len(&self) -> usize {
        self.offsets().last().copied().unwrap_or(0)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn counts(&self) -> Vec<usize> {
        self.offsets().windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn event_range(&self, event: usize) -> Range<usize> {
        let offsets = self.offsets();
        offsets[event]..offsets[event + 1]
    }
}

pub(crate) fn offsets_from_counts(counts: impl IntoIterator<Item = usize>) -> Vec<usize> {
    let mut offsets = vec![0];
    let mut total = 0;
    for c in counts {
        total += c;
        offsets.push(total);
    }
    offsets
}

pub(crate) fn check_event_mask(what: &str, n_events: usize, keep: &[bool]) -> Result<()> {
    if keep.len() != n_events {
        return Err(AnalysisError::ShapeMismatch {
            what: what.to_string(),
            expected: n_events,
            actual: keep.len(),
        });
    }
    Ok(())
}

/// Rows and new offsets that remain when only the kept events survive.
pub(crate) fn rows_of_kept_events(offsets: &[usize], keep: &[bool]) -> (Vec<usize>, Vec<usize>) {
    let mut rows = Vec::new();
    let mut counts = Vec::new();
    for (event, kept) in keep.iter().enumerate() {
        if *kept {
            let range = offsets[event]..offsets[event + 1];
            counts.push(range.len());
            rows.extend(range);
        }
    }
    (offsets_from_counts(counts), rows)
}

/// Per-event offsets after an object-level mask, and the surviving rows.
pub(crate) fn rows_of_kept_objects(offsets: &[usize], keep: &[bool]) -> (Vec<usize>, Vec<usize>) {
    let mut rows = Vec::new();
    let counts = offsets.windows(2).map(|w| {
        let before = rows.len();
        rows.extend((w[0]..w[1]).filter(|&row| keep[row]));
        rows.len() - before
    });
    let offsets = offsets_from_counts(counts.collect::<Vec<_>>());
    (offsets, rows)
}

// ---------------------------------------------------------------------------
// Pairs: per-event index pairs into one or two jagged sources
// ---------------------------------------------------------------------------

/// Per-event pairs of flat row indices.
///
/// `first[k]` and `second[k]` index rows of the sources the pairs were built
/// from; pair `k` belongs to the event whose offset range contains `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pairs {
    offsets: Vec<usize>,
    first: Vec<usize>,
    second: Vec<usize>,
}

impl Jagged for Pairs {
    fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

impl Pairs {
    pub fn empty(n_events: usize) -> Self {
        Self {
            offsets: vec![0; n_events + 1],
            first: Vec::new(),
            second: Vec::new(),
        }
    }

    pub fn first(&self) -> &[usize] {
        &self.first
    }

    pub fn second(&self) -> &[usize] {
        &self.second
    }

    /// Keep the pairs whose flag is set; the event axis is unchanged.
    pub fn filter(&self, keep: &[bool]) -> Result<Pairs> {
        if keep.len() != self.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: "pair mask".into(),
                expected: self.len(),
                actual: keep.len(),
            });
        }
        let (offsets, rows) = rows_of_kept_objects(&self.offsets, keep);
        Ok(self.take(offsets, &rows))
    }

    /// Keep only the events whose flag is set.
    pub fn select_events(&self, keep: &[bool]) -> Result<Pairs> {
        check_event_mask("pair event mask", self.n_events(), keep)?;
        let (offsets, rows) = rows_of_kept_events(&self.offsets, keep);
        Ok(self.take(offsets, &rows))
    }

    fn take(&self, offsets: Vec<usize>, rows: &[usize]) -> Pairs {
        Pairs {
            offsets,
            first: rows.iter().map(|&r| self.first[r]).collect(),
            second: rows.iter().map(|&r| self.second[r]).collect(),
        }
    }
}

/// All unordered pairs `(i, j)`, `i < j`, of rows within the same event.
///
/// Pairs are generated in lexicographic order: `(0,1), (0,2), (1,2), ...`.
pub fn combinations2<J: Jagged + ?Sized>(items: &J) -> Pairs {
    let mut first = Vec::new();
    let mut second = Vec::new();
    let counts = (0..items.n_events()).map(|event| {
        let range = items.event_range(event);
        let before = first.len();
        for i in range.clone() {
            for j in (i + 1)..range.end {
                first.push(i);
                second.push(j);
            }
        }
        first.len() - before
    });
    let offsets = offsets_from_counts(counts.collect::<Vec<_>>());
    Pairs {
        offsets,
        first,
        second,
    }
}

/// Per-event cartesian product of two jagged sources sharing one event axis.
///
/// For each event the left rows vary slowest: `(l0,r0), (l0,r1), (l1,r0), ...`.
pub fn cartesian<L, R>(left: &L, right: &R) -> Result<Pairs>
where
    L: Jagged + ?Sized,
    R: Jagged + ?Sized,
{
    if left.n_events() != right.n_events() {
        return Err(AnalysisError::ShapeMismatch {
            what: "cartesian product operands".into(),
            expected: left.n_events(),
            actual: right.n_events(),
        });
    }
    let mut first = Vec::new();
    let mut second = Vec::new();
    let mut counts = Vec::with_capacity(left.n_events());
    for event in 0..left.n_events() {
        let rights = right.event_range(event);
        let before = first.len();
        for l in left.event_range(event) {
            for r in rights.clone() {
                first.push(l);
                second.push(r);
            }
        }
        counts.push(first.len() - before);
    }
    Ok(Pairs {
        offsets: offsets_from_counts(counts),
        first,
        second,
    })
}
