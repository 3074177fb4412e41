//! Per-event output records and the writer that persists them.
//!
//! Every written file carries a random token in its name so concurrently
//! running workers never collide; files sharing `{prefix}_{dataset}_{year}`
//! are later concatenated by [`merge_buffer`](crate::merge::merge_buffer).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hzupsilon_columnar::{Collection, Jagged, LorentzVector};
use hzupsilon_types::{AnalysisError, BatchMetadata, Result, Year};

use crate::events::Events;
use crate::weights::Weights;

/// Record prefix of the selected-event table.
pub const EVENTS_PREFIX: &str = "events";
/// Record prefix of the dimuon-mass table.
pub const DIMUON_MASS_PREFIX: &str = "dimuons_mass";
/// Record prefix of the probe-muon trigger-study table.
pub const TRIGGER_STUDY_PREFIX: &str = "trigger_study";

// ---------------------------------------------------------------------------
// RecordTable
// ---------------------------------------------------------------------------

/// Named numeric columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordTable {
    columns: BTreeMap<String, Vec<f64>>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows per column; zero for a table without columns.
    pub fn n_rows(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(AnalysisError::Other(format!(
                "record column '{name}' written twice"
            )));
        }
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            return Err(AnalysisError::ShapeMismatch {
                what: format!("record column '{name}'"),
                expected: self.n_rows(),
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Append the rows of `other`. Both tables must share their columns,
    /// unless one of them has none.
    pub fn concat(&mut self, other: &RecordTable) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        if !self.columns.keys().eq(other.columns.keys()) {
            return Err(AnalysisError::Other(format!(
                "cannot concatenate record tables with columns [{}] and [{}]",
                self.column_names().collect::<Vec<_>>().join(", "),
                other.column_names().collect::<Vec<_>>().join(", ")
            )));
        }
        for (name, values) in self.columns.iter_mut() {
            if let Some(more) = other.columns.get(name) {
                values.extend_from_slice(more);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordFile
// ---------------------------------------------------------------------------

/// A self-describing record file: where the rows came from plus the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFile {
    pub prefix: String,
    pub dataset: String,
    pub year: Year,
    /// RFC 3339 timestamp of when the file was produced.
    pub created_at: String,
    pub table: RecordTable,
}

impl RecordFile {
    pub fn new(prefix: impl Into<String>, metadata: &BatchMetadata, table: RecordTable) -> Self {
        Self {
            prefix: prefix.into(),
            dataset: metadata.dataset.clone(),
            year: metadata.year,
            created_at: chrono::Utc::now().to_rfc3339(),
            table,
        }
    }

    /// `{prefix}_{dataset}_{year}`, the key merged files are grouped by.
    pub fn group_key(&self) -> String {
        format!("{}_{}_{}", self.prefix, self.dataset, self.year)
    }

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
}

// ---------------------------------------------------------------------------
// RecordWriter
// ---------------------------------------------------------------------------

/// Persists record files produced by a batch.
pub trait RecordWriter: Send + Sync {
    /// Write `file` into `dir` and return where it went.
    fn write(&self, dir: &Path, file: &RecordFile) -> Result<PathBuf>;
}

/// Writes each record file as JSON under a unique name.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordWriter;

impl RecordWriter for JsonRecordWriter {
    fn write(&self, dir: &Path, file: &RecordFile) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let token = uuid::Uuid::new_v4().simple();
        let path = dir.join(format!("{}_{token}.json", file.group_key()));
        file.save(&path)?;
        tracing::debug!(
            path = %path.display(),
            rows = file.table.n_rows(),
            "Record file written"
        );
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Table builders
// ---------------------------------------------------------------------------

const KINEMATICS: [&str; 4] = ["mass", "pt", "eta", "phi"];

fn push_kinematics(table: &mut RecordTable, name: &str, objects: &Collection) -> Result<()> {
    for field in KINEMATICS {
        table.push_column(format!("{name}_{field}"), objects.float_field(field)?.into_owned())?;
    }
    Ok(())
}

fn pick<T: Copy>(values: &[T], rows: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(rows)
        .filter(|(_, keep)| **keep)
        .map(|(v, _)| *v)
        .collect()
}

/// One row per event passing `selection` that holds a boson candidate:
/// kinematics of `boson`, `upsilon`, `photon`, `mu_1`, `mu_2`, the
/// upsilon-photon separations, the total weight and each weight component.
pub fn event_records(events: &mut Events<'_>, weights: &Weights, selection: &[bool]) -> Result<RecordTable> {
    let boson = events.objects("boson")?;
    let rows: Vec<bool> = boson
        .counts()
        .into_iter()
        .zip(selection)
        .map(|(n, pass)| *pass && n == 1)
        .collect();

    let mut table = RecordTable::new();
    push_kinematics(&mut table, "boson", &boson.select_events(&rows)?)?;
    let upsilon = events.objects("upsilon")?.select_events(&rows)?;
    let photon = events.objects("photon")?.select_events(&rows)?;
    push_kinematics(&mut table, "upsilon", &upsilon)?;
    push_kinematics(&mut table, "photon", &photon)?;
    for name in ["mu_1", "mu_2"] {
        let muon = events.objects(name)?.select_events(&rows)?;
        push_kinematics(&mut table, name, &muon)?;
    }

    let (upsilon_p4, photon_p4) = (upsilon.four_vectors()?, photon.four_vectors()?);
    let pairs: Vec<(&LorentzVector, &LorentzVector)> = upsilon_p4.iter().zip(&photon_p4).collect();
    table.push_column(
        "delta_eta_upsilon_photon",
        pairs.iter().map(|(u, g)| (u.eta() - g.eta()).abs()).collect(),
    )?;
    table.push_column(
        "delta_phi_upsilon_photon",
        pairs.iter().map(|(u, g)| u.delta_phi(g).abs()).collect(),
    )?;
    table.push_column(
        "delta_r_upsilon_photon",
        pairs.iter().map(|(u, g)| u.delta_r(g)).collect(),
    )?;

    table.push_column("weight", pick(&weights.weight(), &rows))?;
    for name in weights.names() {
        table.push_column(format!("weight_{name}"), pick(weights.individual_weight(name)?, &rows))?;
    }
    Ok(table)
}

/// Invariant mass of every `dimuons` pair in the events passing `selection`.
pub fn dimuon_masses(events: &mut Events<'_>, selection: &[bool]) -> Result<RecordTable> {
    let dimuons = events.pairs("dimuons")?.select_events(selection)?;
    let muons = events.objects("good_muons")?.four_vectors()?;
    let masses = dimuons
        .first()
        .iter()
        .zip(dimuons.second())
        .map(|(&a, &b)| (muons[a] + muons[b]).mass())
        .collect();
    let mut table = RecordTable::new();
    table.push_column("mass", masses)?;
    Ok(table)
}

/// One row per `matched_probe_muon` in the events passing `selection`:
/// probe kinematics, whether it matched the trigger, the event's tag-muon and
/// probe-photon counts and each weight component of its event.
pub fn trigger_study_records(
    events: &mut Events<'_>,
    weights: &Weights,
    selection: &[bool],
) -> Result<RecordTable> {
    let probes = events.objects("matched_probe_muon")?.select_events(selection)?;
    let tags = events.objects("tag_muon")?.select_events(selection)?;
    let photons = events.objects("probe_photon")?.select_events(selection)?;

    let mut table = RecordTable::new();
    push_kinematics(&mut table, "probe_muon", &probes)?;
    table.push_column(
        "good_probe_muon",
        probes
            .flag_field("good_probe_muon")?
            .iter()
            .map(|good| if *good { 1.0 } else { 0.0 })
            .collect(),
    )?;

    // event-level values repeated for every probe of the event
    let counts = probes.counts();
    let per_probe = |values: Vec<f64>| -> Vec<f64> {
        counts
            .iter()
            .zip(values)
            .flat_map(|(n, v)| std::iter::repeat(v).take(*n))
            .collect()
    };
    let as_float = |c: Vec<usize>| -> Vec<f64> { c.into_iter().map(|n| n as f64).collect() };
    table.push_column("n_tag_muon", per_probe(as_float(tags.counts())))?;
    table.push_column("n_probe_photon", per_probe(as_float(photons.counts())))?;
    for name in weights.names() {
        table.push_column(
            format!("weight_{name}"),
            per_probe(pick(weights.individual_weight(name)?, selection)),
        )?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[f64]) -> RecordTable {
        let mut t = RecordTable::new();
        t.push_column("mass", rows.to_vec()).unwrap();
        t.push_column("pt", rows.iter().map(|r| r * 2.0).collect()).unwrap();
        t
    }

    #[test]
    fn push_column_checks_length_and_duplicates() {
        let mut t = table(&[1.0, 2.0]);
        assert!(matches!(
            t.push_column("eta", vec![0.0]),
            Err(AnalysisError::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(t.push_column("mass", vec![0.0, 0.0]).is_err());
        assert_eq!(t.n_rows(), 2);
    }

    #[test]
    fn concat_appends_rows() {
        let mut t = RecordTable::new();
        t.concat(&table(&[1.0])).unwrap();
        t.concat(&table(&[2.0, 3.0])).unwrap();
        assert_eq!(t.column("mass").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(t.column("pt").unwrap(), &[2.0, 4.0, 6.0]);

        let mut other = RecordTable::new();
        other.push_column("weight", vec![1.0]).unwrap();
        assert!(t.concat(&other).is_err());
    }

    #[test]
    fn writer_names_are_unique_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let meta = BatchMetadata::new("DoubleMuon", Year::Y2017);
        let file = RecordFile::new(EVENTS_PREFIX, &meta, table(&[9.4]));

        let first = JsonRecordWriter.write(dir.path(), &file).unwrap();
        let second = JsonRecordWriter.write(dir.path(), &file).unwrap();
        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("events_DoubleMuon_2017_"));
        assert!(name.ends_with(".json"));

        let loaded = RecordFile::load(&first).unwrap();
        assert_eq!(loaded.table, file.table);
        assert_eq!(loaded.group_key(), "events_DoubleMuon_2017");
    }
}
