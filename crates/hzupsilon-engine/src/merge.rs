//! Merging the per-batch outputs left in a buffer directory.
//!
//! Each batch stages its partial cutflow and record files in a hidden
//! directory and publishes them with one rename once all of them are written,
//! so the buffer only ever holds complete batches. Merging sums the cutflows
//! cell by cell and concatenates record files that share
//! `{prefix}_{dataset}_{year}`. Both steps are order independent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hzupsilon_types::Result;

use crate::cutflow::Cutflow;
use crate::records::RecordFile;

const CUTFLOW_PREFIX: &str = "cutflow_";
const STAGING_PREFIX: &str = ".staging_";
const BATCH_PREFIX: &str = "batch_";
/// File name of the merged cutflow in the output directory.
pub const MERGED_CUTFLOW: &str = "cutflow.json";

/// What [`merge_buffer`] found and wrote.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub cutflows_merged: usize,
    pub record_files_merged: usize,
    pub cutflow: Option<Cutflow>,
    /// Merged record files, keyed by `{prefix}_{dataset}_{year}`.
    pub groups: BTreeMap<String, usize>,
    pub written: Vec<PathBuf>,
}

/// Write one batch's cutflow into the buffer under a unique name.
pub fn save_partial_cutflow(buffer: &Path, cutflow: &Cutflow) -> Result<PathBuf> {
    std::fs::create_dir_all(buffer)?;
    let path = buffer.join(format!(
        "{CUTFLOW_PREFIX}{}.json",
        uuid::Uuid::new_v4().simple()
    ));
    cutflow.save(&path)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// BatchStage
// ---------------------------------------------------------------------------

/// Hidden directory collecting one batch's outputs until they are complete.
///
/// Dropping an uncommitted stage removes it along with everything written so far.
#[derive(Debug)]
pub struct BatchStage {
    dir: PathBuf,
    buffer: PathBuf,
    committed: bool,
}

impl BatchStage {
    pub fn begin(buffer: &Path) -> Result<Self> {
        let dir = buffer.join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            buffer: buffer.to_path_buf(),
            committed: false,
        })
    }

    /// Where the batch writes its outputs while staged.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Publish every staged file into the buffer with a single rename.
    /// Returns the published paths.
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        let target = self
            .buffer
            .join(format!("{BATCH_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            names.push(entry?.file_name());
        }
        names.sort();
        std::fs::rename(&self.dir, &target)?;
        self.committed = true;
        tracing::debug!(batch = %target.display(), files = names.len(), "Batch outputs published");
        Ok(names.into_iter().map(|name| target.join(name)).collect())
    }
}

impl Drop for BatchStage {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(stage = %self.dir.display(), error = %e, "Failed to discard staged outputs");
        }
    }
}

/// Remove every buffered output, leaving an empty buffer directory.
pub fn clear_buffer(buffer: &Path) -> Result<()> {
    if buffer.exists() {
        std::fs::remove_dir_all(buffer)?;
    }
    std::fs::create_dir_all(buffer)?;
    tracing::info!(buffer = %buffer.display(), "Buffer cleared");
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn json_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    Ok(())
}

/// JSON files at the top of the buffer and inside published batch
/// directories. Stages still being written are hidden and skipped.
fn buffered_json(buffer: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    json_files(buffer, &mut paths)?;
    for entry in std::fs::read_dir(buffer)? {
        let path = entry?.path();
        if path.is_dir() && !is_hidden(&path) {
            json_files(&path, &mut paths)?;
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_partial_cutflow(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(CUTFLOW_PREFIX))
}

/// Merge everything in `buffer` into `out`.
pub fn merge_buffer(buffer: &Path, out: &Path) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut merged_records: BTreeMap<String, RecordFile> = BTreeMap::new();

    for path in buffered_json(buffer)? {
        if is_partial_cutflow(&path) {
            let partial = Cutflow::load(&path)?;
            match report.cutflow.as_mut() {
                Some(total) => total.merge(&partial)?,
                None => report.cutflow = Some(partial),
            }
            report.cutflows_merged += 1;
            continue;
        }

        let file = RecordFile::load(&path)?;
        let key = file.group_key();
        *report.groups.entry(key.clone()).or_insert(0) += 1;
        match merged_records.get_mut(&key) {
            Some(merged) => merged.table.concat(&file.table)?,
            None => {
                merged_records.insert(key, file);
            }
        }
        report.record_files_merged += 1;
    }

    std::fs::create_dir_all(out)?;
    if let Some(cutflow) = &report.cutflow {
        let path = out.join(MERGED_CUTFLOW);
        cutflow.save(&path)?;
        report.written.push(path);
    }
    for (key, mut file) in merged_records {
        file.created_at = chrono::Utc::now().to_rfc3339();
        let path = out.join(format!("{key}.json"));
        file.save(&path)?;
        report.written.push(path);
    }

    tracing::info!(
        cutflows = report.cutflows_merged,
        record_files = report.record_files_merged,
        groups = report.groups.len(),
        out = %out.display(),
        "Buffer merged"
    );
    Ok(report)
}
