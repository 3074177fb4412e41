//! Worker pool that processes batch files and merges what they leave behind.
//!
//! Each batch runs on a blocking thread with its own resolver state. A batch
//! that succeeds publishes its partial cutflow and record files into
//! `<output>/buffer`; a failing one publishes nothing. Once every batch has
//! finished the buffer is merged into `<output>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use hzupsilon_columnar::BatchFile;
use hzupsilon_engine::{
    clear_buffer, merge_buffer, AnalysisConfig, BatchProcessor, JsonRecordWriter, MergeReport,
};
use hzupsilon_types::Result;

/// Buffer subdirectory of the output directory.
pub const BUFFER_DIR: &str = "buffer";
/// Run summary written next to the merged outputs.
pub const SUMMARY_FILE: &str = "yields.json";

#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one `run`: per-sample yields plus the batches that failed.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub processed: usize,
    pub events: usize,
    pub selected: usize,
    /// Selected weighted yield per `<dataset>_<year>`, then per weight variation.
    pub yields: BTreeMap<String, BTreeMap<String, f64>>,
    pub failed: Vec<FailedBatch>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

struct Completed {
    sample: String,
    n_events: usize,
    n_selected: usize,
    yields: BTreeMap<String, f64>,
}

pub fn buffer_dir(output: &Path) -> PathBuf {
    output.join(BUFFER_DIR)
}

fn process_one(processor: &BatchProcessor, path: &Path) -> Result<Completed> {
    let file = BatchFile::load(path)?;
    let output = processor.process_file(file)?;
    Ok(Completed {
        sample: output.metadata.sample_key(),
        n_events: output.n_events,
        n_selected: output.n_selected,
        yields: output.yields,
    })
}

/// Process `files` with at most `workers` batches in flight.
///
/// A failing batch is logged and listed in the summary; the others carry on.
pub async fn run_batches(processor: Arc<BatchProcessor>, files: Vec<PathBuf>, workers: usize) -> RunSummary {
    let mut summary = RunSummary {
        started_at: chrono::Utc::now().to_rfc3339(),
        ..RunSummary::default()
    };
    let workers = workers.max(1);
    let mut queue = files.into_iter();
    let mut tasks = JoinSet::new();

    loop {
        while tasks.len() < workers {
            let Some(path) = queue.next() else { break };
            let processor = Arc::clone(&processor);
            tasks.spawn_blocking(move || {
                let result = process_one(&processor, &path);
                (path, result)
            });
        }

        let Some(joined) = tasks.join_next().await else { break };
        match joined {
            Ok((_, Ok(done))) => {
                summary.processed += 1;
                summary.events += done.n_events;
                summary.selected += done.n_selected;
                let sample = summary.yields.entry(done.sample).or_default();
                for (variation, y) in done.yields {
                    *sample.entry(variation).or_insert(0.0) += y;
                }
            }
            Ok((path, Err(e))) => {
                tracing::error!(path = %path.display(), error = %e, "Batch failed");
                summary.failed.push(FailedBatch {
                    path,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Batch worker aborted");
                summary.failed.push(FailedBatch {
                    path: PathBuf::new(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary.finished_at = chrono::Utc::now().to_rfc3339();
    summary
}

/// Clear the buffer, process every batch, then merge the buffer into `output`.
pub async fn run(
    config: AnalysisConfig,
    files: Vec<PathBuf>,
    workers: usize,
    output: &Path,
) -> anyhow::Result<(RunSummary, MergeReport)> {
    let buffer = buffer_dir(output);
    clear_buffer(&buffer)?;

    let processor = BatchProcessor::with_default_registry(config).with_writer(JsonRecordWriter, &buffer);
    let summary = run_batches(Arc::new(processor), files, workers).await;

    let report = merge_buffer(&buffer, output)?;
    std::fs::write(
        output.join(SUMMARY_FILE),
        serde_json::to_string_pretty(&summary)?,
    )?;
    tracing::info!(
        processed = summary.processed,
        failed = summary.failed.len(),
        events = summary.events,
        selected = summary.selected,
        "Run finished"
    );
    Ok((summary, report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use hzupsilon_columnar::{Batch, Collection, Column};
    use hzupsilon_engine::{Cutflow, RecordFile, MERGED_CUTFLOW};
    use hzupsilon_types::{BatchMetadata, Year};

    /// Two events: an Upsilon + photon candidate, then an empty event.
    fn signal_batch() -> Batch {
        let muons = Collection::from_counts("Muon", &[2, 0])
            .with_field("pt", Column::Float(vec![12.0, 9.0]))
            .unwrap()
            .with_field("eta", Column::Float(vec![0.0, 0.0]))
            .unwrap()
            .with_field("phi", Column::Float(vec![0.1, 1.0]))
            .unwrap()
            .with_field("mass", Column::Float(vec![0.105_658; 2]))
            .unwrap()
            .with_field("charge", Column::Int(vec![1, -1]))
            .unwrap()
            .with_field("mediumPromptId", Column::Bool(vec![true; 2]))
            .unwrap()
            .with_field("pfRelIso03_all", Column::Float(vec![0.02; 2]))
            .unwrap();
        let photons = Collection::from_counts("Photon", &[1, 0])
            .with_field("pt", Column::Float(vec![80.0]))
            .unwrap()
            .with_field("eta", Column::Float(vec![0.0]))
            .unwrap()
            .with_field("phi", Column::Float(vec![3.3]))
            .unwrap()
            .with_field("mass", Column::Float(vec![0.0]))
            .unwrap()
            .with_field("isScEtaEB", Column::Bool(vec![true]))
            .unwrap()
            .with_field("isScEtaEE", Column::Bool(vec![false]))
            .unwrap()
            .with_field("electronVeto", Column::Bool(vec![true]))
            .unwrap()
            .with_field("mvaID_WP80", Column::Bool(vec![true]))
            .unwrap();
        Batch::new(2)
            .with_collection("Muon", muons)
            .unwrap()
            .with_collection("Photon", photons)
            .unwrap()
            .with_column("HLT_Mu17_Photon30_IsoCaloId", Column::Bool(vec![true, true]))
            .unwrap()
    }

    fn write_batch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        BatchFile {
            metadata: BatchMetadata::new("DoubleMuon", Year::Y2018),
            lumi_mask: None,
            batch: signal_batch(),
        }
        .save(&path)
        .unwrap();
        path
    }

    #[tokio::test]
    async fn run_processes_and_merges_all_batches() {
        let inputs = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = vec![
            write_batch(inputs.path(), "a.json"),
            write_batch(inputs.path(), "b.json"),
            write_batch(inputs.path(), "c.json"),
        ];

        let (summary, report) = run(AnalysisConfig::default(), files, 2, output.path())
            .await
            .unwrap();
        assert!(!summary.has_failures());
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.events, 6);
        assert_eq!(summary.selected, 3);
        assert_eq!(summary.yields["DoubleMuon_2018"]["nominal"], 3.0);
        assert_eq!(report.cutflows_merged, 3);

        let cutflow = Cutflow::load(&output.path().join(MERGED_CUTFLOW)).unwrap();
        assert_eq!(cutflow.total(), 6.0);
        let events = RecordFile::load(&output.path().join("events_DoubleMuon_2018.json")).unwrap();
        assert_eq!(events.table.n_rows(), 3);
        assert!(output.path().join(SUMMARY_FILE).is_file());
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_others() {
        let inputs = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = vec![
            write_batch(inputs.path(), "good.json"),
            inputs.path().join("missing.json"),
        ];

        let (summary, report) = run(AnalysisConfig::default(), files, 1, output.path())
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].path.ends_with("missing.json"));
        assert_eq!(report.cutflows_merged, 1);
        assert_eq!(report.cutflow.unwrap().total(), 2.0);
    }

    #[tokio::test]
    async fn failed_batch_publishes_nothing() {
        let inputs = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        // Parses as a batch file but holds none of the inputs the selection reads.
        let broken = inputs.path().join("broken.json");
        BatchFile {
            metadata: BatchMetadata::new("DoubleMuon", Year::Y2018),
            lumi_mask: None,
            batch: Batch::new(1),
        }
        .save(&broken)
        .unwrap();
        let files = vec![write_batch(inputs.path(), "good.json"), broken];

        let (summary, report) = run(AnalysisConfig::default(), files, 2, output.path())
            .await
            .unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(report.cutflows_merged, 1);
        assert_eq!(report.record_files_merged, 2);
        assert_eq!(report.cutflow.unwrap().total(), 2.0);
    }

    #[tokio::test]
    async fn trigger_study_records_are_merged_when_enabled() {
        let inputs = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = inputs.path().join("a.json");
        // No trigger object fires: every probe is unmatched.
        let trig = Collection::from_counts("TrigObj", &[0, 0])
            .with_field("eta", Column::Float(vec![]))
            .unwrap()
            .with_field("phi", Column::Float(vec![]))
            .unwrap()
            .with_field("id", Column::Int(vec![]))
            .unwrap()
            .with_field("filterBits", Column::Int(vec![]))
            .unwrap();
        BatchFile {
            metadata: BatchMetadata::new("DoubleMuon", Year::Y2018),
            lumi_mask: None,
            batch: signal_batch().with_collection("TrigObj", trig).unwrap(),
        }
        .save(&path)
        .unwrap();
        let config = AnalysisConfig {
            trigger_study: true,
            ..AnalysisConfig::default()
        };

        let (summary, report) = run(config, vec![path], 1, output.path()).await.unwrap();
        assert!(!summary.has_failures());
        assert_eq!(report.groups["trigger_study_DoubleMuon_2018"], 1);
        assert!(output.path().join("trigger_study_DoubleMuon_2018.json").is_file());
    }

    #[tokio::test]
    async fn run_starts_from_an_empty_buffer() {
        let inputs = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let file = write_batch(inputs.path(), "a.json");

        run(AnalysisConfig::default(), vec![file.clone()], 4, output.path())
            .await
            .unwrap();
        let (_, report) = run(AnalysisConfig::default(), vec![file], 4, output.path())
            .await
            .unwrap();
        assert_eq!(report.cutflows_merged, 1);
        assert_eq!(report.groups["events_DoubleMuon_2018"], 1);
    }
}
