//! Batch processor: the end-to-end lifecycle of one batch.
//!
//! Wrap the batch, record every cut, build the weights, fill the cutflow,
//! compute the yields, then emit the record tables. Any error aborts the
//! current batch only; no state survives from one batch to the next, and a
//! batch that fails leaves nothing in the buffer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hzupsilon_columnar::{Batch, BatchFile, Collection, Jagged};
use hzupsilon_types::{BatchMetadata, Result};

use crate::builders::muons::at_least;
use crate::builders::{default_registry, MuonMasks, PhotonMasks};
use crate::config::AnalysisConfig;
use crate::cutflow::Cutflow;
use crate::events::Events;
use crate::filters::Filters;
use crate::merge::{save_partial_cutflow, BatchStage};
use crate::records::{
    self, RecordFile, RecordTable, RecordWriter, DIMUON_MASS_PREFIX, EVENTS_PREFIX,
    TRIGGER_STUDY_PREFIX,
};
use crate::registry::BuilderRegistry;
use crate::value::Value;
use crate::weights::Weights;

/// Yield key of the all-nominal weight.
pub const NOMINAL: &str = "nominal";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Owns the builder registry and configuration shared by every batch.
pub struct BatchProcessor {
    registry: BuilderRegistry,
    config: AnalysisConfig,
    publisher: Option<Publisher>,
}

/// Where and how finished batches are published.
struct Publisher {
    writer: Box<dyn RecordWriter>,
    buffer: PathBuf,
}

/// Everything one batch contributes to the final merge.
#[derive(Debug)]
pub struct BatchOutput {
    pub metadata: BatchMetadata,
    pub n_events: usize,
    /// Events passing every selection filter.
    pub n_selected: usize,
    pub cutflow: Cutflow,
    /// Selected weighted yield per weight variation, plus [`NOMINAL`].
    pub yields: BTreeMap<String, f64>,
    pub records: RecordTable,
    pub dimuon_masses: RecordTable,
    /// Probe-muon table, when the trigger study is enabled.
    pub trigger_study: Option<RecordTable>,
    /// Files published to the buffer, if a writer is attached.
    pub written: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Summed weight of the events passing `filter_names`, with `variation`
/// substituted in the components listed in `include`.
pub fn weighted_yield<S: AsRef<str>, T: AsRef<str>>(
    weights: &Weights,
    filters: &Filters,
    variation: &str,
    include: &[S],
    filter_names: &[T],
) -> Result<f64> {
    let weight = weights.partial_weight_with_variation(variation, include)?;
    let mask = filters.all(filter_names)?;
    Ok(weight
        .iter()
        .zip(&mask)
        .filter(|(_, pass)| **pass)
        .map(|(w, _)| w)
        .sum())
}

/// Events holding at least `min_count` objects passing `keep` on its own.
fn count_passing(objects: &Collection, keep: &[bool], min_count: usize) -> Result<Vec<bool>> {
    Ok(at_least(&objects.count_where(keep)?, min_count))
}

/// Event-level flag column; numeric flags count as set when non-zero.
fn event_flags(events: &mut Events<'_>, name: &str) -> Result<Vec<bool>> {
    match events.get(name)? {
        Value::Numbers(n) => Ok(n.iter().map(|v| *v != 0.0).collect()),
        _ => Ok(events.flags(name)?.to_vec()),
    }
}

impl Publisher {
    /// Stage the batch's record files and partial cutflow, then publish them
    /// together. On error the stage is discarded.
    fn publish(
        &self,
        metadata: &BatchMetadata,
        cutflow: &Cutflow,
        tables: &[(&str, &RecordTable)],
    ) -> Result<Vec<PathBuf>> {
        let stage = BatchStage::begin(&self.buffer)?;
        for (prefix, table) in tables {
            let file = RecordFile::new(*prefix, metadata, (*table).clone());
            self.writer.write(stage.path(), &file)?;
        }
        save_partial_cutflow(stage.path(), cutflow)?;
        stage.commit()
    }
}

// ---------------------------------------------------------------------------
// BatchProcessor
// ---------------------------------------------------------------------------

impl BatchProcessor {
    pub fn new(registry: BuilderRegistry, config: AnalysisConfig) -> Self {
        Self {
            registry,
            config,
            publisher: None,
        }
    }

    /// Processor pre-loaded with the built-in builders.
    pub fn with_default_registry(config: AnalysisConfig) -> Self {
        Self::new(default_registry(), config)
    }

    /// Publish every processed batch into `buffer`: its record tables
    /// through `writer`, plus its partial cutflow.
    pub fn with_writer(mut self, writer: impl RecordWriter + 'static, buffer: &Path) -> Self {
        self.publisher = Some(Publisher {
            writer: Box::new(writer),
            buffer: buffer.to_path_buf(),
        });
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Apply the file's luminosity mask, then process the surviving events.
    pub fn process_file(&self, file: BatchFile) -> Result<BatchOutput> {
        let (metadata, batch) = file.into_masked()?;
        self.process(metadata, batch)
    }

    pub fn process(&self, metadata: BatchMetadata, batch: Batch) -> Result<BatchOutput> {
        let _span = tracing::info_span!(
            "batch",
            dataset = %metadata.dataset,
            year = %metadata.year
        )
        .entered();
        let n_events = batch.n_events();
        let mut events = Events::new(batch, metadata.clone(), &self.registry, &self.config)?;

        let filters = self.record_filters(&mut events)?;
        let weights = self.build_weights(&mut events)?;

        let mut cutflow = Cutflow::new(self.config.cutflow_filters.clone());
        cutflow.fill(&metadata, &filters, &weights.weight())?;

        let include = weights.names();
        let mut yields = BTreeMap::new();
        yields.insert(
            NOMINAL.to_string(),
            weighted_yield(&weights, &filters, NOMINAL, &include, &self.config.selection_filters)?,
        );
        for variation in weights.variation_names() {
            let y = weighted_yield(&weights, &filters, variation, &include, &self.config.selection_filters)?;
            yields.insert(variation.to_string(), y);
        }

        let selection = filters.all(&self.config.selection_filters)?;
        let n_selected = selection.iter().filter(|s| **s).count();
        let records = records::event_records(&mut events, &weights, &selection)?;
        let dimuon_selection = filters.all(&self.config.dimuon_mass_filters)?;
        let dimuon_masses = records::dimuon_masses(&mut events, &dimuon_selection)?;

        let trigger_study = if self.config.trigger_study {
            let probe_selection = filters.all(&self.config.trigger_study_filters)?;
            Some(records::trigger_study_records(&mut events, &weights, &probe_selection)?)
        } else {
            None
        };

        let written = match &self.publisher {
            Some(publisher) => {
                let mut tables = vec![(EVENTS_PREFIX, &records), (DIMUON_MASS_PREFIX, &dimuon_masses)];
                if let Some(table) = &trigger_study {
                    tables.push((TRIGGER_STUDY_PREFIX, table));
                }
                publisher.publish(&metadata, &cutflow, &tables)?
            }
            None => Vec::new(),
        };

        tracing::info!(
            events = n_events,
            selected = n_selected,
            dimuons = dimuon_masses.n_rows(),
            resolved = events.resolved_names().len(),
            "Batch processed"
        );

        Ok(BatchOutput {
            metadata,
            n_events,
            n_selected,
            cutflow,
            yields,
            records,
            dimuon_masses,
            trigger_study,
            written,
        })
    }

    /// Record the marginal outcome of every cut of the selection.
    pub fn record_filters(&self, events: &mut Events<'_>) -> Result<Filters> {
        let thresholds = events.thresholds()?;
        let mut filters = Filters::new(events.n_events());

        filters.record("mc_sample", events.flags("mc_sample")?.to_vec())?;
        filters.record("trigger", event_flags(events, &thresholds.hlt_trigger)?)?;

        let muon_cuts = &thresholds.good_muon;
        let muons = events.objects("Muon")?;
        let masks = MuonMasks::compute(&muons, muon_cuts)?;
        let n = muon_cuts.min_count;
        filters.record("nmuons", at_least(&muons.counts(), n))?;
        filters.record("muon_pt", count_passing(&muons, &masks.kinematic, n)?)?;
        filters.record("mediumPrompt_muon", count_passing(&muons, &masks.id, n)?)?;
        filters.record("iso_muon", count_passing(&muons, &masks.iso, n)?)?;

        let photon_cuts = &thresholds.good_photon;
        let photons = events.objects("Photon")?;
        let masks = PhotonMasks::compute(&photons, photon_cuts)?;
        let n = photon_cuts.min_count;
        filters.record("nphotons", at_least(&photons.counts(), n))?;
        filters.record("photon_pt", count_passing(&photons, &masks.kinematic, n)?)?;
        filters.record("photon_sc_eta", count_passing(&photons, &masks.sc_eta, n)?)?;
        filters.record("photon_electron_veto", count_passing(&photons, &masks.electron_veto, n)?)?;
        filters.record("photon_tight_id", count_passing(&photons, &masks.tight_id, n)?)?;

        let boson = events.objects("boson")?;
        filters.record("signal_selection", at_least(&boson.counts(), 1))?;

        // boson and upsilon share one row layout: at most one candidate per event.
        let upsilon = events.objects("upsilon")?;
        let (boson_mass, upsilon_mass) = (boson.float_field("mass")?, upsilon.float_field("mass")?);
        let mass_selection: Vec<bool> = (0..boson.n_events())
            .map(|event| {
                boson.event_range(event).next().is_some_and(|row| {
                    thresholds.boson_mass.contains(boson_mass[row])
                        && thresholds.upsilon_mass.contains(upsilon_mass[row])
                })
            })
            .collect();
        filters.record("mass_selection", mass_selection)?;
        Ok(filters)
    }

    /// Weight components of the batch: none for collision data; generator,
    /// cross-section and (if present) pileup for simulation.
    pub fn build_weights(&self, events: &mut Events<'_>) -> Result<Weights> {
        let n_events = events.n_events();
        let mut weights = Weights::new(n_events);
        if !events.has_raw("genWeight") {
            return Ok(weights);
        }

        weights.add("generator", events.numbers("genWeight")?.to_vec())?;
        let xsec = self.config.cross_section(events.dataset()).unwrap_or_else(|| {
            tracing::warn!(dataset = %events.dataset(), "No cross-section configured, using 1.0");
            1.0
        });
        weights.add("xsec", vec![xsec; n_events])?;

        if events.has_raw("puWeight") {
            let nominal = events.numbers("puWeight")?.to_vec();
            let mut variations = BTreeMap::new();
            for (variation, column) in [("up", "puWeightUp"), ("down", "puWeightDown")] {
                if events.has_raw(column) {
                    variations.insert(variation.to_string(), events.numbers(column)?.to_vec());
                }
            }
            weights.add_component("pileup", nominal, variations)?;
        }
        Ok(weights)
    }
}
