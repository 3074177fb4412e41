//! Selection configuration: per-year thresholds and output settings.
//!
//! Every builder looks its numbers up through [`AnalysisConfig::thresholds`],
//! which is the single place an unconfigured year is rejected.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use hzupsilon_types::{AnalysisError, Result, Year};

/// Object-level muon requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuonCuts {
    /// Minimum number of muons an event must hold.
    pub min_count: usize,
    pub min_pt: f64,
    pub max_abs_eta: f64,
    pub require_medium_prompt_id: bool,
    /// Upper bound on `pfRelIso03_all`.
    pub max_rel_iso: f64,
}

/// Object-level photon requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonCuts {
    pub min_count: usize,
    pub min_pt: f64,
    pub max_abs_eta: f64,
    /// Supercluster in barrel or endcap (no crack photons).
    pub require_barrel_or_endcap: bool,
    pub require_electron_veto: bool,
    /// MVA identification at the 80% working point.
    pub require_mva_wp80: bool,
}

/// Open interval `(min, max)` in GeV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassWindow {
    pub min: f64,
    pub max: f64,
}

impl MassWindow {
    pub fn contains(&self, mass: f64) -> bool {
        mass > self.min && mass < self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearThresholds {
    /// Name of the event-level HLT flag column.
    pub hlt_trigger: String,
    pub good_muon: MuonCuts,
    pub probe_muon: MuonCuts,
    pub tag_muon: MuonCuts,
    pub good_photon: PhotonCuts,
    pub probe_photon: PhotonCuts,
    pub upsilon_mass: MassWindow,
    pub boson_mass: MassWindow,
}

/// Generator-level cut on the prompt H -> mu+ mu- pair of one simulated sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorMllCut {
    pub dataset_prefix: String,
    /// Upper bound on the generated dimuon mass, in GeV.
    pub max_mass: f64,
}

/// When a probe muon counts as matched to the trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMatch {
    /// The nearest trigger object must lie within this ΔR.
    pub max_delta_r: f64,
    /// Required `TrigObj.id` (13 for muons).
    pub id: i64,
    /// Bit mask that must be set in `TrigObj.filterBits`.
    pub filter_bit: i64,
}

impl Default for TriggerMatch {
    fn default() -> Self {
        Self {
            max_delta_r: 0.1,
            id: 13,
            filter_bit: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub years: BTreeMap<Year, YearThresholds>,
    /// Dataset-name prefix -> cross-section in pb.
    #[serde(default)]
    pub cross_sections: BTreeMap<String, f64>,
    /// Generator-level dimuon mass cuts behind the `mc_sample` filter.
    #[serde(default = "default_generator_mll_cuts")]
    pub generator_mll_cuts: Vec<GeneratorMllCut>,
    /// Cut axes of the cutflow, in emission order.
    pub cutflow_filters: Vec<String>,
    /// Cuts an event must pass to be written to the event records.
    pub selection_filters: Vec<String>,
    /// Cuts an event must pass for its dimuon masses to be written.
    pub dimuon_mass_filters: Vec<String>,
    /// Also write the probe-muon trigger-study records.
    #[serde(default)]
    pub trigger_study: bool,
    /// Cuts an event must pass for its probe muons to be written.
    #[serde(default = "default_trigger_study_filters")]
    pub trigger_study_filters: Vec<String>,
    #[serde(default)]
    pub trigger_match: TriggerMatch,
}

/// Cut names recorded by the batch processor, in cutflow order.
pub const CUT_NAMES: [&str; 13] = [
    "mc_sample",
    "trigger",
    "nmuons",
    "muon_pt",
    "mediumPrompt_muon",
    "iso_muon",
    "nphotons",
    "photon_pt",
    "photon_sc_eta",
    "photon_electron_veto",
    "photon_tight_id",
    "signal_selection",
    "mass_selection",
];

impl AnalysisConfig {
    pub fn thresholds(&self, year: Year) -> Result<&YearThresholds> {
        self.years.get(&year).ok_or_else(|| AnalysisError::UnsupportedYear {
            year: year.to_string(),
        })
    }

    /// Cross-section of the first configured prefix matching `dataset`.
    pub fn cross_section(&self, dataset: &str) -> Option<f64> {
        self.cross_sections
            .iter()
            .find(|(prefix, _)| dataset.starts_with(prefix.as_str()))
            .map(|(_, xsec)| *xsec)
    }

    /// The generator-level cut configured for `dataset`, if any.
    pub fn generator_mll_cut(&self, dataset: &str) -> Option<&GeneratorMllCut> {
        self.generator_mll_cuts
            .iter()
            .find(|cut| dataset.starts_with(cut.dataset_prefix.as_str()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn default_generator_mll_cuts() -> Vec<GeneratorMllCut> {
    vec![GeneratorMllCut {
        dataset_prefix: "GluGluHToMuMuG_M125_MLL-0To60_Dalitz_012j_13TeV_amcatnloFXFX_pythia8".into(),
        max_mass: 30.0,
    }]
}

fn default_trigger_study_filters() -> Vec<String> {
    ["trigger", "nmuons", "nphotons", "signal_selection", "mass_selection"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_thresholds(probe_muon_pt: f64) -> YearThresholds {
    let good_muon = MuonCuts {
        min_count: 2,
        min_pt: 5.0,
        max_abs_eta: 2.4,
        require_medium_prompt_id: true,
        max_rel_iso: 0.15,
    };
    let good_photon = PhotonCuts {
        min_count: 1,
        min_pt: 32.0,
        max_abs_eta: 2.5,
        require_barrel_or_endcap: true,
        require_electron_veto: true,
        require_mva_wp80: true,
    };
    YearThresholds {
        hlt_trigger: "HLT_Mu17_Photon30_IsoCaloId".into(),
        probe_muon: MuonCuts {
            min_pt: probe_muon_pt,
            ..good_muon.clone()
        },
        tag_muon: MuonCuts {
            min_pt: 3.5,
            ..good_muon.clone()
        },
        probe_photon: PhotonCuts {
            min_pt: 33.0,
            ..good_photon.clone()
        },
        good_muon,
        good_photon,
        upsilon_mass: MassWindow { min: 8.0, max: 12.0 },
        boson_mass: MassWindow {
            min: 70.0,
            max: 150.0,
        },
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let years = BTreeMap::from([
            (Year::Y2016Apv, default_thresholds(29.0)),
            (Year::Y2016, default_thresholds(29.0)),
            (Year::Y2017, default_thresholds(26.0)),
            (Year::Y2018, default_thresholds(24.0)),
        ]);
        let cross_sections = [
            "ggH_HToUps1SG_M125_NNPDF31_TuneCP5_13TeV-powheg-pythia8",
            "ggH_HToUps2SG_M125_NNPDF31_TuneCP5_13TeV-powheg-pythia8",
            "ggH_HToUps3SG_M125_NNPDF31_TuneCP5_13TeV-powheg-pythia8",
            "GluGluHToMuMuG_M125_MLL-0To60_Dalitz_012j_13TeV_amcatnloFXFX_pythia8_PSWeight",
            "ZGTo2MuG_MMuMu-2To15_TuneCP5_13TeV-madgraph-pythia8",
            "ZToUpsilon1SGamma_TuneCP5_13TeV-amcatnloFXFX-pythia8",
            "ZToUpsilon2SGamma_TuneCP5_13TeV-amcatnloFXFX-pythia8",
            "ZToUpsilon3SGamma_TuneCP5_13TeV-amcatnloFXFX-pythia8",
        ]
        .into_iter()
        .map(|name| (name.to_string(), 1.0))
        .collect();
        let cuts: Vec<String> = CUT_NAMES.iter().map(|s| s.to_string()).collect();

        Self {
            years,
            cross_sections,
            generator_mll_cuts: default_generator_mll_cuts(),
            selection_filters: cuts.clone(),
            dimuon_mass_filters: cuts[..6].to_vec(),
            cutflow_filters: cuts,
            trigger_study: false,
            trigger_study_filters: default_trigger_study_filters(),
            trigger_match: TriggerMatch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_year_has_default_thresholds() {
        let config = AnalysisConfig::default();
        for year in Year::ALL {
            assert!(config.thresholds(year).is_ok());
        }
        assert_eq!(config.thresholds(Year::Y2017).unwrap().probe_muon.min_pt, 26.0);
    }

    #[test]
    fn missing_year_is_unsupported() {
        let mut config = AnalysisConfig::default();
        config.years.remove(&Year::Y2016Apv);
        let err = config.thresholds(Year::Y2016Apv).unwrap_err();
        match err {
            AnalysisError::UnsupportedYear { year } => assert_eq!(year, "2016APV"),
            other => panic!("Expected UnsupportedYear, got: {other:?}"),
        }
    }

    #[test]
    fn cross_section_matches_prefix() {
        let config = AnalysisConfig::default();
        let dataset = "ZToUpsilon1SGamma_TuneCP5_13TeV-amcatnloFXFX-pythia8_RunIISummer20UL18";
        assert_eq!(config.cross_section(dataset), Some(1.0));
        assert_eq!(config.cross_section("DoubleMuon_Run2018A"), None);
    }

    #[test]
    fn generator_cut_only_for_its_sample() {
        let config = AnalysisConfig::default();
        let dalitz = "GluGluHToMuMuG_M125_MLL-0To60_Dalitz_012j_13TeV_amcatnloFXFX_pythia8_PSWeight";
        assert_eq!(config.generator_mll_cut(dalitz).unwrap().max_mass, 30.0);
        assert!(config.generator_mll_cut("ZToUpsilon1SGamma").is_none());
    }

    #[test]
    fn optional_sections_default_when_absent() {
        let mut value = serde_json::to_value(AnalysisConfig::default()).unwrap();
        let object = value.as_object_mut().unwrap();
        for key in ["generator_mll_cuts", "trigger_study", "trigger_study_filters", "trigger_match"] {
            object.remove(key);
        }
        let config: AnalysisConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn mass_window_is_open() {
        let w = MassWindow { min: 8.0, max: 12.0 };
        assert!(w.contains(9.46));
        assert!(!w.contains(8.0));
        assert!(!w.contains(12.5));
    }

    #[test]
    fn config_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AnalysisConfig::default();
        config.save(&path).unwrap();
        let loaded = AnalysisConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"2016APV\""));
    }
}
