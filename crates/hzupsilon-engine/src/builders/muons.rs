use hzupsilon_columnar::{Collection, Jagged};
use hzupsilon_types::Result;

use crate::config::MuonCuts;
use crate::events::Events;
use crate::value::Value;

/// Object-level muon cut outcomes, one flag per muon.
#[derive(Debug, Clone, PartialEq)]
pub struct MuonMasks {
    /// `pt > min_pt` and `|eta| < max_abs_eta`.
    pub kinematic: Vec<bool>,
    pub id: Vec<bool>,
    pub iso: Vec<bool>,
}

impl MuonMasks {
    pub fn compute(muons: &Collection, cuts: &MuonCuts) -> Result<Self> {
        let pt = muons.float_field("pt")?;
        let eta = muons.float_field("eta")?;
        let kinematic = pt
            .iter()
            .zip(eta.iter())
            .map(|(pt, eta)| *pt > cuts.min_pt && eta.abs() < cuts.max_abs_eta)
            .collect();

        let id = if cuts.require_medium_prompt_id {
            muons.flag_field("mediumPromptId")?.into_owned()
        } else {
            vec![true; muons.len()]
        };

        let iso = muons
            .float_field("pfRelIso03_all")?
            .iter()
            .map(|iso| *iso < cuts.max_rel_iso)
            .collect();

        Ok(Self { kinematic, id, iso })
    }

    pub fn combined(&self) -> Vec<bool> {
        self.kinematic
            .iter()
            .zip(&self.id)
            .zip(&self.iso)
            .map(|((k, id), iso)| *k && *id && *iso)
            .collect()
    }
}

/// Events holding at least `min_count` objects.
pub(crate) fn at_least(counts: &[usize], min_count: usize) -> Vec<bool> {
    counts.iter().map(|n| *n >= min_count).collect()
}

/// Apply `cuts` to every muon of the events passing `gate`.
fn select(muons: &Collection, cuts: &MuonCuts, gate: &[bool], label: &str) -> Result<Collection> {
    let in_gate = muons.broadcast(gate)?;
    let keep: Vec<bool> = MuonMasks::compute(muons, cuts)?
        .combined()
        .into_iter()
        .zip(in_gate)
        .map(|(pass, gated)| pass && gated)
        .collect();
    let mut selected = muons.mask(&keep)?;
    selected.set_label(label);
    Ok(selected)
}

pub fn build_good_muons(events: &mut Events<'_>) -> Result<Value> {
    let cuts = &events.thresholds()?.good_muon;
    let muons = events.objects("Muon")?;
    let gate = at_least(&muons.counts(), cuts.min_count);
    Ok(Value::objects(select(&muons, cuts, &gate, "good_muons")?))
}

/// Trigger-study probe: like `good_muons` with the year's trigger-leg pt.
pub fn build_probe_muon(events: &mut Events<'_>) -> Result<Value> {
    let cuts = &events.thresholds()?.probe_muon;
    let muons = events.objects("Muon")?;
    let gate = at_least(&muons.counts(), cuts.min_count);
    Ok(Value::objects(select(&muons, cuts, &gate, "probe_muon")?))
}

/// Trigger-study tag: soft muons of events that already hold enough probes.
pub fn build_tag_muon(events: &mut Events<'_>) -> Result<Value> {
    let cuts = &events.thresholds()?.tag_muon;
    let probes = events.objects("probe_muon")?;
    let gate = at_least(&probes.counts(), cuts.min_count);
    let muons = events.objects("Muon")?;
    Ok(Value::objects(select(&muons, cuts, &gate, "tag_muon")?))
}
