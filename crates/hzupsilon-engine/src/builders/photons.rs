use hzupsilon_columnar::{Collection, Jagged};
use hzupsilon_types::Result;

use crate::builders::muons::at_least;
use crate::config::PhotonCuts;
use crate::events::Events;
use crate::value::Value;

/// Object-level photon cut outcomes, one flag per photon.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotonMasks {
    /// `pt > min_pt` and `|eta| < max_abs_eta`.
    pub kinematic: Vec<bool>,
    /// Supercluster in barrel or endcap.
    pub sc_eta: Vec<bool>,
    pub electron_veto: Vec<bool>,
    pub tight_id: Vec<bool>,
}

impl PhotonMasks {
    pub fn compute(photons: &Collection, cuts: &PhotonCuts) -> Result<Self> {
        let pt = photons.float_field("pt")?;
        let eta = photons.float_field("eta")?;
        let kinematic = pt
            .iter()
            .zip(eta.iter())
            .map(|(pt, eta)| *pt > cuts.min_pt && eta.abs() < cuts.max_abs_eta)
            .collect();

        let sc_eta = if cuts.require_barrel_or_endcap {
            let barrel = photons.flag_field("isScEtaEB")?;
            let endcap = photons.flag_field("isScEtaEE")?;
            barrel.iter().zip(endcap.iter()).map(|(b, e)| *b || *e).collect()
        } else {
            vec![true; photons.len()]
        };
        let electron_veto = required_flag(photons, "electronVeto", cuts.require_electron_veto)?;
        let tight_id = required_flag(photons, "mvaID_WP80", cuts.require_mva_wp80)?;

        Ok(Self {
            kinematic,
            sc_eta,
            electron_veto,
            tight_id,
        })
    }

    pub fn combined(&self) -> Vec<bool> {
        (0..self.kinematic.len())
            .map(|i| self.kinematic[i] && self.sc_eta[i] && self.electron_veto[i] && self.tight_id[i])
            .collect()
    }
}

fn required_flag(photons: &Collection, field: &str, required: bool) -> Result<Vec<bool>> {
    if required {
        Ok(photons.flag_field(field)?.into_owned())
    } else {
        Ok(vec![true; photons.len()])
    }
}

fn select(photons: &Collection, cuts: &PhotonCuts, label: &str) -> Result<Collection> {
    let gate = at_least(&photons.counts(), cuts.min_count);
    let in_gate = photons.broadcast(&gate)?;
    let keep: Vec<bool> = PhotonMasks::compute(photons, cuts)?
        .combined()
        .into_iter()
        .zip(in_gate)
        .map(|(pass, gated)| pass && gated)
        .collect();
    let mut selected = photons.mask(&keep)?;
    selected.set_label(label);
    Ok(selected)
}

pub fn build_good_photons(events: &mut Events<'_>) -> Result<Value> {
    let cuts = &events.thresholds()?.good_photon;
    let photons = events.objects("Photon")?;
    Ok(Value::objects(select(&photons, cuts, "good_photons")?))
}

pub fn build_probe_photon(events: &mut Events<'_>) -> Result<Value> {
    let cuts = &events.thresholds()?.probe_photon;
    let photons = events.objects("Photon")?;
    Ok(Value::objects(select(&photons, cuts, "probe_photon")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{default_registry, fixtures};
    use crate::config::AnalysisConfig;
    use hzupsilon_columnar::{Batch, Column};
    use hzupsilon_types::{BatchMetadata, Year};

    #[test]
    fn crack_photons_and_failed_veto_are_dropped() {
        let photons = fixtures::photons(&[4], &[40.0, 40.0, 40.0, 20.0])
            .with_field("isScEtaEB", Column::Bool(vec![true, false, true, true]))
            .unwrap()
            .with_field("electronVeto", Column::Int(vec![1, 1, 0, 1]))
            .unwrap();
        let cuts = AnalysisConfig::default().years[&Year::Y2018].good_photon.clone();
        let masks = PhotonMasks::compute(&photons, &cuts).unwrap();
        assert_eq!(masks.sc_eta, vec![true, false, true, true]);
        assert_eq!(masks.electron_veto, vec![true, true, false, true]);
        assert_eq!(masks.kinematic, vec![true, true, true, false]);
        assert_eq!(masks.combined(), vec![true, false, false, false]);
    }

    #[test]
    fn good_and_probe_photons_use_their_own_pt_thresholds() {
        // 32.5 GeV passes good_photons (32) but not probe_photon (33).
        let batch = Batch::new(2)
            .with_collection("Photon", fixtures::photons(&[1, 1], &[32.5, 50.0]))
            .unwrap();
        let registry = default_registry();
        let config = AnalysisConfig::default();
        let mut events = Events::new(
            batch,
            BatchMetadata::new("EGamma", Year::Y2017),
            &registry,
            &config,
        )
        .unwrap();
        assert_eq!(events.objects("good_photons").unwrap().counts(), vec![1, 1]);
        assert_eq!(events.objects("probe_photon").unwrap().counts(), vec![0, 1]);
    }
}
