use hzupsilon_columnar::Jagged;
use hzupsilon_types::Result;

use crate::events::Events;
use crate::value::Value;

const HIGGS: f64 = 25.0;
const MUON: f64 = 13.0;
const ANTI_MUON: f64 = -13.0;
/// `GenPart.statusFlags` bit marking prompt particles.
const IS_PROMPT: i64 = 1;

/// Generator-level sample filter.
///
/// For a dataset with a configured [`GeneratorMllCut`](crate::config::GeneratorMllCut),
/// an event passes when its first prompt mu+ and mu- coming from a Higgs
/// boson have an invariant mass below the cut. Events without such a pair
/// fail. Every other dataset passes all events without reading `GenPart`.
pub fn build_mc_sample(events: &mut Events<'_>) -> Result<Value> {
    let Some(cut) = events.config().generator_mll_cut(events.dataset()) else {
        return Ok(Value::Flags(vec![true; events.n_events()].into()));
    };
    let max_mass = cut.max_mass;

    let gen = events.objects("GenPart")?;
    let pdg_id = gen.float_field("pdgId")?;
    let mother = gen.float_field("genPartIdxMother")?;
    let status = gen.float_field("statusFlags")?;
    let p4 = gen.four_vectors()?;

    let pass = (0..gen.n_events())
        .map(|event| {
            let range = gen.event_range(event);
            // genPartIdxMother counts from the first particle of the event; -1 is none.
            let from_higgs = |row: usize| {
                mother[row] >= 0.0
                    && range
                        .clone()
                        .nth(mother[row] as usize)
                        .is_some_and(|m| pdg_id[m] == HIGGS)
            };
            let prompt = |row: usize| (status[row] as i64) & IS_PROMPT != 0;
            let find = |id: f64| {
                range
                    .clone()
                    .find(|&row| pdg_id[row] == id && prompt(row) && from_higgs(row))
            };
            match (find(ANTI_MUON), find(MUON)) {
                (Some(plus), Some(minus)) => (p4[plus] + p4[minus]).mass() < max_mass,
                _ => false,
            }
        })
        .collect::<Vec<bool>>();
    Ok(Value::Flags(pass.into()))
}
