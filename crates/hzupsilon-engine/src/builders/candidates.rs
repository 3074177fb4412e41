use hzupsilon_columnar::{cartesian, combinations2, Collection, Jagged, LorentzVector, Pairs};
use hzupsilon_types::Result;

use crate::events::Events;
use crate::value::Value;

/// Trigger objects, forwarded unchanged.
pub fn build_trig_objs(events: &mut Events<'_>) -> Result<Value> {
    Ok(Value::Objects(events.objects("TrigObj")?))
}

/// Opposite-charge pairs of `good_muons`, indices into `good_muons` rows.
pub fn build_dimuons(events: &mut Events<'_>) -> Result<Value> {
    let muons = events.objects("good_muons")?;
    let charge = muons.float_field("charge")?;
    let pairs = combinations2(&*muons);
    let opposite: Vec<bool> = pairs
        .first()
        .iter()
        .zip(pairs.second())
        .map(|(&a, &b)| charge[a] + charge[b] == 0.0)
        .collect();
    Ok(Value::pairs(pairs.filter(&opposite)?))
}

/// Per event, the (dimuon, photon) combination with the largest total pt.
///
/// `first` indexes `dimuons`, `second` indexes `good_photons`. Events
/// without any combination keep zero entries. Exact ties go to the
/// combination generated first. Combinations whose pt is not finite are
/// never chosen.
pub fn build_bosons_combination(events: &mut Events<'_>) -> Result<Value> {
    let dimuons = events.pairs("dimuons")?;
    let muons = events.objects("good_muons")?;
    let photons = events.objects("good_photons")?;

    let combos = cartesian(&*dimuons, &*photons)?;
    let muon_p4 = muons.four_vectors()?;
    let photon_p4 = photons.four_vectors()?;
    let pt: Vec<f64> = combos
        .first()
        .iter()
        .zip(combos.second())
        .map(|(&d, &g)| {
            (muon_p4[dimuons.first()[d]] + muon_p4[dimuons.second()[d]] + photon_p4[g]).pt()
        })
        .collect();

    let mut keep = vec![false; combos.len()];
    for event in 0..combos.n_events() {
        let mut best: Option<usize> = None;
        for k in combos.event_range(event) {
            if !pt[k].is_finite() {
                continue;
            }
            if best.map_or(true, |b| pt[k] > pt[b]) {
                best = Some(k);
            }
        }
        if let Some(b) = best {
            keep[b] = true;
        }
    }
    Ok(Value::pairs(combos.filter(&keep)?))
}

/// Rows of `good_muons` picked by one leg of the chosen dimuon.
fn chosen_muon(events: &mut Events<'_>, label: &str, leg: fn(&Pairs) -> &[usize]) -> Result<Value> {
    let chosen = events.pairs("bosons_combination")?;
    let dimuons = events.pairs("dimuons")?;
    let muons = events.objects("good_muons")?;
    let picked = leg(&*dimuons);
    let rows: Vec<usize> = chosen.first().iter().map(|&d| picked[d]).collect();
    Ok(Value::objects(muons.gather(label, chosen.offsets().to_vec(), &rows)?))
}

pub fn build_mu_1(events: &mut Events<'_>) -> Result<Value> {
    chosen_muon(events, "mu_1", Pairs::first)
}

pub fn build_mu_2(events: &mut Events<'_>) -> Result<Value> {
    chosen_muon(events, "mu_2", Pairs::second)
}

pub fn build_photon(events: &mut Events<'_>) -> Result<Value> {
    let chosen = events.pairs("bosons_combination")?;
    let photons = events.objects("good_photons")?;
    Ok(Value::objects(photons.gather(
        "photon",
        chosen.offsets().to_vec(),
        chosen.second(),
    )?))
}

/// Four-vector sum of aligned one-per-slot collections.
fn sum_of(label: &str, parts: &[&Collection]) -> Result<Collection> {
    let mut total: Option<Vec<LorentzVector>> = None;
    for part in parts {
        let p4 = part.four_vectors()?;
        total = Some(match total {
            None => p4,
            Some(acc) => acc.into_iter().zip(p4).map(|(a, b)| a + b).collect(),
        });
    }
    let offsets = parts.first().map(|p| p.offsets().to_vec()).unwrap_or_else(|| vec![0]);
    Collection::from_four_vectors(label, offsets, &total.unwrap_or_default())
}

pub fn build_upsilon(events: &mut Events<'_>) -> Result<Value> {
    let mu_1 = events.objects("mu_1")?;
    let mu_2 = events.objects("mu_2")?;
    Ok(Value::objects(sum_of("upsilon", &[&*mu_1, &*mu_2])?))
}

pub fn build_boson(events: &mut Events<'_>) -> Result<Value> {
    let upsilon = events.objects("upsilon")?;
    let photon = events.objects("photon")?;
    Ok(Value::objects(sum_of("boson", &[&*upsilon, &*photon])?))
}
