use hzupsilon_columnar::{Column, Jagged, LorentzVector};
use hzupsilon_types::Result;

use crate::events::Events;
use crate::value::Value;

/// `probe_muon` with its trigger match attached.
///
/// Each probe is compared with the nearest `trig_objs` entry of its event in
/// ΔR. `trig_obj_delta_r` holds that distance (infinite when the event has no
/// trigger object) and `good_probe_muon` is set when the nearest object lies
/// within `max_delta_r`, carries the configured id and has the filter bit set.
pub fn build_matched_probe_muon(events: &mut Events<'_>) -> Result<Value> {
    let rules = &events.config().trigger_match;
    let probes = events.objects("probe_muon")?;
    let trig = events.objects("trig_objs")?;

    let probe_p4 = probes.four_vectors()?;
    let (eta, phi) = (trig.float_field("eta")?, trig.float_field("phi")?);
    let trig_p4: Vec<LorentzVector> = eta
        .iter()
        .zip(phi.iter())
        .map(|(eta, phi)| LorentzVector::from_pt_eta_phi_m(1.0, *eta, *phi, 0.0))
        .collect();
    let id = trig.float_field("id")?;
    let filter_bits = trig.float_field("filterBits")?;

    let mut delta_r = Vec::with_capacity(probes.len());
    let mut good = Vec::with_capacity(probes.len());
    for event in 0..probes.n_events() {
        for row in probes.event_range(event) {
            let nearest = trig
                .event_range(event)
                .map(|t| (t, probe_p4[row].delta_r(&trig_p4[t])))
                .filter(|(_, dr)| dr.is_finite())
                .min_by(|a, b| a.1.total_cmp(&b.1));
            match nearest {
                Some((t, dr)) => {
                    delta_r.push(dr);
                    good.push(
                        dr < rules.max_delta_r
                            && id[t] as i64 == rules.id
                            && (filter_bits[t] as i64) & rules.filter_bit != 0,
                    );
                }
                None => {
                    delta_r.push(f64::INFINITY);
                    good.push(false);
                }
            }
        }
    }

    let mut matched = (*probes).clone();
    matched.set_label("matched_probe_muon");
    matched.insert_field("trig_obj_delta_r", Column::Float(delta_r))?;
    matched.insert_field("good_probe_muon", Column::Bool(good))?;
    Ok(Value::objects(matched))
}
