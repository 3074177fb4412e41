//! Built-in attribute builders for the Upsilon + photon selection.
//!
//! Each builder is a pure function of the resolved state. Thresholds come from
//! the year's [`YearThresholds`](crate::config::YearThresholds); events with no
//! surviving candidates yield empty per-event collections, never errors.

pub mod candidates;
pub mod generator;
pub mod muons;
pub mod photons;
pub mod trigger;

use hzupsilon_types::Result;

use crate::registry::BuilderRegistry;

pub use muons::MuonMasks;
pub use photons::PhotonMasks;

/// Register every built-in builder into `registry`.
pub fn register_builders(registry: &mut BuilderRegistry) -> Result<()> {
    registry.register("good_muons", muons::build_good_muons)?;
    registry.register("probe_muon", muons::build_probe_muon)?;
    registry.register("tag_muon", muons::build_tag_muon)?;
    registry.register("good_photons", photons::build_good_photons)?;
    registry.register("probe_photon", photons::build_probe_photon)?;
    registry.register("trig_objs", candidates::build_trig_objs)?;
    registry.register("matched_probe_muon", trigger::build_matched_probe_muon)?;
    registry.register("mc_sample", generator::build_mc_sample)?;
    registry.register("dimuons", candidates::build_dimuons)?;
    registry.register("bosons_combination", candidates::build_bosons_combination)?;
    registry.register("mu_1", candidates::build_mu_1)?;
    registry.register("mu_2", candidates::build_mu_2)?;
    registry.register("photon", candidates::build_photon)?;
    registry.register("upsilon", candidates::build_upsilon)?;
    registry.register("boson", candidates::build_boson)?;
    Ok(())
}

/// A registry pre-loaded with the built-in builders.
pub fn default_registry() -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();
    // Names above are distinct, so registration into an empty registry cannot fail.
    if let Err(err) = register_builders(&mut registry) {
        unreachable!("built-in builder names collide: {err}");
    }
    registry
}
