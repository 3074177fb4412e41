//! Minimal Lorentz-vector arithmetic for collider kinematics.

use std::f64::consts::PI;
use std::ops::Add;

/// A four-momentum stored in Cartesian components (GeV).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LorentzVector {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl LorentzVector {
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Build from the (pt, eta, phi, mass) coordinates NanoAOD stores.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        Self {
            px,
            py,
            pz,
            e: (p2 + mass * mass).sqrt(),
        }
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            if self.pz == 0.0 {
                return 0.0;
            }
            return self.pz.signum() * f64::INFINITY;
        }
        (self.pz / pt).asinh()
    }

    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 {
            return 0.0;
        }
        self.py.atan2(self.px)
    }

    pub fn mass2(&self) -> f64 {
        self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz)
    }

    /// Invariant mass, with m² < 0 from limited float precision clamped to 0.
    pub fn mass(&self) -> f64 {
        self.mass2().max(0.0).sqrt()
    }

    /// Azimuthal separation wrapped into [-π, π].
    pub fn delta_phi(&self, other: &LorentzVector) -> f64 {
        let mut dphi = self.phi() - other.phi();
        while dphi > PI {
            dphi -= 2.0 * PI;
        }
        while dphi < -PI {
            dphi += 2.0 * PI;
        }
        dphi
    }

    pub fn delta_r(&self, other: &LorentzVector) -> f64 {
        let deta = self.eta() - other.eta();
        deta.hypot(self.delta_phi(other))
    }
}

impl Add for LorentzVector {
    type Output = LorentzVector;

    fn add(self, rhs: LorentzVector) -> LorentzVector {
        LorentzVector {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn coordinates_round_trip() {
        let v = LorentzVector::from_pt_eta_phi_m(40.0, -1.2, 2.5, 0.105);
        assert!((v.pt() - 40.0).abs() < EPS);
        assert!((v.eta() + 1.2).abs() < EPS);
        assert!((v.phi() - 2.5).abs() < EPS);
        assert!((v.mass() - 0.105).abs() < 1e-6);
    }

    #[test]
    fn back_to_back_pair_mass() {
        let a = LorentzVector::from_pt_eta_phi_m(5.0, 0.0, 0.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(5.0, 0.0, PI, 0.0);
        let sum = a + b;
        assert!(sum.pt() < EPS);
        assert!((sum.mass() - 10.0).abs() < EPS);
    }

    #[test]
    fn negative_mass_squared_is_clamped() {
        let v = LorentzVector::new(3.0, 4.0, 0.0, 4.9999);
        assert!(v.mass2() < 0.0);
        assert_eq!(v.mass(), 0.0);
    }

    #[test]
    fn delta_phi_wraps_around() {
        let a = LorentzVector::from_pt_eta_phi_m(1.0, 0.0, 3.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(1.0, 0.0, -3.0, 0.0);
        let expected = 6.0 - 2.0 * PI;
        assert!((a.delta_phi(&b) - expected).abs() < EPS);
        assert!(a.delta_phi(&b).abs() <= PI);
    }

    #[test]
    fn delta_r_combines_eta_and_phi() {
        let a = LorentzVector::from_pt_eta_phi_m(1.0, 0.3, 0.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(1.0, 0.0, 0.4, 0.0);
        assert!((a.delta_r(&b) - 0.5).abs() < EPS);
    }
}
