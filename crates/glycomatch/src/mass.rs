use serde::{Deserialize, Serialize};

use crate::Error;

pub const PROTON: f64 = 1.00727646677;

/// Symmetric mass tolerance. `Da` windows are absolute (Daltons), `Ppm`
/// windows are scaled by the mass they are centered on.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64),
    Da(f64),
}

impl Tolerance {
    /// Reject zero, negative or NaN windows
    pub fn validate(self) -> Result<Self, Error> {
        let value = match self {
            Tolerance::Ppm(v) | Tolerance::Da(v) => v,
        };
        // `!(v > 0)` also catches NaN
        if !(value > 0.0) {
            return Err(Error::ToleranceNonPositive(value));
        }
        Ok(self)
    }

    /// Absolute half-width of the window (in Da) around `center`
    pub fn delta(&self, center: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => Tolerance::ppm_to_delta_mass(center, *ppm),
            Tolerance::Da(da) => *da,
        }
    }

    /// Compute the (`lower`, `upper`) window (in Da) for a neutral mass
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        let delta = self.delta(center);
        (center - delta, center + delta)
    }

    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        (rhs - center).abs() <= self.delta(center)
    }

    pub fn ppm_to_delta_mass(center: f64, ppm: f64) -> f64 {
        ppm * center.abs() / 1_000_000.0
    }
}

/// Relative mass error of `x` with respect to `y`, as a fraction (not
/// multiplied by 1e6)
pub fn ppm_error(x: f64, y: f64) -> f64 {
    (x - y) / y
}

/// Relative mass error of `x` with respect to `y`, if its magnitude is
/// within `tolerance`
pub fn tol_ppm_error(x: f64, y: f64, tolerance: f64) -> Option<f64> {
    let err = ppm_error(x, y);
    if err.abs() <= tolerance {
        Some(err)
    } else {
        None
    }
}

/// Convert a neutral mass to m/z at `charge`. Charge 0 is treated as
/// an uncharged species and returns the neutral mass.
pub fn mass_charge_ratio(neutral_mass: f64, charge: i32) -> f64 {
    if charge == 0 {
        return neutral_mass;
    }
    let z = charge as f64;
    (neutral_mass + z * PROTON) / z.abs()
}
