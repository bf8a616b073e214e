use serde::Serialize;

use crate::mass::Tolerance;
use crate::spectrum::{Peak, PeakCatalog};
use crate::Error;

/// Peaks found a diagnostic mass shift away from an anchor peak
#[derive(Clone, Debug, Serialize)]
pub struct PeakShiftMatches<'c> {
    pub anchor: &'c Peak,
    pub mass_shift: f64,
    /// Ascending by mass, never containing the anchor
    pub peaks: Vec<&'c Peak>,
}

impl<'c> PeakShiftMatches<'c> {
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }
}

/// Find every peak at `anchor ± mass_shift` within `tolerance`. Neutral
/// losses and gains are both reported, since a diagnostic pair can appear
/// on either side of the anchor.
pub fn find_shifted(
    catalog: &PeakCatalog,
    anchor_id: i64,
    mass_shift: f64,
    tolerance: Tolerance,
) -> Result<PeakShiftMatches<'_>, Error> {
    let tolerance = tolerance.validate()?;
    let anchor = catalog.get(anchor_id).ok_or(Error::UnknownPeak(anchor_id))?;

    let shift = mass_shift.abs();
    let lower = catalog.window_range(anchor.neutral_mass - shift, tolerance);
    let upper = catalog.window_range(anchor.neutral_mass + shift, tolerance);

    // Both windows index the same sorted catalog; merge them when they
    // overlap so that no peak is reported twice
    let ranges = if upper.start <= lower.end {
        vec![lower.start.min(upper.start)..lower.end.max(upper.end)]
    } else {
        vec![lower, upper]
    };

    let peaks = ranges
        .into_iter()
        .flat_map(|range| catalog.peaks()[range].iter())
        .filter(|peak| peak.id != anchor.id)
        .collect();

    Ok(PeakShiftMatches {
        anchor,
        mass_shift,
        peaks,
    })
}
