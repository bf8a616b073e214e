use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::mass::{mass_charge_ratio, Tolerance};
use crate::Error;

/// An observed, charge-deconvoluted peak
#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize, Deserialize)]
pub struct Peak {
    pub neutral_mass: f64,
    pub charge: i32,
    pub intensity: f32,
    /// Intensity-order rank within the spectrum, see [`intensity_rank`]
    pub rank: i32,
    pub mass_charge_ratio: f64,
    /// Unique within a spectrum
    pub id: i64,
}

impl Peak {
    pub fn new(neutral_mass: f64, charge: i32, intensity: f32, id: i64) -> Self {
        Self {
            neutral_mass,
            charge,
            intensity,
            rank: 0,
            mass_charge_ratio: mass_charge_ratio(neutral_mass, charge),
            id,
        }
    }

    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }
}

/// Immutable set of peaks from a single spectrum, sorted by neutral mass
/// in ascending order
#[derive(Clone, Default, Debug, Serialize)]
pub struct PeakCatalog {
    peaks: Box<[Peak]>,
    #[serde(skip_serializing)]
    positions: FnvHashMap<i64, usize>,
    max_intensity: f32,
}

impl PeakCatalog {
    /// Sort `peaks` by mass (ties broken by id) and freeze them. Fails if two
    /// peaks share an id, or if a peak mass is NaN or infinite.
    pub fn new(mut peaks: Vec<Peak>) -> Result<Self, Error> {
        if let Some(peak) = peaks.iter().find(|peak| !peak.neutral_mass.is_finite()) {
            return Err(Error::NonFiniteMass(peak.id));
        }
        peaks.sort_by(|a, b| {
            a.neutral_mass
                .total_cmp(&b.neutral_mass)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut positions =
            FnvHashMap::with_capacity_and_hasher(peaks.len(), Default::default());
        for (idx, peak) in peaks.iter().enumerate() {
            if positions.insert(peak.id, idx).is_some() {
                return Err(Error::DuplicatePeakId(peak.id));
            }
        }

        let max_intensity = peaks
            .iter()
            .map(|peak| peak.intensity)
            .fold(0.0f32, f32::max);

        Ok(Self {
            peaks: peaks.into_boxed_slice(),
            positions,
            max_intensity,
        })
    }

    /// Build a catalog from raw `(neutral_mass, charge, intensity, id)` tuples
    pub fn from_tuples<I>(tuples: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (f64, i32, f32, i64)>,
    {
        Self::new(
            tuples
                .into_iter()
                .map(|(mass, charge, intensity, id)| Peak::new(mass, charge, intensity, id))
                .collect(),
        )
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn max_intensity(&self) -> f32 {
        self.max_intensity
    }

    pub fn total_intensity(&self) -> f32 {
        self.peaks.iter().map(|peak| peak.intensity).sum()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&Peak> {
        self.positions.get(&id).map(|&idx| &self.peaks[idx])
    }

    /// All peaks with `center - delta <= neutral_mass <= center + delta`,
    /// in ascending mass order
    pub fn window(&self, center: f64, tolerance: Tolerance) -> &[Peak] {
        &self.peaks[self.window_range(center, tolerance)]
    }

    /// Index range of [`PeakCatalog::window`] within [`PeakCatalog::peaks`]
    pub fn window_range(&self, center: f64, tolerance: Tolerance) -> Range<usize> {
        let (lo, hi) = tolerance.bounds(center);
        // NaN bounds select nothing
        if !(lo <= hi) {
            return 0..0;
        }
        // binary search to the lower bound, then scan up to the upper one
        let i = self.peaks.partition_point(|peak| peak.neutral_mass < lo);
        let j = i + self.peaks[i..]
            .iter()
            .take_while(|peak| peak.neutral_mass <= hi)
            .count();
        i..j
    }
}

/// Assign coarse intensity ranks in place.
///
/// Peaks below `minimum_intensity` get rank 0. The remaining peaks, from most
/// to least intense, start at rank 10 and drop one rank every 10 peaks (the
/// first window holds 9). Rank 1 is kept for 6 additional windows, after
/// which every remaining peak is rank 0.
pub fn intensity_rank(peaks: &mut [Peak], minimum_intensity: f32) {
    let mut order = (0..peaks.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| peaks[b].intensity.total_cmp(&peaks[a].intensity));

    let mut i = 0;
    let mut rank = 10;
    let mut tailing = 6;
    let mut exhausted = false;
    for idx in order {
        let peak = &mut peaks[idx];
        if exhausted || peak.intensity < minimum_intensity {
            peak.rank = 0;
            continue;
        }
        i += 1;
        if i == 10 {
            i = 0;
            if rank == 1 && tailing != 0 {
                tailing -= 1;
            } else {
                rank -= 1;
            }
        }
        if rank == 0 {
            exhausted = true;
        }
        peak.rank = rank;
    }
}

/// Bin the intensity ratio of two peaks into a small signed class: strongly
/// larger first peak is -4, strongly smaller is 5. Returns `None` when the
/// ratio is undefined or negative.
pub fn intensity_ratio_class(first: &Peak, second: &Peak) -> Option<i8> {
    let ratio = first.intensity / second.intensity;
    let class = match ratio {
        r if r >= 5.0 => -4,
        r if r >= 2.5 => -3,
        r if r >= 1.7 => -2,
        r if r >= 1.3 => -1,
        r if r >= 1.0 => 0,
        r if r >= 0.8 => 1,
        r if r >= 0.6 => 2,
        r if r >= 0.4 => 3,
        r if r >= 0.2 => 4,
        r if r >= 0.0 => 5,
        // NaN and negative ratios
        _ => return None,
    };
    Some(class)
}
