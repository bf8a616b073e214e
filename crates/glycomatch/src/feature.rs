use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aggregate::{MatchedSpectrum, SpectrumContext};
use crate::ion_type::{IonTypeAccumulator, IonTypeIndex};
use crate::mass::ppm_error;
use crate::spectrum::{intensity_ratio_class, Peak};
use crate::Error;

/// Default relative tolerance of a peak relation (20 ppm)
pub const DEFAULT_RELATION_TOLERANCE: f64 = 2e-5;

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// Matching feature definition, as read from a configuration file
pub struct FeatureBuilder {
    /// Defaults to `F:<offset>`
    pub name: Option<String>,
    /// Mass offset between two related peaks
    pub offset: Option<f64>,
    /// Relative (ppm / 1e6) tolerance on the peak relation offset
    pub tolerance: Option<f64>,
    /// Minimum intensity of a matched peak, relative to the most intense peak
    /// of its spectrum
    pub intensity_ratio: Option<f64>,
    /// Required intensity ratio class of a related peak pair
    pub intensity_class: Option<i8>,
    pub from_charge: Option<i32>,
    pub to_charge: Option<i32>,
    pub feature_type: Option<String>,
    pub min_peak_rank: Option<i32>,
    pub max_peak_rank: Option<i32>,
    /// Only score spectra whose context carries this glycan/peptide ratio
    pub glycan_peptide_ratio: Option<i32>,
    /// Only score spectra whose context carries this peptide mass rank
    pub peptide_mass_rank: Option<i32>,
}

impl FeatureBuilder {
    pub fn make_feature(self, index: Arc<IonTypeIndex>) -> MatchingFeature {
        let offset = self.offset.unwrap_or(0.0);
        let name = self.name.unwrap_or_else(|| {
            // `{:?}` keeps the decimal point of whole offsets ("F:0.0")
            let mut name = format!("F:{:?}", offset);
            if let Some(class) = self.intensity_class {
                name.push_str(&format!(", {}", class));
            }
            name
        });

        let tolerance = self.tolerance.unwrap_or(DEFAULT_RELATION_TOLERANCE);
        if tolerance <= 0.0 {
            log::warn!(
                "feature `{}` has a non-positive tolerance ({}), it will never relate two peaks",
                name,
                tolerance
            );
        }
        if let (Some(lo), Some(hi)) = (self.min_peak_rank, self.max_peak_rank) {
            if lo > hi {
                log::warn!("feature `{}`: min_peak_rank {} > max_peak_rank {}", name, lo, hi);
            }
        }

        MatchingFeature {
            offset,
            tolerance,
            name,
            intensity_ratio: self.intensity_ratio,
            intensity_class: self.intensity_class,
            from_charge: self.from_charge,
            to_charge: self.to_charge,
            feature_type: self.feature_type.unwrap_or_default(),
            min_peak_rank: self.min_peak_rank,
            max_peak_rank: self.max_peak_rank,
            ion_type_matches: IonTypeAccumulator::new(index.clone()),
            ion_type_totals: IonTypeAccumulator::new(index),
            glycan_peptide_ratio: self.glycan_peptide_ratio,
            peptide_mass_rank: self.peptide_mass_rank,
        }
    }
}

/// A charge, rank and intensity rule, together with the per-ion-type counts
/// of the matches that satisfied it and of the opportunities it was given
#[derive(Clone, Debug)]
pub struct MatchingFeature {
    pub offset: f64,
    pub tolerance: f64,
    pub name: String,
    pub intensity_ratio: Option<f64>,
    pub intensity_class: Option<i8>,
    pub from_charge: Option<i32>,
    pub to_charge: Option<i32>,
    pub feature_type: String,
    pub min_peak_rank: Option<i32>,
    pub max_peak_rank: Option<i32>,
    ion_type_matches: IonTypeAccumulator,
    ion_type_totals: IonTypeAccumulator,
    pub glycan_peptide_ratio: Option<i32>,
    pub peptide_mass_rank: Option<i32>,
}

/// Per-ion-type statistics of a feature, for downstream classifiers
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureStatistics {
    pub name: String,
    pub feature_type: String,
    pub matches: BTreeMap<String, f64>,
    pub totals: BTreeMap<String, f64>,
}

type Counts = (IonTypeAccumulator, IonTypeAccumulator);

impl MatchingFeature {
    pub fn ion_type_matches(&self) -> &IonTypeAccumulator {
        &self.ion_type_matches
    }

    pub fn ion_type_totals(&self) -> &IonTypeAccumulator {
        &self.ion_type_totals
    }

    fn empty_counts(&self) -> Counts {
        let index = self.ion_type_matches.index().clone();
        (
            IonTypeAccumulator::new(index.clone()),
            IonTypeAccumulator::new(index),
        )
    }

    fn applies_to(&self, context: &SpectrumContext) -> bool {
        self.glycan_peptide_ratio
            .map_or(true, |r| r == context.glycan_peptide_ratio)
            && self
                .peptide_mass_rank
                .map_or(true, |r| r == context.peptide_mass_rank)
    }

    fn charge_in_range(&self, charge: i32) -> bool {
        self.from_charge.map_or(true, |lo| lo <= charge)
            && self.to_charge.map_or(true, |hi| charge <= hi)
    }

    fn rank_in_range(&self, rank: i32) -> bool {
        self.min_peak_rank.map_or(true, |lo| lo <= rank)
            && self.max_peak_rank.map_or(true, |hi| rank <= hi)
    }

    fn intense_enough(&self, peak: &Peak, max_intensity: f32) -> bool {
        match self.intensity_ratio {
            Some(ratio) => (peak.intensity / max_intensity) as f64 >= ratio,
            None => true,
        }
    }

    fn accumulate(&self, spectrum: &MatchedSpectrum, counts: &mut Counts) -> Result<(), Error> {
        if !self.applies_to(&spectrum.context) {
            return Ok(());
        }
        let (matches, totals) = counts;

        for series in spectrum.series() {
            totals.add(&series.label, series.theoretical as f64)?;
        }

        let max_intensity = spectrum.max_intensity();
        for m in spectrum.matches() {
            let peak = spectrum
                .catalog()
                .get(m.peak_id)
                .ok_or(Error::InconsistentCatalog { peak_id: m.peak_id })?;
            if self.charge_in_range(peak.charge)
                && self.rank_in_range(peak.rank)
                && self.intense_enough(peak, max_intensity)
            {
                matches.add(&m.ion_type, 1.0)?;
            }
        }
        Ok(())
    }

    /// Update this feature's accumulators with one spectrum. On error the
    /// accumulators are left untouched.
    pub fn score(&mut self, spectrum: &MatchedSpectrum) -> Result<(), Error> {
        let mut counts = self.empty_counts();
        self.accumulate(spectrum, &mut counts)?;
        self.merge_counts(&counts)
    }

    /// Score many spectra in parallel, then fold the per-worker counts into
    /// this feature
    pub fn score_spectra(&mut self, spectra: &[MatchedSpectrum]) -> Result<(), Error> {
        let this: &Self = self;
        let counts = spectra
            .par_iter()
            .try_fold(
                || this.empty_counts(),
                |mut counts, spectrum| {
                    this.accumulate(spectrum, &mut counts)?;
                    Ok::<_, Error>(counts)
                },
            )
            .try_reduce(
                || this.empty_counts(),
                |(mut matches, mut totals), (m, t)| {
                    matches.merge(&m)?;
                    totals.merge(&t)?;
                    Ok((matches, totals))
                },
            )?;
        log::trace!("scored feature `{}` over {} spectra", self.name, spectra.len());
        self.merge_counts(&counts)
    }

    fn merge_counts(&mut self, (matches, totals): &Counts) -> Result<(), Error> {
        self.ion_type_matches.merge(matches)?;
        self.ion_type_totals.merge(totals)
    }

    /// Sum the accumulators of a copy of this feature that was scored
    /// elsewhere (e.g. on another worker)
    pub fn merge(&mut self, other: &MatchingFeature) -> Result<(), Error> {
        self.ion_type_matches.merge(&other.ion_type_matches)?;
        self.ion_type_totals.merge(&other.ion_type_totals)
    }

    pub fn statistics(&self) -> FeatureStatistics {
        FeatureStatistics {
            name: self.name.clone(),
            feature_type: self.feature_type.clone(),
            matches: self.ion_type_matches.to_map(),
            totals: self.ion_type_totals.to_map(),
        }
    }

    /// Does `to` sit at `from + offset`, within the feature's relative
    /// tolerance, with the required charge pair and intensity class?
    pub fn test(&self, from: &Peak, to: &Peak) -> bool {
        if let Some(class) = self.intensity_class {
            if intensity_ratio_class(from, to) != Some(class) {
                return false;
            }
        }
        let charges = match (self.from_charge, self.to_charge) {
            (None, None) => true,
            (Some(f), Some(t)) => f == from.charge && t == to.charge,
            (Some(f), None) => f == from.charge,
            (None, Some(t)) => t == to.charge,
        };
        charges && ppm_error(from.neutral_mass + self.offset, to.neutral_mass).abs() <= self.tolerance
    }
}
