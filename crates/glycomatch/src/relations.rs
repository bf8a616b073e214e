//! Peak-to-peak relations: pairs of peaks in one spectrum that satisfy a
//! [`MatchingFeature`]'s mass offset, charge and intensity rules. Fitting a
//! feature measures how much more often the relation holds between peaks
//! explained by an ion series than between unexplained peaks.

use fnv::{FnvHashMap, FnvHashSet};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::sync::Arc;

use crate::aggregate::MatchedSpectrum;
use crate::feature::{MatchingFeature, DEFAULT_RELATION_TOLERANCE};
use crate::spectrum::{intensity_rank, intensity_ratio_class, Peak};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeakRelation {
    pub from: Peak,
    pub to: Peak,
    pub feature: String,
    pub intensity_class: Option<i8>,
    pub from_charge: i32,
    pub to_charge: i32,
    /// Ion series explaining `from`, or `None` for noise
    pub kind: Option<Arc<str>>,
}

impl PeakRelation {
    pub fn new(from: &Peak, to: &Peak, feature: &MatchingFeature, kind: Option<Arc<str>>) -> Self {
        Self {
            from: *from,
            to: *to,
            feature: feature.name.clone(),
            intensity_class: intensity_ratio_class(from, to),
            from_charge: from.charge,
            to_charge: to.charge,
            kind,
        }
    }

    pub fn is_noise(&self) -> bool {
        self.kind.is_none()
    }
}

/// Every relation, under any of `features`, from each peak to the other
/// peaks of `peaks`, keyed by the id of the originating peak
pub fn search_features(
    peaks: &[Peak],
    features: &[MatchingFeature],
) -> FnvHashMap<i64, Vec<PeakRelation>> {
    let mut relations: FnvHashMap<i64, Vec<PeakRelation>> = FnvHashMap::default();
    for from in peaks {
        for to in peaks.iter().filter(|to| to.id != from.id) {
            for feature in features.iter().filter(|f| f.test(from, to)) {
                relations
                    .entry(from.id)
                    .or_default()
                    .push(PeakRelation::new(from, to, feature, None));
            }
        }
    }
    relations
}

/// Relation counts over a set of spectra
#[derive(Clone, Default, Debug)]
struct Tally {
    on_kind_satisfied: usize,
    off_kind_satisfied: usize,
    on_kind: usize,
    off_kind: usize,
    relations: Vec<(i64, Vec<PeakRelation>)>,
}

impl AddAssign<Tally> for Tally {
    fn add_assign(&mut self, rhs: Tally) {
        self.on_kind_satisfied += rhs.on_kind_satisfied;
        self.off_kind_satisfied += rhs.off_kind_satisfied;
        self.on_kind += rhs.on_kind;
        self.off_kind += rhs.off_kind;
        self.relations.extend(rhs.relations);
    }
}

fn tally_spectrum(
    spectrum: &MatchedSpectrum,
    feature: &MatchingFeature,
    kind: &Arc<str>,
    minimum_intensity: f32,
) -> Tally {
    let mut peaks = spectrum.catalog().peaks().to_vec();
    intensity_rank(&mut peaks, minimum_intensity);
    peaks.retain(|peak| peak.rank > 0);

    let on_kind_peaks = spectrum
        .matches_of(kind)
        .map(|m| m.peak_id)
        .collect::<FnvHashSet<_>>();

    let mut tally = Tally::default();
    let mut related = Vec::new();
    for from in &peaks {
        let on_kind = on_kind_peaks.contains(&from.id);
        for to in peaks.iter().filter(|to| to.id != from.id) {
            if !feature.test(from, to) {
                continue;
            }
            if on_kind {
                tally.on_kind_satisfied += 1;
                related.push(PeakRelation::new(from, to, feature, Some(kind.clone())));
            } else {
                tally.off_kind_satisfied += 1;
                related.push(PeakRelation::new(from, to, feature, None));
            }
        }
        if on_kind {
            tally.on_kind += 1;
        } else {
            tally.off_kind += 1;
        }
    }
    if !related.is_empty() {
        tally.relations.push((spectrum.context.spectrum_id, related));
    }
    tally
}

/// Rates at which a feature relates peaks explained by ion series `kind`
/// (`on_kind`) and all other ranked peaks (`off_kind`)
#[derive(Clone, Debug, Serialize)]
pub struct FittedFeature {
    pub name: String,
    pub kind: Arc<str>,
    pub on_kind: f64,
    pub off_kind: f64,
    /// Relations found, grouped by spectrum id
    pub relations: Vec<(i64, Vec<PeakRelation>)>,
}

pub fn fit_feature(
    spectra: &[MatchedSpectrum],
    feature: &MatchingFeature,
    kind: &str,
    minimum_intensity: f32,
) -> FittedFeature {
    let kind: Arc<str> = Arc::from(kind);
    let tally = spectra
        .par_iter()
        .map(|spectrum| tally_spectrum(spectrum, feature, &kind, minimum_intensity))
        .reduce(Tally::default, |mut acc, rhs| {
            acc += rhs;
            acc
        });

    log::trace!(
        "fit feature `{}` on {} spectra: {} on-kind, {} off-kind relations",
        feature.name,
        spectra.len(),
        tally.on_kind_satisfied,
        tally.off_kind_satisfied
    );

    FittedFeature {
        name: feature.name.clone(),
        kind,
        on_kind: tally.on_kind_satisfied as f64 / tally.on_kind.max(1) as f64,
        off_kind: tally.off_kind_satisfied as f64 / tally.off_kind.max(1) as f64,
        relations: tally.relations,
    }
}

impl FittedFeature {
    pub fn peak_relations(&self, include_noise: bool) -> impl Iterator<Item = &PeakRelation> {
        self.relations
            .iter()
            .flat_map(|(_, relations)| relations.iter())
            .filter(move |rel| include_noise || !rel.is_noise())
    }

    /// Counts of (from, to) charge pairs among non-noise relations
    pub fn charge_relations(&self) -> BTreeMap<(i32, i32), usize> {
        let mut counts = BTreeMap::new();
        for rel in self.peak_relations(false) {
            *counts.entry((rel.from_charge, rel.to_charge)).or_default() += 1;
        }
        counts
    }

    /// Counts of intensity ratio classes among non-noise relations
    pub fn intensity_classes(&self) -> BTreeMap<Option<i8>, usize> {
        let mut counts = BTreeMap::new();
        for rel in self.peak_relations(false) {
            *counts.entry(rel.intensity_class).or_default() += 1;
        }
        counts
    }
}

/// Mass spacing at which an unexplained peak could have been observed
pub const SMALLEST_UNIT: f64 = 1000.0 * DEFAULT_RELATION_TOLERANCE;

/// Lower bound of the random fragment hit rate
pub const MINIMUM_PRIOR: f64 = 1e-4;

// Random masses are drawn from [RANDOM_MASS_FLOOR, sequence mass + RANDOM_MASS_HEADROOM]
const RANDOM_MASS_FLOOR: f64 = 56.0;
const RANDOM_MASS_HEADROOM: f64 = 38.0;

/// Parameters of [`probability_of_peak_explained`], estimated from matched
/// spectra for one ion series
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OffsetParameters {
    /// Explained peaks of the series per fragmentation site
    pub alpha: f64,
    /// Unexplained peaks per empty mass slot
    pub beta: f64,
    /// Expected number of fragments hit by a random mass, per spectrum
    pub prior: f64,
}

#[derive(Clone, Copy, Default, Debug, PartialEq)]
struct SiteCounts {
    spectra: usize,
    sites: usize,
    explained: usize,
    unexplained: usize,
    sparsity: f64,
    random_hits: f64,
}

impl AddAssign<SiteCounts> for SiteCounts {
    fn add_assign(&mut self, rhs: SiteCounts) {
        self.spectra += rhs.spectra;
        self.sites += rhs.sites;
        self.explained += rhs.explained;
        self.unexplained += rhs.unexplained;
        self.sparsity += rhs.sparsity;
        self.random_hits += rhs.random_hits;
    }
}

/// Expected number of `fragments` within `tolerance` (relative) of a mass
/// drawn uniformly from `[low, high]`
fn expected_random_hits(fragments: &[f64], low: f64, high: f64, tolerance: f64) -> f64 {
    let width = high - low;
    if !(width > 0.0) {
        return 0.0;
    }
    fragments
        .iter()
        .filter(|mass| mass.is_finite() && **mass > 0.0)
        .map(|mass| {
            // |(mass - x) / x| <= tolerance
            let lo = (mass / (1.0 + tolerance)).max(low);
            let hi = (mass / (1.0 - tolerance)).min(high);
            (hi - lo).max(0.0) / width
        })
        .sum()
}

fn count_sites(spectrum: &MatchedSpectrum, kind: &str) -> SiteCounts {
    let context = &spectrum.context;
    let sequence_mass = context.peptide_mass + context.glycan_mass;
    if !(sequence_mass > 0.0) {
        log::warn!(
            "spectrum {} ({}) has no sequence mass, skipping it",
            context.spectrum_id,
            context.identity
        );
        return SiteCounts::default();
    }

    let series = spectrum
        .series()
        .iter()
        .filter(|s| &*s.label == kind)
        .collect::<Vec<_>>();
    let sites = series.iter().map(|s| s.theoretical).sum::<usize>();
    let explained = spectrum.matches_of(kind).count();
    let unexplained =
        spectrum.peaks_unexplained + spectrum.peaks_explained.saturating_sub(explained);
    let random_hits = series
        .iter()
        .map(|s| {
            expected_random_hits(
                &s.fragment_masses,
                RANDOM_MASS_FLOOR,
                sequence_mass + RANDOM_MASS_HEADROOM,
                DEFAULT_RELATION_TOLERANCE,
            )
        })
        .sum();

    SiteCounts {
        spectra: 1,
        sites,
        explained,
        unexplained,
        sparsity: sequence_mass / SMALLEST_UNIT - sites as f64,
        random_hits,
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Estimate `alpha`, `beta` and the prior for ion series `kind`.
///
/// Spectra are weighted by their sequence mass (`peptide_mass +
/// glycan_mass`); spectra without one are skipped. The prior is the
/// expected hit count of a uniformly random mass, floored at
/// [`MINIMUM_PRIOR`].
pub fn estimate_offset_parameters(spectra: &[MatchedSpectrum], kind: &str) -> OffsetParameters {
    let counts = spectra
        .par_iter()
        .map(|spectrum| count_sites(spectrum, kind))
        .reduce(SiteCounts::default, |mut acc, rhs| {
            acc += rhs;
            acc
        });

    let parameters = OffsetParameters {
        alpha: ratio(counts.explained as f64, counts.sites as f64),
        beta: ratio(counts.unexplained as f64, counts.sparsity),
        prior: ratio(counts.random_hits, counts.spectra as f64).max(MINIMUM_PRIOR),
    };
    log::trace!(
        "offset parameters for `{}` over {} spectra: {:?}",
        kind,
        counts.spectra,
        parameters
    );
    parameters
}

/// Explained peaks of series `kind` per fragmentation site
pub fn offset_frequency(spectra: &[MatchedSpectrum], kind: &str) -> f64 {
    estimate_offset_parameters(spectra, kind).alpha
}

/// Peaks not explained by series `kind` per empty mass slot
pub fn unknown_peak_rate(spectra: &[MatchedSpectrum], kind: &str) -> f64 {
    estimate_offset_parameters(spectra, kind).beta
}

pub fn prior_fragment_probability(spectra: &[MatchedSpectrum], kind: &str) -> f64 {
    estimate_offset_parameters(spectra, kind).prior
}

/// Posterior probability that a peak satisfying a relation is explained,
/// given the on-kind rate, the unexplained-peak rate and the prior
/// probability of a random fragment hit. Zero when both rates are zero.
pub fn probability_of_peak_explained(
    offset_frequency: f64,
    unknown_peak_rate: f64,
    prior_fragment_probability: f64,
) -> f64 {
    let a = prior_fragment_probability * offset_frequency;
    let b = (1.0 - prior_fragment_probability) * unknown_peak_rate;
    ratio(a, a + b)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::aggregate::{aggregate, SpectrumContext};
    use crate::feature::FeatureBuilder;
    use crate::ion_series::FragmentSeries;
    use crate::ion_type::IonTypeIndex;
    use crate::mass::Tolerance;
    use crate::matching::Matcher;
    use crate::spectrum::PeakCatalog;

    const HEXNAC: f64 = 203.07937;

    fn hexnac_feature() -> MatchingFeature {
        FeatureBuilder {
            offset: Some(HEXNAC),
            name: Some("HexNAc".into()),
            ..Default::default()
        }
        .make_feature(Arc::new(IonTypeIndex::from_names(["stub_glycopeptide"])))
    }

    fn peaks() -> Vec<Peak> {
        vec![
            Peak::new(1000.0, 2, 500.0, 1),
            Peak::new(1000.0 + HEXNAC, 2, 400.0, 2),
            Peak::new(1000.0 + 2.0 * HEXNAC, 3, 300.0, 3),
            Peak::new(1500.0, 1, 200.0, 4),
            Peak::new(1500.0 + HEXNAC, 1, 150.0, 5),
            Peak::new(1800.0, 1, 50.0, 6),
        ]
    }

    fn spectrum() -> MatchedSpectrum {
        let catalog = Arc::new(PeakCatalog::new(peaks()).unwrap());
        let matcher = Matcher::new(&catalog, Tolerance::Da(0.01)).unwrap();
        let series = vec![matcher.match_series(&FragmentSeries::from_tuples(
            "stub_glycopeptide",
            [
                (1000.0, "peptide"),
                (1000.0 + HEXNAC, "peptide+HexNAc"),
                (1000.0 + 2.0 * HEXNAC, "peptide+HexNAc2"),
            ],
        ))];
        aggregate(catalog, series, SpectrumContext::default()).unwrap()
    }

    #[test]
    fn relations_by_peak() {
        let relations = search_features(&peaks(), &[hexnac_feature()]);
        assert_eq!(relations.len(), 3);
        assert_eq!(relations[&1].len(), 1);
        assert_eq!(relations[&1][0].to.id, 2);
        assert_eq!(relations[&2][0].to.id, 3);
        assert_eq!(relations[&4][0].to.id, 5);
        assert_eq!(relations[&1][0].feature, "HexNAc");
        assert_eq!(relations[&1][0].intensity_class, Some(0));
    }

    #[test]
    fn fitting() {
        let spectra = vec![spectrum(), spectrum()];
        let fitted = fit_feature(&spectra, &hexnac_feature(), "stub_glycopeptide", 100.0);

        // peaks 1, 2, 3 are explained, 4 and 5 are not, 6 is below the
        // intensity cutoff; 1->2 and 2->3 are on-kind, 4->5 is noise
        assert_eq!(fitted.on_kind, 2.0 / 3.0);
        assert_eq!(fitted.off_kind, 1.0 / 2.0);
        assert_eq!(fitted.relations.len(), 2);
        assert_eq!(fitted.peak_relations(true).count(), 6);
        assert_eq!(fitted.peak_relations(false).count(), 4);

        let charges = fitted.charge_relations();
        assert_eq!(charges[&(2, 2)], 2);
        assert_eq!(charges[&(2, 3)], 2);
        assert!(!charges.contains_key(&(1, 1)));
        assert_eq!(fitted.intensity_classes().values().sum::<usize>(), 4);
    }

    #[test]
    fn fitting_without_spectra() {
        let fitted = fit_feature(&[], &hexnac_feature(), "b", 0.0);
        assert_eq!(fitted.on_kind, 0.0);
        assert_eq!(fitted.off_kind, 0.0);
        assert!(fitted.relations.is_empty());
    }

    #[test]
    fn posterior() {
        let p = probability_of_peak_explained(0.5, 0.1, 0.2);
        assert!((p - 0.1 / (0.1 + 0.08)).abs() < 1e-12);
        assert_eq!(probability_of_peak_explained(1.0, 0.0, 0.5), 1.0);
        assert_eq!(probability_of_peak_explained(0.0, 0.0, 0.5), 0.0);
    }

    fn spectrum_with_mass(peptide_mass: f64) -> MatchedSpectrum {
        let spectrum = spectrum();
        let context = SpectrumContext {
            peptide_mass,
            glycan_mass: 2.0 * HEXNAC,
            ..Default::default()
        };
        let catalog = Arc::new(spectrum.catalog().clone());
        aggregate(catalog, spectrum.series().to_vec(), context).unwrap()
    }

    #[test]
    fn offset_parameters() {
        let spectra = vec![spectrum_with_mass(1000.0), spectrum_with_mass(1000.0)];
        let params = estimate_offset_parameters(&spectra, "stub_glycopeptide");

        // 3 of 3 sites explained in each spectrum
        assert_eq!(params.alpha, 1.0);
        assert_eq!(offset_frequency(&spectra, "stub_glycopeptide"), 1.0);

        // 3 unexplained peaks per spectrum, over mass / 0.02 - 3 slots
        let slots = (1000.0 + 2.0 * HEXNAC) / SMALLEST_UNIT - 3.0;
        assert!((params.beta - 3.0 / slots).abs() < 1e-12);
        assert_eq!(unknown_peak_rate(&spectra, "stub_glycopeptide"), params.beta);

        // each fragment covers a window of about 2 * 2e-5 * mass out of
        // the random mass range
        let width = 1000.0 + 2.0 * HEXNAC + 38.0 - 56.0;
        let expected = [1000.0, 1000.0 + HEXNAC, 1000.0 + 2.0 * HEXNAC]
            .iter()
            .map(|m| m / (1.0 - 2e-5) - m / (1.0 + 2e-5))
            .sum::<f64>()
            / width;
        assert!((params.prior - expected).abs() < 1e-9);
        assert!(params.prior > MINIMUM_PRIOR);

        let posterior = probability_of_peak_explained(params.alpha, params.beta, params.prior);
        assert!(posterior > 0.0 && posterior < 1.0);
    }

    #[test]
    fn offset_parameters_for_missing_series() {
        let spectra = vec![spectrum_with_mass(1000.0)];
        let params = estimate_offset_parameters(&spectra, "b");
        assert_eq!(params.alpha, 0.0);
        // every peak is unexplained with respect to `b`
        let slots = (1000.0 + 2.0 * HEXNAC) / SMALLEST_UNIT;
        assert!((params.beta - 6.0 / slots).abs() < 1e-12);
        assert_eq!(params.prior, MINIMUM_PRIOR);
    }

    #[test]
    fn offset_parameters_skip_massless_spectra() {
        // the default context carries no sequence mass
        let params = estimate_offset_parameters(&[spectrum()], "stub_glycopeptide");
        assert_eq!(params, OffsetParameters { prior: MINIMUM_PRIOR, ..Default::default() });
        assert_eq!(
            estimate_offset_parameters(&[], "stub_glycopeptide").prior,
            MINIMUM_PRIOR
        );
    }

    #[test]
    fn random_hits_are_clipped_to_the_range() {
        // a fragment far outside the range is never hit
        assert_eq!(expected_random_hits(&[10.0, f64::NAN], 56.0, 100.0, 2e-5), 0.0);
        // a fragment on the range edge contributes half of its window
        let full = expected_random_hits(&[80.0], 56.0, 100.0, 2e-5);
        let edge = expected_random_hits(&[100.0], 56.0, 100.0, 2e-5);
        assert!((edge - 100.0 * 2e-5 / (1.0 + 2e-5) / 44.0).abs() < 1e-12);
        assert!(full > edge);
        assert_eq!(expected_random_hits(&[80.0], 100.0, 56.0, 2e-5), 0.0);
    }
}
