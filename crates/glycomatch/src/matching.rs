use serde::Serialize;
use std::sync::Arc;

use crate::aggregate::{aggregate, MatchedSpectrum, SpectrumContext};
use crate::ion_series::{FragmentSeries, IonSeriesSuite};
use crate::mass::Tolerance;
use crate::spectrum::PeakCatalog;
use crate::Error;

/// A theoretical fragment observed at a catalog peak
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FragmentMatch {
    pub observed_mass: f64,
    pub intensity: f32,
    /// Copied from the theoretical fragment
    pub key: Arc<str>,
    /// Label of the series the fragment belongs to
    pub ion_type: Arc<str>,
    /// Back-reference to a [`crate::spectrum::Peak`] in the matched catalog
    pub peak_id: i64,
    /// Position of the theoretical fragment within its series
    pub fragment_index: usize,
    pub theoretical_mass: f64,
}

impl FragmentMatch {
    pub fn mass_error(&self) -> f64 {
        self.observed_mass - self.theoretical_mass
    }
}

/// Matches derived from a single [`FragmentSeries`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchedSeries {
    pub label: Arc<str>,
    /// Number of theoretical fragments in the source series, matched or not
    pub theoretical: usize,
    /// Neutral masses of the source fragments, in series order
    #[serde(skip_serializing)]
    pub fragment_masses: Box<[f64]>,
    /// Ordered by fragment, then by ascending peak mass
    pub matches: Box<[FragmentMatch]>,
}

impl MatchedSeries {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Number of theoretical fragments with at least one matching peak
    pub fn fragments_matched(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for m in self.matches.iter() {
            if last != Some(m.fragment_index) {
                count += 1;
                last = Some(m.fragment_index);
            }
        }
        count
    }
}

/// Locates catalog peaks within a mass tolerance of theoretical fragments
pub struct Matcher<'c> {
    pub catalog: &'c PeakCatalog,
    pub tolerance: Tolerance,
}

impl<'c> Matcher<'c> {
    pub fn new(catalog: &'c PeakCatalog, tolerance: Tolerance) -> Result<Self, Error> {
        Ok(Self {
            catalog,
            tolerance: tolerance.validate()?,
        })
    }

    /// Match every fragment of `series`. All peaks within tolerance of a
    /// fragment are recorded, and a peak may match any number of fragments.
    pub fn match_series(&self, series: &FragmentSeries) -> MatchedSeries {
        let mut matches = Vec::new();
        for (fragment_index, fragment) in series.fragments.iter().enumerate() {
            for peak in self.catalog.window(fragment.neutral_mass, self.tolerance) {
                matches.push(FragmentMatch {
                    observed_mass: peak.neutral_mass,
                    intensity: peak.intensity,
                    key: fragment.key.clone(),
                    ion_type: series.label.clone(),
                    peak_id: peak.id,
                    fragment_index,
                    theoretical_mass: fragment.neutral_mass,
                });
            }
        }

        MatchedSeries {
            label: series.label.clone(),
            theoretical: series.len(),
            fragment_masses: series.fragments.iter().map(|f| f.neutral_mass).collect(),
            matches: matches.into_boxed_slice(),
        }
    }

    /// Match every series of `suite`, returning a copy of the suite with
    /// its matched series populated
    pub fn match_suite(&self, suite: &IonSeriesSuite) -> IonSeriesSuite {
        let matched = suite
            .series()
            .iter()
            .map(|series| self.match_series(series))
            .collect();
        suite.with_matches(matched)
    }
}

/// Match `suite` against `catalog` and summarize the result
pub fn match_spectrum(
    catalog: Arc<PeakCatalog>,
    suite: &IonSeriesSuite,
    tolerance: Tolerance,
    context: SpectrumContext,
) -> Result<MatchedSpectrum, Error> {
    let matched = Matcher::new(&catalog, tolerance)?.match_suite(suite);
    let series = matched.into_matched().unwrap_or_default();
    log::trace!(
        "matched {} series against {} peaks for {}",
        series.len(),
        catalog.len(),
        context.identity
    );
    aggregate(catalog, series, context)
}
