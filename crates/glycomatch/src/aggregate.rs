use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::matching::{FragmentMatch, MatchedSeries};
use crate::spectrum::PeakCatalog;
use crate::Error;

/// Provenance of a matched spectrum: which hypothesis was matched, and
/// where the spectrum came from
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumContext {
    /// Glycopeptide sequence (or other hypothesis identity)
    pub identity: String,
    pub scan_time: i32,
    pub spectrum_id: i64,
    pub peptide_mass: f64,
    pub glycan_mass: f64,
    pub peptide_mass_rank: i32,
    pub glycan_peptide_ratio: i32,
}

/// All fragment matches of one hypothesis against one spectrum
#[derive(Clone, Debug, Serialize)]
pub struct MatchedSpectrum {
    #[serde(skip_serializing)]
    catalog: Arc<PeakCatalog>,
    #[serde(skip_serializing)]
    series: Box<[MatchedSeries]>,
    #[serde(skip_serializing)]
    matches: Box<[FragmentMatch]>,
    #[serde(flatten)]
    pub context: SpectrumContext,
    /// Number of distinct peaks explained by at least one fragment
    pub peaks_explained: usize,
    pub peaks_unexplained: usize,
}

/// Summarize matched series against the catalog they were matched on.
///
/// Fails with [`Error::InconsistentCatalog`] if any match refers to a peak
/// that is not part of `catalog`.
pub fn aggregate(
    catalog: Arc<PeakCatalog>,
    series: Vec<MatchedSeries>,
    context: SpectrumContext,
) -> Result<MatchedSpectrum, Error> {
    let mut explained = FnvHashSet::default();
    for m in series.iter().flat_map(|s| s.matches.iter()) {
        if !catalog.contains(m.peak_id) {
            return Err(Error::InconsistentCatalog { peak_id: m.peak_id });
        }
        explained.insert(m.peak_id);
    }

    let matches = series
        .iter()
        .flat_map(|s| s.matches.iter().cloned())
        .collect::<Vec<_>>();

    let peaks_explained = explained.len();
    let peaks_unexplained = catalog.len() - peaks_explained;

    Ok(MatchedSpectrum {
        catalog,
        series: series.into_boxed_slice(),
        matches: matches.into_boxed_slice(),
        context,
        peaks_explained,
        peaks_unexplained,
    })
}

impl MatchedSpectrum {
    pub fn catalog(&self) -> &PeakCatalog {
        &self.catalog
    }

    pub fn series(&self) -> &[MatchedSeries] {
        &self.series
    }

    /// Every fragment match, grouped by series in suite order
    pub fn matches(&self) -> &[FragmentMatch] {
        &self.matches
    }

    pub fn matches_of<'a>(&'a self, ion_type: &'a str) -> impl Iterator<Item = &'a FragmentMatch> {
        self.matches
            .iter()
            .filter(move |m| &*m.ion_type == ion_type)
    }

    pub fn max_intensity(&self) -> f32 {
        self.catalog.max_intensity()
    }

    /// Summed intensity of explained peaks, counting each peak once
    pub fn explained_intensity(&self) -> f32 {
        self.peak_match_map()
            .keys()
            .filter_map(|&id| self.catalog.get(id))
            .map(|peak| peak.intensity)
            .sum()
    }

    /// Group matches by the peak they were observed at
    pub fn peak_match_map(&self) -> FnvHashMap<i64, Vec<&FragmentMatch>> {
        let mut map: FnvHashMap<i64, Vec<&FragmentMatch>> = FnvHashMap::default();
        for m in self.matches.iter() {
            map.entry(m.peak_id).or_default().push(m);
        }
        map
    }

    /// Keys of the theoretical fragments explaining peak `peak_id`
    pub fn peak_explained_by(&self, peak_id: i64) -> FnvHashSet<&str> {
        self.matches
            .iter()
            .filter(|m| m.peak_id == peak_id)
            .map(|m| &*m.key)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ion_series::FragmentSeries;
    use crate::mass::Tolerance;
    use crate::matching::Matcher;

    fn catalog() -> Arc<PeakCatalog> {
        Arc::new(
            PeakCatalog::from_tuples([
                (100.0, 1, 100.0, 1),
                (204.09, 2, 50.0, 2),
                (366.14, 1, 10.0, 3),
            ])
            .unwrap(),
        )
    }

    fn matched(catalog: &PeakCatalog) -> Vec<MatchedSeries> {
        let matcher = Matcher::new(catalog, Tolerance::Da(0.02)).unwrap();
        vec![
            matcher.match_series(&FragmentSeries::from_tuples(
                "b",
                [(100.0, "b1"), (204.1, "b2")],
            )),
            matcher.match_series(&FragmentSeries::from_tuples(
                "stub_glycopeptide",
                [(204.095, "peptide+HexNAc")],
            )),
        ]
    }

    #[test]
    fn peaks_counted_once() {
        let catalog = catalog();
        let series = matched(&catalog);
        let spectrum = aggregate(catalog, series, SpectrumContext::default()).unwrap();

        // peak 2 is matched by two fragments but explained once
        assert_eq!(spectrum.matches().len(), 3);
        assert_eq!(spectrum.peaks_explained, 2);
        assert_eq!(spectrum.peaks_unexplained, 1);
        assert_eq!(
            spectrum.peaks_explained + spectrum.peaks_unexplained,
            spectrum.catalog().len()
        );
        assert_eq!(spectrum.explained_intensity(), 150.0);

        let keys = spectrum.peak_explained_by(2);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("b2") && keys.contains("peptide+HexNAc"));
        assert!(spectrum.peak_explained_by(3).is_empty());
        assert_eq!(spectrum.matches_of("b").count(), 2);
    }

    #[test]
    fn wrong_catalog() {
        let series = matched(&catalog());
        let other = Arc::new(PeakCatalog::from_tuples([(100.0, 1, 100.0, 1)]).unwrap());
        let err = aggregate(other, series, SpectrumContext::default()).unwrap_err();
        assert!(matches!(err, Error::InconsistentCatalog { peak_id: 2 }));
    }

    #[test]
    fn context_is_kept() {
        let context = SpectrumContext {
            identity: "NVT(HexNAc)K".into(),
            scan_time: 1200,
            spectrum_id: 7,
            peptide_mass: 1000.5,
            glycan_mass: 203.08,
            ..Default::default()
        };
        let spectrum = aggregate(catalog(), Vec::new(), context.clone()).unwrap();
        assert_eq!(spectrum.context, context);
        assert_eq!(spectrum.peaks_explained, 0);
        assert_eq!(spectrum.peaks_unexplained, 3);

        let json = serde_json::to_value(&spectrum).unwrap();
        assert_eq!(json["identity"], "NVT(HexNAc)K");
        assert_eq!(json["peaks_unexplained"], 3);
    }
}
