use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ion_type::IonTypeIndex;
use crate::matching::MatchedSeries;

/// Theoretical fragment ion, produced upstream from a glycopeptide
/// composition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TheoreticalFragment {
    /// Neutral fragment mass (no charge)
    pub neutral_mass: f64,
    /// Opaque label identifying the composition or cleavage site, e.g. "b3"
    pub key: Arc<str>,
}

impl TheoreticalFragment {
    pub fn new<K: Into<Arc<str>>>(neutral_mass: f64, key: K) -> Self {
        Self {
            neutral_mass,
            key: key.into(),
        }
    }
}

/// Ordered fragments sharing one ion series label ("b", "y", "oxonium_ion", ...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentSeries {
    pub label: Arc<str>,
    pub fragments: Box<[TheoreticalFragment]>,
}

impl FragmentSeries {
    pub fn new<L: Into<Arc<str>>>(label: L, fragments: Vec<TheoreticalFragment>) -> Self {
        Self {
            label: label.into(),
            fragments: fragments.into_boxed_slice(),
        }
    }

    /// Build a series from raw `(neutral_mass, key)` tuples
    pub fn from_tuples<L, I, K>(label: L, tuples: I) -> Self
    where
        L: Into<Arc<str>>,
        I: IntoIterator<Item = (f64, K)>,
        K: Into<Arc<str>>,
    {
        Self::new(
            label,
            tuples
                .into_iter()
                .map(|(mass, key)| TheoreticalFragment::new(mass, key))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Theoretical fragment library for one hypothesis, plus the matches derived
/// from it once it has been run through a [`crate::matching::Matcher`]
#[derive(Clone, Debug, Default)]
pub struct IonSeriesSuite {
    series: Box<[FragmentSeries]>,
    matched: Option<Box<[MatchedSeries]>>,
}

impl IonSeriesSuite {
    pub fn new(series: Vec<FragmentSeries>) -> Self {
        Self {
            series: series.into_boxed_slice(),
            matched: None,
        }
    }

    pub fn series(&self) -> &[FragmentSeries] {
        &self.series
    }

    /// Matched series, parallel to [`IonSeriesSuite::series`]
    pub fn matched(&self) -> Option<&[MatchedSeries]> {
        self.matched.as_deref()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn fragment_count(&self) -> usize {
        self.series.iter().map(FragmentSeries::len).sum()
    }

    /// Register every series label of this suite
    pub fn register_ion_types(&self, index: &mut IonTypeIndex) {
        for series in self.series.iter() {
            index.register(&series.label);
        }
    }

    pub(crate) fn with_matches(&self, matched: Vec<MatchedSeries>) -> Self {
        assert_eq!(
            matched.len(),
            self.series.len(),
            "internal bug, matched suite is not parallel to theoretical suite"
        );
        Self {
            series: self.series.clone(),
            matched: Some(matched.into_boxed_slice()),
        }
    }

    pub fn into_matched(self) -> Option<Vec<MatchedSeries>> {
        self.matched.map(Vec::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_tuples() {
        let series = FragmentSeries::from_tuples("b", [(98.06, "b1"), (227.10, "b2")]);
        assert_eq!(&*series.label, "b");
        assert_eq!(series.len(), 2);
        assert_eq!(&*series.fragments[1].key, "b2");
    }

    #[test]
    fn suite_registers_labels() {
        let suite = IonSeriesSuite::new(vec![
            FragmentSeries::from_tuples("b", [(98.06, "b1")]),
            FragmentSeries::from_tuples("y", [(148.06, "y1"), (263.08, "y2")]),
            FragmentSeries::from_tuples("b", Vec::<(f64, &str)>::new()),
        ]);
        assert_eq!(suite.len(), 3);
        assert_eq!(suite.fragment_count(), 3);
        assert!(suite.matched().is_none());

        let mut index = IonTypeIndex::default();
        suite.register_ion_types(&mut index);
        assert_eq!(index.len(), 2);
        assert_eq!(index.slot("y"), Some(1));
    }

    #[test]
    fn deserialize() {
        let series: FragmentSeries = serde_json::from_str(
            r#"{"label": "oxonium_ion", "fragments": [{"neutral_mass": 203.0794, "key": "HexNAc"}]}"#,
        )
        .unwrap();
        assert_eq!(&*series.label, "oxonium_ion");
        assert_eq!(series.fragments[0].neutral_mass, 203.0794);
    }
}
