use anyhow::Context;
use glycomatch_core::aggregate::{MatchedSpectrum, SpectrumContext};
use glycomatch_core::relations::{probability_of_peak_explained, FittedFeature, OffsetParameters};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::runner::Runner;

/// Per-spectrum match summary, one entry of `matches.json`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SpectrumReport {
    #[serde(flatten)]
    pub context: SpectrumContext,
    pub peaks_explained: usize,
    pub peaks_unexplained: usize,
    pub explained_intensity: f32,
    pub total_intensity: f32,
    /// Series label -> (fragments matched, fragments in series)
    pub series: BTreeMap<String, (usize, usize)>,
}

impl From<&MatchedSpectrum> for SpectrumReport {
    fn from(spectrum: &MatchedSpectrum) -> Self {
        let mut series = BTreeMap::new();
        for s in spectrum.series() {
            let entry = series.entry(s.label.to_string()).or_insert((0, 0));
            entry.0 += s.fragments_matched();
            entry.1 += s.theoretical;
        }
        Self {
            context: spectrum.context.clone(),
            peaks_explained: spectrum.peaks_explained,
            peaks_unexplained: spectrum.peaks_unexplained,
            explained_intensity: spectrum.explained_intensity(),
            total_intensity: spectrum.catalog().total_intensity(),
            series,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ShiftReport {
    pub name: String,
    pub shift: f64,
    /// Explained peaks with at least one partner at the shift
    pub anchors: usize,
    pub pairs: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RelationReport {
    pub feature: String,
    pub kind: String,
    pub on_kind: f64,
    pub off_kind: f64,
    pub relations: usize,
    /// Estimated over every matched spectrum for `kind`
    pub parameters: OffsetParameters,
    /// Probability that a peak of series `kind` is explained
    pub posterior: f64,
    pub charge_pairs: Vec<((i32, i32), usize)>,
}

impl RelationReport {
    pub fn new(fitted: &FittedFeature, parameters: OffsetParameters) -> Self {
        Self {
            feature: fitted.name.clone(),
            kind: fitted.kind.to_string(),
            on_kind: fitted.on_kind,
            off_kind: fitted.off_kind,
            relations: fitted.peak_relations(true).count(),
            parameters,
            posterior: probability_of_peak_explained(
                parameters.alpha,
                parameters.beta,
                parameters.prior,
            ),
            charge_pairs: fitted.charge_relations().into_iter().collect(),
        }
    }
}

impl Runner {
    /// Serialize `value` as pretty JSON into `file_name` within the output
    /// directory, returning the path written
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> anyhow::Result<String> {
        let path = self.make_path(file_name);
        let bytes = serde_json::to_vec_pretty(value)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        log::trace!("wrote {}", path.display());
        Ok(path.display().to_string())
    }
}
