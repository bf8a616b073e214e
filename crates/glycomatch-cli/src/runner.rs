use super::input::{Search, SpectrumRecord};
use super::output::{RelationReport, ShiftReport, SpectrumReport};
use anyhow::Context;
use glycomatch_core::aggregate::MatchedSpectrum;
use glycomatch_core::feature::MatchingFeature;
use glycomatch_core::ion_series::IonSeriesSuite;
use glycomatch_core::ion_type::IonTypeIndex;
use glycomatch_core::matching::match_spectrum;
use glycomatch_core::relations::{estimate_offset_parameters, fit_feature};
use glycomatch_core::shift::find_shifted;
use log::info;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct Runner {
    pub parameters: Search,
    start: Instant,
}

/// Everything produced by one run, before it is written out
pub struct Outputs {
    pub spectra: Vec<MatchedSpectrum>,
    pub features: Vec<MatchingFeature>,
    pub shifts: Vec<ShiftReport>,
    pub relations: Vec<RelationReport>,
}

impl Runner {
    pub fn new(parameters: Search) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    fn read_spectra(&self) -> anyhow::Result<Vec<SpectrumRecord>> {
        let start = Instant::now();
        let spectra = self
            .parameters
            .spectra_paths
            .par_iter()
            .map(|path| {
                glycomatch_core::read_json::<_, Vec<SpectrumRecord>>(path)
                    .with_context(|| format!("Failed to read spectra from `{path}`"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        info!(
            "read {} spectra from {} files in {:#?}",
            spectra.len(),
            self.parameters.spectra_paths.len(),
            start.elapsed()
        );
        Ok(spectra)
    }

    /// Build a single ion type index covering every series label in the run,
    /// so that all feature accumulators are comparable
    fn ion_type_index(records: &[SpectrumRecord]) -> Arc<IonTypeIndex> {
        let mut index = IonTypeIndex::default();
        for record in records {
            for series in &record.series {
                index.register(&series.label);
            }
        }
        Arc::new(index)
    }

    pub fn match_spectra(&self, records: Vec<SpectrumRecord>) -> anyhow::Result<Vec<MatchedSpectrum>> {
        let start = Instant::now();
        let tolerance = self.parameters.tolerance;
        let minimum_intensity = self.parameters.minimum_intensity;
        let spectra = records
            .into_par_iter()
            .map(|record| {
                let catalog = Arc::new(record.catalog(minimum_intensity)?);
                let suite = IonSeriesSuite::new(record.series);
                let spectrum = match_spectrum(catalog, &suite, tolerance, record.context)?;
                Ok::<_, anyhow::Error>(spectrum)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let duration = start.elapsed().as_millis() as usize;
        let rate = spectra.len() * 1000 / (duration + 1);
        info!("- matching: {:8} ms ({} spectra/s)", duration, rate);
        Ok(spectra)
    }

    pub fn score_features(
        &self,
        index: Arc<IonTypeIndex>,
        spectra: &[MatchedSpectrum],
    ) -> anyhow::Result<Vec<MatchingFeature>> {
        let start = Instant::now();
        let mut features = self
            .parameters
            .features
            .iter()
            .cloned()
            .map(|builder| builder.make_feature(index.clone()))
            .collect::<Vec<_>>();
        for feature in &mut features {
            feature
                .score_spectra(spectra)
                .with_context(|| format!("Failed to score feature `{}`", feature.name))?;
        }
        info!(
            "- scoring: {:8} ms ({} features)",
            start.elapsed().as_millis(),
            features.len()
        );
        Ok(features)
    }

    /// For every configured mass shift, search each explained peak for
    /// partners at that shift
    pub fn count_shifts(&self, spectra: &[MatchedSpectrum]) -> anyhow::Result<Vec<ShiftReport>> {
        let tolerance = self.parameters.shift_tolerance;
        self.parameters
            .mass_shifts
            .iter()
            .map(|shift| {
                let (anchors, pairs) = spectra
                    .par_iter()
                    .map(|spectrum| {
                        let mut anchors = 0;
                        let mut pairs = 0;
                        for peak_id in spectrum.peak_match_map().keys() {
                            let found =
                                find_shifted(spectrum.catalog(), *peak_id, shift.shift, tolerance)?;
                            if !found.is_empty() {
                                anchors += 1;
                                pairs += found.len();
                            }
                        }
                        Ok::<_, glycomatch_core::Error>((anchors, pairs))
                    })
                    .try_reduce(|| (0, 0), |a, b| Ok((a.0 + b.0, a.1 + b.1)))
                    .with_context(|| format!("Failed to search mass shift `{}`", shift.name))?;
                log::trace!("mass shift `{}`: {} anchors, {} pairs", shift.name, anchors, pairs);
                Ok::<_, anyhow::Error>(ShiftReport {
                    name: shift.name.clone(),
                    shift: shift.shift,
                    anchors,
                    pairs,
                })
            })
            .collect()
    }

    /// Fit every offset feature against every requested ion series
    pub fn fit_relations(
        &self,
        features: &[MatchingFeature],
        spectra: &[MatchedSpectrum],
    ) -> Vec<RelationReport> {
        let parameters = self
            .parameters
            .relation_kinds
            .iter()
            .map(|kind| estimate_offset_parameters(spectra, kind))
            .collect::<Vec<_>>();

        let mut reports = Vec::new();
        for feature in features.iter().filter(|f| f.offset != 0.0) {
            for (kind, parameters) in self.parameters.relation_kinds.iter().zip(&parameters) {
                let fitted = fit_feature(spectra, feature, kind, self.parameters.minimum_intensity);
                reports.push(RelationReport::new(&fitted, *parameters));
            }
        }
        reports
    }

    // Create a path for `file_name` in the specified output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn process(&self) -> anyhow::Result<Outputs> {
        let records = self.read_spectra()?;
        let index = Self::ion_type_index(&records);
        let spectra = self.match_spectra(records)?;
        let features = self.score_features(index, &spectra)?;
        let shifts = self.count_shifts(&spectra)?;
        let relations = self.fit_relations(&features, &spectra);
        Ok(Outputs {
            spectra,
            features,
            shifts,
            relations,
        })
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let outputs = self.process()?;

        let explained = outputs
            .spectra
            .iter()
            .map(|s| s.peaks_explained)
            .sum::<usize>();
        let total = outputs
            .spectra
            .iter()
            .map(|s| s.catalog().len())
            .sum::<usize>();
        info!(
            "explained {} of {} peaks across {} spectra",
            explained,
            total,
            outputs.spectra.len()
        );

        let spectra = outputs
            .spectra
            .iter()
            .map(SpectrumReport::from)
            .collect::<Vec<_>>();
        let path = self.write_json("matches.json", &spectra)?;
        self.parameters.output_paths.push(path);

        let features = outputs
            .features
            .iter()
            .map(MatchingFeature::statistics)
            .collect::<Vec<_>>();
        let path = self.write_json("features.json", &features)?;
        self.parameters.output_paths.push(path);

        if !outputs.shifts.is_empty() {
            let path = self.write_json("shifts.json", &outputs.shifts)?;
            self.parameters.output_paths.push(path);
        }
        if !outputs.relations.is_empty() {
            let path = self.write_json("relations.json", &outputs.relations)?;
            self.parameters.output_paths.push(path);
        }

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);
        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {:#?}", self.start.elapsed());
        Ok(self.parameters)
    }
}
