use anyhow::{ensure, Context};
use clap::ArgMatches;
use glycomatch_core::{
    aggregate::SpectrumContext,
    feature::FeatureBuilder,
    ion_series::FragmentSeries,
    mass::Tolerance,
    spectrum::{intensity_rank, Peak, PeakCatalog},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
/// A named diagnostic mass difference, e.g. the loss of a HexNAc residue
pub struct MassShift {
    pub name: String,
    pub shift: f64,
}

#[derive(Serialize)]
/// Actual search parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub tolerance: Tolerance,
    pub shift_tolerance: Tolerance,
    pub features: Vec<FeatureBuilder>,
    pub mass_shifts: Vec<MassShift>,
    pub relation_kinds: Vec<String>,
    pub minimum_intensity: f32,
    pub spectra_paths: Vec<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input search parameters deserialized from JSON file
pub struct Input {
    tolerance: Option<Tolerance>,
    shift_tolerance: Option<Tolerance>,
    features: Option<Vec<FeatureBuilder>>,
    mass_shifts: Option<Vec<MassShift>>,
    relation_kinds: Option<Vec<String>>,
    minimum_intensity: Option<f32>,
    spectra_paths: Option<Vec<String>>,
    output_directory: Option<String>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .expect("required parameters");
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(spectra_paths) = matches.get_many::<String>("spectra_paths") {
            log::trace!("overriding `spectra_paths` parameter.");
            input.spectra_paths = Some(spectra_paths.into_iter().map(|p| p.into()).collect());
        }

        ensure!(
            input.spectra_paths.is_some(),
            "`spectra_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        glycomatch_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let tolerance = self.tolerance.unwrap_or(Tolerance::Da(0.02));
        let tolerance = tolerance
            .validate()
            .context("`tolerance` must be positive")?;
        if let Tolerance::Da(da) = tolerance {
            if da > 0.5 {
                log::warn!("`tolerance` of {} Da is wider than expected", da);
            }
        }
        let shift_tolerance = self
            .shift_tolerance
            .unwrap_or(tolerance)
            .validate()
            .context("`shift_tolerance` must be positive")?;

        let mass_shifts = self.mass_shifts.unwrap_or_default();
        for shift in &mass_shifts {
            if shift.shift == 0.0 {
                log::warn!(
                    "mass shift `{}` is zero, it will only pair peaks of equal mass",
                    shift.name
                );
            }
        }

        let minimum_intensity = self.minimum_intensity.unwrap_or(0.0);
        ensure!(
            minimum_intensity >= 0.0,
            "`minimum_intensity` must not be negative"
        );

        let spectra_paths = self.spectra_paths.unwrap_or_default();
        ensure!(
            !spectra_paths.is_empty(),
            "`spectra_paths` must contain at least one file"
        );

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("Failed to create `{}`", path.display()))?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            tolerance,
            shift_tolerance,
            features: self.features.unwrap_or_default(),
            mass_shifts,
            relation_kinds: self.relation_kinds.unwrap_or_default(),
            minimum_intensity,
            spectra_paths,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[derive(Deserialize, Clone, Debug)]
/// One observed peak, as written by upstream spectrum processing
pub struct PeakRecord {
    pub neutral_mass: f64,
    pub charge: i32,
    pub intensity: f32,
    pub id: i64,
    pub rank: Option<i32>,
}

#[derive(Deserialize, Clone, Debug)]
/// One spectrum and the theoretical fragments of the hypothesis it is matched
/// against
pub struct SpectrumRecord {
    #[serde(flatten)]
    pub context: SpectrumContext,
    pub peaks: Vec<PeakRecord>,
    #[serde(default)]
    pub series: Vec<FragmentSeries>,
}

impl SpectrumRecord {
    /// Build the peak catalog of this spectrum. If any peak lacks a rank,
    /// every peak is re-ranked by intensity.
    pub fn catalog(&self, minimum_intensity: f32) -> anyhow::Result<PeakCatalog> {
        let mut peaks = self
            .peaks
            .iter()
            .map(|p| {
                Peak::new(p.neutral_mass, p.charge, p.intensity, p.id).with_rank(p.rank.unwrap_or(0))
            })
            .collect::<Vec<_>>();
        if self.peaks.iter().any(|p| p.rank.is_none()) {
            intensity_rank(&mut peaks, minimum_intensity);
        }
        PeakCatalog::new(peaks)
            .with_context(|| format!("Invalid peaks in spectrum {}", self.context.spectrum_id))
    }
}
