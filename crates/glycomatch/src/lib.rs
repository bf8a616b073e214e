pub mod aggregate;
pub mod feature;
pub mod ion_series;
pub mod ion_type;
pub mod mass;
pub mod matching;
pub mod relations;
pub mod shift;
pub mod spectrum;

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown ion type `{0}`")]
    UnknownIonType(String),
    #[error("fragment match references peak {peak_id}, which is absent from the peak catalog")]
    InconsistentCatalog { peak_id: i64 },
    #[error("tolerance must be positive, got {0}")]
    ToleranceNonPositive(f64),
    #[error("duplicate peak id {0} in peak catalog")]
    DuplicatePeakId(i64),
    #[error("peak {0} has a non-finite neutral mass")]
    NonFiniteMass(i64),
    #[error("no peak with id {0} in peak catalog")]
    UnknownPeak(i64),
    #[error("ion type accumulators are bound to different ion type indices")]
    IndexMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
