//! End-to-end matching of a small glycopeptide spectrum

use glycomatch_core::aggregate::SpectrumContext;
use glycomatch_core::feature::FeatureBuilder;
use glycomatch_core::ion_series::{FragmentSeries, IonSeriesSuite};
use glycomatch_core::ion_type::IonTypeIndex;
use glycomatch_core::mass::Tolerance;
use glycomatch_core::matching::match_spectrum;
use glycomatch_core::shift::find_shifted;
use glycomatch_core::spectrum::{Peak, PeakCatalog};
use glycomatch_core::Error;
use quickcheck_macros::quickcheck;
use std::sync::Arc;

fn catalog() -> Arc<PeakCatalog> {
    Arc::new(
        PeakCatalog::new(vec![
            Peak::new(100.0, 1, 1000.0, 1).with_rank(1),
            Peak::new(204.09, 2, 500.0, 2).with_rank(2),
        ])
        .unwrap(),
    )
}

fn suite() -> IonSeriesSuite {
    IonSeriesSuite::new(vec![FragmentSeries::from_tuples("b", [(100.001, "b1")])])
}

#[test]
fn integration() -> Result<(), Error> {
    let catalog = catalog();
    let suite = suite();
    let context = SpectrumContext {
        identity: "NGTK".into(),
        spectrum_id: 1,
        ..Default::default()
    };

    let spectrum = match_spectrum(catalog.clone(), &suite, Tolerance::Da(0.01), context)?;
    assert_eq!(spectrum.matches().len(), 1);
    assert_eq!(spectrum.matches()[0].peak_id, 1);
    assert_eq!(spectrum.peaks_explained, 1);
    assert_eq!(spectrum.peaks_unexplained, 1);

    let shifted = find_shifted(&catalog, 1, 104.09, Tolerance::Da(0.01))?;
    assert_eq!(shifted.peaks.len(), 1);
    assert_eq!(shifted.peaks[0].id, 2);

    let mut index = IonTypeIndex::default();
    suite.register_ion_types(&mut index);
    let mut feature = FeatureBuilder {
        from_charge: Some(1),
        to_charge: Some(1),
        ..Default::default()
    }
    .make_feature(Arc::new(index));
    feature.score(&spectrum)?;

    let stats = feature.statistics();
    assert_eq!(stats.matches["b"], 1.0);
    assert_eq!(stats.totals["b"], 1.0);
    Ok(())
}

#[test]
fn matching_is_idempotent() -> Result<(), Error> {
    let catalog = catalog();
    let suite = suite();

    let first = match_spectrum(
        catalog.clone(),
        &suite,
        Tolerance::Da(0.01),
        SpectrumContext::default(),
    )?;
    let second = match_spectrum(catalog, &suite, Tolerance::Da(0.01), SpectrumContext::default())?;

    assert_eq!(first.matches(), second.matches());
    assert_eq!(first.series(), second.series());
    assert_eq!(
        serde_json::to_string(&first)?,
        serde_json::to_string(&second)?
    );
    Ok(())
}

#[test]
fn empty_inputs_are_not_errors() -> Result<(), Error> {
    let empty = Arc::new(PeakCatalog::new(Vec::new())?);
    let spectrum = match_spectrum(
        empty.clone(),
        &suite(),
        Tolerance::Ppm(10.0),
        SpectrumContext::default(),
    )?;
    assert!(spectrum.matches().is_empty());
    assert_eq!(spectrum.series().len(), 1);
    assert_eq!(spectrum.peaks_explained + spectrum.peaks_unexplained, 0);

    let spectrum = match_spectrum(
        catalog(),
        &IonSeriesSuite::default(),
        Tolerance::Da(0.01),
        SpectrumContext::default(),
    )?;
    assert!(spectrum.series().is_empty());
    assert_eq!(spectrum.peaks_unexplained, 2);
    Ok(())
}

#[test]
fn non_positive_tolerances_are_rejected() {
    for tolerance in [Tolerance::Da(0.0), Tolerance::Da(-0.5), Tolerance::Ppm(f64::NAN)] {
        let result = match_spectrum(catalog(), &suite(), tolerance, SpectrumContext::default());
        assert!(matches!(result, Err(Error::ToleranceNonPositive(_))));
    }
}

#[test]
fn charge_window_excludes_matched_peaks() -> Result<(), Error> {
    let suite = IonSeriesSuite::new(vec![FragmentSeries::from_tuples(
        "b",
        [(100.001, "b1"), (204.09, "b2")],
    )]);
    let spectrum = match_spectrum(catalog(), &suite, Tolerance::Da(0.01), SpectrumContext::default())?;
    assert_eq!(spectrum.peaks_explained, 2);

    let mut feature = FeatureBuilder {
        from_charge: Some(1),
        to_charge: Some(1),
        ..Default::default()
    }
    .make_feature(Arc::new(IonTypeIndex::from_names(["b"])));
    feature.score(&spectrum)?;
    assert_eq!(feature.ion_type_matches().get("b")?, 1.0);
    assert_eq!(feature.ion_type_totals().get("b")?, 2.0);
    Ok(())
}

#[quickcheck]
fn explained_and_unexplained_cover_catalog(peaks: Vec<u16>, fragments: Vec<u16>) -> bool {
    let catalog = Arc::new(
        PeakCatalog::from_tuples(
            peaks
                .iter()
                .enumerate()
                .map(|(id, &m)| (m as f64 / 10.0, 1, 1.0, id as i64)),
        )
        .unwrap(),
    );
    let suite = IonSeriesSuite::new(vec![FragmentSeries::from_tuples(
        "y",
        fragments
            .iter()
            .enumerate()
            .map(|(i, &m)| (m as f64 / 10.0, format!("y{}", i))),
    )]);
    let spectrum = match_spectrum(
        catalog.clone(),
        &suite,
        Tolerance::Da(0.25),
        SpectrumContext::default(),
    )
    .unwrap();
    spectrum.peaks_explained + spectrum.peaks_unexplained == catalog.len()
        && spectrum.peaks_explained <= spectrum.matches().len()
}
