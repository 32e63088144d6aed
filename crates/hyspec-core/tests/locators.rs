mod common;

use std::path::Path;

use common::{MemoryLoader, SCAN, assert_all_close, cube_from_fn, manager_with_scan};
use hyspec_core::annotation::{AnnotatedObject, Contour, Rect, WHITE_REFERENCE_LABEL};
use hyspec_core::locator::{GenericLocator, LocatorOutput};
use hyspec_core::{Algorithm, ContourSet, ReferenceKind, ReferenceLocator, SpectralCube, Stage};

/// Generic locator that hands back an annotation object instead of a path.
#[derive(Debug)]
struct ObjectLocator;

impl GenericLocator for ObjectLocator {
    fn locate(&self) -> hyspec_core::Result<Option<LocatorOutput>> {
        Ok(Some(LocatorOutput::Object(AnnotatedObject {
            label: "white_reference".into(),
            polygon: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
            bbox: Rect::new(0, 0, 1, 1),
        })))
    }
}

fn patched_scan() -> SpectralCube {
    cube_from_fn((4, 4, 2), |y, x, _| if y < 2 && x < 2 { 5.0 } else { 10.0 })
}

#[test]
fn file_pattern_locator_loads_sibling_reference() {
    let loader = MemoryLoader::default().with("/scans/leaf_white.json", SpectralCube::filled(3, 3, 2, 2.0));
    let mut manager = manager_with_scan(SpectralCube::filled(4, 4, 2, 4.0), loader);
    manager.set_locator(
        ReferenceKind::White,
        Some(ReferenceLocator::file_pattern("{dir}/{name}_white.{ext}").unwrap()),
    );
    manager.set_method(ReferenceKind::White, Some(Algorithm::Average));

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::WhiteReferenceDataInitialized), Some(true));
    assert_eq!(outcome.get(Stage::WhiteReferenceApplied), Some(true));
    assert_eq!(
        manager.reference_file(ReferenceKind::White),
        Some(Path::new("/scans/leaf_white.json"))
    );
    assert_all_close(manager.normalized().unwrap(), 2.0);
}

#[test]
fn missing_located_file_aborts() {
    let mut manager = manager_with_scan(SpectralCube::filled(2, 2, 1, 1.0), MemoryLoader::default());
    manager.set_locator(
        ReferenceKind::Black,
        Some(ReferenceLocator::file_pattern("{dir}/dark_{name}.{ext}").unwrap()),
    );

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::BlackReferenceDataInitialized), Some(false));
    assert_eq!(outcome.get(Stage::WhiteReferenceDataInitialized), None);
    assert_eq!(outcome.get(Stage::DimensionsDiffer), None);
    assert!(manager.normalized().is_none());
}

#[test]
fn annotation_locator_binds_in_scan_rectangle() {
    let mut manager = manager_with_scan(patched_scan(), MemoryLoader::default());
    manager.set_contours(ContourSet::new(vec![Contour::from_rect(
        WHITE_REFERENCE_LABEL,
        Rect::new(0, 0, 2, 2),
    )]));
    manager.set_locator(
        ReferenceKind::White,
        Some(ReferenceLocator::annotation_label(WHITE_REFERENCE_LABEL).unwrap()),
    );
    manager.set_method(ReferenceKind::White, Some(Algorithm::AnnotationAverage));

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::WhiteReferenceDataInitialized), Some(true));
    assert_eq!(outcome.get(Stage::WhiteReferenceApplied), Some(true));
    assert_eq!(
        manager.reference_annotation(ReferenceKind::White),
        Some((Rect::new(0, 0, 2, 2), true))
    );
    let normalized = manager.normalized().unwrap();
    assert_eq!(normalized.data[[1, 1, 0]], 1.0);
    assert_eq!(normalized.data[[2, 2, 1]], 2.0);
}

#[test]
fn locator_finding_nothing_does_not_abort() {
    let mut manager = manager_with_scan(patched_scan(), MemoryLoader::default());
    manager.set_locator(
        ReferenceKind::Black,
        Some(ReferenceLocator::annotation_label("black_reference").unwrap()),
    );
    manager.set_locator(ReferenceKind::White, Some(ReferenceLocator::manual()));

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::BlackReferenceDataInitialized), Some(false));
    assert_eq!(outcome.get(Stage::WhiteReferenceDataInitialized), Some(false));
    assert_eq!(outcome.get(Stage::DimensionsDiffer), Some(false));
    assert!(manager.normalized().is_some());
}

#[test]
fn generic_locator_path_is_loaded() {
    let loader = MemoryLoader::default().with("/refs/dark.json", SpectralCube::filled(1, 1, 2, 1.0));
    let mut manager = manager_with_scan(SpectralCube::filled(2, 2, 2, 3.0), loader);
    manager.set_locator(ReferenceKind::Black, Some(ReferenceLocator::fixed("/refs/dark.json").unwrap()));
    manager.set_method(ReferenceKind::Black, Some(Algorithm::Average));

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::BlackReferenceDataInitialized), Some(true));
    assert_all_close(manager.normalized().unwrap(), 2.0);
}

#[test]
fn generic_locator_object_output_is_unsupported() {
    let mut manager = manager_with_scan(SpectralCube::filled(2, 2, 2, 3.0), MemoryLoader::default());
    manager.set_locator(ReferenceKind::White, Some(ReferenceLocator::Generic(Box::new(ObjectLocator))));

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::WhiteReferenceDataInitialized), Some(false));
    assert_eq!(outcome.get(Stage::DimensionsDiffer), None);
    assert!(manager.normalized().is_none());
}

#[test]
fn explicit_reference_skips_locator() {
    let mut manager = manager_with_scan(SpectralCube::filled(2, 2, 2, 3.0), MemoryLoader::default());
    manager.set_locator(ReferenceKind::Black, Some(ReferenceLocator::fixed("/refs/absent.json").unwrap()));
    manager.set_reference_data(ReferenceKind::Black, Some(SpectralCube::filled(2, 2, 2, 1.0)));
    manager.set_method(ReferenceKind::Black, Some(Algorithm::SameSize));

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::BlackReferenceDataInitialized), None);
    assert_eq!(outcome.get(Stage::BlackReferenceApplied), Some(true));
    assert_all_close(manager.normalized().unwrap(), 2.0);
}

#[test]
fn new_scan_forgets_located_reference() {
    let loader = MemoryLoader::default().with("/scans/leaf_white.json", SpectralCube::filled(1, 1, 2, 2.0));
    let mut manager = manager_with_scan(SpectralCube::filled(2, 2, 2, 4.0), loader);
    manager.set_locator(
        ReferenceKind::White,
        Some(ReferenceLocator::file_pattern("{dir}/{name}_white.{ext}").unwrap()),
    );
    manager.calc_norm_data();
    assert!(manager.reference_data(ReferenceKind::White).is_some());

    assert_eq!(manager.load_scan(SCAN), None);
    assert!(manager.reference_data(ReferenceKind::White).is_none());
    assert!(manager.reference_file(ReferenceKind::White).is_none());

    let outcome = manager.calc_norm_data();
    assert_eq!(outcome.get(Stage::WhiteReferenceDataInitialized), Some(true));
}
