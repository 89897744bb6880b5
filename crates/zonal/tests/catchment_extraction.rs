//! Registry loading and extraction over on-disk catchment fixtures.

use test_utils::{ramp_grid, write_catchments, CHILE_BASINS};
use zonal::{extract, CatchmentRegistry, Reducer, ZonalError};

#[test]
fn test_registry_keeps_feature_order() {
    let dir = test_utils::scratch_dir();
    let path = write_catchments(dir.path(), &CHILE_BASINS, "gauge_id");

    let registry = CatchmentRegistry::load(&path, "gauge_id").unwrap();

    assert_eq!(registry.ids(), vec!["1001", "1002", "1003"]);
}

#[test]
fn test_wrong_id_property_is_rejected() {
    let dir = test_utils::scratch_dir();
    let path = write_catchments(dir.path(), &CHILE_BASINS, "gauge_id");

    let err = CatchmentRegistry::load(&path, "id").unwrap_err();

    assert!(matches!(err, ZonalError::MissingId { index: 0, .. }));
}

#[test]
fn test_extract_over_scene() {
    let dir = test_utils::scratch_dir();
    let path = write_catchments(dir.path(), &CHILE_BASINS, "id");
    let registry = CatchmentRegistry::load(&path, "id").unwrap();

    // 4x4 cells of 0.5 degrees over (-72..-70, -34..-32)
    let grid = ramp_grid(4, 4, (-72.0, -32.0), 0.5);
    let table = extract(&grid, &registry, Reducer::Mean);

    // 1001 holds 8, 9, 12, 13 and 1002 holds 2, 3, 6, 7; halves round away from zero
    assert_eq!(table.values(), vec![Some(11), Some(5), None]);
    assert_eq!(table.fractions(), vec![Some(1000), Some(1000), None]);
}
