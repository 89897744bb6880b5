//! Stores across process restarts: create, append, reopen.

use std::fs;

use chrono::NaiveDate;
use ts_store::{append_pair, StoreError, TimeSeriesStore};
use zonal::{ZonalRecord, ZonalTable};

fn ids() -> Vec<String> {
    ["1001", "1002", "1003"].iter().map(|s| s.to_string()).collect()
}

fn table(values: [Option<i64>; 3], fractions: [Option<i64>; 3]) -> ZonalTable {
    ZonalTable {
        records: ids()
            .into_iter()
            .zip(values.into_iter().zip(fractions))
            .map(|(id, (value, valid_fraction))| ZonalRecord {
                id,
                value,
                valid_fraction,
            })
            .collect(),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 4, d).unwrap()
}

#[test]
fn test_reopened_store_keeps_rows_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let vp = dir.path().join("ndvi").join("values.csv");
    let fp = dir.path().join("ndvi").join("fractions.csv");

    {
        let mut v = TimeSeriesStore::open_or_create(&vp, &ids()).unwrap();
        let mut f = TimeSeriesStore::open_or_create(&fp, &ids()).unwrap();
        let t = table([Some(10), None, Some(-3)], [Some(1000), Some(0), Some(250)]);
        append_pair(&mut v, &mut f, &t, &ids(), "A2020100", day(9)).unwrap();
    }

    let mut v = TimeSeriesStore::open_or_create(&vp, &ids()).unwrap();
    let mut f = TimeSeriesStore::open_or_create(&fp, &ids()).unwrap();
    assert_eq!(v.scene_ids(), vec!["A2020100"]);
    assert_eq!(v.rows()[0].cells, vec![Some(10), None, Some(-3)]);

    let t = table([Some(11), Some(2), None], [Some(1000), Some(500), Some(0)]);
    append_pair(&mut v, &mut f, &t, &ids(), "A2020108", day(17)).unwrap();

    let text = fs::read_to_string(&vp).unwrap();
    assert_eq!(
        text,
        "name_id,date,1001,1002,1003\n\
         A2020100,2020-04-09,10,NA,-3\n\
         A2020108,2020-04-17,11,2,NA\n"
    );

    let summary = TimeSeriesStore::open(&fp).unwrap().summary();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.first_scene.as_deref(), Some("A2020100"));
    assert_eq!(summary.last_scene.as_deref(), Some("A2020108"));
}

#[test]
fn test_legacy_decimal_cells_are_rounded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.csv");
    fs::write(
        &path,
        "name_id,date,1001,1002,1003\nA2019001,2019-01-01,12.6,,NA\n",
    )
    .unwrap();

    let store = TimeSeriesStore::open(&path).unwrap();

    assert_eq!(store.rows()[0].cells, vec![Some(13), None, None]);
}

#[test]
fn test_short_row_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.csv");
    fs::write(&path, "name_id,date,1001,1002\nA2019001,2019-01-01,1\n").unwrap();

    let err = TimeSeriesStore::open(&path).unwrap_err();

    assert!(matches!(err, StoreError::MalformedRow { line: 2, .. }));
}
