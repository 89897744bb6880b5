//! Appending extraction results to paired value / valid-fraction stores.

use chrono::NaiveDate;
use tracing::{info, warn};

use zonal::ZonalTable;

use crate::error::{StoreError, StoreResult};
use crate::store::{column_mismatch, StoreRow, TimeSeriesStore};

/// Which column of a [`ZonalTable`] a store receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Value,
    Fraction,
}

/// Build the row for `column` after checking the table against `catchment_ids`
/// and the store header.
fn prepare_row(
    store: &TimeSeriesStore,
    table: &ZonalTable,
    catchment_ids: &[String],
    scene_id: &str,
    date: NaiveDate,
    column: Column,
) -> StoreResult<StoreRow> {
    if let Some(detail) = column_mismatch(catchment_ids, &table.ids()) {
        return Err(StoreError::ColumnOrder {
            path: store.path().to_path_buf(),
            detail,
        });
    }
    store.check_columns(catchment_ids)?;

    if store.contains_scene(scene_id) {
        return Err(StoreError::AlreadyRecorded {
            path: store.path().to_path_buf(),
            scene_id: scene_id.to_string(),
        });
    }

    let cells = match column {
        Column::Value => table.values(),
        Column::Fraction => table.fractions(),
    };
    Ok(StoreRow {
        scene_id: scene_id.to_string(),
        date: date.format("%Y-%m-%d").to_string(),
        cells,
    })
}

/// Append one column of `table` as a row of `store`.
pub fn append_extraction(
    store: &mut TimeSeriesStore,
    table: &ZonalTable,
    catchment_ids: &[String],
    scene_id: &str,
    date: NaiveDate,
    column: Column,
) -> StoreResult<()> {
    let row = prepare_row(store, table, catchment_ids, scene_id, date, column)
        .map_err(|e| {
            warn!(scene = %scene_id, error = %e, "Row rejected");
            e
        })?;
    let mut file = store.appender()?;
    store.append_with(&mut file, row)
}

/// Append the value row and the valid-fraction row of one extraction.
///
/// Both rows are validated and both files opened before either line is
/// written, so a rejected extraction touches neither store.
pub fn append_pair(
    values: &mut TimeSeriesStore,
    fractions: &mut TimeSeriesStore,
    table: &ZonalTable,
    catchment_ids: &[String],
    scene_id: &str,
    date: NaiveDate,
) -> StoreResult<()> {
    let checked = prepare_row(values, table, catchment_ids, scene_id, date, Column::Value)
        .and_then(|v| {
            prepare_row(fractions, table, catchment_ids, scene_id, date, Column::Fraction)
                .map(|f| (v, f))
        });
    let (value_row, fraction_row) = match checked {
        Ok(rows) => rows,
        Err(e) => {
            warn!(scene = %scene_id, error = %e, "Inconsistencies with catchment ids, rows not written");
            return Err(e);
        }
    };

    let mut value_file = values.appender()?;
    let mut fraction_file = fractions.appender()?;
    values.append_with(&mut value_file, value_row)?;
    fractions.append_with(&mut fraction_file, fraction_row)?;

    info!(
        scene = %scene_id,
        values = %values.path().display(),
        fractions = %fractions.path().display(),
        "Appended extraction"
    );
    Ok(())
}
