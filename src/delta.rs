//! Cumulative-to-monthly delta conversion.

use crate::error::Result;
use crate::parser::{CumulativeRow, CumulativeTable};
use crate::period::MonthWindow;

/// Differences consecutive cumulative readings.
///
/// `readings[0]` is the seed (the month before the window); the result has
/// one element fewer than the input. Decreases are passed through as
/// negative deltas.
pub fn monthly_deltas(readings: &[i64]) -> Vec<i64> {
    readings.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Monthly deltas of one table row over `window`, in month order.
pub fn row_deltas(table: &CumulativeTable, row: &CumulativeRow, window: &MonthWindow) -> Result<Vec<i64>> {
    let readings = table.readings(row, &window.date_keys())?;
    Ok(monthly_deltas(&readings))
}
