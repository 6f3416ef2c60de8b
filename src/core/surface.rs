//! Volatility Matrix
//!
//! Implied volatility tabulated on a strike × expiration grid.
//! Rows are strikes (ascending), columns are expirations (ascending).
//! Every cell of a built matrix holds a valid implied vol:
//! - columns with no value at all are dropped first
//! - rows with any remaining gap are dropped second

use chrono::NaiveDate;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::quote::{IvSource, QuoteTable};

const STRIKE_TOLERANCE: f64 = 1e-9;

/// Dense implied volatility matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolMatrix {
    /// Row axis: strikes, ascending
    pub strikes: Vec<f64>,
    /// Column axis: expirations, ascending
    pub expiries: Vec<NaiveDate>,
    /// Vol grid [strike, expiry] -> vol
    pub vols: Array2<f64>,
}

impl VolMatrix {
    /// Pivot a quote table onto the filtered strike list
    ///
    /// Each distinct expiration in the table becomes a column. A
    /// (strike, expiration) pair with no quote row, or whose chosen vol is
    /// missing, is a gap rather than zero.
    pub fn from_quotes(table: &QuoteTable, strikes: &[f64], source: IvSource) -> Self {
        let mut strikes = strikes.to_vec();
        strikes.sort_by(|a, b| a.total_cmp(b));
        strikes.dedup_by(|a, b| (*a - *b).abs() < STRIKE_TOLERANCE);

        let expiries = table.expiries();
        let mut grid: Array2<Option<f64>> = Array2::from_elem((strikes.len(), expiries.len()), None);

        for row in &table.rows {
            let Some(si) = strikes.iter().position(|s| (s - row.strike).abs() < STRIKE_TOLERANCE) else {
                continue;
            };
            let Ok(ei) = expiries.binary_search(&row.expiry) else {
                continue;
            };

            let cell = &mut grid[[si, ei]];
            if cell.is_none() {
                *cell = row.iv(source);
            }
        }

        Self::from_sparse(strikes, expiries, grid)
    }

    /// Apply the drop rules to a sparse grid
    ///
    /// `strikes` and `expiries` must already be ascending and match the
    /// grid's shape.
    pub fn from_sparse(
        strikes: Vec<f64>,
        expiries: Vec<NaiveDate>,
        grid: Array2<Option<f64>>,
    ) -> Self {
        // Columns that are entirely missing
        let keep_cols: Vec<usize> = (0..expiries.len())
            .filter(|&ei| grid.column(ei).iter().any(|v| v.is_some()))
            .collect();

        // Rows with any gap among the surviving columns
        let keep_rows: Vec<usize> = (0..strikes.len())
            .filter(|&si| keep_cols.iter().all(|&ei| grid[[si, ei]].is_some()))
            .collect();

        tracing::debug!(
            "Matrix {}x{} -> {}x{} after dropping empty expirations and incomplete strikes",
            strikes.len(),
            expiries.len(),
            keep_rows.len(),
            keep_cols.len()
        );

        if keep_rows.is_empty() || keep_cols.is_empty() {
            return Self::empty();
        }

        let dense = grid
            .select(Axis(0), &keep_rows)
            .select(Axis(1), &keep_cols)
            .mapv(|v| v.unwrap_or(f64::NAN));

        Self {
            strikes: keep_rows.iter().map(|&i| strikes[i]).collect(),
            expiries: keep_cols.iter().map(|&i| expiries[i]).collect(),
            vols: dense,
        }
    }

    pub fn empty() -> Self {
        Self {
            strikes: Vec::new(),
            expiries: Vec::new(),
            vols: Array2::zeros((0, 0)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty() || self.expiries.is_empty()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.strikes.len(), self.expiries.len())
    }

    /// Vol at an exact grid point
    pub fn get(&self, strike: f64, expiry: NaiveDate) -> Option<f64> {
        let si = self.strikes.iter().position(|s| (s - strike).abs() < STRIKE_TOLERANCE)?;
        let ei = self.expiries.binary_search(&expiry).ok()?;
        Some(self.vols[[si, ei]])
    }

    /// All cells as (strike, expiry, vol), expiration-major
    pub fn cells(&self) -> impl Iterator<Item = (f64, NaiveDate, f64)> + '_ {
        self.expiries.iter().enumerate().flat_map(move |(ei, &expiry)| {
            self.strikes
                .iter()
                .enumerate()
                .map(move |(si, &strike)| (strike, expiry, self.vols[[si, ei]]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn test_drop_rules() {
        let strikes = vec![90.0, 95.0, 100.0];
        let expiries = vec![d(1, 19), d(2, 16), d(3, 15)];

        // Column 2 is empty; strike 95 has a gap in column 1
        let grid = ndarray::array![
            [Some(0.25), Some(0.24), None],
            [Some(0.22), None, None],
            [Some(0.20), Some(0.21), None],
        ];

        let m = VolMatrix::from_sparse(strikes, expiries, grid);
        assert_eq!(m.strikes, vec![90.0, 100.0]);
        assert_eq!(m.expiries, vec![d(1, 19), d(2, 16)]);
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.get(100.0, d(2, 16)), Some(0.21));
        assert_eq!(m.get(95.0, d(2, 16)), None);
        assert!(m.vols.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_all_missing_is_empty() {
        let grid = Array2::from_elem((2, 2), None);
        let m = VolMatrix::from_sparse(vec![1.0, 2.0], vec![d(1, 19), d(2, 16)], grid);
        assert!(m.is_empty());
        assert_eq!(m.cells().count(), 0);
    }

    #[test]
    fn test_cells_order() {
        let grid = ndarray::array![[Some(0.3), Some(0.4)], [Some(0.5), Some(0.6)]];
        let m = VolMatrix::from_sparse(vec![10.0, 20.0], vec![d(1, 19), d(2, 16)], grid);

        let cells: Vec<_> = m.cells().collect();
        assert_eq!(cells[0], (10.0, d(1, 19), 0.3));
        assert_eq!(cells[1], (20.0, d(1, 19), 0.5));
        assert_eq!(cells[2], (10.0, d(2, 16), 0.4));
        assert_eq!(cells.len(), 4);
    }
}
