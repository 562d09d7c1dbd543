//! Per-feature standardization fitted on the training distribution.

use serde::{Deserialize, Serialize};

/// Mean/variance scaler. `transform` computes `(x - mean) / scale`.
///
/// Uses the population standard deviation. A zero-variance column gets a
/// scale of 1.0 so it maps to 0 instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a row-major matrix.
    ///
    /// # Errors
    /// Returns a message if the matrix is empty, ragged or contains a
    /// non-finite value.
    pub fn fit<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, String> {
        let first = rows.first().ok_or("cannot fit scaler on an empty matrix")?;
        let width = first.as_ref().len();
        if width == 0 {
            return Err("cannot fit scaler on zero-width rows".to_string());
        }

        let mut sum = vec![0.0; width];
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(format!("row {i} has {} values, expected {width}", row.len()));
            }
            for (j, (acc, x)) in sum.iter_mut().zip(row).enumerate() {
                if !x.is_finite() {
                    return Err(format!("row {i} column {j} is not finite"));
                }
                *acc += x;
            }
        }

        let n = rows.len() as f64;
        let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();

        let mut sq = vec![0.0; width];
        for row in rows {
            for ((acc, x), m) in sq.iter_mut().zip(row.as_ref()).zip(&mean) {
                let d = x - m;
                *acc += d * d;
            }
        }
        let scale = sq
            .into_iter()
            .map(|s| {
                let std = (s / n).sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    /// Number of features this scaler was fitted on.
    #[must_use]
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardize one row.
    ///
    /// # Panics
    /// Debug builds assert that `row` matches the fitted width.
    #[must_use]
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        debug_assert_eq!(row.len(), self.width());
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((x, m), s)| (x - m) / s)
            .collect()
    }

    #[must_use]
    pub fn transform_all<R: AsRef<[f64]>>(&self, rows: &[R]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r.as_ref())).collect()
    }

    /// Internal consistency of deserialized parameters.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.mean.len() != self.scale.len() {
            return Err(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.mean.iter().any(|m| !m.is_finite())
            || self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err("scaler parameters must be finite with positive scales".to_string());
        }
        Ok(())
    }
}
