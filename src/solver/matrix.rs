//! Dense matrix kernel.
//!
//! Matrices are stored row-major in a single `Vec<f64>`. Solves operate on
//! augmented matrices `[A | b]` with the right-hand side in the last column.

use crate::error::{NodalError, Result};

/// Relative threshold below which a pivot or row norm counts as zero.
pub const EPS: f64 = 1e-12;

/// Row scaling applied by [`scale_add`].
#[derive(Debug, Clone, Copy)]
pub enum Scale<'a> {
    /// Same factor for every row
    Uniform(f64),
    /// One factor per row
    PerRow(&'a [f64]),
}

impl Scale<'_> {
    fn factor(&self, row: usize) -> f64 {
        match self {
            Scale::Uniform(s) => *s,
            Scale::PerRow(s) => s[row],
        }
    }

    fn covers(&self, rows: usize) -> bool {
        match self {
            Scale::Uniform(_) => true,
            Scale::PerRow(s) => s.len() >= rows,
        }
    }
}

/// A dense, zero-initialized rectangular matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Allocate a `rows x cols` matrix of zeros.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from nested rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut m = Self::new(rows.len(), cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(NodalError::dimension(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            m.row_mut(i).copy_from_slice(row);
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] += value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Clear every entry to zero.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let cols = self.cols;
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.data.split_at_mut(hi * cols);
        head[lo * cols..(lo + 1) * cols].swap_with_slice(&mut tail[..cols]);
    }

    /// Largest absolute entry.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }

    /// Form `b = scale * M * x`.
    pub fn mul_vec(&self, x: &[f64], b: &mut [f64], scale: f64) -> Result<()> {
        if b.len() != self.rows || x.len() != self.cols {
            return Err(NodalError::dimension(format!(
                "cannot multiply {}x{} matrix by vector of {} into vector of {}",
                self.rows,
                self.cols,
                x.len(),
                b.len()
            )));
        }
        for (i, bi) in b.iter_mut().enumerate() {
            let sum: f64 = self.row(i).iter().zip(x).map(|(m, x)| m * x).sum();
            *bi = scale * sum;
        }
        Ok(())
    }

    /// Copy this matrix into the top-left corner of `dest`.
    ///
    /// `dest` must be at least as large as `self` in both dimensions.
    pub fn copy_into(&self, dest: &mut Matrix) -> Result<()> {
        if self.rows > dest.rows || self.cols > dest.cols {
            return Err(NodalError::dimension(format!(
                "cannot copy {}x{} matrix into {}x{}",
                self.rows, self.cols, dest.rows, dest.cols
            )));
        }
        for i in 0..self.rows {
            let src = self.row(i);
            dest.row_mut(i)[..self.cols].copy_from_slice(src);
        }
        Ok(())
    }

    /// Rank by Gaussian elimination on a copy.
    ///
    /// Pivots smaller than `EPS` times the largest entry are structural zeros.
    pub fn rank(&self) -> usize {
        let mut m = self.clone();
        let threshold = EPS * m.max_abs();

        let mut rank = 0;
        let mut start_col = 0;
        for row in 0..m.rows {
            // Search for the first nonzero column in the remaining rows
            for col in start_col..m.cols {
                let mut max_v = m.get(row, col).abs();
                let mut max_row = row;
                for i in (row + 1)..m.rows {
                    let v = m.get(i, col).abs();
                    if v > max_v {
                        max_v = v;
                        max_row = i;
                    }
                }

                if max_v > threshold {
                    start_col = col + 1;
                    rank += 1;
                    m.swap_rows(row, max_row);

                    let pivot = m.get(row, col);
                    for i in (row + 1)..m.rows {
                        let factor = m.get(i, col) / pivot;
                        if factor != 0.0 {
                            for j in col..m.cols {
                                let v = m.get(row, j);
                                m.add(i, j, -v * factor);
                            }
                        }
                    }
                    break;
                }
            }
        }

        rank
    }

    /// Mark rows that can be removed without changing the rank.
    ///
    /// Applied to the capacitance matrix, `true` marks unknowns with no
    /// independent energy storage (algebraic variables).
    pub fn algebraic_rows(&self) -> Vec<bool> {
        let mut m = self.clone();
        let full_rank = m.rank();

        (0..m.rows)
            .map(|row| {
                m.row_mut(row).fill(0.0);
                if m.rank() == full_rank {
                    true
                } else {
                    m.row_mut(row).copy_from_slice(self.row(row));
                    false
                }
            })
            .collect()
    }

    fn load_rhs(&mut self, rhs: Option<&[f64]>) -> Result<()> {
        if self.cols != self.rows + 1 {
            return Err(NodalError::dimension(format!(
                "augmented matrix must be n x (n+1), got {}x{}",
                self.rows, self.cols
            )));
        }
        if let Some(rhs) = rhs {
            if rhs.len() < self.rows {
                return Err(NodalError::dimension(format!(
                    "rhs has {} entries for {} rows",
                    rhs.len(),
                    self.rows
                )));
            }
            let last = self.cols - 1;
            for (row, &v) in rhs.iter().enumerate().take(self.rows) {
                self.set(row, last, v);
            }
        }
        Ok(())
    }

    /// Solve the augmented system `[A | b]` in place by Gaussian elimination
    /// with partial pivoting.
    ///
    /// A column with no nonzero pivot gets `EPS` on the diagonal, which acts
    /// like a tiny conductance to ground instead of failing the solve.
    pub fn solve(&mut self, rhs: Option<&[f64]>) -> Result<Vec<f64>> {
        self.load_rhs(rhs)?;
        let n = self.rows;

        for col in 0..n {
            let mut max_v = self.get(col, col).abs();
            let mut max_row = col;
            for i in (col + 1)..n {
                let v = self.get(i, col).abs();
                if v > max_v {
                    max_v = v;
                    max_row = i;
                }
            }

            if max_v == 0.0 {
                self.set(col, col, EPS);
            } else {
                self.swap_rows(col, max_row);
            }

            let pivot = self.get(col, col);
            for i in (col + 1)..n {
                let factor = self.get(i, col) / pivot;
                if factor != 0.0 {
                    for j in col..=n {
                        let v = self.get(col, j);
                        self.add(i, j, -v * factor);
                    }
                }
            }
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = self.get(i, n);
            for j in (i + 1)..n {
                sum -= self.get(i, j) * x[j];
            }
            x[i] = sum / self.get(i, i);
        }

        Ok(x)
    }

    /// Solve the augmented system `[A | b]` in place using an `R^T Q^T`
    /// factorization built by row-normalized orthogonalization.
    ///
    /// Rows that become numerically zero span the null space of `A` and are
    /// dropped, so the result is the null-space-free solution even when `A`
    /// is singular along some directions.
    pub fn solve_rank_revealing(&mut self, rhs: Option<&[f64]>) -> Result<Vec<f64>> {
        self.load_rhs(rhs)?;
        let nr = self.rows;
        let nc = self.cols;
        let last = nc - 1;

        let mut mat_scale = 0.0;
        let mut nonzero_rows = nr;
        for row in 0..nr {
            // Bring the remaining row with the largest 2-norm up
            let mut max_row = row;
            let mut max_sumsq = 0.0;
            for rowp in row..nr {
                let sumsq: f64 = self.row(rowp)[..last].iter().map(|v| v * v).sum();
                if rowp == row || sumsq > max_sumsq {
                    max_row = rowp;
                    max_sumsq = sumsq;
                }
            }
            self.swap_rows(row, max_row);

            let row_norm = max_sumsq.sqrt();
            if row == 0 {
                mat_scale = row_norm;
            }
            if row_norm <= mat_scale * EPS {
                nonzero_rows = row;
                break;
            }

            let scale = 1.0 / row_norm;
            for v in self.row_mut(row) {
                *v *= scale;
            }

            let pivot_row = self.row(row).to_vec();
            for rowp in (row + 1)..nr {
                let target = self.row_mut(rowp);
                let inner: f64 = pivot_row[..last]
                    .iter()
                    .zip(&target[..last])
                    .map(|(a, b)| a * b)
                    .sum();
                for (t, p) in target.iter_mut().zip(&pivot_row) {
                    *t -= inner * p;
                }
            }
        }

        // Last column holds inv(R^T) * rhs; combine the rows of Q
        let mut x = vec![0.0; last];
        for row in 0..nonzero_rows {
            let r = self.row(row);
            let coeff = r[last];
            for (xi, q) in x.iter_mut().zip(&r[..last]) {
                *xi += q * coeff;
            }
        }

        Ok(x)
    }
}

/// Form `c = scale_a * a + scale_b * b` over the bounds of `a`.
pub fn scale_add(
    a: &Matrix,
    b: &Matrix,
    scale_a: Scale<'_>,
    scale_b: Scale<'_>,
    c: &mut Matrix,
) -> Result<()> {
    if a.rows > b.rows || a.cols > b.cols {
        return Err(NodalError::dimension("rows or columns of A too large for B"));
    }
    if a.rows > c.rows || a.cols > c.cols {
        return Err(NodalError::dimension("rows or columns of A too large for C"));
    }
    if !scale_a.covers(a.rows) || !scale_b.covers(a.rows) {
        return Err(NodalError::dimension("row scale vector shorter than matrix"));
    }
    for i in 0..a.rows {
        let sa = scale_a.factor(i);
        let sb = scale_b.factor(i);
        for j in 0..a.cols {
            c.set(i, j, sa * a.get(i, j) + sb * b.get(i, j));
        }
    }
    Ok(())
}
