//! Minimal dense matrix helpers for ridge regression. Scenario counts are
//! tiny (at most `max_scenarios`, typically ≤ 5) so a hand-rolled
//! Gauss-Jordan inversion is simpler than pulling in a linear-algebra crate
//! for matrices this small.

#[derive(Debug, Clone)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let r = rows.len();
        let c = rows.first().map(|row| row.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(r * c);
        for row in rows {
            data.extend(row);
        }
        Self { rows: r, cols: c, data }
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.set(c, r, self.get(r, c));
            }
        }
        out
    }

    pub fn mul(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.cols, other.rows, "matrix dimension mismatch");
        let mut out = Matrix::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out.set(r, c, out.get(r, c) + a * other.get(k, c));
                }
            }
        }
        out
    }

    pub fn add_scaled_identity(&mut self, lambda: f64) {
        for i in 0..self.rows.min(self.cols) {
            self.set(i, i, self.get(i, i) + lambda);
        }
    }

    /// Gauss-Jordan inversion with partial pivoting. Always succeeds for the
    /// ridge-regularized matrices this module builds (`X^T X + λI` with
    /// λ > 0 is always positive definite, hence invertible).
    pub fn invert(&self) -> Option<Matrix> {
        assert_eq!(self.rows, self.cols, "invert requires a square matrix");
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            let mut pivot_row = col;
            let mut pivot_val = a.get(col, col).abs();
            for r in (col + 1)..n {
                if a.get(r, col).abs() > pivot_val {
                    pivot_val = a.get(r, col).abs();
                    pivot_row = r;
                }
            }
            if pivot_val < 1e-12 {
                return None;
            }
            if pivot_row != col {
                a.swap_rows(col, pivot_row);
                inv.swap_rows(col, pivot_row);
            }

            let pivot = a.get(col, col);
            for c in 0..n {
                a.set(col, c, a.get(col, c) / pivot);
                inv.set(col, c, inv.get(col, c) / pivot);
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a.set(r, c, a.get(r, c) - factor * a.get(col, c));
                    inv.set(r, c, inv.get(r, c) - factor * inv.get(col, c));
                }
            }
        }

        Some(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }

    pub fn col(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverts_identity_to_itself() {
        let id = Matrix::identity(3);
        let inv = id.invert().unwrap();
        for r in 0..3 {
            for c in 0..3 {
                assert!((inv.get(r, c) - id.get(r, c)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn inverts_simple_2x2() {
        let m = Matrix::from_rows(vec![vec![4.0, 7.0], vec![2.0, 6.0]]);
        let inv = m.invert().unwrap();
        let product = m.mul(&inv);
        assert!((product.get(0, 0) - 1.0).abs() < 1e-9);
        assert!((product.get(1, 1) - 1.0).abs() < 1e-9);
        assert!(product.get(0, 1).abs() < 1e-9);
    }
}
