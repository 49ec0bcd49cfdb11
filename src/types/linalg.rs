//! Numeric linear algebra for substituted observability matrices
//!
//! Reduced row echelon form with partial pivoting on nalgebra dynamic
//! matrices. Entries below the tolerance are cleaned to exact zero so the
//! nullspace keeps its standard-basis structure when there is one.

use nalgebra::{DMatrix, DVector};

// ===== Type Aliases =====
pub type NumMatrix = DMatrix<f64>;
pub type NumVector = DVector<f64>;

// ===== Tolerances =====
/// Relative tolerance, scaled by matrix size and largest magnitude
pub const RANK_REL_TOL: f64 = 1e-10;

/// Absolute tolerance used for a matrix with entries of magnitude `scale`
pub fn tolerance(m: &NumMatrix) -> f64 {
    if m.is_empty() {
        return RANK_REL_TOL;
    }
    let scale = m.amax().max(1.0);
    RANK_REL_TOL * scale * (m.nrows().max(m.ncols()) as f64)
}

/// Reduced row echelon form and pivot columns
pub fn rref(m: &NumMatrix) -> (NumMatrix, Vec<usize>) {
    let mut a = m.clone();
    let (rows, cols) = a.shape();
    let tol = tolerance(m);
    let mut pivots = Vec::new();
    let mut row = 0;

    for col in 0..cols {
        if row == rows {
            break;
        }
        let (p, max) = (row..rows)
            .map(|r| (r, a[(r, col)].abs()))
            .fold((row, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if max <= tol {
            for r in row..rows {
                a[(r, col)] = 0.0;
            }
            continue;
        }
        a.swap_rows(row, p);

        let pv = a[(row, col)];
        for c in col..cols {
            a[(row, c)] /= pv;
        }
        for r in 0..rows {
            if r == row {
                continue;
            }
            let factor = a[(r, col)];
            if factor == 0.0 {
                continue;
            }
            for c in col..cols {
                let delta = factor * a[(row, c)];
                a[(r, c)] -= delta;
            }
        }
        pivots.push(col);
        row += 1;
    }

    for x in a.iter_mut() {
        if x.abs() <= tol {
            *x = 0.0;
        }
    }
    (a, pivots)
}

pub fn rank(m: &NumMatrix) -> usize {
    rref(m).1.len()
}

/// Nullspace basis, one vector per free column (1 on that column)
pub fn nullspace(m: &NumMatrix) -> Vec<NumVector> {
    let (a, pivots) = rref(m);
    let cols = a.ncols();
    (0..cols)
        .filter(|c| !pivots.contains(c))
        .map(|free| {
            let mut v = NumVector::zeros(cols);
            v[free] = 1.0;
            for (i, &p) in pivots.iter().enumerate() {
                v[p] = -a[(i, free)];
            }
            v
        })
        .collect()
}
