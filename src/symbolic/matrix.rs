use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::expr::{clear_denominators, Expr, Symbol};

/// Row-major matrix of symbolic expressions
///
/// The column count is stored separately so a matrix with zero rows still
/// knows its width (an observability matrix always has N columns).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymMatrix {
    cols: usize,
    rows: Vec<Vec<Expr>>,
}

impl SymMatrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        SymMatrix {
            cols: ncols,
            rows: vec![vec![Expr::zero(); ncols]; nrows],
        }
    }

    /// Build from rows; every row must have `ncols` entries.
    pub fn from_rows(rows: Vec<Vec<Expr>>, ncols: usize) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == ncols));
        SymMatrix { cols: ncols, rows }
    }

    /// Jacobian of `exprs` with respect to `vars` (one row per expression)
    pub fn jacobian(exprs: &[Expr], vars: &[Symbol]) -> Self {
        let rows = exprs
            .iter()
            .map(|e| vars.iter().map(|v| e.diff(v)).collect())
            .collect();
        SymMatrix {
            cols: vars.len(),
            rows,
        }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> &Expr {
        &self.rows[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Expr) {
        self.rows[row][col] = value;
    }

    pub fn row(&self, row: usize) -> &[Expr] {
        &self.rows[row]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Expr]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Matrix-vector product
    pub fn mul_vec(&self, v: &[Expr]) -> Vec<Expr> {
        debug_assert_eq!(v.len(), self.cols);
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(v)
                    .filter(|(a, b)| !a.is_zero() && !b.is_zero())
                    .fold(Expr::zero(), |acc, (a, b)| acc + a * b)
            })
            .collect()
    }

    /// Append the rows of `other` below this matrix
    pub fn col_join(&mut self, other: &SymMatrix) {
        debug_assert_eq!(self.cols, other.cols);
        self.rows.extend(other.rows.iter().cloned());
    }

    /// True when every entry is identically zero
    pub fn is_zero(&self) -> bool {
        self.rows.iter().flatten().all(Expr::is_identically_zero)
    }

    pub fn subs_values(&self, values: &BTreeMap<Symbol, f64>) -> SymMatrix {
        SymMatrix {
            cols: self.cols,
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(|e| e.subs_values(values)).collect())
                .collect(),
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        self.rows
            .iter()
            .flatten()
            .flat_map(|e| e.free_symbols())
            .collect()
    }

    /// Numeric copy when no entry has a free symbol left
    pub fn to_numeric(&self) -> Option<DMatrix<f64>> {
        let mut values = Vec::with_capacity(self.rows.len() * self.cols);
        for row in &self.rows {
            for e in row {
                values.push(e.as_constant()?);
            }
        }
        Some(DMatrix::from_row_slice(self.rows.len(), self.cols, &values))
    }

    /// Exact rank over the field of expressions
    pub fn rank(&self) -> usize {
        self.echelon().1.len()
    }

    /// Nullspace basis. Vector `j` carries 1 on the j-th free column and 0
    /// on the other free columns, as in a reduced echelon form.
    pub fn nullspace(&self) -> Vec<Vec<Expr>> {
        let (m, pivots) = self.echelon();
        let free: Vec<usize> = (0..self.cols).filter(|c| !pivots.contains(c)).collect();

        let mut basis = Vec::with_capacity(free.len());
        for f in free {
            let mut v = vec![Expr::zero(); self.cols];
            v[f] = Expr::one();
            for (i, &p) in pivots.iter().enumerate().rev() {
                let mut acc = Expr::zero();
                for c in (p + 1)..self.cols {
                    if !m[i][c].is_zero() && !v[c].is_zero() {
                        acc = acc + &m[i][c] * &v[c];
                    }
                }
                if !acc.is_identically_zero() {
                    v[p] = -acc * m[i][p].powi(-1);
                }
            }
            basis.push(v);
        }
        basis
    }

    /// Upper echelon form and pivot columns.
    ///
    /// Every row is first scaled to a polynomial numerator, and stays one:
    /// pivots that are a single term over plain symbols are divided out
    /// exactly, any other pivot uses fraction-free cross multiplication.
    /// Elimination then never compares two forms of one rational function.
    fn echelon(&self) -> (Vec<Vec<Expr>>, Vec<usize>) {
        let mut m: Vec<Vec<Expr>> = self.rows.iter().map(|r| clear_denominators(r)).collect();
        let mut pivots = Vec::new();
        let mut row = 0;

        for col in 0..self.cols {
            if row == m.len() {
                break;
            }
            let candidate = (row..m.len())
                .filter(|&r| !m[r][col].is_zero())
                .min_by_key(|&r| (!m[r][col].is_constant(), m[r][col].term_count()));
            let Some(p) = candidate else {
                continue;
            };
            m.swap(row, p);

            let pivot_row = m[row].clone();
            let pivot = &pivot_row[col];
            let inverse = pivot.is_symbol_monomial().then(|| pivot.powi(-1));

            for r in (row + 1)..m.len() {
                if m[r][col].is_zero() {
                    continue;
                }
                let factor = m[r][col].clone();
                match &inverse {
                    Some(inv) => {
                        let scale = &factor * inv;
                        for c in (col + 1)..self.cols {
                            if pivot_row[c].is_zero() {
                                continue;
                            }
                            m[r][c] = &m[r][c] - &(&scale * &pivot_row[c]);
                        }
                    }
                    None => {
                        for c in (col + 1)..self.cols {
                            m[r][c] = &(pivot * &m[r][c]) - &(&factor * &pivot_row[c]);
                        }
                    }
                }
                m[r][col] = Expr::zero();
                m[r] = clear_denominators(&m[r]);
            }
            pivots.push(col);
            row += 1;
        }
        (m, pivots)
    }
}

impl fmt::Display for SymMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[")?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|e| e.to_string()).collect();
            writeln!(f, "  [{}]", cells.join(", "))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbols;

    fn p(text: &str) -> Expr {
        Expr::parse(text).unwrap()
    }

    fn row(items: &[&str]) -> Vec<Expr> {
        items.iter().map(|t| p(t)).collect()
    }

    #[test]
    fn test_jacobian_shape_and_entries() {
        let x = symbols(&["x1", "x2"]);
        let j = SymMatrix::jacobian(&[p("x1*x2"), p("x1^2")], &x);
        assert_eq!((j.nrows(), j.ncols()), (2, 2));
        assert_eq!(j.get(0, 0), &p("x2"));
        assert_eq!(j.get(0, 1), &p("x1"));
        assert_eq!(j.get(1, 0), &p("2*x1"));
        assert!(j.get(1, 1).is_zero());
    }

    #[test]
    fn test_mul_vec() {
        let m = SymMatrix::from_rows(vec![row(&["1", "0"]), row(&["x", "y"])], 2);
        let out = m.mul_vec(&row(&["a", "b"]));
        assert_eq!(out, row(&["a", "a*x + b*y"]));
    }

    #[test]
    fn test_symbolic_rank_detects_dependence() {
        // second row is x times the first one
        let m = SymMatrix::from_rows(
            vec![row(&["1", "y", "0"]), row(&["x", "x*y", "0"]), row(&["0", "0", "z"])],
            3,
        );
        assert_eq!(m.rank(), 2);
    }

    #[test]
    fn test_rank_with_sum_pivots() {
        let m = SymMatrix::from_rows(
            vec![row(&["x + 1", "y"]), row(&["y", "x - 1"])],
            2,
        );
        // det = x^2 - 1 - y^2, not identically zero
        assert_eq!(m.rank(), 2);

        let singular = SymMatrix::from_rows(
            vec![row(&["x + 1", "y"]), row(&["2*x + 2", "2*y"])],
            2,
        );
        assert_eq!(singular.rank(), 1);
    }

    #[test]
    fn test_rank_of_rational_rows() {
        let x = symbols(&["x1", "x2"]);
        let j = SymMatrix::jacobian(&[p("x1/(x1 + x2)"), p("x2/(x1 + x2)")], &x);
        assert_eq!(j.rank(), 1);
        assert_eq!(j.nullspace().len(), 1);

        // rows differ by the factor (x + y)^-1
        let m = SymMatrix::from_rows(
            vec![row(&["x + y", "a*(x + y)"]), row(&["1", "a + b*(x + y)^-1"])],
            2,
        );
        assert_eq!(m.rank(), 2);
        let singular = SymMatrix::from_rows(
            vec![
                row(&["(x + y)^2", "(x + y)^2*(a*(x + y)^-1 + b)"]),
                row(&["1", "a*(x + y)^-1 + b"]),
            ],
            2,
        );
        assert_eq!(singular.rank(), 1);
    }

    #[test]
    fn test_rank_uses_pythagorean_identity() {
        let m = SymMatrix::from_rows(
            vec![row(&["cos(t)", "sin(t)"]), row(&["cos(t)^2", "sin(t)*cos(t)"])],
            2,
        );
        assert_eq!(m.rank(), 1);
        let m = SymMatrix::from_rows(
            vec![row(&["sin(t)^2 + cos(t)^2", "1"]), row(&["1", "1"])],
            2,
        );
        assert_eq!(m.rank(), 1);
    }

    #[test]
    fn test_nullspace_of_single_row() {
        let m = SymMatrix::from_rows(vec![row(&["1", "0"])], 2);
        assert_eq!(m.nullspace(), vec![row(&["0", "1"])]);
    }

    #[test]
    fn test_nullspace_is_annihilated() {
        let m = SymMatrix::from_rows(
            vec![row(&["1", "x", "0"]), row(&["0", "1", "-y"])],
            3,
        );
        let basis = m.nullspace();
        assert_eq!(basis.len(), 1);
        assert_eq!(basis[0], row(&["-x*y", "y", "1"]));
        for v in &basis {
            assert!(m.mul_vec(v).iter().all(Expr::is_zero));
        }
    }

    #[test]
    fn test_rank_plus_nullity_is_width() {
        let m = SymMatrix::from_rows(
            vec![row(&["x", "0", "x", "1"]), row(&["0", "y", "y", "0"])],
            4,
        );
        assert_eq!(m.rank() + m.nullspace().len(), 4);
    }

    #[test]
    fn test_to_numeric() {
        let m = SymMatrix::from_rows(vec![row(&["1", "2"]), row(&["3", "4"])], 2);
        let n = m.to_numeric().unwrap();
        assert_eq!(n[(1, 0)], 3.0);
        let s = SymMatrix::from_rows(vec![row(&["1", "k"])], 2);
        assert!(s.to_numeric().is_none());

        let mut values = BTreeMap::new();
        values.insert(Symbol::new("k"), 5.0);
        assert_eq!(s.subs_values(&values).to_numeric().unwrap()[(0, 1)], 5.0);
    }

    #[test]
    fn test_col_join_keeps_width() {
        let mut m = SymMatrix::zeros(0, 3);
        assert!(m.is_zero());
        m.col_join(&SymMatrix::from_rows(vec![row(&["0", "x", "0"])], 3));
        assert_eq!((m.nrows(), m.ncols()), (1, 3));
        assert!(!m.is_zero());
    }
}
