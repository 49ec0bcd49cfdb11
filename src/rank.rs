use serde::{Deserialize, Serialize};

use crate::error::{NoaError, NoaResult};
use crate::model::NoaModel;
use crate::symbolic::{Expr, SymMatrix};
use crate::trace::TraceEvent;
use crate::types::{linalg, CalcMode};

/// Rank of the observability matrix and the resulting verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSummary {
    pub rank: usize,
    pub sys_order: usize,
    pub weakly_locally_observable: bool,
    /// Observable and jointly observable subspace dimension
    pub observable_dim: usize,
    /// Dimension of the indistinguishable region
    pub unobservable_dim: usize,
}

impl RankSummary {
    pub fn new(rank: usize, sys_order: usize) -> Self {
        let rank = rank.min(sys_order);
        RankSummary {
            rank,
            sys_order,
            weakly_locally_observable: rank == sys_order,
            observable_dim: rank,
            unobservable_dim: sys_order - rank,
        }
    }
}

/// Rank via nalgebra when every entry is a number, exact elimination otherwise
pub fn matrix_rank(m: &SymMatrix) -> usize {
    match m.to_numeric() {
        Some(numeric) => linalg::rank(&numeric),
        None => m.rank(),
    }
}

/// Nullspace basis, same dispatch as [`matrix_rank`]
pub fn matrix_nullspace(m: &SymMatrix) -> Vec<Vec<Expr>> {
    match m.to_numeric() {
        Some(numeric) => linalg::nullspace(&numeric)
            .into_iter()
            .map(|v| v.iter().map(|&x| Expr::num(x)).collect())
            .collect(),
        None => m.nullspace(),
    }
}

impl NoaModel {
    /// Observability matrix with the numeric parameters substituted,
    /// resolving the parameters first when needed.
    pub fn numeric_obsv_mat(&mut self) -> NoaResult<&SymMatrix> {
        if self.obsv_mat_num.is_none() {
            self.resolve_numeric_params()?;
            self.obsv_mat_num = Some(self.obsv_mat.subs_values(&self.numeric_params));
        }
        self.obsv_mat_num.as_ref().ok_or(NoaError::NotAnalyzed)
    }

    /// Rank of the observability matrix per `rank_mode`, with the WLO verdict
    pub fn evaluate_rank(&mut self) -> NoaResult<RankSummary> {
        if self.lie.is_empty() {
            return Err(NoaError::NotAnalyzed);
        }
        let mode = self.options.rank_mode;
        let rank = match mode {
            CalcMode::Symbolic => self.obsv_mat.rank(),
            CalcMode::Numeric => matrix_rank(self.numeric_obsv_mat()?),
        };
        self.trace.record(TraceEvent::RankComputed { mode, rank });

        let summary = RankSummary::new(rank, self.sys_order());
        self.trace.record(TraceEvent::Verdict {
            observable: summary.weakly_locally_observable,
            rank: summary.rank,
            sys_order: summary.sys_order,
        });
        self.rank = Some(summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[&str]]) -> SymMatrix {
        let ncols = rows.first().map_or(0, |r| r.len());
        SymMatrix::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|t| Expr::parse(t).unwrap()).collect())
                .collect(),
            ncols,
        )
    }

    #[test]
    fn test_summary_dimensions() {
        let full = RankSummary::new(3, 3);
        assert!(full.weakly_locally_observable);
        assert_eq!(full.unobservable_dim, 0);

        let partial = RankSummary::new(1, 3);
        assert!(!partial.weakly_locally_observable);
        assert_eq!(partial.observable_dim, 1);
        assert_eq!(partial.unobservable_dim, 2);
    }

    #[test]
    fn test_rank_dispatch() {
        let numeric = matrix(&[&["1", "2"], &["2", "4"]]);
        assert_eq!(matrix_rank(&numeric), 1);

        let symbolic = matrix(&[&["x", "1"], &["1", "y"]]);
        assert_eq!(matrix_rank(&symbolic), 2);
    }

    #[test]
    fn test_numeric_nullspace_as_expressions() {
        let m = matrix(&[&["1", "0", "0"], &["0", "1", "0"]]);
        let basis = matrix_nullspace(&m);
        assert_eq!(basis.len(), 1);
        assert_eq!(basis[0], vec![Expr::zero(), Expr::zero(), Expr::one()]);
    }
}
