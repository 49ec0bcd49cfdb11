//! Observable / unobservable decomposition from continuous symmetries
//!
//! Each nullspace vector `w` of the observability matrix defines the PDE
//! `Σ_i w_i ∂g/∂x_i = 0` that every observable mode `g(x)` satisfies. When all
//! symmetries are standard basis vectors the states split directly into
//! observable and unobservable sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{NoaError, NoaResult};
use crate::model::NoaModel;
use crate::rank::matrix_nullspace;
use crate::symbolic::{Expr, Symbol};
use crate::types::CalcMode;

/// Outcome of substituting a candidate mode into a PDE
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PdeCheck {
    Satisfied,
    Unsatisfied { residual: Expr },
}

impl PdeCheck {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PdeCheck::Satisfied)
    }
}

/// `Σ_i coefficients[i] * ∂g/∂states[i] = 0`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservableModePde {
    pub coefficients: Vec<Expr>,
    pub states: Vec<Symbol>,
}

impl ObservableModePde {
    pub fn new(coefficients: Vec<Expr>, states: &[Symbol]) -> Self {
        ObservableModePde {
            coefficients,
            states: states.to_vec(),
        }
    }

    /// Left-hand side of the PDE evaluated for `g`
    pub fn residual(&self, g: &Expr) -> Expr {
        self.coefficients
            .iter()
            .zip(&self.states)
            .filter(|(w, _)| !w.is_zero())
            .fold(Expr::zero(), |acc, (w, x)| acc + w * &g.diff(x))
    }

    pub fn check(&self, g: &Expr) -> PdeCheck {
        let residual = self.residual(g);
        if residual.is_identically_zero() {
            PdeCheck::Satisfied
        } else {
            PdeCheck::Unsatisfied { residual }
        }
    }

    /// Whether exactly one coefficient is nonzero
    pub fn is_standard_basis(&self) -> bool {
        self.coefficients.iter().filter(|w| !w.is_identically_zero()).count() == 1
    }

    fn zero_indices(&self) -> BTreeSet<usize> {
        self.coefficients
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_identically_zero())
            .map(|(i, _)| i)
            .collect()
    }
}

impl fmt::Display for ObservableModePde {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let terms: Vec<String> = self
            .coefficients
            .iter()
            .zip(&self.states)
            .filter(|(w, _)| !w.is_zero())
            .map(|(w, x)| format!("({})*dg/d{}", w, x))
            .collect();
        if terms.is_empty() {
            write!(f, "0 = 0")
        } else {
            write!(f, "{} = 0", terms.join(" + "))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Decomposition {
    /// Empty nullspace
    FullyObservable { observable: Vec<Symbol> },
    /// Every symmetry is one-hot: a direct partition of the states
    StandardBasis {
        observable: Vec<Symbol>,
        unobservable: Vec<Symbol>,
        pdes: Vec<ObservableModePde>,
    },
    /// General symmetries, characterized by their PDEs
    Pde {
        pdes: Vec<ObservableModePde>,
        /// States whose coordinate is zero in every symmetry
        candidates: Vec<Symbol>,
        /// Candidates that solve every PDE
        observable_modes: Vec<Symbol>,
        /// Candidates without a conclusion
        inconclusive: Vec<Symbol>,
    },
}

impl Decomposition {
    pub fn observable(&self) -> &[Symbol] {
        match self {
            Decomposition::FullyObservable { observable }
            | Decomposition::StandardBasis { observable, .. } => observable,
            Decomposition::Pde {
                observable_modes, ..
            } => observable_modes,
        }
    }

    pub fn pdes(&self) -> &[ObservableModePde] {
        match self {
            Decomposition::FullyObservable { .. } => &[],
            Decomposition::StandardBasis { pdes, .. } | Decomposition::Pde { pdes, .. } => pdes,
        }
    }

    fn log(&self) {
        if let Decomposition::FullyObservable { observable } = self {
            log::info!("[NULL] all states are observable: {:?}", observable);
            return;
        }
        log::info!("[NULL] observable modes g(x) satisfy these PDEs:");
        for pde in self.pdes() {
            log::info!("[NULL]   {}", pde);
        }
        match self {
            Decomposition::StandardBasis {
                observable,
                unobservable,
                ..
            } => {
                log::info!("[NULL] observable states: {:?}", observable);
                log::info!("[NULL] unobservable states: {:?}", unobservable);
            }
            Decomposition::Pde {
                observable_modes,
                inconclusive,
                ..
            } => {
                log::info!("[NULL] observable modes: {:?}", observable_modes);
                if !inconclusive.is_empty() {
                    log::warn!("[NULL] no conclusion for: {:?}", inconclusive);
                }
            }
            Decomposition::FullyObservable { .. } => {}
        }
    }
}

/// Classify a nullspace basis over `states`
pub fn decompose(symmetries: &[Vec<Expr>], states: &[Symbol]) -> Decomposition {
    if symmetries.is_empty() {
        return Decomposition::FullyObservable {
            observable: states.to_vec(),
        };
    }

    let pdes: Vec<ObservableModePde> = symmetries
        .iter()
        .map(|w| ObservableModePde::new(w.clone(), states))
        .collect();

    if pdes.iter().all(ObservableModePde::is_standard_basis) {
        let flagged: BTreeSet<usize> = symmetries
            .iter()
            .flat_map(|w| {
                w.iter()
                    .enumerate()
                    .filter(|(_, e)| !e.is_identically_zero())
                    .map(|(i, _)| i)
            })
            .collect();
        let (unobservable, observable): (Vec<_>, Vec<_>) = states
            .iter()
            .enumerate()
            .partition(|(i, _)| flagged.contains(i));
        return Decomposition::StandardBasis {
            observable: observable.into_iter().map(|(_, x)| x.clone()).collect(),
            unobservable: unobservable.into_iter().map(|(_, x)| x.clone()).collect(),
            pdes,
        };
    }

    let mut candidate_idx = pdes[0].zero_indices();
    for pde in &pdes[1..] {
        let zeros = pde.zero_indices();
        candidate_idx.retain(|i| zeros.contains(i));
    }

    let candidates: Vec<Symbol> = candidate_idx.iter().map(|&i| states[i].clone()).collect();
    let mut observable_modes = Vec::new();
    let mut inconclusive = Vec::new();
    for candidate in &candidates {
        let g = Expr::from_symbol(candidate);
        let failed: Vec<Expr> = pdes
            .iter()
            .filter_map(|pde| match pde.check(&g) {
                PdeCheck::Satisfied => None,
                PdeCheck::Unsatisfied { residual } => Some(residual),
            })
            .collect();
        if failed.is_empty() {
            observable_modes.push(candidate.clone());
        } else {
            log::warn!("[NULL] {} leaves PDE residuals {:?}", candidate, failed);
            inconclusive.push(candidate.clone());
        }
    }

    Decomposition::Pde {
        pdes,
        candidates,
        observable_modes,
        inconclusive,
    }
}

impl NoaModel {
    /// Continuous symmetries per `nullspace_mode` and the resulting decomposition
    pub fn observable_mode(&mut self) -> NoaResult<&Decomposition> {
        if self.lie.is_empty() {
            return Err(NoaError::NotAnalyzed);
        }
        let symmetries = match self.options.nullspace_mode {
            CalcMode::Symbolic => self.obsv_mat.nullspace(),
            CalcMode::Numeric => matrix_nullspace(self.numeric_obsv_mat()?),
        };
        log::info!(
            "[NULL] {} continuous symmetries ({} nullspace)",
            symmetries.len(),
            self.options.nullspace_mode
        );

        let decomposition = decompose(&symmetries, &self.system.states);
        decomposition.log();
        self.symmetries = symmetries;
        Ok(&*self.decomposition.insert(decomposition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisOptions;
    use crate::model::ControlAffineSystem;
    use crate::symbolic::symbols;

    fn p(text: &str) -> Expr {
        Expr::parse(text).unwrap()
    }

    fn vector(texts: &[&str]) -> Vec<Expr> {
        texts.iter().map(|t| p(t)).collect()
    }

    #[test]
    fn test_empty_nullspace_is_fully_observable() {
        let states = symbols(&["x1", "x2"]);
        let d = decompose(&[], &states);
        assert_eq!(d, Decomposition::FullyObservable { observable: states });
        assert!(d.pdes().is_empty());
    }

    #[test]
    fn test_standard_basis_partition() {
        let states = symbols(&["x1", "x2", "x3"]);
        let symmetries = vec![vector(&["0", "2", "0"]), vector(&["0", "0", "1"])];
        match decompose(&symmetries, &states) {
            Decomposition::StandardBasis {
                observable,
                unobservable,
                pdes,
            } => {
                assert_eq!(observable, symbols(&["x1"]));
                assert_eq!(unobservable, symbols(&["x2", "x3"]));
                assert_eq!(pdes.len(), 2);
            }
            other => panic!("expected standard basis, got {:?}", other),
        }
    }

    #[test]
    fn test_general_symmetry_candidates() {
        // rotation symmetry in (x, y), heading-independent z
        let states = symbols(&["x", "y", "z"]);
        let symmetries = vec![vector(&["-y", "x", "0"])];
        match decompose(&symmetries, &states) {
            Decomposition::Pde {
                candidates,
                observable_modes,
                inconclusive,
                ..
            } => {
                assert_eq!(candidates, symbols(&["z"]));
                assert_eq!(observable_modes, symbols(&["z"]));
                assert!(inconclusive.is_empty());
            }
            other => panic!("expected PDE decomposition, got {:?}", other),
        }
    }

    #[test]
    fn test_pde_residual() {
        let states = symbols(&["x", "y"]);
        let pde = ObservableModePde::new(vector(&["-y", "x"]), &states);
        // x^2 + y^2 is invariant under rotation
        assert!(pde.check(&p("x^2 + y^2")).is_satisfied());
        assert_eq!(
            pde.check(&p("x")),
            PdeCheck::Unsatisfied { residual: p("-y") }
        );
        assert_eq!(pde.to_string(), "(-y)*dg/dx + (x)*dg/dy = 0");
    }

    #[test]
    fn test_observable_mode_requires_analysis() {
        let sys = ControlAffineSystem::new(symbols(&["x1"]), vec![vec![p("0")]], vec![p("x1")]);
        let mut model = NoaModel::new("fresh", sys);
        assert!(matches!(model.observable_mode(), Err(NoaError::NotAnalyzed)));
    }

    #[test]
    fn test_fully_observable_after_orc() {
        let sys = ControlAffineSystem::new(
            symbols(&["x1", "x2"]),
            vec![vector(&["x2", "0"])],
            vector(&["x1"]),
        );
        let mut model = NoaModel::new("double_integrator", sys);
        model.orc().unwrap();
        let d = model.observable_mode().unwrap().clone();
        assert_eq!(d.observable(), symbols(&["x1", "x2"]).as_slice());
        assert!(model.symmetries.is_empty());
    }

    #[test]
    fn test_unobservable_state_after_orc() {
        let sys = ControlAffineSystem::new(
            symbols(&["x1", "x2"]),
            vec![vector(&["0", "0"]), vector(&["1", "0"])],
            vector(&["x1"]),
        );
        let mut model = NoaModel::new("no_drift", sys);
        let summary = model.orc().unwrap();
        model.observable_mode().unwrap();

        assert_eq!(model.symmetries.len(), summary.unobservable_dim);
        assert_eq!(model.symmetries[0], vector(&["0", "1"]));
        match model.decomposition.as_ref().unwrap() {
            Decomposition::StandardBasis {
                observable,
                unobservable,
                ..
            } => {
                assert_eq!(observable, &symbols(&["x1"]));
                assert_eq!(unobservable, &symbols(&["x2"]));
            }
            other => panic!("expected standard basis, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_nullspace_resolves_parameters() {
        // range-only measurement of a planar point: rotation symmetry
        let sys = ControlAffineSystem::new(
            symbols(&["x", "y"]),
            vec![vector(&["0", "0"])],
            vector(&["r*(x^2 + y^2)"]),
        );
        let options = AnalysisOptions {
            nullspace_mode: CalcMode::Numeric,
            substitution_params: symbols(&["r"]),
            prime_seed: Some(11),
            ..AnalysisOptions::default()
        };
        let mut model = NoaModel::new("range", sys).with_options(options);
        let summary = model.orc().unwrap();
        assert_eq!(summary.rank, 1);

        model.observable_mode().unwrap();
        assert_eq!(model.numeric_params[&Symbol::new("r")], 2.0);
        assert_eq!(model.symmetries.len(), 1);
        assert!(matches!(
            model.decomposition,
            Some(Decomposition::Pde { ref candidates, .. }) if candidates.is_empty()
        ));
    }
}
