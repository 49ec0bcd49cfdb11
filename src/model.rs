use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::AnalysisOptions;
use crate::decomposition::Decomposition;
use crate::error::{NoaError, NoaResult};
use crate::lie::LieCache;
use crate::rank::RankSummary;
use crate::symbolic::{Expr, SymMatrix, Symbol};
use crate::trace::Trace;
use crate::types::IndexPolicy;

/// Control-affine dynamics `x' = f0(x) + Σ f_i(x) u_i` with outputs `y = h(x)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlAffineSystem {
    /// State vector x (N entries)
    pub states: Vec<Symbol>,
    /// Vector fields f0..fM, each of length N; f0 is the drift
    pub fields: Vec<Vec<Expr>>,
    /// Measurement model h (P entries)
    pub outputs: Vec<Expr>,
}

impl ControlAffineSystem {
    pub fn new(states: Vec<Symbol>, fields: Vec<Vec<Expr>>, outputs: Vec<Expr>) -> Self {
        Self {
            states,
            fields,
            outputs,
        }
    }

    /// Number of states N
    pub fn sys_order(&self) -> usize {
        self.states.len()
    }

    /// Number of control inputs M
    pub fn num_inputs(&self) -> usize {
        self.fields.len().saturating_sub(1)
    }

    /// M + 1
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn validate(&self) -> NoaResult<()> {
        if self.states.is_empty() {
            return Err(NoaError::DimensionMismatch("state vector is empty".into()));
        }
        if self.fields.is_empty() {
            return Err(NoaError::DimensionMismatch(
                "at least the drift vector field is required".into(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(NoaError::DimensionMismatch("measurement model is empty".into()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.len() != self.states.len() {
                return Err(NoaError::DimensionMismatch(format!(
                    "vector field f{} has {} entries, state vector has {}",
                    i,
                    field.len(),
                    self.states.len()
                )));
            }
        }
        Ok(())
    }
}

/// Observability analysis of one system: inputs, options, and every result
/// of the run, serialized together as one snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoaModel {
    pub name: String,
    pub system: ControlAffineSystem,
    pub options: AnalysisOptions,

    /// Caller overrides applied after parameter resolution
    pub new_params: BTreeMap<String, f64>,

    /// Lie derivatives and their gradients
    pub lie: LieCache,
    pub obsv_mat: SymMatrix,
    /// Policy that produced `obsv_mat` (differs from the option after escalation)
    pub active_policy: IndexPolicy,
    /// Highest Lie derivative order generated
    pub final_order: usize,

    pub numeric_params: BTreeMap<Symbol, f64>,
    /// Observability matrix with numeric parameters substituted
    pub obsv_mat_num: Option<SymMatrix>,
    pub rank: Option<RankSummary>,

    /// Continuous symmetries (nullspace basis of the observability matrix)
    pub symmetries: Vec<Vec<Expr>>,
    pub decomposition: Option<Decomposition>,

    pub trace: Trace,
    pub backup_name: Option<PathBuf>,
}

impl NoaModel {
    pub fn new(name: &str, system: ControlAffineSystem) -> Self {
        let cols = system.sys_order();
        log::info!("{} NOA object initialized", name);
        NoaModel {
            name: name.to_string(),
            system,
            options: AnalysisOptions::default(),
            new_params: BTreeMap::new(),
            lie: LieCache::default(),
            obsv_mat: SymMatrix::zeros(0, cols),
            active_policy: IndexPolicy::default(),
            final_order: 0,
            numeric_params: BTreeMap::new(),
            obsv_mat_num: None,
            rank: None,
            symmetries: Vec::new(),
            decomposition: None,
            trace: Trace::default(),
            backup_name: None,
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    /// Caller-supplied parameter values, applied on top of the resolved set.
    /// Only names that resolution already produced are honored; other names
    /// are dropped without notice.
    pub fn update_params_dict(&mut self, new_params: BTreeMap<String, f64>) {
        self.new_params = new_params;
    }

    pub fn sys_order(&self) -> usize {
        self.system.sys_order()
    }

    pub fn num_inputs(&self) -> usize {
        self.system.num_inputs()
    }

    /// `None` until the rank has been evaluated
    pub fn is_weakly_locally_observable(&self) -> Option<bool> {
        self.rank.map(|r| r.weakly_locally_observable)
    }

    /// Drop every derived result, keeping inputs and options
    pub(crate) fn reset_results(&mut self) {
        self.lie = LieCache::seed(&self.system);
        self.obsv_mat = SymMatrix::zeros(0, self.system.sys_order());
        self.final_order = 0;
        self.obsv_mat_num = None;
        self.rank = None;
        self.symmetries.clear();
        self.decomposition = None;
    }
}
