//! Nonlinear observability analysis of control-affine systems
//!
//! Observability rank criterion over Lie derivatives, with the
//! observable/unobservable decomposition from continuous symmetries.

pub mod config;
pub mod decomposition;
pub mod error;
pub mod index_gen;
pub mod lie;
pub mod model;
pub mod orc;
pub mod params;
pub mod persistence;
pub mod quaternion;
pub mod rank;
pub mod symbolic;
pub mod trace;
pub mod types;

pub use config::{AnalysisOptions, ModelFile, ParameterConfig};
pub use decomposition::{Decomposition, ObservableModePde, PdeCheck};
pub use error::{NoaError, NoaResult};
pub use model::{ControlAffineSystem, NoaModel};
pub use rank::RankSummary;
pub use symbolic::{Expr, SymMatrix, Symbol};
pub use trace::{Trace, TraceEvent};
pub use types::{CalcMode, DerivativeKey, IndexPolicy};
