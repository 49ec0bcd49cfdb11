//! Diagnostic event stream of an analysis run
//!
//! Every event is logged through the `log` facade when recorded and kept in
//! order on the model so a run can be inspected (and tested) afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CalcMode, DerivativeKey, IndexPolicy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    PolicyActive(IndexPolicy),
    TuplesGenerated { order: usize, count: usize },
    Appended(DerivativeKey),
    Skipped(DerivativeKey),
    OrderEscalated { order: usize },
    PolicyEscalated { from: IndexPolicy, to: IndexPolicy },
    Saturated { order: usize },
    OrderCapReached { order: usize },
    ParameterSource(String),
    ParameterMissing(String),
    ParametersUpdated,
    RankComputed { mode: CalcMode, rank: usize },
    Verdict { observable: bool, rank: usize, sys_order: usize },
}

impl TraceEvent {
    pub(crate) fn log(&self) {
        match self {
            TraceEvent::Skipped(_) | TraceEvent::TuplesGenerated { .. } => log::debug!("{}", self),
            TraceEvent::ParameterMissing(_)
            | TraceEvent::OrderCapReached { .. }
            | TraceEvent::PolicyEscalated { .. } => log::warn!("{}", self),
            _ => log::info!("{}", self),
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraceEvent::PolicyActive(p) => write!(f, "[ORC] vector field policy: {}", p),
            TraceEvent::TuplesGenerated { order, count } => {
                write!(f, "[ORC] order {}: {} index tuples", order, count)
            }
            TraceEvent::Appended(key) => {
                write!(f, "[ORC] Lie derivative {} appended to observability matrix", key)
            }
            TraceEvent::Skipped(key) => write!(
                f,
                "[ORC] Lie derivative {} not appended (zero gradient)",
                key
            ),
            TraceEvent::OrderEscalated { order } => write!(
                f,
                "[ORC] insufficient observability matrix rows, appending order {}",
                order
            ),
            TraceEvent::PolicyEscalated { from, to } => write!(
                f,
                "[ORC] insufficient rows with {}, rebuilding with {}",
                from, to
            ),
            TraceEvent::Saturated { order } => write!(
                f,
                "[ORC] order {} added no gradient, higher orders vanish",
                order
            ),
            TraceEvent::OrderCapReached { order } => write!(
                f,
                "[ORC] order cap {} reached with fewer rows than states",
                order
            ),
            TraceEvent::ParameterSource(src) => write!(f, "[RANK] parameters from {}", src),
            TraceEvent::ParameterMissing(name) => {
                write!(f, "[RANK] parameter {} not found in configuration, using 0.0", name)
            }
            TraceEvent::ParametersUpdated => write!(f, "[RANK] numeric parameters updated"),
            TraceEvent::RankComputed { mode, rank } => {
                write!(f, "[RANK] {} rank of observability matrix: {}", mode, rank)
            }
            TraceEvent::Verdict {
                observable: true, ..
            } => write!(f, "[RANK] the system is weakly locally observable (WLO)"),
            TraceEvent::Verdict {
                observable: false,
                rank,
                sys_order,
            } => write!(
                f,
                "[RANK] the system is NOT weakly locally observable: observable dim {}, unobservable dim {}",
                rank,
                sys_order - rank
            ),
        }
    }
}

/// Ordered event log
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn record(&mut self, event: TraceEvent) {
        event.log();
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Keys appended to the observability matrix, in order
    pub fn appended(&self) -> Vec<&DerivativeKey> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Appended(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    /// Keys skipped because of a zero gradient, in order
    pub fn skipped(&self) -> Vec<&DerivativeKey> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Skipped(k) => Some(k),
                _ => None,
            })
            .collect()
    }
}
