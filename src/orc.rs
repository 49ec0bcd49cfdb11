//! Observability rank criterion driver
//!
//! Builds the observability matrix order by order under the configured index
//! policy and escalates the order while rows < states. An exhausted
//! combination run always restarts under the permutation policy; the drift
//! policies restart only when they leave rows < states. The rank step then
//! decides weak local observability.

use crate::error::NoaResult;
use crate::model::NoaModel;
use crate::rank::RankSummary;
use crate::trace::TraceEvent;
use crate::types::{DerivativeKey, IndexPolicy};

/// Every restricted policy falls back to permutation, which never falls back
const MAX_POLICY_ESCALATIONS: usize = 1;

impl NoaModel {
    /// Build the observability matrix and evaluate its rank
    pub fn orc(&mut self) -> NoaResult<RankSummary> {
        self.trace.clear();
        self.build_observability_matrix()?;
        self.evaluate_rank()
    }

    /// Lie derivative construction with order and policy escalation
    pub fn build_observability_matrix(&mut self) -> NoaResult<()> {
        self.system.validate()?;
        let sys_order = self.sys_order();
        let mut policy = self.options.index_policy;

        for _ in 0..=MAX_POLICY_ESCALATIONS {
            self.reset_results();
            self.active_policy = policy;
            self.trace.record(TraceEvent::PolicyActive(policy));
            self.run_policy(policy);

            let fall_back = match policy {
                IndexPolicy::Permutation => false,
                IndexPolicy::Combination => true,
                IndexPolicy::Drift2ndOrder | IndexPolicy::Drift2ndOrderWuest => {
                    self.obsv_mat.nrows() < sys_order
                }
            };
            if !fall_back {
                break;
            }
            self.trace.record(TraceEvent::PolicyEscalated {
                from: policy,
                to: IndexPolicy::Permutation,
            });
            policy = IndexPolicy::Permutation;
        }
        Ok(())
    }

    fn run_policy(&mut self, policy: IndexPolicy) {
        let sys_order = self.sys_order();
        let num_inputs = self.num_inputs();
        let num_fields = self.system.num_fields();
        let cap = self.options.order_cap(num_inputs, sys_order);

        // zeroth order: the output Jacobian seeds the matrix
        if let Some(gradient) = self.lie.gradient(&DerivativeKey::root()) {
            self.obsv_mat.col_join(gradient);
        }

        let initial_order = match policy {
            IndexPolicy::Drift2ndOrder | IndexPolicy::Drift2ndOrderWuest => 2,
            IndexPolicy::Permutation | IndexPolicy::Combination => {
                self.options.base_order(num_inputs)
            }
        };
        for order in 1..=initial_order {
            self.append_order(policy, order);
        }

        let mut order = initial_order;
        while self.obsv_mat.nrows() < sys_order {
            if policy
                .max_native_order(num_fields)
                .map_or(false, |native| order >= native)
            {
                break;
            }
            if order >= cap {
                self.trace.record(TraceEvent::OrderCapReached { order });
                break;
            }
            order += 1;
            self.trace.record(TraceEvent::OrderEscalated { order });
            if self.append_order(policy, order) == 0 {
                self.trace.record(TraceEvent::Saturated { order });
                break;
            }
        }
        self.final_order = order;
    }

    /// Derive every tuple of one order, appending nonzero gradients.
    /// Returns the number of appended blocks.
    fn append_order(&mut self, policy: IndexPolicy, order: usize) -> usize {
        let tuples = policy.tuples(self.system.num_fields(), order);
        self.trace.record(TraceEvent::TuplesGenerated {
            order,
            count: tuples.len(),
        });

        let mut appended = 0;
        for key in tuples {
            let gradient = self.lie.derive(&key, &self.system);
            if gradient.is_zero() {
                self.trace.record(TraceEvent::Skipped(key));
            } else {
                self.obsv_mat.col_join(gradient);
                self.trace.record(TraceEvent::Appended(key));
                appended += 1;
            }
        }
        appended
    }
}
