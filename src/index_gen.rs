//! Vector-field index tuples for k-th order Lie derivatives
//!
//! Fields are indexed 0..=M; index 0 is the drift, 1..=M the inputs.

use crate::types::{DerivativeKey, IndexPolicy};

/// All ordered tuples of length `k` over `0..num_fields` (repetition allowed),
/// in lexicographic order.
pub fn permutations_with_repetition(num_fields: usize, k: usize) -> Vec<DerivativeKey> {
    if num_fields == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(num_fields.pow(k as u32));
    let mut digits = vec![0usize; k];
    loop {
        out.push(DerivativeKey::new(digits.clone()));
        // odometer increment, rightmost digit fastest
        let mut pos = k;
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            digits[pos] += 1;
            if digits[pos] < num_fields {
                break;
            }
            digits[pos] = 0;
        }
    }
}

/// All strictly increasing tuples of length `k` over `0..num_fields`,
/// in lexicographic order.
pub fn combinations(num_fields: usize, k: usize) -> Vec<DerivativeKey> {
    if k > num_fields {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(DerivativeKey::new(idx.clone()));
        // rightmost position that can still move
        let Some(i) = (0..k).rev().find(|&i| idx[i] < num_fields - k + i) else {
            return out;
        };
        idx[i] += 1;
        for j in (i + 1)..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Second-order (drift, input) pairs; `drift_first == false` gives (input, drift)
pub fn drift_pairs(num_inputs: usize, drift_first: bool) -> Vec<DerivativeKey> {
    (1..=num_inputs)
        .map(|i| {
            if drift_first {
                DerivativeKey::new(vec![0, i])
            } else {
                DerivativeKey::new(vec![i, 0])
            }
        })
        .collect()
}

impl IndexPolicy {
    /// Index tuples for order `k` given `num_fields` = M + 1 vector fields
    pub fn tuples(self, num_fields: usize, k: usize) -> Vec<DerivativeKey> {
        match self {
            IndexPolicy::Permutation => permutations_with_repetition(num_fields, k),
            IndexPolicy::Combination => combinations(num_fields, k),
            IndexPolicy::Drift2ndOrder | IndexPolicy::Drift2ndOrderWuest => match k {
                1 => combinations(num_fields, 1),
                2 => drift_pairs(
                    num_fields.saturating_sub(1),
                    self == IndexPolicy::Drift2ndOrder,
                ),
                _ => Vec::new(),
            },
        }
    }

    /// Highest order the policy escalates to on its own before falling
    /// back, `None` when unbounded. Combination stops at the input count.
    pub fn max_native_order(self, num_fields: usize) -> Option<usize> {
        match self {
            IndexPolicy::Permutation => None,
            IndexPolicy::Combination => Some(num_fields.saturating_sub(1)),
            IndexPolicy::Drift2ndOrder | IndexPolicy::Drift2ndOrderWuest => Some(2),
        }
    }
}
