//! Lie derivative and gradient caches
//!
//! `L_{f_{i_k}} ... L_{f_{i_1}} h` is stored under the key `[i_1, ..., i_k]`
//! together with its Jacobian with respect to the state vector. An entry is
//! built from its prefix: `Lfh[key] = dLfh_dx[prefix] * f[last]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ControlAffineSystem;
use crate::symbolic::{Expr, SymMatrix};
use crate::types::DerivativeKey;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LieCache {
    #[serde(with = "key_pairs")]
    lfh: BTreeMap<DerivativeKey, Vec<Expr>>,
    #[serde(with = "key_pairs")]
    dlfh_dx: BTreeMap<DerivativeKey, SymMatrix>,
}

impl LieCache {
    /// Cache holding only the zeroth-order derivative (h and its Jacobian)
    pub fn seed(system: &ControlAffineSystem) -> Self {
        let mut cache = LieCache::default();
        let gradient = SymMatrix::jacobian(&system.outputs, &system.states);
        cache.lfh.insert(DerivativeKey::root(), system.outputs.clone());
        cache.dlfh_dx.insert(DerivativeKey::root(), gradient);
        cache
    }

    /// Gradient for `key`, deriving it (and any missing prefix) on demand
    pub fn derive(&mut self, key: &DerivativeKey, system: &ControlAffineSystem) -> &SymMatrix {
        if !self.dlfh_dx.contains_key(key) {
            match (key.prefix(), key.last_field()) {
                (Some(prefix), Some(field)) => {
                    self.derive(&prefix, system);
                    let lfh = self.dlfh_dx[&prefix].mul_vec(&system.fields[field]);
                    let gradient = SymMatrix::jacobian(&lfh, &system.states);
                    self.lfh.insert(key.clone(), lfh);
                    self.dlfh_dx.insert(key.clone(), gradient);
                }
                _ => *self = LieCache::seed(system),
            }
        }
        &self.dlfh_dx[key]
    }

    pub fn lie_derivative(&self, key: &DerivativeKey) -> Option<&[Expr]> {
        self.lfh.get(key).map(|v| v.as_slice())
    }

    pub fn gradient(&self, key: &DerivativeKey) -> Option<&SymMatrix> {
        self.dlfh_dx.get(key)
    }

    pub fn len(&self) -> usize {
        self.lfh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lfh.is_empty()
    }
}

/// Maps with non-string keys serialize as a list of `[key, value]` pairs.
mod key_pairs {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        K: Serialize,
        V: Serialize,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: DeserializeOwned + Ord,
        V: DeserializeOwned,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbols;

    fn p(text: &str) -> Expr {
        Expr::parse(text).unwrap()
    }

    fn double_integrator() -> ControlAffineSystem {
        ControlAffineSystem::new(
            symbols(&["x1", "x2"]),
            vec![vec![p("x2"), p("0")], vec![p("0"), p("1")]],
            vec![p("x1")],
        )
    }

    #[test]
    fn test_seed_holds_output_jacobian() {
        let system = double_integrator();
        let cache = LieCache::seed(&system);
        assert_eq!(cache.len(), 1);
        let g = cache.gradient(&DerivativeKey::root()).unwrap();
        assert_eq!(g.row(0), &[p("1"), p("0")]);
    }

    #[test]
    fn test_first_and_second_order() {
        let system = double_integrator();
        let mut cache = LieCache::seed(&system);

        let k0 = DerivativeKey::new(vec![0]);
        let g = cache.derive(&k0, &system).clone();
        assert_eq!(cache.lie_derivative(&k0).unwrap(), &[p("x2")]);
        assert_eq!(g.row(0), &[p("0"), p("1")]);

        // L_f1 L_f0 h = d(x2)/dx . f1 = 1, gradient zero
        let k01 = DerivativeKey::new(vec![0, 1]);
        assert!(cache.derive(&k01, &system).is_zero());
        assert_eq!(cache.lie_derivative(&k01).unwrap(), &[p("1")]);
    }

    #[test]
    fn test_missing_prefix_is_derived() {
        let system = double_integrator();
        let mut cache = LieCache::seed(&system);
        cache.derive(&DerivativeKey::new(vec![0, 0, 1]), &system);
        assert!(cache.gradient(&DerivativeKey::new(vec![0])).is_some());
        assert!(cache.gradient(&DerivativeKey::new(vec![0, 0])).is_some());
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let system = double_integrator();
        let mut cache = LieCache::seed(&system);
        cache.derive(&DerivativeKey::new(vec![0]), &system);
        let json = serde_json::to_string(&cache).unwrap();
        let back: LieCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }
}
