//! Numeric parameter resolution for the numeric rank and nullspace modes

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::config::ParameterConfig;
use crate::error::NoaResult;
use crate::model::NoaModel;
use crate::symbolic::Symbol;
use crate::trace::{Trace, TraceEvent};

/// The first `count` primes in increasing order
pub fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

/// One shuffled prime per parameter, assigned in order
pub fn prime_parameters(params: &[Symbol], rng: &mut ChaCha8Rng) -> BTreeMap<Symbol, f64> {
    let mut primes = first_primes(params.len());
    primes.shuffle(rng);
    params
        .iter()
        .cloned()
        .zip(primes.into_iter().map(|p| p as f64))
        .collect()
}

/// Values from a configuration source; a miss yields 0.0 and a trace event
pub fn config_parameters(
    params: &[Symbol],
    config: &ParameterConfig,
    trace: &mut Trace,
) -> BTreeMap<Symbol, f64> {
    params
        .iter()
        .map(|param| {
            let value = config.get(param.name()).unwrap_or_else(|| {
                trace.record(TraceEvent::ParameterMissing(param.name().to_string()));
                0.0
            });
            (param.clone(), value)
        })
        .collect()
}

/// Apply overrides to already resolved names; unknown names are ignored.
/// Returns whether any override was supplied.
pub fn apply_overrides(values: &mut BTreeMap<Symbol, f64>, overrides: &BTreeMap<String, f64>) -> bool {
    for (param, value) in values.iter_mut() {
        if let Some(&new_value) = overrides.get(param.name()) {
            *value = new_value;
        }
    }
    !overrides.is_empty()
}

/// Full resolution pipeline: configuration source or shuffled primes, then overrides
pub fn resolve_parameters(
    params: &[Symbol],
    config: Option<&ParameterConfig>,
    overrides: &BTreeMap<String, f64>,
    seed: Option<u64>,
    trace: &mut Trace,
) -> BTreeMap<Symbol, f64> {
    let mut values = match config {
        Some(config) => {
            let values = config_parameters(params, config, trace);
            trace.record(TraceEvent::ParameterSource(config.source().to_string()));
            values
        }
        None => {
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            let values = prime_parameters(params, &mut rng);
            trace.record(TraceEvent::ParameterSource("shuffled prime numbers".into()));
            values
        }
    };

    if apply_overrides(&mut values, overrides) {
        trace.record(TraceEvent::ParametersUpdated);
    }
    log::info!("[RANK] numeric parameters: {:?}", values);
    values
}

impl NoaModel {
    /// Resolve and store the numeric parameter map per the model options
    pub fn resolve_numeric_params(&mut self) -> NoaResult<&BTreeMap<Symbol, f64>> {
        let config = match &self.options.config_path {
            Some(path) => Some(ParameterConfig::from_path(path)?),
            None => None,
        };
        self.numeric_params = resolve_parameters(
            &self.options.substitution_params,
            config.as_ref(),
            &self.new_params,
            self.options.prime_seed,
            &mut self.trace,
        );
        Ok(&self.numeric_params)
    }
}
