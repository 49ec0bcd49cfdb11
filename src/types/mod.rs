pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NoaError;

/// How vector-field index tuples are generated for each Lie derivative order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexPolicy {
    /// Ordered tuples with repetition (cartesian product)
    #[default]
    #[serde(rename = "permutation")]
    Permutation,
    /// Unordered subsets without repetition
    #[serde(rename = "combination")]
    Combination,
    /// Order 2 restricted to (drift, input) pairs
    #[serde(rename = "drift2ndOrder")]
    Drift2ndOrder,
    /// Order 2 restricted to (input, drift) pairs
    #[serde(rename = "drift2ndOrderWuest")]
    Drift2ndOrderWuest,
}

impl IndexPolicy {
    pub fn name(self) -> &'static str {
        match self {
            IndexPolicy::Permutation => "permutation",
            IndexPolicy::Combination => "combination",
            IndexPolicy::Drift2ndOrder => "drift2ndOrder",
            IndexPolicy::Drift2ndOrderWuest => "drift2ndOrderWuest",
        }
    }
}

impl fmt::Display for IndexPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexPolicy {
    type Err = NoaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permutation" => Ok(IndexPolicy::Permutation),
            "combination" => Ok(IndexPolicy::Combination),
            "drift2ndOrder" => Ok(IndexPolicy::Drift2ndOrder),
            "drift2ndOrderWuest" => Ok(IndexPolicy::Drift2ndOrderWuest),
            other => Err(NoaError::UnknownOption(other.to_string())),
        }
    }
}

/// Symbolic or numeric evaluation of rank / nullspace
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalcMode {
    #[default]
    Symbolic,
    #[serde(alias = "numerical")]
    Numeric,
}

impl fmt::Display for CalcMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CalcMode::Symbolic => f.write_str("symbolic"),
            CalcMode::Numeric => f.write_str("numeric"),
        }
    }
}

impl FromStr for CalcMode {
    type Err = NoaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbolic" => Ok(CalcMode::Symbolic),
            "numeric" | "numerical" => Ok(CalcMode::Numeric),
            other => Err(NoaError::UnknownOption(other.to_string())),
        }
    }
}

/// Derivative path: the vector-field indices applied in order.
/// The empty key is the zeroth-order derivative (h itself).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivativeKey(Vec<usize>);

impl DerivativeKey {
    pub fn root() -> Self {
        DerivativeKey(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        DerivativeKey(indices)
    }

    pub fn order(&self) -> usize {
        self.0.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Key of the derivative this one is built from
    pub fn prefix(&self) -> Option<DerivativeKey> {
        self.0
            .split_last()
            .map(|(_, rest)| DerivativeKey(rest.to_vec()))
    }

    pub fn last_field(&self) -> Option<usize> {
        self.0.last().copied()
    }
}

impl fmt::Display for DerivativeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "k{}", self.0.len())?;
        for i in &self.0 {
            write!(f, "f{}", i)?;
        }
        Ok(())
    }
}
