//! Analysis options, parameter configuration source, and model files

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NoaError, NoaResult};
use crate::model::{ControlAffineSystem, NoaModel};
use crate::symbolic::{Expr, Symbol};
use crate::types::{CalcMode, IndexPolicy};

/// Options steering one analysis run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Vector-field index generation policy
    pub index_policy: IndexPolicy,

    /// Maximum Lie derivative order before escalation (0 = number of inputs)
    pub lie_order: usize,

    /// Highest order escalation may reach (default: Lie order + state count)
    pub max_order: Option<usize>,

    pub rank_mode: CalcMode,
    pub nullspace_mode: CalcMode,

    /// Parameters replaced by numbers in numeric mode
    pub substitution_params: Vec<Symbol>,

    /// JSON object mapping parameter names to values
    pub config_path: Option<PathBuf>,

    /// Seed for the prime shuffle (entropy when absent)
    pub prime_seed: Option<u64>,
}

impl AnalysisOptions {
    /// Order used before any escalation for a system with `num_inputs` inputs
    pub fn base_order(&self, num_inputs: usize) -> usize {
        if self.lie_order == 0 {
            num_inputs
        } else {
            self.lie_order
        }
    }

    /// Escalation ceiling for a system with `sys_order` states
    pub fn order_cap(&self, num_inputs: usize, sys_order: usize) -> usize {
        let base = self.base_order(num_inputs);
        self.max_order.unwrap_or(base + sys_order).max(base)
    }
}

/// Key-value parameter source (a JSON object)
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterConfig {
    source: String,
    values: Map<String, Value>,
}

impl ParameterConfig {
    pub fn from_path(path: impl AsRef<Path>) -> NoaResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| NoaError::io(path, e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| NoaError::json(path, e))?;
        match value {
            Value::Object(values) => Ok(ParameterConfig {
                source: path.display().to_string(),
                values,
            }),
            _ => Err(NoaError::ConfigFormat(path.to_path_buf())),
        }
    }

    pub fn from_map(source: impl Into<String>, values: Map<String, Value>) -> Self {
        ParameterConfig {
            source: source.into(),
            values,
        }
    }

    /// Numeric value for `key`; absent and non-numeric entries are misses.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// On-disk description of a system, expressions written as text
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: String,
    pub states: Vec<String>,
    /// Drift first, then one field per input
    pub fields: Vec<Vec<String>>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

fn parse_text(text: &str) -> NoaResult<Expr> {
    Expr::parse(text).map_err(|source| NoaError::Parse {
        text: text.to_string(),
        source,
    })
}

fn parse_all(texts: &[String]) -> NoaResult<Vec<Expr>> {
    texts.iter().map(|t| parse_text(t)).collect()
}

impl ModelFile {
    pub fn from_path(path: impl AsRef<Path>) -> NoaResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| NoaError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| NoaError::json(path, e))
    }

    pub fn from_json_str(text: &str) -> NoaResult<Self> {
        serde_json::from_str(text).map_err(|e| NoaError::json("<inline>", e))
    }

    /// Parse every expression and build a validated model
    pub fn into_model(self) -> NoaResult<NoaModel> {
        let states: Vec<Symbol> = self.states.iter().map(|s| Symbol::new(s.as_str())).collect();
        let fields = self
            .fields
            .iter()
            .map(|f| parse_all(f))
            .collect::<NoaResult<Vec<_>>>()?;
        let outputs = parse_all(&self.outputs)?;

        let system = ControlAffineSystem::new(states, fields, outputs);
        system.validate()?;

        let mut options = self.options;
        for name in &self.params {
            let symbol = Symbol::new(name.as_str());
            if !options.substitution_params.contains(&symbol) {
                options.substitution_params.push(symbol);
            }
        }

        let mut model = NoaModel::new(&self.name, system).with_options(options);
        if !self.overrides.is_empty() {
            model.update_params_dict(self.overrides);
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_defaults() {
        let options: AnalysisOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.index_policy, IndexPolicy::Permutation);
        assert_eq!(options.rank_mode, CalcMode::Symbolic);
        assert_eq!(options.base_order(2), 2);
        assert_eq!(options.order_cap(2, 3), 5);

        let options: AnalysisOptions =
            serde_json::from_str(r#"{"lie_order": 4, "max_order": 1, "rank_mode": "numerical"}"#)
                .unwrap();
        assert_eq!(options.base_order(2), 4);
        // the cap never undercuts the configured order
        assert_eq!(options.order_cap(2, 3), 4);
        assert_eq!(options.rank_mode, CalcMode::Numeric);
    }

    #[test]
    fn test_parameter_config_lookup() {
        let values = json!({"m": 2.5, "k": 3, "label": "spring"});
        let config = ParameterConfig::from_map("inline", values.as_object().unwrap().clone());
        assert_eq!(config.get("m"), Some(2.5));
        assert_eq!(config.get("k"), Some(3.0));
        assert_eq!(config.get("label"), None);
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_parameter_config_must_be_object() {
        let path = std::env::temp_dir().join("noa_rs_config_not_object.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        let err = ParameterConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, NoaError::ConfigFormat(_)));
        let _ = fs::remove_file(&path);

        let err = ParameterConfig::from_path("/nonexistent/noa_rs/params.json").unwrap_err();
        assert!(matches!(err, NoaError::Io { .. }));
    }

    #[test]
    fn test_model_file_into_model() {
        let text = r#"{
            "name": "spring",
            "states": ["p", "v"],
            "fields": [["v", "-k/m*p"]],
            "outputs": ["p"],
            "params": ["k", "m"],
            "overrides": {"k": 4.0},
            "options": {"rank_mode": "numeric"}
        }"#;
        let model = ModelFile::from_json_str(text).unwrap().into_model().unwrap();
        assert_eq!(model.name, "spring");
        assert_eq!(model.system.sys_order(), 2);
        assert_eq!(model.system.num_inputs(), 0);
        assert_eq!(model.options.rank_mode, CalcMode::Numeric);
        assert_eq!(
            model.options.substitution_params,
            vec![Symbol::new("k"), Symbol::new("m")]
        );
        assert_eq!(model.new_params.get("k"), Some(&4.0));
    }

    #[test]
    fn test_demo_models_load() {
        for name in ["unicycle", "range_only", "spring_mass"] {
            let path = Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("demos")
                .join(format!("{}.json", name));
            let model = ModelFile::from_path(&path).unwrap().into_model().unwrap();
            assert_eq!(model.name, name);
        }
    }

    #[test]
    fn test_model_file_reports_bad_expression() {
        let text = r#"{"name": "bad", "states": ["x"], "fields": [["x +"]], "outputs": ["x"]}"#;
        let err = ModelFile::from_json_str(text).unwrap().into_model().unwrap_err();
        assert!(matches!(err, NoaError::Parse { .. }));
    }

    #[test]
    fn test_model_file_reports_shape_mismatch() {
        let text = r#"{"name": "bad", "states": ["x", "y"], "fields": [["x"]], "outputs": ["x"]}"#;
        let err = ModelFile::from_json_str(text).unwrap().into_model().unwrap_err();
        assert!(matches!(err, NoaError::DimensionMismatch(_)));
    }
}
