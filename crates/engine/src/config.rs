//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Top-level engine settings, usually loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub expressions: ExpressionConfig,
}

/// What expressions may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    /// Maximum expression length in code points; 0 disables the check.
    pub max_expression_size: usize,
    /// Identifiers admitted in every scope on top of the built-in ones.
    pub extra_variables: Vec<String>,
    /// Function names admitted on top of the standard library.
    pub extra_functions: Vec<String>,
    /// When false only variable references are checked.
    pub check_functions: bool,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            max_expression_size: 100_000,
            extra_variables: Vec::new(),
            extra_functions: Vec::new(),
            check_functions: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: EngineConfig = serde_json::from_value(json!({
            "expressions": { "extra_variables": ["tenant"] }
        }))
        .unwrap();

        assert_eq!(config.expressions.max_expression_size, 100_000);
        assert!(config.expressions.check_functions);
        assert_eq!(config.expressions.extra_variables, vec!["tenant"]);
    }
}
