//! Step parameters

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameter lookup errors
#[derive(Debug, Error)]
pub enum ParameterError {
    /// The parameter is not set
    #[error("parameter '{0}' is missing")]
    Missing(String),

    /// The parameter was expected to have exactly one value
    #[error("parameter '{name}' has {count} values, expected exactly one")]
    NotSingle {
        /// Parameter name
        name: String,
        /// Number of values found
        count: usize,
    },
}

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Param(String);

impl Param {
    /// Create a parameter value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the value as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Named parameters of a step, each holding one or more values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestStepParameters(HashMap<String, Vec<Param>>);

impl TestStepParameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of a parameter, replacing any existing ones
    pub fn set(&mut self, name: impl Into<String>, values: Vec<Param>) {
        self.0.insert(name.into(), values);
    }

    /// All values of a parameter; empty if not set
    pub fn get(&self, name: &str) -> &[Param] {
        self.0.get(name).map_or(&[], Vec::as_slice)
    }

    /// The single value of a parameter
    ///
    /// Errors when the parameter is missing or holds more than one value.
    pub fn get_one(&self, name: &str) -> Result<&Param, ParameterError> {
        match self.0.get(name) {
            None => Err(ParameterError::Missing(name.to_string())),
            Some(values) if values.len() == 1 => Ok(&values[0]),
            Some(values) => Err(ParameterError::NotSingle {
                name: name.to_string(),
                count: values.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_empty() {
        let params = TestStepParameters::new();
        assert!(params.get("executable").is_empty());
    }

    #[test]
    fn test_get_one() {
        let mut params = TestStepParameters::new();
        params.set("executable", vec![Param::new("sleep")]);
        assert_eq!(params.get_one("executable").unwrap().as_str(), "sleep");
    }

    #[test]
    fn test_get_one_rejects_missing_and_multiple() {
        let mut params = TestStepParameters::new();
        params.set("args", vec![Param::new("5"), Param::new("6")]);

        assert!(matches!(
            params.get_one("executable"),
            Err(ParameterError::Missing(_))
        ));
        assert!(matches!(
            params.get_one("args"),
            Err(ParameterError::NotSingle { count: 2, .. })
        ));
    }

    #[test]
    fn test_parameters_serde() {
        let mut params = TestStepParameters::new();
        params.set("message", vec![Param::new("hello")]);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"message":["hello"]}"#);

        let back: TestStepParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("message"), params.get("message"));
    }
}
