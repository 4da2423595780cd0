use crate::{core::value::Value, execution::errors::ConfigurationError};
use serde::{Deserialize, Serialize};

/// Ordered migration-specific parameters, e.g. `["partition_id", 100]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArguments(Vec<Value>);

impl JobArguments {
    pub fn new(values: Vec<Value>) -> Self {
        JobArguments(values)
    }

    pub fn from_json(values: Vec<serde_json::Value>) -> Self {
        JobArguments(values.into_iter().map(Value::from).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn string(&self, index: usize) -> Result<String, ConfigurationError> {
        self.get(index)
            .and_then(Value::as_string)
            .ok_or_else(|| missing(index, "expected a string"))
    }

    pub fn int(&self, index: usize) -> Result<i64, ConfigurationError> {
        self.get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing(index, "expected an integer"))
    }

    /// Reads a column name or a list of column names.
    ///
    /// Accepts `"col"` and `["a", "b"]`.
    pub fn column_list(&self, index: usize) -> Result<Vec<String>, ConfigurationError> {
        match self.get(index) {
            Some(Value::String(name)) => Ok(vec![name.clone()]),
            Some(Value::Json(serde_json::Value::Array(items))) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| missing(index, "column lists may only contain strings"))
                })
                .collect(),
            Some(_) => Err(missing(index, "expected a column name or list of names")),
            None => Err(missing(index, "argument is missing")),
        }
    }
}

fn missing(index: usize, message: &str) -> ConfigurationError {
    ConfigurationError::InvalidArgument {
        index,
        message: message.to_string(),
    }
}

impl From<Vec<Value>> for JobArguments {
    fn from(values: Vec<Value>) -> Self {
        JobArguments(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_typed_arguments() {
        let args = JobArguments::from_json(vec![json!("partition_id"), json!(100)]);
        assert_eq!(args.string(0).unwrap(), "partition_id");
        assert_eq!(args.int(1).unwrap(), 100);
        assert!(args.int(2).is_err());
    }

    #[test]
    fn reads_column_lists() {
        let args = JobArguments::from_json(vec![json!(["a", "b"]), json!("c"), json!([1])]);
        assert_eq!(args.column_list(0).unwrap(), vec!["a", "b"]);
        assert_eq!(args.column_list(1).unwrap(), vec!["c"]);
        assert!(matches!(
            args.column_list(2),
            Err(ConfigurationError::InvalidArgument { index: 2, .. })
        ));
    }
}
