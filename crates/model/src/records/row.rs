use crate::core::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(entity: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            entity: entity.to_string(),
            field_values,
        }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(entity: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let field_values = pairs
            .into_iter()
            .map(|(name, value)| FieldValue {
                name: name.into(),
                value: value.into(),
            })
            .collect();
        RowData::new(entity, field_values)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Sets a field, appending it when absent.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        match self
            .field_values
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(field))
        {
            Some(existing) => existing.value = value,
            None => self.field_values.push(FieldValue {
                name: field.to_string(),
                value,
            }),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.field_values.iter().map(|f| f.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_case_insensitively() {
        let mut row = RowData::from_pairs("users", [("id", Value::Int(1)), ("Name", "a".into())]);
        row.set("name", "b");
        row.set("email", "b@example.com");

        assert_eq!(row.get_value("NAME"), Value::String("b".into()));
        assert_eq!(row.column_names(), vec!["id", "Name", "email"]);
        assert_eq!(row.get_value("missing"), Value::Null);
    }
}
