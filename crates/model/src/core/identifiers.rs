use crate::execution::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Arc<str>);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quotes an identifier for SQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A target table, optionally schema-qualified (`schema.table`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        TableRef {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableRef {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Renders the quoted, schema-qualified form used in statements.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Key used when the table acts as a map key (memory store, checkpoints).
    pub fn path(&self) -> String {
        self.to_string()
    }

    /// Whether both names could resolve to the same table. An unqualified
    /// name matches the same name in any schema.
    pub fn may_refer_to(&self, other: &TableRef) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl FromStr for TableRef {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').map(str::trim).collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(TableRef::new(*name)),
            [schema, name] if !schema.is_empty() && !name.is_empty() => {
                Ok(TableRef::qualified(*schema, *name))
            }
            _ => Err(ConfigurationError::InvalidTableName(s.to_string())),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef(pub String);

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnRef(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }

    /// Quoted and prefixed with a table alias, e.g. `c."id"`.
    pub fn qualified(&self, alias: Option<&str>) -> String {
        match alias {
            Some(alias) => format!("{alias}.{}", self.quoted()),
            None => self.quoted(),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        ColumnRef::new(s)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
