use crate::{
    error::MutationError,
    step::{BatchScope, MutationStep},
};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::SqlAdapter, error::DbError, query::generator::ParamList, statement::Statement,
};
use engine_config::settings::SqlStepConfig;
use model::execution::{errors::ConfigurationError, spec::BatchSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placeholder {
    Window(Option<String>),
    Table,
    Arg(usize),
}

impl Placeholder {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "window" => Some(Placeholder::Window(None)),
            "table" => Some(Placeholder::Table),
            _ => {
                if let Some(alias) = token.strip_prefix("window:") {
                    let valid = !alias.is_empty()
                        && alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                    return valid.then(|| Placeholder::Window(Some(alias.to_string())));
                }
                token
                    .strip_prefix("arg")
                    .and_then(|index| index.parse().ok())
                    .map(Placeholder::Arg)
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(Placeholder),
}

/// Splits a template into literal text and placeholders.
///
/// Braces that do not form a known placeholder stay literal, as does anything
/// inside a single-quoted SQL string.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut literal_from = 0;
    let mut in_string = false;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            // '' inside a string flips twice and stays in the string
            b'\'' => in_string = !in_string,
            b'{' if !in_string => {
                let after = &template[pos + 1..];
                let parsed = after
                    .find('}')
                    .and_then(|close| Placeholder::parse(&after[..close]).map(|p| (close, p)));

                if let Some((close, placeholder)) = parsed {
                    if pos > literal_from {
                        out.push(Segment::Text(&template[literal_from..pos]));
                    }
                    out.push(Segment::Placeholder(placeholder));
                    pos += close + 2;
                    literal_from = pos;
                    continue;
                }
            }
            _ => {}
        }
        pos += 1;
    }

    if literal_from < template.len() {
        out.push(Segment::Text(&template[literal_from..]));
    }
    out
}

/// Runs user supplied statements against each window in one transaction.
///
/// Supported placeholders: `{window}` and `{window:alias}` expand to the key
/// range predicate, `{table}` to the quoted table, `{argN}` binds job argument `N`.
/// Placeholders inside single-quoted string literals are left as written.
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    statements: Vec<String>,
    operation: String,
}

impl SqlTemplate {
    pub fn new(config: &SqlStepConfig) -> Result<Self, ConfigurationError> {
        let statements: Vec<String> = config
            .statements
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if statements.is_empty() {
            return Err(ConfigurationError::InvalidStep(
                "sql step needs at least one statement".to_string(),
            ));
        }

        Ok(SqlTemplate {
            statements,
            operation: config
                .operation
                .clone()
                .unwrap_or_else(|| "update_all".to_string()),
        })
    }

    pub fn render(&self, scope: &BatchScope<'_>) -> Result<Vec<Statement>, DbError> {
        self.statements
            .iter()
            .map(|template| Self::render_one(template, scope))
            .collect()
    }

    fn render_one(template: &str, scope: &BatchScope<'_>) -> Result<Statement, DbError> {
        let mut params = ParamList::default();
        let mut sql = String::with_capacity(template.len() + 64);

        for segment in segments(template) {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Placeholder(Placeholder::Window(alias)) => {
                    let predicate = scope.predicate(alias.as_deref(), &mut params)?;
                    sql.push('(');
                    sql.push_str(&predicate);
                    sql.push(')');
                }
                Segment::Placeholder(Placeholder::Table) => sql.push_str(&scope.table().quoted()),
                Segment::Placeholder(Placeholder::Arg(index)) => {
                    let value = scope.arguments().get(index).cloned().ok_or_else(|| {
                        DbError::QueryBuildError(format!("job argument {index} is missing"))
                    })?;
                    sql.push_str(&params.bind(value));
                }
            }
        }

        Ok(Statement::new(sql, params.into_values()))
    }
}

#[async_trait]
impl MutationStep for SqlTemplate {
    fn operation_name(&self) -> &str {
        &self.operation
    }

    fn validate(&self, spec: &BatchSpec) -> Result<(), ConfigurationError> {
        for (position, template) in self.statements.iter().enumerate() {
            let placeholders: Vec<Placeholder> = segments(template)
                .into_iter()
                .filter_map(|segment| match segment {
                    Segment::Placeholder(p) => Some(p),
                    Segment::Text(_) => None,
                })
                .collect();

            if !placeholders
                .iter()
                .any(|p| matches!(p, Placeholder::Window(_)))
            {
                return Err(ConfigurationError::InvalidStep(format!(
                    "statement {position} does not restrict itself to the window; add {{window}}"
                )));
            }

            for placeholder in &placeholders {
                if let Placeholder::Arg(index) = placeholder
                    && *index >= spec.arguments().len()
                {
                    return Err(ConfigurationError::InvalidArgument {
                        index: *index,
                        message: format!("referenced by statement {position} but not provided"),
                    });
                }
            }
        }
        Ok(())
    }

    async fn apply(
        &self,
        store: &dyn SqlAdapter,
        scope: &BatchScope<'_>,
    ) -> Result<u64, MutationError> {
        Ok(store.exec_atomic(self.render(scope)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::{identifiers::TableRef, value::Value},
        execution::arguments::JobArguments,
        pagination::cursor::{Key, KeyColumns},
        records::batch::SubBatch,
    };
    use serde_json::json;

    fn template(statements: &[&str]) -> SqlTemplate {
        SqlTemplate::new(&SqlStepConfig {
            statements: statements.iter().map(|s| s.to_string()).collect(),
            operation: None,
        })
        .unwrap()
    }

    fn spec(arguments: Vec<serde_json::Value>) -> BatchSpec {
        BatchSpec::builder(
            TableRef::qualified("public", "deployment_merge_requests"),
            KeyColumns::composite(&["deployment_id", "merge_request_id"]),
        )
        .arguments(JobArguments::from_json(arguments))
        .build()
        .unwrap()
    }

    #[test]
    fn splits_placeholders_and_keeps_unknown_braces() {
        assert_eq!(
            segments("SELECT '{}' FROM {table} WHERE {window:d} AND x = {arg1}"),
            vec![
                Segment::Text("SELECT '{}' FROM "),
                Segment::Placeholder(Placeholder::Table),
                Segment::Text(" WHERE "),
                Segment::Placeholder(Placeholder::Window(Some("d".into()))),
                Segment::Text(" AND x = "),
                Segment::Placeholder(Placeholder::Arg(1)),
            ]
        );
        assert_eq!(segments("{window"), vec![Segment::Text("{window")]);
    }

    #[test]
    fn leaves_placeholders_in_string_literals_alone() {
        assert_eq!(
            segments("UPDATE {table} SET note = 'moved from {table}', tag = 'it''s {arg0}' WHERE {window}"),
            vec![
                Segment::Text("UPDATE "),
                Segment::Placeholder(Placeholder::Table),
                Segment::Text(" SET note = 'moved from {table}', tag = 'it''s {arg0}' WHERE "),
                Segment::Placeholder(Placeholder::Window(None)),
            ]
        );
    }

    #[test]
    fn renders_window_table_and_arguments() {
        let step = template(&["UPDATE {table} AS d SET environment_id = {arg0} WHERE {window:d}"]);
        let spec = spec(vec![json!(42)]);
        let window = SubBatch::new(0, Key::Tuple(vec![1, 1]), Key::Tuple(vec![1, 500]));

        let rendered = step.render(&BatchScope::new(&spec, &window)).unwrap();
        assert_eq!(
            rendered[0].sql,
            "UPDATE \"public\".\"deployment_merge_requests\" AS d SET environment_id = $1 \
             WHERE ((d.\"deployment_id\", d.\"merge_request_id\") >= ($2::bigint, $3::bigint) \
             AND (d.\"deployment_id\", d.\"merge_request_id\") <= ($4::bigint, $5::bigint))"
        );
        assert_eq!(
            rendered[0].params,
            vec![Value::Int(42), Value::Int(1), Value::Int(1), Value::Int(1), Value::Int(500)]
        );
    }

    #[test]
    fn validation_requires_window_and_known_arguments() {
        let spec = spec(vec![json!("x")]);

        let unscoped = template(&["DELETE FROM {table}"]);
        assert!(matches!(
            unscoped.validate(&spec),
            Err(ConfigurationError::InvalidStep(_))
        ));

        let missing_arg = template(&["DELETE FROM {table} WHERE {window} AND kind = {arg3}"]);
        assert!(matches!(
            missing_arg.validate(&spec),
            Err(ConfigurationError::InvalidArgument { index: 3, .. })
        ));

        assert!(template(&["DELETE FROM {table} WHERE {window} AND kind = {arg0}"])
            .validate(&spec)
            .is_ok());
    }

    #[test]
    fn blank_statements_are_rejected() {
        let result = SqlTemplate::new(&SqlStepConfig {
            statements: vec!["  ".into()],
            operation: Some("cleanup".into()),
        });
        assert!(result.is_err());
    }
}
