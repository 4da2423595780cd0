use crate::sql::base::{error::DbError, statement::Statement};
use model::{
    core::{identifiers::TableRef, value::Value},
    pagination::{
        cursor::{Key, KeyColumns},
        range::BatchRange,
    },
};

/// Collects positional parameters while a statement is rendered.
#[derive(Debug, Default)]
pub struct ParamList {
    offset: usize,
    values: Vec<Value>,
}

impl ParamList {
    /// Starts numbering after `offset` already-bound parameters.
    pub fn starting_after(offset: usize) -> Self {
        ParamList {
            offset,
            values: Vec::new(),
        }
    }

    /// Binds a value and returns its placeholder, e.g. `$3`.
    pub fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.offset + self.values.len())
    }

    fn bind_key_part(&mut self, part: i64) -> String {
        format!("{}::bigint", self.bind(Value::Int(part)))
    }

    pub fn len(&self) -> usize {
        self.offset + self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[derive(Clone, Copy)]
enum Bound {
    AtLeast,
    After,
    AtMost,
}

impl Bound {
    fn operator(self) -> &'static str {
        match self {
            Bound::AtLeast => ">=",
            Bound::After => ">",
            Bound::AtMost => "<=",
        }
    }
}

/// Renders the key-range SQL shared by the Postgres adapter and SQL mutation steps.
///
/// Key parameters are cast to `bigint` so integer columns of any width compare
/// against `i64` bindings.
pub struct QueryGenerator;

impl QueryGenerator {
    /// Predicate selecting keys in the inclusive window `[start, end]`.
    ///
    /// Composite keys use row comparison, which Postgres evaluates lexicographically.
    pub fn window_predicate(
        columns: &KeyColumns,
        alias: Option<&str>,
        start: &Key,
        end: &Key,
        params: &mut ParamList,
    ) -> Result<String, DbError> {
        Self::check_arity(columns, start)?;
        Self::check_arity(columns, end)?;

        if !columns.is_composite() {
            let column = columns.render(alias);
            let low = params.bind_key_part(start.components()[0]);
            let high = params.bind_key_part(end.components()[0]);
            return Ok(format!("{column} BETWEEN {low} AND {high}"));
        }

        let lower = Self::bound(columns, alias, start, Bound::AtLeast, params);
        let upper = Self::bound(columns, alias, end, Bound::AtMost, params);
        Ok(format!("{lower} AND {upper}"))
    }

    /// Selects the first and the `limit`-th key of the next window (0 or 2 rows).
    pub fn key_window(
        table: &TableRef,
        columns: &KeyColumns,
        range: &BatchRange,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Statement, DbError> {
        Self::check_arity(columns, &range.start)?;
        Self::check_arity(columns, &range.end)?;

        let mut params = ParamList::default();
        let lower = match after {
            Some(key) => {
                Self::check_arity(columns, key)?;
                Self::bound(columns, None, key, Bound::After, &mut params)
            }
            None => Self::bound(columns, None, &range.start, Bound::AtLeast, &mut params),
        };
        let upper = Self::bound(columns, None, &range.end, Bound::AtMost, &mut params);
        let limit = params.bind(Value::Int(limit as i64));

        let select = Self::key_select(columns);
        let not_null = Self::not_null(columns);
        let order = columns.render(None);
        let order_desc = Self::aliases(columns)
            .iter()
            .map(|a| format!("{a} DESC"))
            .collect::<Vec<_>>()
            .join(", ");
        let from = table.quoted();

        let sql = format!(
            "(SELECT {select} FROM {from} WHERE {not_null} AND {lower} AND {upper} \
             ORDER BY {order} LIMIT 1) \
             UNION ALL \
             (SELECT * FROM (SELECT {select} FROM {from} WHERE {not_null} AND {lower} AND {upper} \
             ORDER BY {order} LIMIT {limit}::bigint) AS window_keys ORDER BY {order_desc} LIMIT 1)"
        );

        Ok(Statement::new(sql, params.into_values()))
    }

    /// Selects the smallest and largest key in the table (0 or 2 rows).
    pub fn key_bounds(table: &TableRef, columns: &KeyColumns) -> Statement {
        let select = Self::key_select(columns);
        let not_null = Self::not_null(columns);
        let from = table.quoted();
        let asc = columns.render(None);
        let desc = columns
            .columns()
            .iter()
            .map(|c| format!("{} DESC", c.quoted()))
            .collect::<Vec<_>>()
            .join(", ");

        Statement::raw(format!(
            "(SELECT {select} FROM {from} WHERE {not_null} ORDER BY {asc} LIMIT 1) \
             UNION ALL \
             (SELECT {select} FROM {from} WHERE {not_null} ORDER BY {desc} LIMIT 1)"
        ))
    }

    fn bound(
        columns: &KeyColumns,
        alias: Option<&str>,
        key: &Key,
        bound: Bound,
        params: &mut ParamList,
    ) -> String {
        let placeholders = key
            .components()
            .iter()
            .map(|part| params.bind_key_part(*part))
            .collect::<Vec<_>>()
            .join(", ");
        let op = bound.operator();

        if columns.is_composite() {
            format!("({}) {op} ({placeholders})", columns.render(alias))
        } else {
            format!("{} {op} {placeholders}", columns.render(alias))
        }
    }

    fn key_select(columns: &KeyColumns) -> String {
        columns
            .columns()
            .iter()
            .zip(Self::aliases(columns))
            .map(|(c, alias)| format!("{}::bigint AS {alias}", c.quoted()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn not_null(columns: &KeyColumns) -> String {
        columns
            .columns()
            .iter()
            .map(|c| format!("{} IS NOT NULL", c.quoted()))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn aliases(columns: &KeyColumns) -> Vec<String> {
        (0..columns.len()).map(|i| format!("k{i}")).collect()
    }

    fn check_arity(columns: &KeyColumns, key: &Key) -> Result<(), DbError> {
        if key.arity() != columns.len() {
            return Err(DbError::QueryBuildError(format!(
                "key {key} does not match batch columns ({columns})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_scalar_window_with_between() {
        let mut params = ParamList::default();
        let sql = QueryGenerator::window_predicate(
            &KeyColumns::single("id"),
            None,
            &Key::Scalar(1),
            &Key::Scalar(100),
            &mut params,
        )
        .unwrap();

        assert_eq!(sql, "\"id\" BETWEEN $1::bigint AND $2::bigint");
        assert_eq!(params.into_values(), vec![Value::Int(1), Value::Int(100)]);
    }

    #[test]
    fn renders_composite_window_with_row_comparison() {
        let mut params = ParamList::starting_after(1);
        let sql = QueryGenerator::window_predicate(
            &KeyColumns::composite(&["deployment_id", "merge_request_id"]),
            Some("d"),
            &Key::Tuple(vec![1, 5]),
            &Key::Tuple(vec![3, 2]),
            &mut params,
        )
        .unwrap();

        assert_eq!(
            sql,
            "(d.\"deployment_id\", d.\"merge_request_id\") >= ($2::bigint, $3::bigint) \
             AND (d.\"deployment_id\", d.\"merge_request_id\") <= ($4::bigint, $5::bigint)"
        );
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn rejects_mismatched_key_arity() {
        let mut params = ParamList::default();
        let result = QueryGenerator::window_predicate(
            &KeyColumns::single("id"),
            None,
            &Key::Tuple(vec![1, 2]),
            &Key::Tuple(vec![3, 4]),
            &mut params,
        );
        assert!(matches!(result, Err(DbError::QueryBuildError(_))));
    }

    #[test]
    fn key_window_binds_after_key_exclusively() {
        let range = BatchRange::new(1, 50);
        let stmt = QueryGenerator::key_window(
            &TableRef::new("users"),
            &KeyColumns::single("id"),
            &range,
            Some(&Key::Scalar(10)),
            25,
        )
        .unwrap();

        assert!(stmt.sql.contains("\"id\" > $1::bigint"));
        assert!(stmt.sql.contains("\"id\" <= $2::bigint"));
        assert!(stmt.sql.contains("LIMIT $3::bigint"));
        assert_eq!(
            stmt.params,
            vec![Value::Int(10), Value::Int(50), Value::Int(25)]
        );
    }

    #[test]
    fn key_bounds_skips_null_keys() {
        let stmt = QueryGenerator::key_bounds(
            &TableRef::qualified("public", "uploads"),
            &KeyColumns::composite(&["model_type", "id"]),
        );
        assert!(stmt.sql.contains("\"model_type\" IS NOT NULL AND \"id\" IS NOT NULL"));
        assert!(stmt.sql.contains("ORDER BY \"model_type\" DESC, \"id\" DESC"));
        assert!(stmt.params.is_empty());
    }
}
