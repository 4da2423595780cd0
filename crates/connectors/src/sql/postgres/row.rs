use chrono::{DateTime, NaiveDateTime, Utc};
use model::{
    core::value::Value,
    records::row::{FieldValue, RowData},
};
use tokio_postgres::{
    Row as PgRow,
    types::{Json as PgJson, Type},
};
use tracing::warn;

/// Converts a driver row into [`RowData`], decoding each column by its Postgres type.
pub fn to_row_data(row: &PgRow, entity: &str) -> RowData {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| FieldValue {
            name: column.name().to_string(),
            value: decode(row, idx, column.type_()),
        })
        .collect();

    RowData::new(entity, fields)
}

fn decode(row: &PgRow, idx: usize, ty: &Type) -> Value {
    let value = match *ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|v| Value::Int(v as i64))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|v| Value::Int(v as i64))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::Int)),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|v| Value::Float(v as f64))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::Float)),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Boolean)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(Value::String)),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<PgJson<serde_json::Value>>>(idx)
            .map(|v| v.map(|json| Value::Json(json.0))),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(Value::Timestamp)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(|ts| Value::Timestamp(ts.and_utc()))),
        _ => {
            warn!(column = %row.columns()[idx].name(), pg_type = %ty, "Unsupported column type, reading as NULL");
            return Value::Null;
        }
    };

    match value {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(err) => {
            warn!(column = %row.columns()[idx].name(), %err, "Failed to decode column");
            Value::Null
        }
    }
}
