//! 将 sqlx 结果行解码为 `Record`
//!
//! 先按列类型名选择解码类型；未知类型依次尝试整数、浮点、文本、二进制。

use crate::error::{Result, SqlxFluentError};
use crate::executor::Record;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{Column, Row, TypeInfo};

fn to_json<T: Serialize>(value: Option<T>) -> JsonValue {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(JsonValue::Null)
}

/// 按给定类型解码第 `index` 列
macro_rules! get_json {
    ($row:expr, $index:expr, $ty:ty) => {
        $row.try_get::<Option<$ty>, _>($index).map(to_json)
    };
}

/// 未知类型的回退解码链
fn decode_fallback<'r, R>(row: &'r R, index: usize) -> std::result::Result<JsonValue, sqlx::Error>
where
    R: Row,
    usize: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    f64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Vec<u8>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    get_json!(row, index, i64)
        .or_else(|_| get_json!(row, index, f64))
        .or_else(|_| get_json!(row, index, String))
        .or_else(|_| get_json!(row, index, Vec<u8>))
}

fn build_record<R, F>(row: &R, mut decode: F) -> Result<Record>
where
    R: Row,
    F: FnMut(&R, usize, &str) -> std::result::Result<JsonValue, sqlx::Error>,
{
    let mut record = Record::new();
    for column in row.columns() {
        let index = column.ordinal();
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = decode(row, index, &type_name)
            .map_err(|e| SqlxFluentError::decode(column.name(), e.to_string()))?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[cfg(feature = "postgres")]
pub(crate) fn pg_record(row: &sqlx::postgres::PgRow) -> Result<Record> {
    build_record(row, |row, i, type_name| match type_name {
        "BOOL" => get_json!(row, i, bool),
        "INT2" => get_json!(row, i, i16),
        "INT4" => get_json!(row, i, i32),
        "INT8" => get_json!(row, i, i64),
        "FLOAT4" => get_json!(row, i, f32),
        "FLOAT8" => get_json!(row, i, f64),
        "NUMERIC" => get_json!(row, i, bigdecimal::BigDecimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => get_json!(row, i, String),
        "JSON" | "JSONB" => get_json!(row, i, JsonValue),
        "TIMESTAMP" => get_json!(row, i, chrono::NaiveDateTime),
        "TIMESTAMPTZ" => get_json!(row, i, chrono::DateTime<chrono::Utc>),
        "DATE" => get_json!(row, i, chrono::NaiveDate),
        "TIME" => get_json!(row, i, chrono::NaiveTime),
        "BYTEA" => get_json!(row, i, Vec<u8>),
        _ => decode_fallback(row, i),
    })
}

#[cfg(feature = "mysql")]
pub(crate) fn mysql_record(row: &sqlx::mysql::MySqlRow) -> Result<Record> {
    build_record(row, |row, i, type_name| match type_name {
        "BOOLEAN" => get_json!(row, i, bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            get_json!(row, i, i64)
        }
        name if name.ends_with(" UNSIGNED") => get_json!(row, i, u64),
        "FLOAT" => get_json!(row, i, f32),
        "DOUBLE" => get_json!(row, i, f64),
        "DECIMAL" => get_json!(row, i, bigdecimal::BigDecimal),
        "JSON" => get_json!(row, i, JsonValue),
        "DATETIME" => get_json!(row, i, chrono::NaiveDateTime),
        "TIMESTAMP" => get_json!(row, i, chrono::DateTime<chrono::Utc>),
        "DATE" => get_json!(row, i, chrono::NaiveDate),
        "TIME" => get_json!(row, i, chrono::NaiveTime),
        _ => decode_fallback(row, i),
    })
}

#[cfg(feature = "sqlite")]
pub(crate) fn sqlite_record(row: &sqlx::sqlite::SqliteRow) -> Result<Record> {
    build_record(row, |row, i, type_name| match type_name {
        "BOOLEAN" => get_json!(row, i, bool),
        "INTEGER" => get_json!(row, i, i64),
        "REAL" => get_json!(row, i, f64),
        "TEXT" => get_json!(row, i, String),
        "BLOB" => get_json!(row, i, Vec<u8>),
        "DATETIME" => get_json!(row, i, chrono::NaiveDateTime)
            .or_else(|_| get_json!(row, i, String)),
        _ => decode_fallback(row, i),
    })
}
