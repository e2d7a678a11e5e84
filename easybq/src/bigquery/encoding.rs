//! Conversions between BigQuery REST payloads and Arrow.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, AsArray, BinaryBuilder, BooleanBuilder, Date32Builder, Float64Builder,
    Int64Builder, StringArray, StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Schema, SchemaRef, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use arrow::json::LineDelimitedWriter;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat};
use serde_json::{Map, Value};

use crate::bigquery::model::{TableFieldSchema, TableRow, TableSchema};
use crate::bq_error;
use crate::error::{BqResult, ErrorKind};

/// Days between 0001-01-01 and 1970-01-01 in the proleptic Gregorian calendar.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Arrow representation chosen for a BigQuery column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int64,
    Float64,
    Boolean,
    Timestamp,
    Date,
    Bytes,
    /// Records and repeated fields, rendered as JSON text.
    Json,
    Utf8,
}

impl ColumnKind {
    fn for_field(field: &TableFieldSchema) -> Self {
        if field.is_repeated() {
            return ColumnKind::Json;
        }

        match field.field_type.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT64" => ColumnKind::Int64,
            "FLOAT" | "FLOAT64" => ColumnKind::Float64,
            "BOOLEAN" | "BOOL" => ColumnKind::Boolean,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "DATE" => ColumnKind::Date,
            "BYTES" => ColumnKind::Bytes,
            "RECORD" | "STRUCT" => ColumnKind::Json,
            _ => ColumnKind::Utf8,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Bytes => DataType::Binary,
            ColumnKind::Json | ColumnKind::Utf8 => DataType::Utf8,
        }
    }
}

/// Maps a BigQuery result schema to an Arrow schema.
pub fn arrow_schema(schema: &TableSchema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields
        .iter()
        .map(|field| {
            Field::new(
                &field.name,
                ColumnKind::for_field(field).data_type(),
                !field.is_required() || field.is_repeated(),
            )
        })
        .collect();

    Arc::new(Schema::new(fields))
}

/// Converts REST rows to a record batch with the schema returned by [`arrow_schema`].
pub fn rows_to_record_batch(schema: &TableSchema, rows: &[TableRow]) -> BqResult<RecordBatch> {
    let arrow_schema = arrow_schema(schema);

    let columns = schema
        .fields
        .iter()
        .enumerate()
        .map(|(index, field)| build_column(rows, index, field))
        .collect::<BqResult<Vec<ArrayRef>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    let batch = RecordBatch::try_new_with_options(arrow_schema, columns, &options)?;

    Ok(batch)
}

fn build_column(rows: &[TableRow], index: usize, field: &TableFieldSchema) -> BqResult<ArrayRef> {
    let kind = ColumnKind::for_field(field);
    let cells = rows.iter().map(|row| cell_value(row, index, field));

    let array: ArrayRef = match kind {
        ColumnKind::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(scalar(cell?, field, parse_int64)?);
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(scalar(cell?, field, parse_float64)?);
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(scalar(cell?, field, parse_boolean)?);
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Timestamp => {
            let mut builder =
                TimestampMicrosecondBuilder::with_capacity(rows.len()).with_timezone("UTC");
            for cell in cells {
                builder.append_option(scalar(cell?, field, parse_timestamp_micros)?);
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Date => {
            let mut builder = Date32Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(scalar(cell?, field, parse_date32)?);
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Bytes => {
            let mut builder = BinaryBuilder::new();
            for cell in cells {
                builder.append_option(scalar(cell?, field, parse_base64)?);
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Json => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                let value = cell?;
                if value.is_null() {
                    builder.append_null();
                } else {
                    builder.append_value(plain_json(field, value).to_string());
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Utf8 => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                builder.append_option(scalar(cell?, field, |text| Ok(text.to_string()))?);
            }
            Arc::new(builder.finish())
        }
    };

    Ok(array)
}

fn cell_value<'a>(row: &'a TableRow, index: usize, field: &TableFieldSchema) -> BqResult<&'a Value> {
    row.f.get(index).map(|cell| &cell.v).ok_or_else(|| {
        bq_error!(
            ErrorKind::InvalidData,
            "BigQuery row is missing a column",
            format!("column {} at position {index}", field.name)
        )
    })
}

/// Applies `parse` to the textual form of a scalar cell. Null cells stay null.
fn scalar<T>(
    value: &Value,
    field: &TableFieldSchema,
    parse: impl Fn(&str) -> Result<T, String>,
) -> BqResult<Option<T>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => {
            return Err(bq_error!(
                ErrorKind::InvalidData,
                "BigQuery cell is not a scalar",
                format!("column {} holds {other}", field.name)
            ));
        }
    };

    parse(&text).map(Some).map_err(|reason| {
        bq_error!(
            ErrorKind::ConversionError,
            "Failed to convert BigQuery value",
            format!("column {} ({}): {reason}", field.name, field.field_type)
        )
    })
}

fn parse_int64(text: &str) -> Result<i64, String> {
    text.parse().map_err(|err| format!("invalid integer {text:?}: {err}"))
}

fn parse_float64(text: &str) -> Result<f64, String> {
    text.parse().map_err(|err| format!("invalid float {text:?}: {err}"))
}

fn parse_boolean(text: &str) -> Result<bool, String> {
    match text.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("invalid boolean {text:?}")),
    }
}

/// Accepts integer microseconds and the floating point seconds older endpoints return.
fn parse_timestamp_micros(text: &str) -> Result<i64, String> {
    if let Ok(micros) = text.parse::<i64>() {
        return Ok(micros);
    }

    text.parse::<f64>()
        .map(|seconds| (seconds * 1_000_000.0).round() as i64)
        .map_err(|err| format!("invalid timestamp {text:?}: {err}"))
}

fn parse_date32(text: &str) -> Result<i32, String> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .map_err(|err| format!("invalid date {text:?}: {err}"))
}

fn parse_base64(text: &str) -> Result<Vec<u8>, String> {
    STANDARD
        .decode(text)
        .map_err(|err| format!("invalid base64: {err}"))
}

/// Rewrites the `{"f": [{"v": ..}]}` and `[{"v": ..}]` wire shapes into plain JSON objects and
/// arrays keyed by field name.
fn plain_json(field: &TableFieldSchema, value: &Value) -> Value {
    if field.is_repeated() {
        let element_field = TableFieldSchema {
            mode: None,
            ..field.clone()
        };
        let elements = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| plain_json(&element_field, unwrap_v(item)))
                .collect(),
            other => vec![plain_json(&element_field, other)],
        };

        return Value::Array(elements);
    }

    match value {
        Value::Object(record) if !field.fields.is_empty() => {
            let cells = record
                .get("f")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let object: Map<String, Value> = field
                .fields
                .iter()
                .zip(cells)
                .map(|(child, cell)| (child.name.clone(), plain_json(child, unwrap_v(cell))))
                .collect();

            Value::Object(object)
        }
        other => other.clone(),
    }
}

fn unwrap_v(value: &Value) -> &Value {
    value.get("v").unwrap_or(value)
}

/// Encodes `batch` as newline-delimited JSON, one object per row.
///
/// Zoned timestamps are written as UTC RFC 3339 text and binary columns as base64, the forms
/// BigQuery reads for TIMESTAMP and BYTES. Non-finite floats have no JSON form and are rejected.
pub fn record_batch_to_ndjson(batch: &RecordBatch) -> BqResult<Vec<u8>> {
    let (fields, columns): (Vec<Field>, Vec<ArrayRef>) = batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| load_column(field, column))
        .collect::<BqResult<Vec<_>>>()?
        .into_iter()
        .unzip();

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    let encoded =
        RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;

    let mut writer = LineDelimitedWriter::new(Vec::new());
    writer.write(&encoded)?;
    writer.finish()?;

    Ok(writer.into_inner())
}

/// Rewrites a column into the representation BigQuery loads from JSON.
fn load_column(field: &Field, column: &ArrayRef) -> BqResult<(Field, ArrayRef)> {
    let text = |array: StringArray| -> (Field, ArrayRef) {
        (
            Field::new(field.name(), DataType::Utf8, field.is_nullable()),
            Arc::new(array),
        )
    };

    match field.data_type() {
        DataType::Timestamp(unit, Some(_)) => Ok(text(utc_timestamps(column, *unit, field.name())?)),
        DataType::Binary => Ok(text(base64_strings(column.as_binary::<i32>().iter()))),
        DataType::LargeBinary => Ok(text(base64_strings(column.as_binary::<i64>().iter()))),
        DataType::FixedSizeBinary(_) => {
            Ok(text(base64_strings(column.as_fixed_size_binary().iter())))
        }
        DataType::Float32 => {
            let values = column.as_primitive::<Float32Type>().iter();
            ensure_finite(values.map(|value| value.map(f64::from)), field.name())?;
            Ok((field.clone(), Arc::clone(column)))
        }
        DataType::Float64 => {
            ensure_finite(column.as_primitive::<Float64Type>().iter(), field.name())?;
            Ok((field.clone(), Arc::clone(column)))
        }
        _ => Ok((field.clone(), Arc::clone(column))),
    }
}

/// Formats instants as UTC text. Arrow stores zoned timestamps as UTC epoch offsets, so the
/// zone name only affects display and is not needed here.
fn utc_timestamps(column: &ArrayRef, unit: TimeUnit, name: &str) -> BqResult<StringArray> {
    let (values, units_per_second): (Vec<Option<i64>>, i64) = match unit {
        TimeUnit::Second => (column.as_primitive::<TimestampSecondType>().iter().collect(), 1),
        TimeUnit::Millisecond => (
            column.as_primitive::<TimestampMillisecondType>().iter().collect(),
            1_000,
        ),
        TimeUnit::Microsecond => (
            column.as_primitive::<TimestampMicrosecondType>().iter().collect(),
            1_000_000,
        ),
        TimeUnit::Nanosecond => (
            column.as_primitive::<TimestampNanosecondType>().iter().collect(),
            1_000_000_000,
        ),
    };

    values
        .into_iter()
        .map(|value| {
            value
                .map(|value| format_utc(value, units_per_second, name))
                .transpose()
        })
        .collect()
}

fn format_utc(value: i64, units_per_second: i64, name: &str) -> BqResult<String> {
    let seconds = value.div_euclid(units_per_second);
    let nanos = value.rem_euclid(units_per_second) * (1_000_000_000 / units_per_second);

    u32::try_from(nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(seconds, nanos))
        .map(|instant| instant.to_rfc3339_opts(SecondsFormat::Micros, true))
        .ok_or_else(|| {
            bq_error!(
                ErrorKind::ConversionError,
                "Timestamp is out of range",
                format!("column {name}: {value}")
            )
        })
}

fn base64_strings<'a>(values: impl Iterator<Item = Option<&'a [u8]>>) -> StringArray {
    values
        .map(|value| value.map(|bytes| STANDARD.encode(bytes)))
        .collect()
}

fn ensure_finite(values: impl Iterator<Item = Option<f64>>, name: &str) -> BqResult<()> {
    match values.flatten().find(|value| !value.is_finite()) {
        Some(value) => Err(bq_error!(
            ErrorKind::ConversionError,
            "BigQuery cannot load non-finite floats",
            format!("column {name}: {value}")
        )),
        None => Ok(()),
    }
}

/// Builds a `multipart/related` body holding the job resource and the data to load.
///
/// Returns the body and the matching `Content-Type` header value.
pub fn multipart_related_body(metadata: &[u8], data: &[u8], boundary: &str) -> (Vec<u8>, String) {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    (body, format!("multipart/related; boundary={boundary}"))
}
