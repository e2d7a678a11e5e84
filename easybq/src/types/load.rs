use std::fmt;

use serde::{Deserialize, Serialize};

/// Policy applied when the destination table of a load job already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteDisposition {
    /// Replaces the table data and schema.
    #[serde(rename = "WRITE_TRUNCATE")]
    Truncate,
    /// Appends rows to the existing table.
    #[default]
    #[serde(rename = "WRITE_APPEND")]
    Append,
    /// Fails unless the table is empty.
    #[serde(rename = "WRITE_EMPTY")]
    Empty,
    #[serde(rename = "WRITE_DISPOSITION_UNSPECIFIED")]
    Unspecified,
    /// Replaces the table data but keeps its schema.
    #[serde(rename = "WRITE_TRUNCATE_DATA")]
    TruncateData,
}

impl WriteDisposition {
    /// Returns the wire name understood by BigQuery.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
            WriteDisposition::Append => "WRITE_APPEND",
            WriteDisposition::Empty => "WRITE_EMPTY",
            WriteDisposition::Unspecified => "WRITE_DISPOSITION_UNSPECIFIED",
            WriteDisposition::TruncateData => "WRITE_TRUNCATE_DATA",
        }
    }
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy applied when the destination table of a load job does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDisposition {
    #[default]
    CreateIfNeeded,
    CreateNever,
}

/// BigQuery standard SQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    BigNumeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Json,
}

/// Nullability and repetition of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

/// Explicit column definition for a load destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mode: FieldMode,
}

impl SchemaField {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Settings submitted with a load job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadJobConfig {
    pub create_disposition: CreateDisposition,
    pub write_disposition: WriteDisposition,
    /// When `true` BigQuery infers the schema from the data and `schema` is `None`.
    pub autodetect: bool,
    pub schema: Option<Vec<SchemaField>>,
}

/// A single error reported by a BigQuery job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = self.reason.as_deref().unwrap_or("unknown");
        let message = self.message.as_deref().unwrap_or("<no message>");
        write!(f, "{reason}: {message}")?;
        if let Some(location) = &self.location {
            write!(f, " (at {location})")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_disposition_defaults_to_append() {
        assert_eq!(WriteDisposition::default(), WriteDisposition::Append);
    }

    #[test]
    fn test_write_disposition_wire_names() {
        let names: Vec<String> = [
            WriteDisposition::Truncate,
            WriteDisposition::Append,
            WriteDisposition::Empty,
            WriteDisposition::Unspecified,
            WriteDisposition::TruncateData,
        ]
        .iter()
        .map(|disposition| serde_json::to_value(disposition).unwrap())
        .map(|value| value.as_str().unwrap().to_string())
        .collect();

        assert_eq!(
            names,
            [
                "WRITE_TRUNCATE",
                "WRITE_APPEND",
                "WRITE_EMPTY",
                "WRITE_DISPOSITION_UNSPECIFIED",
                "WRITE_TRUNCATE_DATA"
            ]
        );
        assert_eq!(WriteDisposition::TruncateData.to_string(), "WRITE_TRUNCATE_DATA");
    }

    #[test]
    fn test_schema_field_serializes_like_bigquery() {
        let field = SchemaField::new("amount", FieldType::BigNumeric).with_mode(FieldMode::Required);

        let json = serde_json::to_value(&field).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"name": "amount", "type": "BIGNUMERIC", "mode": "REQUIRED"})
        );
        assert_eq!(
            serde_json::to_value(CreateDisposition::CreateIfNeeded).unwrap(),
            "CREATE_IF_NEEDED"
        );
    }

    #[test]
    fn test_job_error_deserializes_and_displays() {
        let error: JobError = serde_json::from_str(
            r#"{"reason": "invalid", "location": "row 3", "message": "bad value", "debugInfo": ""}"#,
        )
        .unwrap();

        assert_eq!(error.to_string(), "invalid: bad value (at row 3)");
    }
}
