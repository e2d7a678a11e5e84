//! Subset of the BigQuery REST resources used by the query and load paths.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{
    CreateDisposition, FieldMode, JobError, SchemaField, TableReference, WriteDisposition,
};

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    pub fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }

    pub fn is_required(&self) -> bool {
        self.mode.as_deref() == Some("REQUIRED")
    }
}

impl From<&SchemaField> for TableFieldSchema {
    fn from(field: &SchemaField) -> Self {
        let mode = match field.mode {
            FieldMode::Nullable => "NULLABLE",
            FieldMode::Required => "REQUIRED",
            FieldMode::Repeated => "REPEATED",
        };
        let field_type = serde_json::to_value(field.field_type)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| "STRING".to_string());

        Self {
            name: field.name.clone(),
            field_type,
            mode: Some(mode.to_string()),
            fields: Vec::new(),
        }
    }
}

/// A row as returned by `jobs.getQueryResults` and `tabledata.list`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableRow {
    #[serde(default, deserialize_with = "null_as_default")]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

/// One page of `jobs.query` or `jobs.getQueryResults`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultsPage {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: Option<bool>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub page_token: Option<String>,
    /// Sent as a decimal string by the REST API.
    #[serde(default)]
    pub total_rows: Option<serde_json::Value>,
}

impl QueryResultsPage {
    pub fn is_complete(&self) -> bool {
        self.job_complete.unwrap_or(false)
    }

    pub fn total_rows(&self) -> Option<u64> {
        match self.total_rows.as_ref()? {
            serde_json::Value::String(rows) => rows.parse().ok(),
            other => other.as_u64(),
        }
    }
}

/// Response of `tabledata.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<JobReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<JobConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JobStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JobConfigurationQuery>,
    /// Only sent; responses may leave out fields the request requires.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub load: Option<JobConfigurationLoad>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationLoad {
    pub destination_table: TableReference,
    pub source_format: String,
    pub create_disposition: CreateDisposition,
    pub write_disposition: WriteDisposition,
    pub autodetect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result: Option<JobError>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub errors: Vec<JobError>,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        self.state.as_deref() == Some("DONE")
    }

    /// Errors of a finished job, including the fatal error when it is not already listed.
    pub fn all_errors(&self) -> Vec<JobError> {
        let mut errors = self.errors.clone();
        if let Some(error_result) = &self.error_result {
            if !errors.contains(error_result) {
                errors.insert(0, error_result.clone());
            }
        }

        errors
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<String>,
}

/// Error envelope returned by the REST API on non-success status codes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<JobError>,
}
