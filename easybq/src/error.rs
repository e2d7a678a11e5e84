//! Error types and result definitions for BigQuery operations.
//!
//! Every fallible operation in this crate returns [`BqResult`]. A [`BqError`] carries an
//! [`ErrorKind`] for programmatic handling, a static description, optional dynamic detail, the
//! originating error as its source, the callsite location and a captured backtrace. Load job
//! failures additionally carry the per-error details reported by the job.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use arrow::error::ArrowError;

use crate::types::JobError;

/// Convenient result type for BigQuery operations using [`BqError`] as the error type.
pub type BqResult<T> = Result<T, BqError>;

/// Detailed payload stored for every [`BqError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    job_errors: Vec<JobError>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for BigQuery operations.
#[derive(Debug, Clone)]
pub struct BqError {
    payload: ErrorPayload,
}

/// Categories of errors raised by this crate.
///
/// The first four kinds are configuration errors: they are raised before any remote call is
/// made and are never retried.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConnectionNotOpen,
    ContextNotActive,
    ConfigError,
    InvalidCredentials,

    // Runtime Availability Errors
    ClientUnavailable,

    // Remote Errors
    AuthenticationError,
    QueryFailed,
    LoadJobFailed,
    RemoteIoError,

    // Data & Serialization Errors
    SerializationError,
    DeserializationError,
    ConversionError,
    InvalidData,

    // Unknown / Uncategorized
    Unknown,
}

impl BqError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the errors reported by a failed load job.
    ///
    /// Empty for every kind other than [`ErrorKind::LoadJobFailed`].
    pub fn job_errors(&self) -> &[JobError] {
        &self.payload.job_errors
    }

    /// Returns `true` for errors raised before any remote call because of misuse or
    /// misconfiguration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionNotOpen
                | ErrorKind::ContextNotActive
                | ErrorKind::ConfigError
                | ErrorKind::InvalidCredentials
        )
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Attaches the errors reported by a load job.
    pub fn with_job_errors(mut self, job_errors: Vec<JobError>) -> Self {
        self.payload.job_errors = job_errors;
        self
    }

    /// Creates a [`BqError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        BqError {
            payload: ErrorPayload {
                kind,
                description,
                detail,
                job_errors: Vec::new(),
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            },
        }
    }
}

impl PartialEq for BqError {
    fn eq(&self, other: &BqError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for BqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        write_detail(payload.detail.as_deref(), f, 1)?;
        write_job_errors(&payload.job_errors, f, 1)?;
        write_backtrace(payload.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for BqError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);
    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Writes one line per job error.
fn write_job_errors(
    job_errors: &[JobError],
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    if job_errors.is_empty() {
        return Ok(());
    }

    let indent_str = "  ".repeat(indent);
    write!(f, "\n{indent_str}Job errors:")?;
    for (index, job_error) in job_errors.iter().enumerate() {
        write!(f, "\n{indent_str}  {}. {job_error}", index + 1)?;
    }

    Ok(())
}

/// Creates a [`BqError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for BqError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> BqError {
        BqError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`BqError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for BqError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> BqError {
        BqError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`serde_json::Error`] to [`BqError`] with the appropriate error kind.
///
/// Writer failures map to [`ErrorKind::SerializationError`]; malformed input maps to
/// [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for BqError {
    #[track_caller]
    fn from(err: serde_json::Error) -> BqError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON I/O operation failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };
        let detail = err.to_string();
        BqError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`ArrowError`] to [`BqError`].
///
/// JSON writer failures surface as [`ErrorKind::SerializationError`], everything else as
/// [`ErrorKind::ConversionError`].
impl From<ArrowError> for BqError {
    #[track_caller]
    fn from(err: ArrowError) -> BqError {
        let (kind, description) = match err {
            ArrowError::JsonError(_) | ArrowError::IoError(..) => (
                ErrorKind::SerializationError,
                "Arrow JSON serialization failed",
            ),
            _ => (ErrorKind::ConversionError, "Arrow conversion failed"),
        };
        let detail = err.to_string();
        BqError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
