//! Error types and result definitions for pipeline operations.
//!
//! A single [`PipelineError`] type carries an [`ErrorKind`] classification
//! together with a static description, optional dynamic detail, an optional
//! source error and captured callsite metadata. Per-entity failures are
//! converted into stage reports by the orchestrators; only setup failures
//! (unreachable stores, bad configuration) abort a whole run.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for pipeline operations using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Detailed payload stored inside a [`PipelineError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for pipeline operations.
#[derive(Debug, Clone)]
pub struct PipelineError {
    payload: ErrorPayload,
}

/// Categories of failures that can occur while moving data through the
/// pipeline.
///
/// The kinds mirror the seams of the system: the object store, the source
/// and warehouse databases, and the tabular transforms in between.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Object store
    /// The store itself is missing or unreachable. Distinct from a missing
    /// object: callers must never treat this as "no watermark yet".
    StoreUnavailable,
    /// An expected object is absent from the store.
    NoSuchObject,

    // Databases
    /// A table name failed the catalog allow-list check.
    UnknownTable,
    SourceConnectionFailed,
    /// Malformed SQL, constraint violation or connectivity failure.
    DatabaseError,

    // Tabular data
    /// A value or shape that the transforms cannot work with, such as a
    /// non-tabular input or a dangling foreign key.
    MalformedInput,
    SerializationError,
    DeserializationError,

    // General
    ConfigError,
    InvalidState,
    Unknown,
}

impl PipelineError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] and returns the modified
    /// instance. The stored source is exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        PipelineError {
            payload: ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location,
                backtrace,
            },
        }
    }
}

impl PartialEq for PipelineError {
    fn eq(&self, other: &PipelineError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload.detail {
            Some(detail) => write!(
                f,
                "{:?}: {} -> {}",
                self.payload.kind, self.payload.description, detail
            ),
            None => write!(f, "{:?}: {}", self.payload.kind, self.payload.description),
        }
    }
}

impl error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for PipelineError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> Self {
        PipelineError::from_components(kind, Cow::Borrowed(description), None)
    }
}

impl From<(ErrorKind, String)> for PipelineError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, String)) -> Self {
        PipelineError::from_components(kind, Cow::Owned(description), None)
    }
}

impl From<(ErrorKind, &'static str, String)> for PipelineError {
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, String)) -> Self {
        PipelineError::from_components(kind, Cow::Borrowed(description), Some(Cow::Owned(detail)))
    }
}
