//! Purpose: Single error type shared by the re-paginator, host collaborators, CLI and server.
//! Exports: `Error`, `ErrorKind`, `ErrorPayload`, `to_exit_code`.
//! Role: Builder-style error carrying a stable kind plus optional request context.
//! Invariants: `ErrorKind` values and exit codes are stable across releases.
//! Invariants: A remote body, when present, is returned to callers byte-for-byte.
use serde::Serialize;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;

pub const INVALID_REPORTID: &str = "INVALID_REPORTID";
pub const INVALID_REPORTID_MESSAGE: &str = "The dataset/saved search id is invalid";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    InvalidReportId,
    NotFound,
    Permission,
    Host,
    Io,
}

impl ErrorKind {
    /// Machine code used in `{"error": ..., "message": ...}` payloads.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Usage => "INVALID_ARGUMENT",
            ErrorKind::InvalidReportId => INVALID_REPORTID,
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Permission => "PERMISSION_DENIED",
            ErrorKind::Host => "HOST_ERROR",
            ErrorKind::Io => "IO_ERROR",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    report_id: Option<String>,
    host_page: Option<u64>,
    remote_body: Option<Value>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            report_id: None,
            host_page: None,
            remote_body: None,
            source: None,
        }
    }

    pub fn invalid_report_id(report_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidReportId)
            .with_message(INVALID_REPORTID_MESSAGE)
            .with_report_id(report_id)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn report_id(&self) -> Option<&str> {
        self.report_id.as_deref()
    }

    pub fn host_page(&self) -> Option<u64> {
        self.host_page
    }

    pub fn remote_body(&self) -> Option<&Value> {
        self.remote_body.as_ref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_report_id(mut self, report_id: impl Into<String>) -> Self {
        self.report_id = Some(report_id.into());
        self
    }

    pub fn with_host_page(mut self, index: u64) -> Self {
        self.host_page = Some(index);
        self
    }

    pub fn with_remote_body(mut self, body: Value) -> Self {
        self.remote_body = Some(body);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Caller-facing payload. Collaborator bodies pass through untouched.
    pub fn payload(&self) -> Value {
        if let Some(body) = &self.remote_body {
            return body.clone();
        }
        let payload = ErrorPayload {
            error: self.kind.code().to_string(),
            message: self.display_message(),
        };
        serde_json::to_value(payload).unwrap_or(Value::Null)
    }

    pub fn display_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match self.kind {
            ErrorKind::Internal => "internal error".to_string(),
            ErrorKind::Usage => "usage error".to_string(),
            ErrorKind::InvalidReportId => INVALID_REPORTID_MESSAGE.to_string(),
            ErrorKind::NotFound => "not found".to_string(),
            ErrorKind::Permission => "permission denied".to_string(),
            ErrorKind::Host => "host platform error".to_string(),
            ErrorKind::Io => "i/o error".to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(report_id) = &self.report_id {
            write!(f, " (report: {report_id})")?;
        }
        if let Some(index) = self.host_page {
            write!(f, " (host page: {index})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    pub message: String,
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::InvalidReportId => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::Permission => 5,
        ErrorKind::Host => 6,
        ErrorKind::Io => 7,
    }
}
