use std::fmt;

use serde::Serialize;

/// An error raised by a corm operation.
///
/// Backend failures keep the driver's own message verbatim in `message`;
/// the `kind` says which stage rejected the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CormError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CormError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Capacity, message)
    }

    /// A validator rejected `field`.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Validation,
            format!("{}: {}", field, message.into()),
        )
    }

    pub fn prepare(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Prepare, message)
    }

    pub fn bind(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Bind, message)
    }

    pub fn exec(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exec, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Allocation, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connect, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }
}

/// The stage or rule that produced a [`CormError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Bad model declaration: primary-key count, unresolved relationship
    /// target, unknown or misused field.
    Schema,
    /// The model registry is full.
    Capacity,
    /// A field validator rejected a value. Nothing was written.
    Validation,
    /// The backend rejected the SQL text.
    Prepare,
    /// The backend rejected a parameter, or the value has no binder.
    Bind,
    /// Execution failed (constraint violation, I/O, ...).
    Exec,
    /// A delete matched no row.
    NotFound,
    /// The allocator refused a charge while materializing a result.
    Allocation,
    /// The backend could not open a connection.
    Connect,
    /// The requested mode or feature is not implemented.
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema => write!(f, "schema error"),
            Self::Capacity => write!(f, "capacity error"),
            Self::Validation => write!(f, "validation error"),
            Self::Prepare => write!(f, "prepare error"),
            Self::Bind => write!(f, "bind error"),
            Self::Exec => write!(f, "exec error"),
            Self::NotFound => write!(f, "not found"),
            Self::Allocation => write!(f, "allocation error"),
            Self::Connect => write!(f, "connect error"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

impl fmt::Display for CormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CormError {}
