//! Error types for podcraft

use std::fmt;

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors that can occur while provisioning or inspecting a tenant environment
#[derive(Debug)]
pub enum ProvisionError {
    /// Object does not exist where one was required
    NotFound { kind: String, name: String },
    /// Object changed between read and update (HTTP 409)
    Conflict {
        kind: String,
        name: String,
        message: String,
    },
    /// Operator credential was rejected (HTTP 401)
    Unauthorized(String),
    /// Operator credential lacks permission for the object (HTTP 403)
    Forbidden {
        kind: String,
        name: String,
        message: String,
    },
    /// API server unreachable or connection failed
    Transport(String),
    /// Malformed input caught before any write
    Validation(String),
    /// API server rejected the request for another reason
    Rejected {
        kind: String,
        name: String,
        message: String,
    },
    /// Kubeconfig or client configuration error
    Configuration(String),
    /// Serialization error
    Serialization(String),
    /// Filesystem error
    Io(String),
    /// Caller-supplied deadline expired before the pipeline finished
    DeadlineExceeded,
}

/// Coarse classification of a [`ProvisionError`], recorded in step logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Transport,
    Validation,
    Rejected,
    Configuration,
    Serialization,
    Io,
    DeadlineExceeded,
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::NotFound { .. } => ErrorKind::NotFound,
            ProvisionError::Conflict { .. } => ErrorKind::Conflict,
            ProvisionError::Unauthorized(_) => ErrorKind::Unauthorized,
            ProvisionError::Forbidden { .. } => ErrorKind::Forbidden,
            ProvisionError::Transport(_) => ErrorKind::Transport,
            ProvisionError::Validation(_) => ErrorKind::Validation,
            ProvisionError::Rejected { .. } => ErrorKind::Rejected,
            ProvisionError::Configuration(_) => ErrorKind::Configuration,
            ProvisionError::Serialization(_) => ErrorKind::Serialization,
            ProvisionError::Io(_) => ErrorKind::Io,
            ProvisionError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }

    /// Classify a `kube::Error` raised while operating on `kind`/`name`.
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => ProvisionError::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                },
                409 => ProvisionError::Conflict {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: ae.message,
                },
                401 => ProvisionError::Unauthorized(ae.message),
                403 => ProvisionError::Forbidden {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: ae.message,
                },
                _ => ProvisionError::Rejected {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: format!("{} ({})", ae.message, ae.code),
                },
            },
            kube::Error::HyperError(e) => ProvisionError::Transport(e.to_string()),
            kube::Error::Service(e) => ProvisionError::Transport(e.to_string()),
            kube::Error::SerdeError(e) => ProvisionError::Serialization(e.to_string()),
            other => ProvisionError::Transport(other.to_string()),
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::NotFound { kind, name } => {
                write!(f, "{} {} not found", kind, name)
            }
            ProvisionError::Conflict {
                kind,
                name,
                message,
            } => write!(
                f,
                "{} {} was modified concurrently, re-run to converge: {}",
                kind, name, message
            ),
            ProvisionError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ProvisionError::Forbidden {
                kind,
                name,
                message,
            } => write!(f, "Forbidden on {} {}: {}", kind, name, message),
            ProvisionError::Transport(msg) => write!(f, "API server unavailable: {}", msg),
            ProvisionError::Validation(msg) => write!(f, "Invalid input: {}", msg),
            ProvisionError::Rejected {
                kind,
                name,
                message,
            } => write!(f, "{} {} rejected by API server: {}", kind, name, message),
            ProvisionError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ProvisionError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ProvisionError::Io(msg) => write!(f, "I/O error: {}", msg),
            ProvisionError::DeadlineExceeded => {
                write!(f, "Deadline exceeded, environment left partially converged")
            }
        }
    }
}

impl std::error::Error for ProvisionError {}

impl From<kube::Error> for ProvisionError {
    fn from(err: kube::Error) -> Self {
        ProvisionError::from_kube(err, "object", "")
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProvisionError {
    fn from(err: serde_yaml::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(err: std::io::Error) -> Self {
        ProvisionError::Io(err.to_string())
    }
}
