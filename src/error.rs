use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Closed classification of everything that can go wrong while mapping,
/// encrypting or storing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A type, provider or handler cannot satisfy its configured role.
    InvalidConfigType,
    /// Scalar text does not parse to the declared type.
    ValueConversionFailed,
    /// An encrypted crypto-provider payload could not be resolved or decrypted.
    CryptographyProviderCreationFailed,
    /// The underlying storage rejected a write or delete.
    AccessDenied,
    /// Any other OS-level I/O failure.
    Io,
    /// The operation is invalid for the provider it was sent to.
    NotSupported,
    /// The document or its top-level section node is malformed or missing.
    InvalidDocument,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidConfigType => "InvalidConfigType",
            ErrorCode::ValueConversionFailed => "ValueConversionFailed",
            ErrorCode::CryptographyProviderCreationFailed => "CryptographyProviderCreationFailed",
            ErrorCode::AccessDenied => "AccessDenied",
            ErrorCode::Io => "Io",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::InvalidDocument => "InvalidDocument",
        };
        f.write_str(name)
    }
}

/// One entry of the ordered error list collected during a read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub code: ErrorCode,
    pub message: String,
}

impl ConfigError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfigType, message)
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValueConversionFailed, message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A successful mapping result together with the non-fatal errors it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped<T> {
    pub value: T,
    pub errors: Vec<ConfigError>,
}

impl<T> Mapped<T> {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Mapped<U> {
        Mapped {
            value: f(self.value),
            errors: self.errors,
        }
    }
}

#[derive(Debug, Error)]
pub enum XmlfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Access denied: {path} is read-only")]
    AccessDenied { path: PathBuf },

    #[error("No user profile directory is available for '{app_name}'")]
    NoProfileDirectory { app_name: String },

    #[error("{provider} does not support {operation}")]
    NotSupported {
        provider: String,
        operation: &'static str,
    },

    #[error("Malformed XML: {reason}")]
    Xml { reason: String },

    #[error("Configuration mapping failed: {failure} ({} earlier error(s))", .errors.len())]
    Mapping {
        failure: ConfigError,
        errors: Vec<ConfigError>,
    },

    #[error("Engine options error: {0}")]
    Options(#[from] confique::Error),

    #[error("Failed to parse {path}: {source}")]
    OptionsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unknown option '{key}' in {path} (line {line})")]
    UnknownOption {
        key: String,
        path: PathBuf,
        line: usize,
    },

    #[error("Unknown options in engine options file")]
    UnknownOptions(Vec<XmlfigError>),
}

impl XmlfigError {
    /// Build the aggregate error for a fatal mapping failure.
    pub fn mapping(failure: ConfigError, errors: Vec<ConfigError>) -> Self {
        XmlfigError::Mapping { failure, errors }
    }

    /// Map an I/O error on `path`, classifying permission failures as access denied.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            XmlfigError::AccessDenied { path }
        } else {
            XmlfigError::Io { path, source }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            XmlfigError::Io { .. } | XmlfigError::NoProfileDirectory { .. } => ErrorCode::Io,
            XmlfigError::AccessDenied { .. } => ErrorCode::AccessDenied,
            XmlfigError::NotSupported { .. } => ErrorCode::NotSupported,
            XmlfigError::Xml { .. } => ErrorCode::InvalidDocument,
            XmlfigError::Mapping { failure, .. } => failure.code,
            XmlfigError::Options(_)
            | XmlfigError::OptionsParse { .. }
            | XmlfigError::UnknownOption { .. }
            | XmlfigError::UnknownOptions(_) => ErrorCode::InvalidDocument,
        }
    }

    /// Every error this failure carries, non-fatal ones first and the fatal one last.
    pub fn errors(&self) -> Vec<ConfigError> {
        match self {
            XmlfigError::Mapping { failure, errors } => {
                let mut all = errors.clone();
                all.push(failure.clone());
                all
            }
            other => vec![ConfigError::new(other.code(), other.to_string())],
        }
    }
}
