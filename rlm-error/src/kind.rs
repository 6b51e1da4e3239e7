//! Error kinds for rlm operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Sandbox errors (reported back to the model, never abort a session)
    // =========================================================================
    /// Fragment tried to use a disallowed capability (files, network, processes)
    CapabilityDenied,

    /// Fragment exceeded its wall-clock budget
    ExecutionTimeout,

    /// Fragment raised at runtime (type mismatch, missing key, bad index, ...)
    RuntimeFault,

    /// Failed to parse input
    ParseFailed,

    // =========================================================================
    // Session errors
    // =========================================================================
    /// A recursive call would exceed the configured depth
    RecursionDepthExceeded,

    /// FINAL_VAR named a variable that is not in the namespace
    UnresolvedFinalVariable,

    /// The run was cancelled by the caller
    Cancelled,

    // =========================================================================
    // Model client errors
    // =========================================================================
    /// The model backend could not produce a response
    ModelUnavailable,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            // Sandbox
            ErrorKind::CapabilityDenied => "CapabilityDenied",
            ErrorKind::ExecutionTimeout => "ExecutionTimeout",
            ErrorKind::RuntimeFault => "RuntimeFault",
            ErrorKind::ParseFailed => "ParseFailed",

            // Session
            ErrorKind::RecursionDepthExceeded => "RecursionDepthExceeded",
            ErrorKind::UnresolvedFinalVariable => "UnresolvedFinalVariable",
            ErrorKind::Cancelled => "Cancelled",

            // Model
            ErrorKind::ModelUnavailable => "ModelUnavailable",
            ErrorKind::RateLimited => "RateLimited",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Parse the name produced by [`ErrorKind::as_str`]
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "Unexpected" => ErrorKind::Unexpected,
            "ConfigInvalid" => ErrorKind::ConfigInvalid,
            "CapabilityDenied" => ErrorKind::CapabilityDenied,
            "ExecutionTimeout" => ErrorKind::ExecutionTimeout,
            "RuntimeFault" => ErrorKind::RuntimeFault,
            "ParseFailed" => ErrorKind::ParseFailed,
            "RecursionDepthExceeded" => ErrorKind::RecursionDepthExceeded,
            "UnresolvedFinalVariable" => ErrorKind::UnresolvedFinalVariable,
            "Cancelled" => ErrorKind::Cancelled,
            "ModelUnavailable" => ErrorKind::ModelUnavailable,
            "RateLimited" => ErrorKind::RateLimited,
            "FileNotFound" => ErrorKind::FileNotFound,
            "PermissionDenied" => ErrorKind::PermissionDenied,
            "IoFailed" => ErrorKind::IoFailed,
            "SerializationFailed" => ErrorKind::SerializationFailed,
            _ => return None,
        };
        Some(kind)
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ModelUnavailable | ErrorKind::RateLimited)
    }

    /// Errors raised while running a fragment.
    ///
    /// These become transcript text instead of propagating out of the engine.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::CapabilityDenied
                | ErrorKind::ExecutionTimeout
                | ErrorKind::RuntimeFault
                | ErrorKind::ParseFailed
                | ErrorKind::RecursionDepthExceeded
                | ErrorKind::UnresolvedFinalVariable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
