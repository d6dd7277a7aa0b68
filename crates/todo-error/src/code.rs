// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable application codes and the static code → transport → HTTP table.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ErrorGroup
// ---------------------------------------------------------------------------

/// Broad family that an [`AppCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorGroup {
    /// Request or entity failed validation.
    Validation,
    /// Lookup or uniqueness failures on a resource.
    Resource,
    /// Authentication and authorization failures.
    Auth,
    /// Throttling and dependency outages.
    Availability,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Resource => "resource",
            Self::Auth => "auth",
            Self::Availability => "availability",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// TransportCode
// ---------------------------------------------------------------------------

/// Coarse RPC status category carried by every error.
///
/// Only the subset of gRPC codes the taxonomy can produce is modelled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportCode {
    /// Client supplied an invalid request.
    InvalidArgument,
    /// The addressed resource does not exist.
    NotFound,
    /// A resource with the same identity already exists.
    AlreadyExists,
    /// The caller lacks permission for the action.
    PermissionDenied,
    /// The caller could not be authenticated.
    Unauthenticated,
    /// A quota or rate limit was exhausted.
    ResourceExhausted,
    /// A dependency is temporarily unavailable.
    Unavailable,
    /// Unexpected server-side failure.
    Internal,
}

impl TransportCode {
    /// The gRPC code this category is sent as.
    pub fn grpc_code(self) -> tonic::Code {
        match self {
            Self::InvalidArgument => tonic::Code::InvalidArgument,
            Self::NotFound => tonic::Code::NotFound,
            Self::AlreadyExists => tonic::Code::AlreadyExists,
            Self::PermissionDenied => tonic::Code::PermissionDenied,
            Self::Unauthenticated => tonic::Code::Unauthenticated,
            Self::ResourceExhausted => tonic::Code::ResourceExhausted,
            Self::Unavailable => tonic::Code::Unavailable,
            Self::Internal => tonic::Code::Internal,
        }
    }

    /// Inverse of [`grpc_code`](Self::grpc_code); `None` for codes the
    /// taxonomy never emits.
    pub fn from_grpc(code: tonic::Code) -> Option<Self> {
        match code {
            tonic::Code::InvalidArgument => Some(Self::InvalidArgument),
            tonic::Code::NotFound => Some(Self::NotFound),
            tonic::Code::AlreadyExists => Some(Self::AlreadyExists),
            tonic::Code::PermissionDenied => Some(Self::PermissionDenied),
            tonic::Code::Unauthenticated => Some(Self::Unauthenticated),
            tonic::Code::ResourceExhausted => Some(Self::ResourceExhausted),
            tonic::Code::Unavailable => Some(Self::Unavailable),
            tonic::Code::Internal => Some(Self::Internal),
            _ => None,
        }
    }

    /// HTTP status code for this category.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 422,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::PermissionDenied => 403,
            Self::Unauthenticated => 401,
            Self::ResourceExhausted => 429,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.grpc_code(), f)
    }
}

// ---------------------------------------------------------------------------
// AppCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable application error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string. Field-level
/// codes (`TOO_LONG`, `DUPLICATE_TAG`, ...) appear on individual
/// [`FieldViolation`](crate::FieldViolation)s; the error carrying them is
/// always [`AppCode::ValidationFailed`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppCode {
    // -- Validation --
    /// One or more fields failed validation.
    ValidationFailed,
    /// A required field is missing or empty.
    RequiredField,
    /// Value is shorter than the minimum length.
    TooShort,
    /// Value is longer than the maximum length.
    TooLong,
    /// Value does not match the expected pattern.
    InvalidFormat,
    /// Timestamp must lie in the future.
    MustBeFuture,
    /// Value violates a constraint with no dedicated code.
    InvalidValue,
    /// The same tag appears more than once.
    DuplicateTag,
    /// Tag is not lowercase alphanumeric-and-hyphen or is too long.
    InvalidTagFormat,
    /// Task was completed after its due date.
    OverdueCompletion,
    /// Batch contains no items.
    EmptyBatch,
    /// Batch exceeds the maximum item count.
    BatchTooLarge,
    /// Two batch items share a title.
    DuplicateTitle,

    // -- Resource --
    /// Addressed resource does not exist.
    ResourceNotFound,
    /// Resource conflicts with an existing one.
    ResourceConflict,

    // -- Auth --
    /// Caller could not be authenticated.
    AuthenticationFailed,
    /// Caller lacks permission for the action.
    PermissionDenied,

    // -- Availability --
    /// Caller exceeded a rate limit.
    RateLimitExceeded,
    /// A dependency is temporarily unavailable.
    ServiceUnavailable,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    InternalError,
}

impl AppCode {
    /// Every code, in declaration order.
    pub const ALL: [AppCode; 20] = [
        Self::ValidationFailed,
        Self::RequiredField,
        Self::TooShort,
        Self::TooLong,
        Self::InvalidFormat,
        Self::MustBeFuture,
        Self::InvalidValue,
        Self::DuplicateTag,
        Self::InvalidTagFormat,
        Self::OverdueCompletion,
        Self::EmptyBatch,
        Self::BatchTooLarge,
        Self::DuplicateTitle,
        Self::ResourceNotFound,
        Self::ResourceConflict,
        Self::AuthenticationFailed,
        Self::PermissionDenied,
        Self::RateLimitExceeded,
        Self::ServiceUnavailable,
        Self::InternalError,
    ];

    /// Returns the broad [`ErrorGroup`] this code belongs to.
    pub fn group(self) -> ErrorGroup {
        match self {
            Self::ValidationFailed
            | Self::RequiredField
            | Self::TooShort
            | Self::TooLong
            | Self::InvalidFormat
            | Self::MustBeFuture
            | Self::InvalidValue
            | Self::DuplicateTag
            | Self::InvalidTagFormat
            | Self::OverdueCompletion
            | Self::EmptyBatch
            | Self::BatchTooLarge
            | Self::DuplicateTitle => ErrorGroup::Validation,

            Self::ResourceNotFound | Self::ResourceConflict => ErrorGroup::Resource,

            Self::AuthenticationFailed | Self::PermissionDenied => ErrorGroup::Auth,

            Self::RateLimitExceeded | Self::ServiceUnavailable => ErrorGroup::Availability,

            Self::InternalError => ErrorGroup::Internal,
        }
    }

    /// `true` for every code in the validation group.
    pub fn is_validation(self) -> bool {
        self.group() == ErrorGroup::Validation
    }

    /// `true` when clients may retry; only these codes carry extensions.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServiceUnavailable)
    }

    /// The transport category this code is always paired with.
    pub fn transport_code(self) -> TransportCode {
        match self {
            Self::ValidationFailed
            | Self::RequiredField
            | Self::TooShort
            | Self::TooLong
            | Self::InvalidFormat
            | Self::MustBeFuture
            | Self::InvalidValue
            | Self::DuplicateTag
            | Self::InvalidTagFormat
            | Self::OverdueCompletion
            | Self::EmptyBatch
            | Self::BatchTooLarge
            | Self::DuplicateTitle => TransportCode::InvalidArgument,
            Self::ResourceNotFound => TransportCode::NotFound,
            Self::ResourceConflict => TransportCode::AlreadyExists,
            Self::AuthenticationFailed => TransportCode::Unauthenticated,
            Self::PermissionDenied => TransportCode::PermissionDenied,
            Self::RateLimitExceeded => TransportCode::ResourceExhausted,
            Self::ServiceUnavailable => TransportCode::Unavailable,
            Self::InternalError => TransportCode::Internal,
        }
    }

    /// HTTP status derived through [`TransportCode::http_status`].
    pub fn http_status(self) -> u16 {
        self.transport_code().http_status()
    }

    /// Short human label used as the error title.
    pub fn title(self) -> &'static str {
        match self {
            Self::ValidationFailed
            | Self::RequiredField
            | Self::TooShort
            | Self::TooLong
            | Self::InvalidFormat
            | Self::MustBeFuture
            | Self::InvalidValue
            | Self::DuplicateTag
            | Self::InvalidTagFormat
            | Self::OverdueCompletion
            | Self::EmptyBatch
            | Self::BatchTooLarge
            | Self::DuplicateTitle => "Validation Failed",
            Self::ResourceNotFound => "Resource Not Found",
            Self::ResourceConflict => "Resource Conflict",
            Self::AuthenticationFailed => "Authentication Failed",
            Self::PermissionDenied => "Permission Denied",
            Self::RateLimitExceeded => "Rate Limit Exceeded",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::InternalError => "Internal Server Error",
        }
    }

    /// Kebab-case slug used in problem `type` URLs (e.g. `resource-not-found`).
    pub fn slug(self) -> String {
        self.as_str().to_ascii_lowercase().replace('_', "-")
    }

    /// Stable `&'static str` representation (e.g. `"RESOURCE_NOT_FOUND"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::TooShort => "TOO_SHORT",
            Self::TooLong => "TOO_LONG",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::MustBeFuture => "MUST_BE_FUTURE",
            Self::InvalidValue => "INVALID_VALUE",
            Self::DuplicateTag => "DUPLICATE_TAG",
            Self::InvalidTagFormat => "INVALID_TAG_FORMAT",
            Self::OverdueCompletion => "OVERDUE_COMPLETION",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::BatchTooLarge => "BATCH_TOO_LARGE",
            Self::DuplicateTitle => "DUPLICATE_TITLE",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::ResourceConflict => "RESOURCE_CONFLICT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for AppCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a known [`AppCode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application error code: {0}")]
pub struct UnknownCode(pub String);

impl FromStr for AppCode {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCode(s.to_string()))
    }
}
