// SPDX-License-Identifier: MIT OR Apache-2.0
//! Binary status detail encoding.
//!
//! An [`AppError`] travels over RPC as a `tonic::Status` whose detail bytes
//! hold a `google.rpc.Status` with `Any`-packed details:
//!
//! 1. `google.rpc.BadRequest` (validation codes only),
//! 2. `todo.errors.v1.ErrorDetail` (always),
//! 3. `google.rpc.RetryInfo` (retryable codes only).
//!
//! [`AppError::from_status`] reverses the projection on the receiving side.

use crate::code::{AppCode, TransportCode, UnknownCode};
use crate::error::{AppError, FieldViolation};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use prost::{Message, Name};
use prost_types::value::Kind;
use std::collections::BTreeMap;

const TYPE_URL_PREFIX: &str = "type.googleapis.com/";
const VALUE_TYPE_URL: &str = "type.googleapis.com/google.protobuf.Value";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// `todo.errors.v1.ErrorDetail`: the application-specific detail payload.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorDetail {
    /// Application code name.
    #[prost(string, tag = "1")]
    pub code: String,
    /// Category label.
    #[prost(string, tag = "2")]
    pub title: String,
    /// Human-readable explanation.
    #[prost(string, tag = "3")]
    pub detail: String,
    /// Ordered field violations.
    #[prost(message, repeated, tag = "4")]
    pub field_violations: Vec<WireFieldViolation>,
    /// Correlation id.
    #[prost(string, tag = "5")]
    pub trace_id: String,
    /// Time the error was raised.
    #[prost(message, optional, tag = "6")]
    pub timestamp: Option<prost_types::Timestamp>,
    /// Request path.
    #[prost(string, tag = "7")]
    pub instance: String,
    /// `google.protobuf.Value`s packed into `Any`.
    #[prost(btree_map = "string, message", tag = "8")]
    pub extensions: BTreeMap<String, prost_types::Any>,
}

/// `todo.errors.v1.FieldViolation`.
#[derive(Clone, PartialEq, Message)]
pub struct WireFieldViolation {
    /// Field path.
    #[prost(string, tag = "1")]
    pub field: String,
    /// Explanation.
    #[prost(string, tag = "2")]
    pub description: String,
    /// Field-level code name.
    #[prost(string, tag = "3")]
    pub code: String,
}

/// `google.rpc.Status`.
#[derive(Clone, PartialEq, Message)]
pub struct RpcStatus {
    /// Numeric gRPC code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Developer-facing message.
    #[prost(string, tag = "2")]
    pub message: String,
    /// Typed details.
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

/// `google.rpc.BadRequest`.
#[derive(Clone, PartialEq, Message)]
pub struct BadRequest {
    /// Per-field violations.
    #[prost(message, repeated, tag = "1")]
    pub field_violations: Vec<BadRequestFieldViolation>,
}

/// `google.rpc.BadRequest.FieldViolation`.
#[derive(Clone, PartialEq, Message)]
pub struct BadRequestFieldViolation {
    /// Field path.
    #[prost(string, tag = "1")]
    pub field: String,
    /// Explanation.
    #[prost(string, tag = "2")]
    pub description: String,
}

/// `google.rpc.RetryInfo`.
#[derive(Clone, PartialEq, Message)]
pub struct RetryInfo {
    /// Minimum delay before retrying.
    #[prost(message, optional, tag = "1")]
    pub retry_delay: Option<prost_types::Duration>,
}

macro_rules! message_name {
    ($ty:ty, $package:literal, $name:literal) => {
        impl Name for $ty {
            const NAME: &'static str = $name;
            const PACKAGE: &'static str = $package;

            fn full_name() -> String {
                format!("{}.{}", $package, $name)
            }

            fn type_url() -> String {
                format!("{}{}.{}", TYPE_URL_PREFIX, $package, $name)
            }
        }
    };
}

message_name!(ErrorDetail, "todo.errors.v1", "ErrorDetail");
message_name!(WireFieldViolation, "todo.errors.v1", "FieldViolation");
message_name!(RpcStatus, "google.rpc", "Status");
message_name!(BadRequest, "google.rpc", "BadRequest");
message_name!(RetryInfo, "google.rpc", "RetryInfo");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a wire status could not be turned back into an [`AppError`].
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The status carries no recognisable detail.
    #[error("status carries no structured error detail")]
    NoDetails,
    /// The detail bytes are not a valid `google.rpc.Status`.
    #[error("failed to decode status details: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The embedded application code is not part of the taxonomy.
    #[error(transparent)]
    UnknownCode(#[from] UnknownCode),
    /// The embedded code disagrees with the transport code.
    #[error("detail code {code} does not belong to transport code {actual:?}")]
    CodeMismatch {
        /// Embedded application code.
        code: AppCode,
        /// gRPC code on the status.
        actual: tonic::Code,
    },
}

// ---------------------------------------------------------------------------
// Any / Value helpers
// ---------------------------------------------------------------------------

fn pack<M: Message + Name>(msg: &M) -> prost_types::Any {
    prost_types::Any {
        type_url: M::type_url(),
        value: msg.encode_to_vec(),
    }
}

fn unpack<M: Message + Name + Default>(
    details: &[prost_types::Any],
) -> Result<Option<M>, prost::DecodeError> {
    let url = M::type_url();
    match details.iter().find(|any| any.type_url == url) {
        Some(any) => M::decode(any.value.as_slice()).map(Some),
        None => Ok(None),
    }
}

fn json_to_value(json: &serde_json::Value) -> prost_types::Value {
    let kind = match json {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(prost_types::ListValue {
            values: items.iter().map(json_to_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(prost_types::Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

fn value_to_json(value: &prost_types::Value) -> serde_json::Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NumberValue(n)) => number_to_json(*n),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

// `google.protobuf.Value` only has doubles; integral values come back as integers.
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.is_finite() {
        if n >= 0.0 && n <= u64::MAX as f64 {
            return serde_json::Value::from(n as u64);
        }
        if n >= i64::MIN as f64 && n < 0.0 {
            return serde_json::Value::from(n as i64);
        }
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn to_timestamp(dt: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

fn from_timestamp(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

/// Fresh correlation id (32 lowercase hex characters).
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl AppError {
    /// Build the structured detail payload, stamping `trace_id`.
    pub fn to_detail(&self, trace_id: &str) -> ErrorDetail {
        ErrorDetail {
            code: self.code.as_str().to_string(),
            title: self.title.clone(),
            detail: self.detail.clone(),
            field_violations: self
                .field_violations
                .iter()
                .map(|v| WireFieldViolation {
                    field: v.field.clone(),
                    description: v.description.clone(),
                    code: v.code.as_str().to_string(),
                })
                .collect(),
            trace_id: trace_id.to_string(),
            timestamp: Some(to_timestamp(self.timestamp)),
            instance: self.instance.clone().unwrap_or_default(),
            extensions: self
                .extensions
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        prost_types::Any {
                            type_url: VALUE_TYPE_URL.to_string(),
                            value: json_to_value(v).encode_to_vec(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Convert to the RPC wire status.
    ///
    /// Logs the internal cause (if any) and generates a trace id when none
    /// has been set. The status message is the error title.
    pub fn to_wire_status(&self) -> tonic::Status {
        self.log_cause();

        let trace_id = self.trace_id.clone().unwrap_or_else(new_trace_id);
        let grpc_code = self.transport_code().grpc_code();

        let mut details = Vec::with_capacity(3);
        if self.code.is_validation() {
            let bad_request = BadRequest {
                field_violations: self
                    .field_violations
                    .iter()
                    .map(|v| BadRequestFieldViolation {
                        field: v.field.clone(),
                        description: v.description.clone(),
                    })
                    .collect(),
            };
            details.push(pack(&bad_request));
        }
        details.push(pack(&self.to_detail(&trace_id)));
        if let Some(policy) = self.retry_policy() {
            let retry = RetryInfo {
                retry_delay: Some(prost_types::Duration {
                    seconds: i64::try_from(policy.retry_after_seconds).unwrap_or(i64::MAX),
                    nanos: 0,
                }),
            };
            details.push(pack(&retry));
        }

        let status = RpcStatus {
            code: grpc_code as i32,
            message: self.title.clone(),
            details,
        };
        tonic::Status::with_details(
            grpc_code,
            self.title.clone(),
            Bytes::from(status.encode_to_vec()),
        )
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        err.to_wire_status()
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

impl AppError {
    /// Rebuild an [`AppError`] from a status produced by
    /// [`to_wire_status`](Self::to_wire_status).
    ///
    /// When only the generic `BadRequest` block is present a
    /// `VALIDATION_FAILED` error is rebuilt from it, with every violation
    /// coded `INVALID_VALUE`.
    pub fn from_status(status: &tonic::Status) -> Result<AppError, WireError> {
        if status.details().is_empty() {
            return Err(WireError::NoDetails);
        }
        let rpc = RpcStatus::decode(status.details())?;

        if let Some(detail) = unpack::<ErrorDetail>(&rpc.details)? {
            return from_detail(detail, status.code());
        }

        if let Some(bad_request) = unpack::<BadRequest>(&rpc.details)? {
            let violations = bad_request
                .field_violations
                .into_iter()
                .map(|v| FieldViolation::new(v.field, AppCode::InvalidValue, v.description))
                .collect();
            return Ok(AppError::validation_failed(violations));
        }

        Err(WireError::NoDetails)
    }

    /// Like [`from_status`](Self::from_status) but never fails: a status
    /// without recoverable detail becomes a generic internal error carrying
    /// the status message.
    pub fn from_status_or_internal(status: &tonic::Status) -> AppError {
        match AppError::from_status(status) {
            Ok(err) => err,
            Err(reason) => {
                tracing::warn!(
                    grpc.code = ?status.code(),
                    reason = %reason,
                    "status carries no usable error detail; degrading to internal"
                );
                AppError::internal(status.message())
            }
        }
    }

    /// Extract the embedded trace id from a wire status without decoding the
    /// rest of the detail.
    pub fn trace_id_of(status: &tonic::Status) -> Option<String> {
        let rpc = RpcStatus::decode(status.details()).ok()?;
        let detail = unpack::<ErrorDetail>(&rpc.details).ok()??;
        if detail.trace_id.is_empty() {
            None
        } else {
            Some(detail.trace_id)
        }
    }
}

fn from_detail(detail: ErrorDetail, actual: tonic::Code) -> Result<AppError, WireError> {
    let code: AppCode = detail.code.parse()?;
    if TransportCode::from_grpc(actual) != Some(code.transport_code()) {
        return Err(WireError::CodeMismatch { code, actual });
    }

    let violations: Vec<FieldViolation> = detail
        .field_violations
        .into_iter()
        .map(|v| {
            let vcode = v.code.parse().unwrap_or(AppCode::InvalidValue);
            FieldViolation::new(v.field, vcode, v.description)
        })
        .collect();

    let mut err = if code.is_validation() {
        let count_detail = detail.detail;
        let mut err = AppError::validation_failed(violations);
        err.code = code;
        err.detail = count_detail;
        err
    } else {
        AppError::internal(detail.detail).with_code(code)
    };
    err.title = detail.title;

    if !detail.trace_id.is_empty() {
        err.trace_id = Some(detail.trace_id);
    }
    if !detail.instance.is_empty() {
        err.instance = Some(detail.instance);
    }
    if let Some(ts) = detail.timestamp.as_ref().and_then(from_timestamp) {
        err.timestamp = ts;
    }
    if code.is_retryable() {
        for (key, any) in detail.extensions {
            if any.type_url != VALUE_TYPE_URL {
                continue;
            }
            let value = prost_types::Value::decode(any.value.as_slice())?;
            err.extensions.insert(key, value_to_json(&value));
        }
    }
    Ok(err)
}

impl AppError {
    // Callers must have checked `code` against the transport code.
    fn with_code(mut self, code: AppCode) -> Self {
        self.code = code;
        self.title = code.title().to_string();
        if !code.is_validation() {
            self.field_violations.clear();
        }
        if !code.is_retryable() {
            self.extensions.clear();
        }
        self
    }
}
