// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code table and wire round-trip tests for `todo-error`.

use proptest::prelude::*;
use todo_error::{AppCode, AppError, FieldViolation, TransportCode};

// ── 1. Exhaustive code → transport → HTTP table ─────────────────────

fn expected_row(code: AppCode) -> (TransportCode, u16) {
    match code {
        AppCode::ValidationFailed
        | AppCode::RequiredField
        | AppCode::TooShort
        | AppCode::TooLong
        | AppCode::InvalidFormat
        | AppCode::MustBeFuture
        | AppCode::InvalidValue
        | AppCode::DuplicateTag
        | AppCode::InvalidTagFormat
        | AppCode::OverdueCompletion
        | AppCode::EmptyBatch
        | AppCode::BatchTooLarge
        | AppCode::DuplicateTitle => (TransportCode::InvalidArgument, 422),
        AppCode::ResourceNotFound => (TransportCode::NotFound, 404),
        AppCode::ResourceConflict => (TransportCode::AlreadyExists, 409),
        AppCode::AuthenticationFailed => (TransportCode::Unauthenticated, 401),
        AppCode::PermissionDenied => (TransportCode::PermissionDenied, 403),
        AppCode::RateLimitExceeded => (TransportCode::ResourceExhausted, 429),
        AppCode::ServiceUnavailable => (TransportCode::Unavailable, 503),
        AppCode::InternalError => (TransportCode::Internal, 500),
    }
}

#[test]
fn every_code_maps_through_the_fixed_table() {
    for code in AppCode::ALL {
        let (transport, http) = expected_row(code);
        assert_eq!(code.transport_code(), transport, "{code}");
        assert_eq!(code.http_status(), http, "{code}");
    }
}

#[test]
fn constructors_produce_table_statuses() {
    let cases = [
        (
            AppError::validation_failed(vec![FieldViolation::new(
                "title",
                AppCode::RequiredField,
                "title is required",
            )]),
            tonic::Code::InvalidArgument,
            422,
        ),
        (
            AppError::required_field("title", "title is required"),
            tonic::Code::InvalidArgument,
            422,
        ),
        (AppError::not_found("Task", "zz"), tonic::Code::NotFound, 404),
        (
            AppError::conflict("task", "dup"),
            tonic::Code::AlreadyExists,
            409,
        ),
        (
            AppError::permission_denied("task", "delete"),
            tonic::Code::PermissionDenied,
            403,
        ),
        (
            AppError::authentication_failed("no token"),
            tonic::Code::Unauthenticated,
            401,
        ),
        (
            AppError::rate_limit_exceeded(3),
            tonic::Code::ResourceExhausted,
            429,
        ),
        (
            AppError::service_unavailable("down"),
            tonic::Code::Unavailable,
            503,
        ),
        (AppError::internal("boom"), tonic::Code::Internal, 500),
    ];
    for (err, grpc, http) in cases {
        let status = err.to_wire_status();
        assert_eq!(status.code(), grpc, "{err}");
        assert_eq!(err.http_status(), http, "{err}");
        assert_eq!(status.message(), err.title());
    }
}

// ── 2. Wire round-trip ──────────────────────────────────────────────

fn arb_field_code() -> impl Strategy<Value = AppCode> {
    prop::sample::select(
        AppCode::ALL
            .iter()
            .copied()
            .filter(|c| c.is_validation() && *c != AppCode::ValidationFailed)
            .collect::<Vec<_>>(),
    )
}

fn arb_violation() -> impl Strategy<Value = FieldViolation> {
    ("[a-z_]{1,12}(\\[[0-9]\\])?", arb_field_code(), ".{0,40}")
        .prop_map(|(field, code, desc)| FieldViolation::new(field, code, desc))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn validation_roundtrip_preserves_ordered_violations(
        violations in prop::collection::vec(arb_violation(), 1..12),
        trace in "[a-f0-9]{8,32}",
    ) {
        let original = AppError::validation_failed(violations.clone()).with_trace_id(trace.clone());
        let back = AppError::from_status(&original.to_wire_status()).unwrap();

        prop_assert_eq!(back.code(), original.code());
        prop_assert_eq!(back.title(), original.title());
        prop_assert_eq!(back.detail(), original.detail());
        prop_assert_eq!(back.field_violations(), violations.as_slice());
        prop_assert_eq!(back.trace_id(), Some(trace.as_str()));
    }

    #[test]
    fn not_found_roundtrip_preserves_detail(id in "[a-zA-Z0-9-]{1,24}") {
        let original = AppError::not_found("Task", &id).with_instance("/v1/tasks/x");
        let back = AppError::from_status(&original.to_wire_status()).unwrap();

        prop_assert_eq!(back.code(), AppCode::ResourceNotFound);
        prop_assert_eq!(back.detail(), original.detail());
        prop_assert!(back.field_violations().is_empty());
        prop_assert!(back.extensions().is_empty());
        prop_assert_eq!(back.instance(), Some("/v1/tasks/x"));
    }
}

// ── 3. Internal cause never crosses the wire ────────────────────────

#[test]
fn internal_cause_is_not_serialized() {
    let cause = std::io::Error::other("secret connection string");
    let status = AppError::internal("An unexpected error occurred")
        .with_cause(cause)
        .to_wire_status();

    assert!(!status.message().contains("secret"));
    let raw = String::from_utf8_lossy(status.details());
    assert!(!raw.contains("secret"));

    let back = AppError::from_status(&status).unwrap();
    assert!(!back.has_cause());
    assert_eq!(back.detail(), "An unexpected error occurred");
}

#[test]
fn status_survives_header_reserialization() {
    let original = AppError::required_field("title", "title is required").with_trace_id("t-9");
    let status = original.to_wire_status();

    let mut headers = tonic::codegen::http::HeaderMap::new();
    status.add_header(&mut headers).unwrap();
    let rebuilt = tonic::Status::from_header_map(&headers).unwrap();

    let back = AppError::from_status(&rebuilt).unwrap();
    assert_eq!(back.field_violations(), original.field_violations());
    assert_eq!(back.trace_id(), Some("t-9"));
}
