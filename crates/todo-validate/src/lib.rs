// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validation engine for the Task API.
//!
//! A [`Validator`] is built once at startup from [`ConstraintSet`]s (the
//! built-in [`standard_constraints`] or sets loaded from TOML) and injected
//! wherever validation is needed. It produces ordered [`FieldViolation`]s:
//!
//! - [`Validator::validate_schema`]: declarative field constraints, in
//!   field-declaration order,
//! - [`Validator::validate_business_rules`]: task consistency checks,
//!   appended after schema violations,
//! - [`Validator::inspect_batch`] / [`Validator::validate_batch`]: per-item
//!   validation with `requests[i].` prefixes plus batch-level checks.
//!
//! Any violations are bundled into exactly one `VALIDATION_FAILED`
//! [`AppError`](todo_error::AppError).
//!
//! [`FieldViolation`]: todo_error::FieldViolation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod message;
mod rules;
mod validator;

pub use batch::{BatchReport, MAX_BATCH_SIZE};
pub use message::{
    DELETE_TASK_REQUEST, FieldValue, GET_TASK_REQUEST, LIST_TASKS_REQUEST, TASK, Validatable,
};
pub use rules::{
    ConstraintError, ConstraintFile, ConstraintSet, FieldConstraints, RuleSpec, code_for_rule_id,
};
pub use validator::{
    Clock, MAX_DESCRIPTION_LEN, MAX_PAGE_SIZE, MAX_TAG_LEN, MAX_TAGS, MAX_TITLE_LEN,
    RulePredicate, Validator, standard_constraints,
};
