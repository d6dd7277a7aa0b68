// SPDX-License-Identifier: MIT OR Apache-2.0
//! Batch validation.

use crate::validator::Validator;
use todo_core::BatchCreateTasksRequest;
use todo_error::{AppCode, AppError, FieldViolation};

/// Maximum number of items in one batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Per-item breakdown of a batch validation.
///
/// All field paths are already rooted at the batch request
/// (`requests[i].task.title`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    batch: Vec<FieldViolation>,
    items: Vec<Vec<FieldViolation>>,
    duplicates: Vec<(usize, FieldViolation)>,
}

impl BatchReport {
    /// `true` when nothing was reported.
    pub fn is_clean(&self) -> bool {
        self.batch.is_empty() && self.duplicates.is_empty() && self.items.iter().all(Vec::is_empty)
    }

    /// Violations about the batch as a whole (`EMPTY_BATCH`, `BATCH_TOO_LARGE`).
    pub fn batch_violations(&self) -> &[FieldViolation] {
        &self.batch
    }

    /// Number of items inspected.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Violations for item `index`, including duplicate-title hits.
    pub fn item_violations(&self, index: usize) -> Vec<FieldViolation> {
        let mut out = self.items.get(index).cloned().unwrap_or_default();
        out.extend(
            self.duplicates
                .iter()
                .filter(|(i, _)| *i == index)
                .map(|(_, v)| v.clone()),
        );
        out
    }

    /// Every violation in reporting order: batch-level, then each item in
    /// order, then duplicate titles grouped by first occurrence.
    pub fn violations(&self) -> Vec<FieldViolation> {
        let mut out = self.batch.clone();
        for item in &self.items {
            out.extend(item.iter().cloned());
        }
        out.extend(self.duplicates.iter().map(|(_, v)| v.clone()));
        out
    }

    /// One `VALIDATION_FAILED` error carrying [`violations`](Self::violations).
    pub fn into_error(self) -> Option<AppError> {
        AppError::from_violations(self.violations())
    }
}

impl Validator {
    /// Validate every item of a batch independently and the batch as a whole.
    pub fn inspect_batch(&self, req: &BatchCreateTasksRequest) -> BatchReport {
        let mut report = BatchReport::default();

        let n = req.requests.len();
        if n == 0 {
            report.batch.push(FieldViolation::new(
                "requests",
                AppCode::EmptyBatch,
                "Batch must contain at least one task",
            ));
        }
        if n > MAX_BATCH_SIZE {
            report.batch.push(FieldViolation::new(
                "requests",
                AppCode::BatchTooLarge,
                format!("Batch size {n} exceeds maximum of {MAX_BATCH_SIZE}"),
            ));
        }

        for (i, item) in req.requests.iter().enumerate() {
            let violations = match item.as_ref().and_then(|r| r.task.as_ref()) {
                None => vec![FieldViolation::new(
                    format!("requests[{i}].task"),
                    AppCode::RequiredField,
                    "Task is required",
                )],
                Some(task) => {
                    let prefix = format!("requests[{i}].task.");
                    self.task_violations(task)
                        .iter()
                        .map(|v| v.prefixed(&prefix))
                        .collect()
                }
            };
            report.items.push(violations);
        }

        // Group by title in first-occurrence order.
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (i, item) in req.requests.iter().enumerate() {
            let Some(task) = item.as_ref().and_then(|r| r.task.as_ref()) else {
                continue;
            };
            if task.title.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(t, _)| *t == task.title) {
                Some((_, indices)) => indices.push(i),
                None => groups.push((task.title.as_str(), vec![i])),
            }
        }
        for (title, indices) in groups.into_iter().filter(|(_, ix)| ix.len() > 1) {
            for i in indices {
                report.duplicates.push((
                    i,
                    FieldViolation::new(
                        format!("requests[{i}].task.title"),
                        AppCode::DuplicateTitle,
                        format!("Title '{title}' is used by multiple tasks in the batch"),
                    ),
                ));
            }
        }

        report
    }

    /// Batch validation bundled into at most one error.
    pub fn validate_batch(&self, req: &BatchCreateTasksRequest) -> Option<AppError> {
        self.inspect_batch(req).into_error()
    }
}
