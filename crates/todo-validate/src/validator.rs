// SPDX-License-Identifier: MIT OR Apache-2.0
//! The [`Validator`]: schema constraints followed by business rules.

use crate::message::{
    DELETE_TASK_REQUEST, FieldValue, GET_TASK_REQUEST, LIST_TASKS_REQUEST, TASK, Validatable,
};
use crate::rules::{CompiledField, CompiledRule, ConstraintError, ConstraintSet, RuleSpec, compile};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use todo_core::{Task, TaskStatus};
use todo_error::{AppCode, AppError, FieldViolation};

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1000;
/// Maximum number of tags on a task.
pub const MAX_TAGS: usize = 20;
/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 50;
/// Maximum `ListTasks` page size accepted by validation.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Source of "now" for future-date rules.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Custom rule predicate: `Some(message)` when the value is rejected.
pub type RulePredicate = Arc<dyn Fn(&FieldValue<'_>) -> Option<String> + Send + Sync>;

/// Built-in constraint sets for the task messages.
pub fn standard_constraints() -> Vec<ConstraintSet> {
    let name_rules = || {
        vec![
            RuleSpec::Required,
            RuleSpec::Pattern {
                regex: "^tasks/[^/]+$".into(),
            },
        ]
    };
    vec![
        ConstraintSet::new(TASK)
            .field(
                "title",
                vec![
                    RuleSpec::Required,
                    RuleSpec::MaxLen { max: MAX_TITLE_LEN },
                ],
            )
            .field(
                "description",
                vec![RuleSpec::MaxLen {
                    max: MAX_DESCRIPTION_LEN,
                }],
            )
            .field("due_date", vec![RuleSpec::Future])
            .field("tags", vec![RuleSpec::MaxItems { max: MAX_TAGS }]),
        ConstraintSet::new(GET_TASK_REQUEST).field("name", name_rules()),
        ConstraintSet::new(DELETE_TASK_REQUEST).field("name", name_rules()),
        ConstraintSet::new(LIST_TASKS_REQUEST)
            .field(
                "page_size",
                vec![RuleSpec::Range {
                    min: 0,
                    max: MAX_PAGE_SIZE,
                }],
            )
            .field(
                "order_by",
                vec![RuleSpec::OneOf {
                    values: ["", "title", "create_time", "-create_time", "due_date"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                }],
            ),
    ]
}

/// Validation engine.
///
/// Built once at startup and shared by reference. Schema violations are
/// reported in field-declaration order, business-rule violations after them
/// in rule order; identical input always yields identical output.
///
/// ```
/// use todo_core::Task;
/// use todo_validate::Validator;
///
/// let validator = Validator::standard().unwrap();
/// let err = validator.validate_task(&Task::titled("")).unwrap();
/// assert_eq!(err.field_violations()[0].field, "title");
/// ```
#[derive(Clone)]
pub struct Validator {
    schemas: BTreeMap<String, Arc<Vec<CompiledField>>>,
    predicates: BTreeMap<String, RulePredicate>,
    clock: Clock,
}

impl Validator {
    /// Validator with no constraint sets.
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
            predicates: BTreeMap::new(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Validator with [`standard_constraints`].
    pub fn standard() -> Result<Self, ConstraintError> {
        standard_constraints()
            .into_iter()
            .try_fold(Self::empty(), Self::with_schema)
    }

    /// Install (or replace) the constraint set for `set.message`.
    ///
    /// Custom rules must be registered with [`with_rule`](Self::with_rule)
    /// beforehand.
    pub fn with_schema(mut self, set: ConstraintSet) -> Result<Self, ConstraintError> {
        let compiled = compile(&set, |id| self.predicates.contains_key(id))?;
        tracing::debug!(
            message = %set.message,
            fields = compiled.len(),
            "installed constraint set"
        );
        self.schemas.insert(set.message, Arc::new(compiled));
        Ok(self)
    }

    /// Register a custom rule predicate under `id`.
    #[must_use]
    pub fn with_rule<F>(mut self, id: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FieldValue<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.predicates.insert(id.into(), Arc::new(predicate));
        self
    }

    /// Replace the clock used by future-date rules.
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Message names with an installed constraint set.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    // -- schema ------------------------------------------------------------

    /// Run the declarative constraints for `M` against `msg`.
    ///
    /// A failed `required` rule skips the remaining rules of that field.
    pub fn validate_schema<M: Validatable>(&self, msg: &M) -> Vec<FieldViolation> {
        let Some(fields) = self.schemas.get(M::MESSAGE) else {
            tracing::debug!(message = M::MESSAGE, "no constraint set installed");
            return Vec::new();
        };
        let now = (self.clock)();
        let mut violations = Vec::new();
        for field in fields.iter() {
            let value = msg.field(&field.field);
            for (rule, code) in &field.rules {
                if let Some(description) = self.check(rule, &value, now) {
                    violations.push(FieldViolation::new(&field.field, *code, description));
                    if matches!(rule, CompiledRule::Required) {
                        break;
                    }
                }
            }
        }
        violations
    }

    fn check(&self, rule: &CompiledRule, value: &FieldValue<'_>, now: DateTime<Utc>) -> Option<String> {
        match (rule, value) {
            (CompiledRule::Required, v) if v.is_empty() => Some("value is required".into()),
            (CompiledRule::MinLen(min), FieldValue::Text(s)) if s.chars().count() < *min => Some(
                format!("value length must be at least {min} characters"),
            ),
            (CompiledRule::MaxLen(max), FieldValue::Text(s)) if s.chars().count() > *max => Some(
                format!("value length must be at most {max} characters"),
            ),
            (CompiledRule::MaxItems(max), FieldValue::List(items)) if items.len() > *max => {
                Some(format!("value must contain no more than {max} item(s)"))
            }
            (CompiledRule::Pattern(re), FieldValue::Text(s)) if !re.is_match(s) => Some(format!(
                "value does not match regex pattern `{}`",
                re.as_str()
            )),
            (CompiledRule::Future, FieldValue::Time(t)) if *t <= now => {
                Some("value must be greater than now".into())
            }
            (CompiledRule::Range(min, max), FieldValue::Int(n)) if n < min || n > max => {
                Some(format!(
                    "value must be greater than or equal to {min} and less than or equal to {max}"
                ))
            }
            (CompiledRule::OneOf(values), FieldValue::Text(s))
                if !values.iter().any(|v| v == s) =>
            {
                Some(format!("value must be in list [{}]", values.join(", ")))
            }
            (CompiledRule::Custom(id), v) => self.predicates.get(id).and_then(|p| p(v)),
            _ => None,
        }
    }

    // -- business rules -----------------------------------------------------

    /// Task consistency rules, in evaluation order:
    ///
    /// 1. a completed task must not have been updated after its due date,
    /// 2. every tag is lowercase alphanumeric-and-hyphen and at most
    ///    [`MAX_TAG_LEN`] characters,
    /// 3. no tag appears twice (reported on each repeat occurrence).
    pub fn validate_business_rules(&self, task: &Task) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        if task.status == TaskStatus::Completed {
            if let (Some(due), Some(updated)) = (task.due_date, task.update_time) {
                if updated > due {
                    violations.push(FieldViolation::new(
                        "due_date",
                        AppCode::OverdueCompletion,
                        "Task was completed after the due date",
                    ));
                }
            }
        }

        for (i, tag) in task.tags.iter().enumerate() {
            if !is_valid_tag(tag) {
                violations.push(FieldViolation::new(
                    format!("tags[{i}]"),
                    AppCode::InvalidTagFormat,
                    format!("Tag '{tag}' must be lowercase letters, numbers, and hyphens only"),
                ));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for (i, tag) in task.tags.iter().enumerate() {
            if !seen.insert(tag.as_str()) {
                violations.push(FieldViolation::new(
                    format!("tags[{i}]"),
                    AppCode::DuplicateTag,
                    format!("Tag '{tag}' appears multiple times"),
                ));
            }
        }

        violations
    }

    // -- combined -----------------------------------------------------------

    /// Schema violations followed by business-rule violations.
    pub fn task_violations(&self, task: &Task) -> Vec<FieldViolation> {
        let mut violations = self.validate_schema(task);
        violations.extend(self.validate_business_rules(task));
        violations
    }

    /// Full task validation bundled into one error.
    pub fn validate_task(&self, task: &Task) -> Option<AppError> {
        AppError::from_violations(self.task_violations(task))
    }

    /// Schema validation of a request message bundled into one error.
    pub fn validate_request<M: Validatable>(&self, msg: &M) -> Option<AppError> {
        AppError::from_violations(self.validate_schema(msg))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("messages", &self.schemas.keys().collect::<Vec<_>>())
            .field("custom_rules", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn validator() -> Validator {
        Validator::standard().unwrap().with_clock(fixed_now)
    }

    fn codes(violations: &[FieldViolation]) -> Vec<(&str, AppCode)> {
        violations.iter().map(|v| (v.field.as_str(), v.code)).collect()
    }

    #[test]
    fn valid_task_has_no_violations() {
        let mut task = Task::titled("write docs");
        task.tags = vec!["docs".into(), "q1-2030".into()];
        task.due_date = Some(fixed_now() + Duration::days(1));
        assert!(validator().task_violations(&task).is_empty());
    }

    #[test]
    fn required_failure_skips_remaining_rules() {
        let req = todo_core::GetTaskRequest::default();
        let v = validator().validate_schema(&req);
        assert_eq!(codes(&v), vec![("name", AppCode::RequiredField)]);
    }

    #[test]
    fn name_pattern() {
        let req = todo_core::GetTaskRequest {
            name: "projects/1".into(),
        };
        let v = validator().validate_schema(&req);
        assert_eq!(codes(&v), vec![("name", AppCode::InvalidFormat)]);
    }

    #[test]
    fn past_due_date_must_be_future() {
        let mut task = Task::titled("t");
        task.due_date = Some(fixed_now() - Duration::seconds(1));
        let v = validator().task_violations(&task);
        assert_eq!(codes(&v), vec![("due_date", AppCode::MustBeFuture)]);
        assert_eq!(v[0].description, "value must be greater than now");
    }

    #[test]
    fn length_limits_count_characters() {
        let mut task = Task::titled("é".repeat(MAX_TITLE_LEN));
        task.description = "x".repeat(MAX_DESCRIPTION_LEN);
        assert!(validator().task_violations(&task).is_empty());

        task.title.push('é');
        task.description.push('x');
        let v = validator().task_violations(&task);
        assert_eq!(
            codes(&v),
            vec![("title", AppCode::TooLong), ("description", AppCode::TooLong)]
        );
    }

    #[test]
    fn too_many_tags_is_invalid_value() {
        let mut task = Task::titled("t");
        task.tags = (0..=MAX_TAGS).map(|i| format!("t{i}")).collect();
        let v = validator().task_violations(&task);
        assert_eq!(codes(&v), vec![("tags", AppCode::InvalidValue)]);
    }

    #[test]
    fn overdue_completion() {
        let mut task = Task::titled("t");
        task.status = TaskStatus::Completed;
        task.due_date = Some(fixed_now() + Duration::days(1));
        task.update_time = Some(fixed_now() + Duration::days(2));
        let v = validator().validate_business_rules(&task);
        assert_eq!(codes(&v), vec![("due_date", AppCode::OverdueCompletion)]);

        task.status = TaskStatus::InProgress;
        assert!(validator().validate_business_rules(&task).is_empty());
    }

    #[test]
    fn tag_rules() {
        let mut task = Task::titled("t");
        task.tags = vec![
            "ok".into(),
            "Bad".into(),
            "x".repeat(MAX_TAG_LEN + 1),
            "ok".into(),
            "ok".into(),
        ];
        let v = validator().validate_business_rules(&task);
        assert_eq!(
            codes(&v),
            vec![
                ("tags[1]", AppCode::InvalidTagFormat),
                ("tags[2]", AppCode::InvalidTagFormat),
                ("tags[3]", AppCode::DuplicateTag),
                ("tags[4]", AppCode::DuplicateTag),
            ]
        );
    }

    #[test]
    fn list_request_bounds() {
        let req = todo_core::ListTasksRequest {
            page_size: 1001,
            order_by: "priority".into(),
            ..Default::default()
        };
        let v = validator().validate_schema(&req);
        assert_eq!(
            codes(&v),
            vec![("page_size", AppCode::InvalidValue), ("order_by", AppCode::InvalidValue)]
        );
    }

    #[test]
    fn custom_rule_and_replaced_schema() {
        let validator = Validator::standard()
            .unwrap()
            .with_rule("task.title.no_todo_prefix", |v: &FieldValue<'_>| match v {
                FieldValue::Text(s) if s.starts_with("TODO") => {
                    Some("title must not start with TODO".into())
                }
                _ => None,
            })
            .with_schema(ConstraintSet::new(TASK).field(
                "title",
                vec![
                    RuleSpec::Required,
                    RuleSpec::MinLen { min: 3 },
                    RuleSpec::Custom {
                        id: "task.title.no_todo_prefix".into(),
                    },
                ],
            ))
            .unwrap();

        let v = validator.task_violations(&Task::titled("TO"));
        assert_eq!(codes(&v), vec![("title", AppCode::TooShort)]);

        let v = validator.task_violations(&Task::titled("TODO: x"));
        assert_eq!(codes(&v), vec![("title", AppCode::InvalidValue)]);
        assert_eq!(v[0].description, "title must not start with TODO");
    }

    #[test]
    fn unknown_message_has_no_constraints() {
        let v = Validator::empty().validate_schema(&Task::titled(""));
        assert!(v.is_empty());
    }
}
