// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scenario and determinism tests for `todo-validate`.

use proptest::prelude::*;
use todo_core::{BatchCreateTasksRequest, Task};
use todo_error::AppCode;
use todo_validate::Validator;

fn validator() -> Validator {
    Validator::standard().unwrap()
}

// ── 1. Mixed schema and business-rule scenario ──────────────────────

#[test]
fn schema_then_business_rule_violations() {
    let mut task = Task::titled("");
    task.description = "x".repeat(1001);
    task.tags = vec![
        "INVALID TAG".to_string(),
        "valid-tag".to_string(),
        "valid-tag".to_string(),
    ];

    let err = validator().validate_task(&task).unwrap();
    assert_eq!(err.code(), AppCode::ValidationFailed);

    let got: Vec<_> = err
        .field_violations()
        .iter()
        .map(|v| (v.field.as_str(), v.code))
        .collect();
    assert_eq!(
        got,
        vec![
            ("title", AppCode::RequiredField),
            ("description", AppCode::TooLong),
            ("tags[0]", AppCode::InvalidTagFormat),
            ("tags[2]", AppCode::DuplicateTag),
        ]
    );
    assert_eq!(err.detail(), "The request contains 4 validation errors");
}

#[test]
fn constraints_loaded_from_toml_replace_the_builtin_set() {
    let set = todo_validate::ConstraintSet::from_toml(
        r#"
        message = "todo.v1.Task"

        [[fields]]
        field = "title"
        rules = [{ kind = "required" }, { kind = "pattern", regex = "^[A-Z]" }]
        "#,
    )
    .unwrap();
    let validator = validator().with_schema(set).unwrap();

    let v = validator.task_violations(&Task::titled("lowercase"));
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].code, AppCode::InvalidFormat);

    // The replaced set no longer limits description length.
    let mut task = Task::titled("Upper");
    task.description = "x".repeat(5000);
    assert!(validator.task_violations(&task).is_empty());
}

// ── 2. Determinism ──────────────────────────────────────────────────

fn arb_task() -> impl Strategy<Value = Option<Task>> {
    prop::option::weighted(
        0.9,
        (
            "[a-z ]{0,4}",
            0usize..1200,
            prop::collection::vec("[a-zA-Z -]{0,6}", 0..5),
        )
            .prop_map(|(title, desc_len, tags)| {
                let mut task = Task::titled(title);
                task.description = "d".repeat(desc_len);
                task.tags = tags;
                task
            }),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn violation_order_is_stable_across_runs(tasks in prop::collection::vec(arb_task(), 0..12)) {
        let req = BatchCreateTasksRequest::from_tasks(tasks);
        let validator = validator();

        let first = validator.inspect_batch(&req).violations();
        for _ in 0..3 {
            prop_assert_eq!(&validator.inspect_batch(&req).violations(), &first);
        }
    }

    #[test]
    fn item_breakdown_covers_every_violation(tasks in prop::collection::vec(arb_task(), 1..12)) {
        let req = BatchCreateTasksRequest::from_tasks(tasks);
        let report = validator().inspect_batch(&req);

        let per_item: usize = (0..report.len()).map(|i| report.item_violations(i).len()).sum();
        prop_assert_eq!(per_item + report.batch_violations().len(), report.violations().len());
    }
}
