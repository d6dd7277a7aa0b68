// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative field constraints.
//!
//! A [`ConstraintSet`] lists, per message, the fields to check and the
//! [`RuleSpec`]s to apply, in declaration order. Sets are plain serde data
//! and can be loaded from TOML:
//!
//! ```toml
//! message = "todo.v1.Task"
//!
//! [[fields]]
//! field = "title"
//! rules = [{ kind = "required" }, { kind = "max_len", max = 200 }]
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use todo_error::AppCode;

/// One constraint on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Field must be set and non-empty.
    Required,
    /// Minimum length in characters.
    MinLen {
        /// Minimum.
        min: usize,
    },
    /// Maximum length in characters.
    MaxLen {
        /// Maximum.
        max: usize,
    },
    /// Maximum number of list items.
    MaxItems {
        /// Maximum.
        max: usize,
    },
    /// Value must match the regular expression.
    Pattern {
        /// Regular expression.
        regex: String,
    },
    /// Timestamp must lie strictly after "now".
    Future,
    /// Integer must lie within `min..=max`.
    Range {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Value must be one of the listed strings.
    OneOf {
        /// Allowed values.
        values: Vec<String>,
    },
    /// Predicate registered on the validator under `id`.
    Custom {
        /// Rule id, e.g. `task.title.no_profanity`.
        id: String,
    },
}

impl RuleSpec {
    /// Stable rule id in the `<kind>` form used for code mapping.
    pub fn rule_id(&self) -> &str {
        match self {
            Self::Required => "required",
            Self::MinLen { .. } => "min_len",
            Self::MaxLen { .. } => "max_len",
            Self::MaxItems { .. } => "max_items",
            Self::Pattern { .. } => "pattern",
            Self::Future => "gt_now",
            Self::Range { .. } => "range",
            Self::OneOf { .. } => "in",
            Self::Custom { id } => id,
        }
    }

    /// The field-level code a failure of this rule is reported with.
    pub fn code(&self) -> AppCode {
        code_for_rule_id(self.rule_id())
    }
}

/// Map a rule id onto a field-level code.
///
/// Matching is by substring so that qualified ids such as
/// `string.max_len` or `task.due_date.gt_now` resolve the same way as the
/// built-in kinds. Anything unrecognised is `INVALID_VALUE`.
pub fn code_for_rule_id(rule_id: &str) -> AppCode {
    if rule_id.contains("required") {
        AppCode::RequiredField
    } else if rule_id.contains("min_len") {
        AppCode::TooShort
    } else if rule_id.contains("max_len") {
        AppCode::TooLong
    } else if rule_id.contains("pattern") {
        AppCode::InvalidFormat
    } else if rule_id.contains("gt_now") {
        AppCode::MustBeFuture
    } else {
        AppCode::InvalidValue
    }
}

/// Constraints for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Field path as exposed by [`Validatable::field`](crate::Validatable::field).
    pub field: String,
    /// Rules, applied in order.
    pub rules: Vec<RuleSpec>,
}

/// All constraints for one message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Fully-qualified message name, e.g. `todo.v1.Task`.
    pub message: String,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldConstraints>,
}

impl ConstraintSet {
    /// Empty set for `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field with its rules.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>, rules: Vec<RuleSpec>) -> Self {
        self.fields.push(FieldConstraints {
            field: field.into(),
            rules,
        });
        self
    }

    /// Parse a set from TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConstraintError> {
        Ok(toml::from_str(content)?)
    }
}

/// A TOML document holding several sets as `[[constraint_set]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintFile {
    /// Sets in document order.
    #[serde(default, rename = "constraint_set")]
    pub sets: Vec<ConstraintSet>,
}

impl ConstraintFile {
    /// Parse a constraint file from TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConstraintError> {
        Ok(toml::from_str(content)?)
    }
}

/// Problems building a validator from constraint sets.
#[derive(Debug, thiserror::Error)]
pub enum ConstraintError {
    /// The TOML document is malformed.
    #[error("failed to parse constraint set: {0}")]
    Parse(#[from] toml::de::Error),
    /// A pattern rule does not compile.
    #[error("invalid pattern on {message}.{field}: {source}")]
    Pattern {
        /// Message name.
        message: String,
        /// Field path.
        field: String,
        /// Regex error.
        source: regex::Error,
    },
    /// A custom rule id has no registered predicate.
    #[error("no predicate registered for custom rule '{0}'")]
    UnknownRule(String),
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) enum CompiledRule {
    Required,
    MinLen(usize),
    MaxLen(usize),
    MaxItems(usize),
    Pattern(Regex),
    Future,
    Range(i64, i64),
    OneOf(Vec<String>),
    Custom(String),
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledField {
    pub(crate) field: String,
    pub(crate) rules: Vec<(CompiledRule, AppCode)>,
}

pub(crate) fn compile(
    set: &ConstraintSet,
    is_registered: impl Fn(&str) -> bool,
) -> Result<Vec<CompiledField>, ConstraintError> {
    set.fields
        .iter()
        .map(|fc| {
            let rules = fc
                .rules
                .iter()
                .map(|spec| {
                    let rule = match spec {
                        RuleSpec::Required => CompiledRule::Required,
                        RuleSpec::MinLen { min } => CompiledRule::MinLen(*min),
                        RuleSpec::MaxLen { max } => CompiledRule::MaxLen(*max),
                        RuleSpec::MaxItems { max } => CompiledRule::MaxItems(*max),
                        RuleSpec::Pattern { regex } => {
                            let re = Regex::new(regex).map_err(|source| {
                                ConstraintError::Pattern {
                                    message: set.message.clone(),
                                    field: fc.field.clone(),
                                    source,
                                }
                            })?;
                            CompiledRule::Pattern(re)
                        }
                        RuleSpec::Future => CompiledRule::Future,
                        RuleSpec::Range { min, max } => CompiledRule::Range(*min, *max),
                        RuleSpec::OneOf { values } => CompiledRule::OneOf(values.clone()),
                        RuleSpec::Custom { id } => {
                            if !is_registered(id) {
                                return Err(ConstraintError::UnknownRule(id.clone()));
                            }
                            CompiledRule::Custom(id.clone())
                        }
                    };
                    Ok((rule, spec.code()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CompiledField {
                field: fc.field.clone(),
                rules,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes() {
        assert_eq!(RuleSpec::Required.code(), AppCode::RequiredField);
        assert_eq!(RuleSpec::MinLen { min: 1 }.code(), AppCode::TooShort);
        assert_eq!(RuleSpec::MaxLen { max: 1 }.code(), AppCode::TooLong);
        assert_eq!(
            RuleSpec::Pattern { regex: ".".into() }.code(),
            AppCode::InvalidFormat
        );
        assert_eq!(RuleSpec::Future.code(), AppCode::MustBeFuture);
        assert_eq!(RuleSpec::MaxItems { max: 1 }.code(), AppCode::InvalidValue);
        assert_eq!(RuleSpec::Range { min: 0, max: 1 }.code(), AppCode::InvalidValue);
    }

    #[test]
    fn qualified_rule_ids() {
        assert_eq!(code_for_rule_id("string.max_len"), AppCode::TooLong);
        assert_eq!(code_for_rule_id("timestamp.gt_now"), AppCode::MustBeFuture);
        assert_eq!(code_for_rule_id("task.no_profanity"), AppCode::InvalidValue);
    }

    #[test]
    fn constraint_file_keeps_set_order() {
        let file = ConstraintFile::from_toml(
            r#"
            [[constraint_set]]
            message = "todo.v1.Task"
            fields = [{ field = "title", rules = [{ kind = "required" }] }]

            [[constraint_set]]
            message = "todo.v1.GetTaskRequest"
            "#,
        )
        .unwrap();
        let names: Vec<_> = file.sets.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(names, vec!["todo.v1.Task", "todo.v1.GetTaskRequest"]);
        assert!(file.sets[1].fields.is_empty());
    }

    #[test]
    fn parse_from_toml() {
        let set = ConstraintSet::from_toml(
            r#"
            message = "todo.v1.Task"

            [[fields]]
            field = "title"
            rules = [{ kind = "required" }, { kind = "max_len", max = 10 }]

            [[fields]]
            field = "due_date"
            rules = [{ kind = "future" }]
            "#,
        )
        .unwrap();
        assert_eq!(set.message, "todo.v1.Task");
        assert_eq!(
            set.fields[0].rules,
            vec![RuleSpec::Required, RuleSpec::MaxLen { max: 10 }]
        );
        assert_eq!(set.fields[1].rules, vec![RuleSpec::Future]);
    }

    #[test]
    fn bad_pattern_is_reported() {
        let set = ConstraintSet::new("m").field(
            "name",
            vec![RuleSpec::Pattern {
                regex: "(".into(),
            }],
        );
        let err = compile(&set, |_| true).unwrap_err();
        assert!(matches!(err, ConstraintError::Pattern { .. }));
    }

    #[test]
    fn unregistered_custom_rule_is_reported() {
        let set = ConstraintSet::new("m").field("title", vec![RuleSpec::Custom { id: "x".into() }]);
        let err = compile(&set, |_| false).unwrap_err();
        assert!(matches!(err, ConstraintError::UnknownRule(id) if id == "x"));
    }
}
