//! Form and field data contract for form steps
//!
//! Forms are rendered by clients; the engine only owns the data contract
//! and the submission-time validation rules. Validation is all-or-nothing
//! per submission: if any field fails, the whole submission is rejected
//! with a map of per-field messages and nothing is persisted.

use crate::error::{CoreError, FieldErrors};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A dynamic form attached to a form step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Form identifier, unique within its definition
    pub id: String,

    /// Display title
    pub title: String,

    /// Display description
    #[serde(default)]
    pub description: String,

    /// Ordered input fields
    pub fields: Vec<Field>,

    /// Optional client-side behavior on submit (e.g. a confirmation message)
    #[serde(rename = "submitAction", default, skip_serializing_if = "Option::is_none")]
    pub submit_action: Option<SubmitAction>,
}

/// Client-side submit behavior attached to a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAction {
    /// Behavior kind, e.g. `message`
    #[serde(rename = "type")]
    pub kind: String,

    /// Message shown by `message`-kind actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Supported field input types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text input
    Text,
    /// Email address input
    Email,
    /// Numeric input
    Number,
    /// Single choice from `options`
    Select,
    /// Multi-line text input
    Textarea,
    /// Date input
    Date,
}

/// Numeric and pattern constraints for a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRules {
    /// Inclusive lower bound for number fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Inclusive upper bound for number fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Regex the value must fully match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One input field of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field identifier; doubles as the key in accumulated instance data
    pub id: String,

    /// Display label
    pub label: String,

    /// Input type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether a non-empty value must be submitted
    #[serde(default)]
    pub required: bool,

    /// Allowed values for `select` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Default or prefilled value; may contain `{{step.field}}` templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Readonly fields are system-populated and exempt from `required`
    #[serde(default)]
    pub readonly: bool,

    /// Additional constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldRules>,
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

/// Render a submitted JSON value as the text the constraints are checked on
///
/// Also used by the runner when a condition step compares its variable
/// against case values.
pub(crate) fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Whether a submitted value counts as "not provided"
fn value_is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Check a submission against a form's fields
///
/// Returns `CoreError::Validation` carrying one message per failing field.
/// Constraint order per field: required-ness first, then type checks on
/// present values, then pattern rules.
pub fn validate_submission(
    fields: &[Field],
    step_data: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), CoreError> {
    let mut errors = FieldErrors::new();

    for field in fields {
        let raw = step_data.get(&field.id);
        let missing = raw.map_or(true, value_is_empty);

        if missing {
            // Readonly fields are prefilled by the engine, not the user
            if field.required && !field.readonly {
                errors.insert(field.id.clone(), format!("{} is required", field.label));
            }
            continue;
        }

        let text = raw.map(value_text).unwrap_or_default();

        match field.field_type {
            FieldType::Email => {
                if !email_regex().is_match(&text) {
                    errors.insert(
                        field.id.clone(),
                        "Please enter a valid email address".to_string(),
                    );
                }
            }
            FieldType::Number => match text.parse::<f64>() {
                Ok(number) => {
                    let rules = field.validation.as_ref();
                    if let Some(min) = rules.and_then(|r| r.min) {
                        if number < min {
                            errors.insert(
                                field.id.clone(),
                                format!("Value must be at least {}", min),
                            );
                        }
                    }
                    if let Some(max) = rules.and_then(|r| r.max) {
                        if number > max {
                            errors.insert(
                                field.id.clone(),
                                format!("Value must be at most {}", max),
                            );
                        }
                    }
                }
                Err(_) => {
                    errors.insert(field.id.clone(), "Please enter a valid number".to_string());
                }
            },
            FieldType::Select => {
                if !field.options.iter().any(|option| option == &text) {
                    errors.insert(
                        field.id.clone(),
                        format!("{} must be one of the available options", field.label),
                    );
                }
            }
            FieldType::Text | FieldType::Textarea | FieldType::Date => {}
        }

        if let Some(pattern) = field.validation.as_ref().and_then(|r| r.pattern.as_deref()) {
            // Patterns are validated when the definition loads; an
            // uncompilable pattern here still fails the field, not the engine
            match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) => {
                    if !re.is_match(&text) {
                        errors.insert(
                            field.id.clone(),
                            format!("{} has an invalid format", field.label),
                        );
                    }
                }
                Err(_) => {
                    errors.insert(
                        field.id.clone(),
                        format!("{} has an invalid validation pattern", field.label),
                    );
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(errors))
    }
}
