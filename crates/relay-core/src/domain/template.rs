//! Template variable resolution for assignments and field prefills
//!
//! Definitions may embed `{{step_id.field_name}}` expressions in a step's
//! `assignedTo` and in field prefill values. They resolve against the
//! instance at access time: the `user_email` and `user_display_name`
//! specials resolve to the initiator, anything else looks up the named
//! field in the accumulated instance data. Unresolvable expressions
//! resolve to the literal input, never to an error.

use crate::domain::workflow_instance::WorkflowInstance;
use regex::Regex;
use std::sync::OnceLock;

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\{(.+)\}\}$").expect("valid template regex"))
}

/// Resolve a `{{step.field}}` template against an instance
///
/// Non-template strings pass through unchanged.
pub fn resolve_template(value: &str, instance: &WorkflowInstance) -> String {
    let Some(captures) = template_regex().captures(value.trim()) else {
        return value.to_string();
    };

    let path = captures[1].trim();
    let mut parts = path.splitn(2, '.');
    let (Some(_step_id), Some(field_name)) = (parts.next(), parts.next()) else {
        return value.to_string();
    };

    match field_name {
        "user_email" => instance.initiated_by_email.clone(),
        "user_display_name" => instance
            .initiated_by_email
            .split('@')
            .next()
            .unwrap_or(&instance.initiated_by_email)
            .to_string(),
        _ => match instance.data.get(field_name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => value.to_string(),
        },
    }
}
