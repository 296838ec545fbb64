//! Azure Pipelines variable placeholders
//!
//! Values written as `$(NAME)` are looked up in the process environment.
//! A placeholder that cannot be resolved is returned untouched so the
//! pipeline agent can still substitute it later.

use serde_yaml::Value;

use super::Config;

/// Resolve a `$(NAME)` placeholder against the process environment
pub fn resolve_pipeline_variable(value: &str) -> String {
    resolve_pipeline_variable_with(value, |name| std::env::var(name).ok())
}

/// Resolve a `$(NAME)` placeholder with a custom variable lookup
///
/// Azure Pipelines exposes `$(System.AccessToken)` as `SYSTEM_ACCESSTOKEN`,
/// so the mangled name is tried when the literal one is absent. Set-but-empty
/// variables count as absent.
pub fn resolve_pipeline_variable_with<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let Some(name) = placeholder_name(value) else {
        return value.to_string();
    };

    let mangled = name.to_uppercase().replace('.', "_");
    let candidates = if mangled == name {
        vec![name.to_string()]
    } else {
        vec![name.to_string(), mangled]
    };

    candidates
        .iter()
        .filter_map(|candidate| lookup(candidate))
        .find(|resolved| !resolved.is_empty())
        .unwrap_or_else(|| value.to_string())
}

/// Resolve a YAML value; anything other than a string passes through unchanged
pub fn resolve_pipeline_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_pipeline_variable(s)),
        other => other.clone(),
    }
}

/// Service connection to use for a subscription: its override if one is
/// configured, otherwise the default. Both are placeholder-resolved.
pub fn resolve_spn_for_subscription(subscription_id: &str, config: &Config, default_spn: &str) -> String {
    match config
        .pipeline
        .subscription_spn_overrides
        .get(subscription_id)
    {
        Some(spn) => value_to_string(&resolve_pipeline_value(spn)),
        None => resolve_pipeline_variable(default_spn),
    }
}

fn placeholder_name(value: &str) -> Option<&str> {
    value
        .strip_prefix("$(")
        .and_then(|rest| rest.strip_suffix(')'))
        .filter(|name| !name.is_empty())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
