use std::collections::HashMap;

use crate::ToolValue;

/// Tool arguments as the string map the classification step produces.
pub(crate) type ToolArguments = HashMap<String, String>;

/// Coerce whatever JSON a backend produced for a call's arguments into the
/// string map handlers consume. Non-string values render through ToolValue
/// so numbers and booleans arrive in a predictable shape.
pub(crate) fn coerce_arguments(value: &serde_json::Value) -> ToolArguments {
    let mut out = ToolArguments::new();
    let Some(map) = value.as_object() else {
        return out;
    };
    for (key, value) in map {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => ToolValue::from_json(other).render(),
        };
        out.insert(key.clone(), rendered);
    }
    out
}

pub(crate) fn str_arg<'a>(args: &'a ToolArguments, name: &str) -> Option<&'a str> {
    args.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

pub(crate) fn usize_arg(args: &ToolArguments, name: &str) -> Option<usize> {
    str_arg(args, name).and_then(|v| v.parse().ok())
}

pub(crate) fn i64_arg(args: &ToolArguments, name: &str) -> Option<i64> {
    str_arg(args, name).and_then(|v| v.parse().ok())
}

pub(crate) fn f64_arg(args: &ToolArguments, name: &str) -> Option<f64> {
    str_arg(args, name).and_then(|v| v.parse().ok())
}

pub(crate) fn bool_arg(args: &ToolArguments, name: &str) -> Option<bool> {
    let value = str_arg(args, name)?.to_ascii_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Comma-separated list argument, entries trimmed, empties dropped.
pub(crate) fn list_arg(args: &ToolArguments, name: &str) -> Vec<String> {
    str_arg(args, name)
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
