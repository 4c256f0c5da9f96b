use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One tool invocation selected by the classification backend.
/// Transient: exists only within a single orchestration pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ToolCall {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) arguments: HashMap<String, String>,
}

/// Outcome of executing one ToolCall. A present `error` and a present
/// `result` are distinct states: "function not found" is an error, a handler
/// that found nothing reports `result: None` with no error.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ToolResult {
    pub(crate) function_name: String,
    pub(crate) result: Option<String>,
    pub(crate) error: Option<String>,
}

impl ToolResult {
    pub(crate) fn ok(name: &str, result: Option<String>) -> Self {
        ToolResult {
            function_name: name.to_string(),
            result,
            error: None,
        }
    }

    pub(crate) fn failed(name: &str, error: String) -> Self {
        ToolResult {
            function_name: name.to_string(),
            result: None,
            error: Some(error),
        }
    }
}

/// Typed value produced by tool handlers and argument coercion.
/// Stringification dispatches on the declared variant, never on runtime
/// introspection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ToolValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<ToolValue>),
    Record(Vec<(String, ToolValue)>),
}

impl ToolValue {
    pub(crate) fn from_json(value: &serde_json::Value) -> ToolValue {
        match value {
            serde_json::Value::Null => ToolValue::Text("N/A".to_string()),
            serde_json::Value::Bool(b) => ToolValue::Bool(*b),
            serde_json::Value::Number(n) => ToolValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => ToolValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                ToolValue::List(items.iter().map(ToolValue::from_json).collect())
            }
            serde_json::Value::Object(map) => ToolValue::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), ToolValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub(crate) fn render(&self) -> String {
        self.render_indented(0)
    }

    fn render_indented(&self, depth: usize) -> String {
        match self {
            ToolValue::Text(s) => s.clone(),
            ToolValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            ToolValue::Bool(b) => (if *b { "Yes" } else { "No" }).to_string(),
            ToolValue::List(items) => items
                .iter()
                .map(|v| v.render_indented(depth))
                .collect::<Vec<_>>()
                .join(", "),
            ToolValue::Record(fields) => {
                let pad = "  ".repeat(depth);
                fields
                    .iter()
                    .map(|(k, v)| match v {
                        ToolValue::Record(_) => {
                            format!("{pad}{k}:\n{}", v.render_indented(depth + 1))
                        }
                        _ => format!("{pad}{k}: {}", v.render_indented(depth)),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

/// Best candidate found by a resolution attempt. Transient, never stored.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResolvedEntityMatch {
    pub(crate) id: String,
    pub(crate) display_name: String,
    pub(crate) score: f64,
}

/// An (id, name) pair from the platform directory: a guild, a channel, or a
/// direct-message channel keyed by its recipient's username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct DirectoryEntry {
    pub(crate) id: String,
    pub(crate) name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MemberEntry {
    pub(crate) id: String,
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    #[serde(default)]
    pub(crate) global_name: Option<String>,
}

impl MemberEntry {
    /// Every known display-name variant, primary name first.
    pub(crate) fn name_variants(&self) -> Vec<&str> {
        let mut out = vec![self.username.as_str()];
        if let Some(name) = self.display_name.as_deref() {
            out.push(name);
        }
        if let Some(name) = self.global_name.as_deref() {
            out.push(name);
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessageEntry {
    pub(crate) id: String,
    pub(crate) author: String,
    pub(crate) content: String,
    pub(crate) created_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MessageFilters {
    pub(crate) limit: usize,
    pub(crate) mentioned: bool,
    pub(crate) before: Option<String>,
    pub(crate) after: Option<String>,
    pub(crate) has: Option<String>,
    pub(crate) mentions: Vec<String>,
}

/// A mention of the bot surfaced by the platform, consumed by the bridge.
#[derive(Debug, Clone)]
pub(crate) struct MentionEvent {
    pub(crate) message_id: String,
    pub(crate) channel_id: String,
    pub(crate) guild_id: Option<String>,
    pub(crate) author_id: String,
    pub(crate) author_name: String,
    pub(crate) author_is_bot: bool,
    pub(crate) content: String,
    pub(crate) created_at: Option<String>,
    pub(crate) mention_everyone: bool,
}

/// Situational context carried alongside one request and rendered into the
/// synthesis prompt.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestContext {
    pub(crate) sender: String,
    pub(crate) sender_id: String,
    pub(crate) channel: String,
    pub(crate) channel_id: String,
    pub(crate) guild: String,
    pub(crate) member_count: Option<u64>,
    pub(crate) message_created_at: String,
    pub(crate) current_time: String,
}

impl RequestContext {
    pub(crate) fn render(&self) -> String {
        let mut fields = vec![
            ("sender".to_string(), ToolValue::Text(self.sender.clone())),
            (
                "sender_id".to_string(),
                ToolValue::Text(self.sender_id.clone()),
            ),
            ("channel".to_string(), ToolValue::Text(self.channel.clone())),
            (
                "channel_id".to_string(),
                ToolValue::Text(self.channel_id.clone()),
            ),
            ("guild".to_string(), ToolValue::Text(self.guild.clone())),
            (
                "message_created_at".to_string(),
                ToolValue::Text(self.message_created_at.clone()),
            ),
            (
                "current_time".to_string(),
                ToolValue::Text(self.current_time.clone()),
            ),
        ];
        if let Some(count) = self.member_count {
            fields.push((
                "channel_member_count".to_string(),
                ToolValue::Number(count as f64),
            ));
        }
        ToolValue::Record(fields).render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_dispatches_on_variant() {
        assert_eq!(ToolValue::Text("hi".into()).render(), "hi");
        assert_eq!(ToolValue::Number(42.0).render(), "42");
        assert_eq!(ToolValue::Number(21.5).render(), "21.5");
        assert_eq!(ToolValue::Bool(true).render(), "Yes");
        assert_eq!(ToolValue::Bool(false).render(), "No");
        let list = ToolValue::List(vec![
            ToolValue::Text("a".into()),
            ToolValue::Text("b".into()),
        ]);
        assert_eq!(list.render(), "a, b");
    }

    #[test]
    fn render_record_as_lines() {
        let record = ToolValue::Record(vec![
            ("location".into(), ToolValue::Text("Boston, MA".into())),
            ("temp".into(), ToolValue::Number(68.0)),
            ("unit".into(), ToolValue::Text("F".into())),
        ]);
        assert_eq!(record.render(), "location: Boston, MA\ntemp: 68\nunit: F");
    }

    #[test]
    fn render_nested_record_indents() {
        let record = ToolValue::Record(vec![(
            "outer".into(),
            ToolValue::Record(vec![("inner".into(), ToolValue::Bool(false))]),
        )]);
        assert_eq!(record.render(), "outer:\n  inner: No");
    }

    #[test]
    fn from_json_maps_null_to_placeholder() {
        let value = ToolValue::from_json(&serde_json::Value::Null);
        assert_eq!(value.render(), "N/A");
    }

    #[test]
    fn member_name_variants_in_order() {
        let member = MemberEntry {
            id: "1".into(),
            username: "alice".into(),
            display_name: Some("Alice W".into()),
            global_name: None,
        };
        assert_eq!(member.name_variants(), vec!["alice", "Alice W"]);
    }
}
