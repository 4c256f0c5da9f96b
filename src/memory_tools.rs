//! Memory tools exposed to the classification backend: append, typed store,
//! ranked recall, forget, and stats over the shared store.

use std::sync::{Arc, Mutex};

use crate::memory::{ForgetCriteria, RecallOptions, SetOptions};
use crate::registry::{params_object, ToolDescriptor};
use crate::tool_args::{f64_arg, i64_arg, list_arg, str_arg, usize_arg};
use crate::{MemoryStore, ToolValue};

pub(crate) fn tools(memory: Arc<Mutex<MemoryStore>>) -> Vec<ToolDescriptor> {
    let mut out = Vec::new();

    {
        let memory = memory.clone();
        out.push(ToolDescriptor {
            name: "append_memory".to_string(),
            description:
                "Appends or updates a detailed value in the system's memory, associated with a specific key"
                    .to_string(),
            parameters: params_object(
                serde_json::json!({
                    "key": {
                        "type": "string",
                        "description": "The unique identifier or contextual key under which the value will be stored.",
                    },
                    "value": {
                        "type": "string",
                        "description": "The detailed information to be stored in memory.",
                    },
                }),
                &["key", "value"],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let key = str_arg(args, "key")?;
                let value = str_arg(args, "value")?;
                let mut store = memory.lock().unwrap_or_else(|e| e.into_inner());
                match store.set(key, value, true) {
                    Ok(()) => Some(format!("Successfully stored memory with key: {key}")),
                    Err(e) => {
                        eprintln!("[function: append_memory] {e}");
                        Some(format!("Failed to store memory: {e}"))
                    }
                }
            }),
        });
    }

    {
        let memory = memory.clone();
        out.push(ToolDescriptor {
            name: "store_memory".to_string(),
            description: "Store information in the memory system with type, tags, and retention"
                .to_string(),
            parameters: params_object(
                serde_json::json!({
                    "key": {
                        "type": "string",
                        "description": "Unique identifier for the memory",
                    },
                    "content": {
                        "type": "string",
                        "description": "The content to store",
                    },
                    "type": {
                        "type": "string",
                        "enum": ["conversation", "preference", "userData"],
                        "description": "Type of memory being stored",
                    },
                    "tags": {
                        "type": "string",
                        "description": "Optional comma separated tags for categorizing the memory",
                    },
                    "ttl": {
                        "type": "number",
                        "description": "Optional time-to-live in milliseconds",
                    },
                }),
                &["key", "content", "type"],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let key = str_arg(args, "key")?;
                let content = str_arg(args, "content")?;
                let opts = SetOptions {
                    kind: str_arg(args, "type").map(|s| s.to_string()),
                    tags: list_arg(args, "tags"),
                    ttl_ms: i64_arg(args, "ttl"),
                };
                let mut store = memory.lock().unwrap_or_else(|e| e.into_inner());
                match store.set_with_options(key, content, opts) {
                    Ok(()) => Some(format!("Successfully stored memory with key: {key}")),
                    Err(e) => {
                        eprintln!("[function: store_memory] {e}");
                        Some(format!("Failed to store memory: {e}"))
                    }
                }
            }),
        });
    }

    {
        let memory = memory.clone();
        out.push(ToolDescriptor {
            name: "recall_memory".to_string(),
            description: "Retrieve memories based on context".to_string(),
            parameters: params_object(
                serde_json::json!({
                    "context": {
                        "type": "string",
                        "description": "Context to search for relevant memories",
                    },
                    "type": {
                        "type": "string",
                        "enum": ["conversation", "preference", "userData"],
                        "description": "Optional type of memories to retrieve",
                    },
                    "min_similarity": {
                        "type": "number",
                        "description": "Minimum similarity threshold (0-1)",
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of memories to retrieve",
                    },
                }),
                &["context"],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let context = str_arg(args, "context")?;
                let mut opts = RecallOptions::default();
                if let Some(kind) = str_arg(args, "type") {
                    opts.kind = Some(kind.to_string());
                }
                if let Some(min) = f64_arg(args, "min_similarity") {
                    opts.min_similarity = min;
                }
                if let Some(limit) = usize_arg(args, "limit") {
                    opts.limit = limit;
                }
                let store = memory.lock().unwrap_or_else(|e| e.into_inner());
                let hits = store.recall(context, &opts);
                if hits.is_empty() {
                    return Some("No relevant memories found".to_string());
                }
                let lines: Vec<String> = hits
                    .iter()
                    .map(|hit| format!("[{:.2}] {}", hit.similarity, hit.content))
                    .collect();
                Some(lines.join("\n"))
            }),
        });
    }

    {
        let memory = memory.clone();
        out.push(ToolDescriptor {
            name: "forget_memory".to_string(),
            description: "Remove specific memories from the system".to_string(),
            parameters: params_object(
                serde_json::json!({
                    "key": {
                        "type": "string",
                        "description": "Specific memory key to forget",
                    },
                    "type": {
                        "type": "string",
                        "enum": ["conversation", "preference", "userData"],
                        "description": "Type of memories to forget",
                    },
                    "before": {
                        "type": "number",
                        "description": "Forget memories older than this timestamp (ms)",
                    },
                    "tags": {
                        "type": "string",
                        "description": "Forget memories with specific comma separated tags",
                    },
                }),
                &[],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let criteria = ForgetCriteria {
                    key: str_arg(args, "key").map(|s| s.to_string()),
                    kind: str_arg(args, "type").map(|s| s.to_string()),
                    before_ms: i64_arg(args, "before"),
                    tags: list_arg(args, "tags"),
                };
                let mut store = memory.lock().unwrap_or_else(|e| e.into_inner());
                match store.forget(&criteria) {
                    Ok(count) => Some(format!("Successfully removed {count} memories")),
                    Err(e) => {
                        eprintln!("[function: forget_memory] {e}");
                        Some(format!("Failed to forget memories: {e}"))
                    }
                }
            }),
        });
    }

    {
        let memory = memory.clone();
        out.push(ToolDescriptor {
            name: "get_memory_stats".to_string(),
            description: "Get statistics about the memory system".to_string(),
            parameters: params_object(serde_json::json!({}), &[]),
            handler: Arc::new(move |_args, _input, _calls| {
                let store = memory.lock().unwrap_or_else(|e| e.into_inner());
                let stats = store.stats();
                let kinds = ToolValue::Record(
                    stats
                        .kinds
                        .iter()
                        .map(|(kind, count)| (kind.clone(), ToolValue::Number(*count as f64)))
                        .collect(),
                );
                let record = ToolValue::Record(vec![
                    (
                        "documents".to_string(),
                        ToolValue::Number(stats.documents as f64),
                    ),
                    (
                        "total_length".to_string(),
                        ToolValue::Number(stats.total_len as f64),
                    ),
                    ("kinds".to_string(), kinds),
                ]);
                Some(record.render())
            }),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_args::ToolArguments;

    fn store() -> Arc<Mutex<MemoryStore>> {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        // Leak the tempdir so the backing files outlive the handle.
        std::mem::forget(dir);
        Arc::new(Mutex::new(store))
    }

    fn run(
        tools: &[ToolDescriptor],
        name: &str,
        pairs: &[(&str, &str)],
    ) -> Option<String> {
        let idx = tools.iter().position(|t| t.name == name).unwrap();
        let args: ToolArguments = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        (tools[idx].handler)(&args, "", &[])
    }

    #[test]
    fn append_then_recall_round_trip() {
        let memory = store();
        let tools = tools(memory);
        let stored = run(
            &tools,
            "append_memory",
            &[("key", "lissa"), ("value", "Lissa is twenty three years old")],
        )
        .unwrap();
        assert!(stored.contains("lissa"));
        let recalled = run(
            &tools,
            "recall_memory",
            &[("context", "Lissa is twenty three years old")],
        )
        .unwrap();
        assert!(recalled.contains("twenty three"));
    }

    #[test]
    fn recall_with_no_hits_reports_nothing_found() {
        let memory = store();
        let tools = tools(memory);
        let out = run(&tools, "recall_memory", &[("context", "anything at all")]).unwrap();
        assert_eq!(out, "No relevant memories found");
    }

    #[test]
    fn forget_reports_removed_count() {
        let memory = store();
        let tools = tools(memory);
        run(
            &tools,
            "store_memory",
            &[
                ("key", "m1"),
                ("content", "one"),
                ("type", "conversation"),
            ],
        );
        let out = run(&tools, "forget_memory", &[("type", "conversation")]).unwrap();
        assert_eq!(out, "Successfully removed 1 memories");
    }

    #[test]
    fn stats_render_as_record() {
        let memory = store();
        let tools = tools(memory);
        run(
            &tools,
            "store_memory",
            &[("key", "m1"), ("content", "one"), ("type", "preference")],
        );
        let out = run(&tools, "get_memory_stats", &[]).unwrap();
        assert!(out.contains("documents: 1"));
        assert!(out.contains("preference: 1"));
    }
}
