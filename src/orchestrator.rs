//! The request pipeline: Classify → Execute → Synthesize.
//!
//! One pass per request, always in that order, with an early exit to a
//! direct-answer path when classification selects no tools. Every failure
//! below this module degrades: a backend error becomes "no calls" or "no
//! reply", a missing tool becomes an error entry in the batch, a panicking
//! handler becomes an error entry. Callers never see anything but
//! `Option<String>`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    LlmBackend, MemoryStore, RequestContext, ToolCall, ToolRegistry, ToolResult,
};

pub(crate) const FALLBACK_REPLY: &str =
    "I'm sorry, I couldn't understand that. Please try again.";

/// Everything one request needs, constructed once at startup (or once per
/// test) and passed in explicitly.
pub(crate) struct Assistant {
    pub(crate) registry: ToolRegistry,
    pub(crate) memory: Arc<Mutex<MemoryStore>>,
    pub(crate) backend: Arc<dyn LlmBackend>,
}

/// Run one request through the pipeline. `None` means the caller should fall
/// back to a canned reply; no error ever escapes.
pub(crate) fn process_request(
    assistant: &Assistant,
    input: &str,
    context: Option<&RequestContext>,
) -> Option<String> {
    let memory_segment = {
        let store = assistant.memory.lock().unwrap_or_else(|e| e.into_inner());
        store.get(input)
    };

    let schemas = assistant.registry.schemas();
    let calls = match assistant.backend.classify(input, &schemas) {
        Ok(calls) => calls,
        Err(e) => {
            eprintln!("[classify] backend failed, answering without tools: {e}");
            Vec::new()
        }
    };

    if calls.is_empty() {
        let block = direct_answer_block(memory_segment.as_deref(), context);
        return match assistant.backend.synthesize(&block, input) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("[synthesize] backend failed: {e}");
                None
            }
        };
    }

    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    eprintln!("[tool_calls] {names:?}");

    let results = execute_batch(&assistant.registry, &calls, input);
    let block = build_results_block(&results, memory_segment.as_deref(), context);
    match assistant.backend.synthesize(&block, input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("[synthesize] backend failed: {e}");
            None
        }
    }
}

/// Execute every call in the batch concurrently and collect one result per
/// call, in call order. An unknown name or a panicking handler produces an
/// error entry without aborting the rest of the batch. The batch completes
/// when the slowest call finishes.
pub(crate) fn execute_batch(
    registry: &ToolRegistry,
    calls: &[ToolCall],
    input: &str,
) -> Vec<ToolResult> {
    calls
        .par_iter()
        .map(|call| {
            let Some(descriptor) = registry.get(&call.name) else {
                return ToolResult::failed(&call.name, "Function not found in registry".to_string());
            };
            let started = Instant::now();
            let handler = descriptor.handler.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                handler(&call.arguments, input, calls)
            }));
            let elapsed_ms = started.elapsed().as_millis();
            eprintln!("[function: {}] {elapsed_ms}ms", call.name);
            match outcome {
                Ok(result) => ToolResult::ok(&call.name, result),
                Err(panic_info) => {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    eprintln!("[function: {}] panicked: {msg}", call.name);
                    ToolResult::failed(&call.name, format!("tool panicked: {msg}"))
                }
            }
        })
        .collect()
}

/// Aggregate successful tool outputs, memory recall, and situational context
/// into the block the synthesis backend consumes. Failed and empty calls are
/// logged and skipped; partial success is normal.
pub(crate) fn build_results_block(
    results: &[ToolResult],
    memory_segment: Option<&str>,
    context: Option<&RequestContext>,
) -> String {
    let mut segments: Vec<String> = Vec::new();
    for result in results {
        if let Some(error) = &result.error {
            eprintln!("[{}] {error}", result.function_name);
            continue;
        }
        let Some(text) = &result.result else {
            eprintln!("[{}] No result", result.function_name);
            continue;
        };
        segments.push(format!(
            "<{name}>\n{text}\n</{name}>",
            name = result.function_name
        ));
    }
    segments.push(format!(
        "<memory-recall>\n{}\n</memory-recall>",
        memory_segment.unwrap_or("No memory")
    ));
    if let Some(context) = context {
        segments.push(format!("<context>\n{}\n</context>", context.render()));
    }
    segments.join("\n")
}

/// The no-tools path: answer from memory and situational context alone.
fn direct_answer_block(memory_segment: Option<&str>, context: Option<&RequestContext>) -> String {
    let mut segments = vec![format!(
        "-----[memory: recall]\n{}\n-----",
        memory_segment.unwrap_or("No memory")
    )];
    if let Some(context) = context {
        segments.push(format!("-----[context]\n{}\n-----", context.render()));
    }
    segments.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::StubPlatform;
    use crate::registry::{params_object, ToolDescriptor};
    use crate::{platform_tools, weather, DirectoryCache, DirectoryEntry};

    /// Backend stub: canned classification, synthesis echoes its block so
    /// tests can assert on exactly what synthesis saw.
    struct StubBackend {
        calls: Vec<ToolCall>,
        classify_fails: bool,
        synthesize_fails: bool,
    }

    impl StubBackend {
        fn with_calls(calls: Vec<ToolCall>) -> Self {
            StubBackend {
                calls,
                classify_fails: false,
                synthesize_fails: false,
            }
        }
    }

    impl LlmBackend for StubBackend {
        fn classify(
            &self,
            _input: &str,
            _tools: &[serde_json::Value],
        ) -> Result<Vec<ToolCall>, String> {
            if self.classify_fails {
                Err("classification backend down".to_string())
            } else {
                Ok(self.calls.clone())
            }
        }

        fn synthesize(&self, results_block: &str, input: &str) -> Result<Option<String>, String> {
            if self.synthesize_fails {
                Err("synthesis backend down".to_string())
            } else {
                Ok(Some(format!("{results_block}\n===\n{input}")))
            }
        }
    }

    fn tool_call(name: &str, pairs: &[(&str, &str)]) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn scratch_memory() -> Arc<Mutex<MemoryStore>> {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        std::mem::forget(dir);
        Arc::new(Mutex::new(store))
    }

    fn assistant_with(registry: ToolRegistry, backend: StubBackend) -> Assistant {
        Assistant {
            registry,
            memory: scratch_memory(),
            backend: Arc::new(backend),
        }
    }

    fn weather_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_all(weather::tools()).unwrap();
        registry
    }

    #[test]
    fn empty_call_list_takes_the_direct_answer_path() {
        let assistant = assistant_with(weather_registry(), StubBackend::with_calls(Vec::new()));
        {
            let mut store = assistant.memory.lock().unwrap();
            store
                .set("boston", "Boston is cold in winter.", false)
                .unwrap();
        }
        let answer = process_request(&assistant, "Is Boston cold in winter?", None).unwrap();
        assert!(answer.contains("[memory: recall]"));
        assert!(answer.contains("Boston is cold"));
        // No tool-result segments on the direct path.
        assert!(!answer.contains("<get_current_weather>"));
    }

    #[test]
    fn classification_failure_degrades_to_direct_answer() {
        let backend = StubBackend {
            calls: Vec::new(),
            classify_fails: true,
            synthesize_fails: false,
        };
        let assistant = assistant_with(weather_registry(), backend);
        let answer = process_request(&assistant, "hello there", None).unwrap();
        assert!(answer.contains("[memory: recall]"));
        assert!(answer.contains("No memory"));
    }

    #[test]
    fn synthesis_failure_yields_none() {
        let backend = StubBackend {
            calls: Vec::new(),
            classify_fails: false,
            synthesize_fails: true,
        };
        let assistant = assistant_with(weather_registry(), backend);
        assert!(process_request(&assistant, "hello", None).is_none());
    }

    #[test]
    fn unknown_tool_produces_error_entry_without_aborting_batch() {
        let registry = weather_registry();
        let calls = vec![
            tool_call("no_such_tool", &[]),
            tool_call(
                "get_current_weather",
                &[("location", "Boston, MA"), ("format", "fahrenheit")],
            ),
        ];
        let results = execute_batch(&registry, &calls, "weather in boston?");
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Function not found in registry")
        );
        assert!(results[0].result.is_none());
        assert!(results[1].error.is_none());
        assert!(results[1].result.as_deref().unwrap().contains("Boston"));
    }

    #[test]
    fn panicking_handler_becomes_error_entry() {
        let mut registry = weather_registry();
        registry
            .register(ToolDescriptor {
                name: "explode".to_string(),
                description: "always panics".to_string(),
                parameters: params_object(serde_json::json!({}), &[]),
                handler: Arc::new(|_, _, _| panic!("boom")),
            })
            .unwrap();
        let calls = vec![
            tool_call("explode", &[]),
            tool_call(
                "get_current_weather",
                &[("location", "Oslo"), ("format", "celsius")],
            ),
        ];
        let results = execute_batch(&registry, &calls, "");
        assert!(results[0].error.as_deref().unwrap().contains("boom"));
        assert!(results[1].result.is_some());
    }

    #[test]
    fn weather_end_to_end() {
        let calls = vec![tool_call(
            "get_current_weather",
            &[("location", "Boston, MA"), ("format", "fahrenheit")],
        )];
        let assistant = assistant_with(weather_registry(), StubBackend::with_calls(calls));
        let answer = process_request(
            &assistant,
            "What's the weather in Boston, fahrenheit?",
            None,
        )
        .unwrap();
        assert!(!answer.is_empty());
        assert!(answer.contains("Boston"));
        assert!(answer.contains("temp:"));
        assert!(answer.contains("<get_current_weather>"));
    }

    #[test]
    fn unresolvable_recipient_end_to_end() {
        let platform = Arc::new(StubPlatform {
            dm_channels: vec![DirectoryEntry {
                id: "d1".into(),
                name: "alice".into(),
            }],
            ..Default::default()
        });
        let cache = Arc::new(DirectoryCache::new());
        let mut registry = ToolRegistry::new();
        registry
            .register_all(platform_tools::tools(platform, cache))
            .unwrap();

        let calls = vec![tool_call(
            "send_discord_message",
            &[
                ("channel_name", "@zzzzz_unknown_handle"),
                ("content", "hello"),
            ],
        )];
        let assistant = assistant_with(registry, StubBackend::with_calls(calls));
        let answer = process_request(
            &assistant,
            "tell @zzzzz_unknown_handle I said hello",
            None,
        )
        .unwrap();
        assert!(answer.contains("Failed to send message"));
    }

    #[test]
    fn context_segment_reaches_synthesis() {
        let assistant = assistant_with(weather_registry(), StubBackend::with_calls(Vec::new()));
        let context = RequestContext {
            sender: "mara".into(),
            channel: "general".into(),
            guild: "home".into(),
            ..Default::default()
        };
        let answer = process_request(&assistant, "hi", Some(&context)).unwrap();
        assert!(answer.contains("sender: mara"));
        assert!(answer.contains("[context]"));
    }

    #[test]
    fn results_block_skips_failures_and_empties() {
        let results = vec![
            ToolResult::failed("broken", "Function not found in registry".to_string()),
            ToolResult::ok("quiet", None),
            ToolResult::ok("loud", Some("output".to_string())),
        ];
        let block = build_results_block(&results, Some("remembered"), None);
        assert!(!block.contains("broken"));
        assert!(!block.contains("quiet"));
        assert!(block.contains("<loud>\noutput\n</loud>"));
        assert!(block.contains("<memory-recall>\nremembered\n</memory-recall>"));
    }

    #[test]
    fn fallback_reply_is_nonempty() {
        assert!(!FALLBACK_REPLY.is_empty());
    }

    #[test]
    fn batch_results_preserve_call_order() {
        let registry = weather_registry();
        let mut calls = Vec::new();
        for city in ["Oslo", "Lima", "Cairo", "Perth"] {
            calls.push(tool_call(
                "get_current_weather",
                &[("location", city), ("format", "celsius")],
            ));
        }
        let results = execute_batch(&registry, &calls, "");
        for (result, city) in results.iter().zip(["Oslo", "Lima", "Cairo", "Perth"]) {
            assert!(result.result.as_deref().unwrap().contains(city));
        }
    }
}
