//! Static aggregation of the tool modules into one name → descriptor table.
//! Assembly happens once at startup from an explicit list; a duplicate name
//! is a startup error, never a silent overwrite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::tool_args::ToolArguments;
use crate::{
    memory_tools, platform_tools, socials, weather, ChatPlatform, DirectoryCache, MemoryStore,
    ToolCall,
};

/// Handler contract: `(arguments, raw input, all calls in the batch)` →
/// `Some(text)` or `None` for "nothing". Handlers are expected to catch
/// their own upstream failures and report them as text or `None`.
pub(crate) type ToolHandler =
    Arc<dyn Fn(&ToolArguments, &str, &[ToolCall]) -> Option<String> + Send + Sync>;

pub(crate) struct ToolDescriptor {
    pub(crate) name: String,
    pub(crate) description: String,
    /// The `{type: object, properties, required}` shape, relayed verbatim
    /// to whichever backend is active.
    pub(crate) parameters: serde_json::Value,
    pub(crate) handler: ToolHandler,
}

impl ToolDescriptor {
    pub(crate) fn schema_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Build the `{type: object, ...}` parameter schema for a descriptor.
pub(crate) fn params_object(
    properties: serde_json::Value,
    required: &[&str],
) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[derive(Default)]
pub(crate) struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub(crate) fn new() -> Self {
        ToolRegistry::default()
    }

    pub(crate) fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), String> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(format!("duplicate tool registration: {}", descriptor.name));
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub(crate) fn register_all(
        &mut self,
        descriptors: Vec<ToolDescriptor>,
    ) -> Result<(), String> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.tools.len()
    }

    /// Schema list for the classification backend, sorted by name for a
    /// stable prompt shape.
    pub(crate) fn schemas(&self) -> Vec<serde_json::Value> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.tools[name].schema_json())
            .collect()
    }
}

pub(crate) struct ToolDeps {
    pub(crate) platform: Arc<dyn ChatPlatform>,
    pub(crate) cache: Arc<DirectoryCache>,
    pub(crate) memory: Arc<Mutex<MemoryStore>>,
}

/// Assemble the full registry from the independently defined tool modules.
pub(crate) fn build_registry(deps: &ToolDeps) -> Result<ToolRegistry, String> {
    let mut registry = ToolRegistry::new();
    registry.register_all(weather::tools())?;
    registry.register_all(socials::tools())?;
    registry.register_all(platform_tools::tools(
        deps.platform.clone(),
        deps.cache.clone(),
    ))?;
    registry.register_all(memory_tools::tools(deps.memory.clone()))?;
    eprintln!("[functions] {} registered", registry.len());
    Ok(registry)
}
