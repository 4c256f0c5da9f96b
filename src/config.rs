use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Assistant configuration, read from `config.json` in the workspace.
/// Every field is optional; env vars override file values at the point of
/// use. A missing or unreadable file means defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct AssistantConfig {
    #[serde(default)]
    pub(crate) workspace: Option<String>,
    /// LLM provider: "openai" or "workers".
    #[serde(default)]
    pub(crate) provider: Option<String>,
    #[serde(default)]
    pub(crate) openai_model: Option<String>,
    #[serde(default)]
    pub(crate) classify_model: Option<String>,
    #[serde(default)]
    pub(crate) synthesis_model: Option<String>,
    /// Bridge poll cadence in seconds.
    #[serde(default)]
    pub(crate) poll_interval_secs: Option<u64>,
    /// How many mentions to scan per poll.
    #[serde(default)]
    pub(crate) mention_limit: Option<usize>,
    /// Refuse inputs longer than this many characters.
    #[serde(default)]
    pub(crate) max_input_chars: Option<usize>,
}

pub(crate) fn config_file_path(workspace: &Path) -> PathBuf {
    workspace.join("config.json")
}

pub(crate) fn load_config(workspace: &Path) -> AssistantConfig {
    let path = config_file_path(workspace);
    let Ok(raw) = fs::read_to_string(&path) else {
        return AssistantConfig::default();
    };
    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[config] ignoring unparsable {}: {e}", path.display());
            AssistantConfig::default()
        }
    }
}
