// Module declarations
mod bridge;
mod cli;
mod config;
mod directory;
mod discord;
mod llm;
mod memory;
mod memory_tools;
mod orchestrator;
mod platform_tools;
mod registry;
mod resolver;
mod similarity;
mod socials;
mod tool_args;
mod types;
mod util;
mod weather;

// Re-export module items at the crate root so cross-module references stay
// short; modules grew out of one file and still share a namespace.
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use directory::*;
#[allow(unused_imports)]
pub(crate) use discord::*;
#[allow(unused_imports)]
pub(crate) use llm::*;
#[allow(unused_imports)]
pub(crate) use memory::*;
#[allow(unused_imports)]
pub(crate) use orchestrator::*;
#[allow(unused_imports)]
pub(crate) use registry::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;

use crate::memory::ForgetCriteria;
use crate::memory::RecallOptions;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { workspace } => {
            let (workspace, config) = workspace_and_config(workspace);
            let (assistant, platform, cache) = build_assistant(&workspace, &config)?;
            bridge::run_bridge(Arc::new(assistant), platform, cache, &workspace, &config)
        }

        Command::Ask {
            input,
            workspace,
            json,
        } => {
            let input = match input {
                Some(input) => input,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            if input.trim().is_empty() {
                return Err("ask requires a non-empty input".into());
            }
            let (workspace, config) = workspace_and_config(workspace);
            let (assistant, _platform, _cache) = build_assistant(&workspace, &config)?;
            let answer = orchestrator::process_request(&assistant, input.trim(), None);
            if json {
                let payload = serde_json::json!({
                    "input": input.trim(),
                    "answer": answer,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{}", answer.as_deref().unwrap_or(FALLBACK_REPLY));
            }
            Ok(())
        }

        Command::Tools { workspace } => {
            let (workspace, config) = workspace_and_config(workspace);
            let (assistant, _platform, _cache) = build_assistant(&workspace, &config)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&assistant.registry.schemas())?
            );
            Ok(())
        }

        Command::Resolve { handle, kind } => {
            let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordApi::from_env()?);
            let cache = DirectoryCache::new();
            let found = match kind.as_str() {
                "member" => {
                    let members = cache.all_members(platform.as_ref());
                    resolver::resolve_member(&handle, &members)
                }
                "dm" => resolver::resolve_dm_channel(&handle, platform.as_ref(), &cache),
                "channel" => resolver::resolve_channel(&handle, platform.as_ref(), &cache),
                "guild" => resolver::resolve_guild(&handle, platform.as_ref(), &cache),
                other => {
                    return Err(
                        format!("unknown kind '{other}' (expected member, dm, channel, guild)")
                            .into(),
                    )
                }
            };
            match found {
                Some(m) => println!(
                    "{} -> {} ({}) score={:.2}",
                    handle, m.display_name, m.id, m.score
                ),
                None => println!("{handle} -> not found"),
            }
            Ok(())
        }

        Command::Memory { command, workspace } => {
            let (workspace, _config) = workspace_and_config(workspace);
            let store = Mutex::new(MemoryStore::open(&workspace.join("memory"))?);
            run_memory_command(&store, command)
        }
    }
}

fn workspace_and_config(cli_workspace: Option<PathBuf>) -> (PathBuf, AssistantConfig) {
    // The config file lives inside the workspace, so resolve once with
    // defaults, read the file, then resolve again with its values.
    let probe = resolve_workspace(cli_workspace.clone(), &AssistantConfig::default());
    let config = load_config(&probe);
    let workspace = resolve_workspace(cli_workspace, &config);
    (workspace, config)
}

fn build_assistant(
    workspace: &Path,
    config: &AssistantConfig,
) -> Result<(Assistant, Arc<dyn ChatPlatform>, Arc<DirectoryCache>), Box<dyn std::error::Error>> {
    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordApi::from_env()?);
    let cache = Arc::new(DirectoryCache::new());
    let memory = Arc::new(Mutex::new(MemoryStore::open(&workspace.join("memory"))?));
    let backend = Arc::new(HttpBackend::from_config(config, workspace)?);

    let deps = ToolDeps {
        platform: platform.clone(),
        cache: cache.clone(),
        memory: memory.clone(),
    };
    let registry = build_registry(&deps)?;

    Ok((
        Assistant {
            registry,
            memory,
            backend,
        },
        platform,
        cache,
    ))
}

fn run_memory_command(
    store: &Mutex<MemoryStore>,
    command: MemoryCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        MemoryCommand::Set { key, value, append } => {
            store
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .set(&key, &value, append)?;
            println!("stored {key}");
            Ok(())
        }
        MemoryCommand::Get { query } => {
            let found = store.lock().unwrap_or_else(|e| e.into_inner()).get(&query);
            println!("{}", found.as_deref().unwrap_or("nothing found"));
            Ok(())
        }
        MemoryCommand::Recall { query, limit } => {
            let hits = store.lock().unwrap_or_else(|e| e.into_inner()).recall(
                &query,
                &RecallOptions {
                    limit,
                    ..Default::default()
                },
            );
            if hits.is_empty() {
                println!("nothing found");
            }
            for hit in hits {
                println!("[{:.2}] {}: {}", hit.similarity, hit.key, hit.content);
            }
            Ok(())
        }
        MemoryCommand::Forget {
            key,
            kind,
            before_ms,
            tags,
        } => {
            let removed = store.lock().unwrap_or_else(|e| e.into_inner()).forget(
                &ForgetCriteria {
                    key,
                    kind,
                    before_ms,
                    tags,
                },
            )?;
            println!("removed {removed}");
            Ok(())
        }
        MemoryCommand::Stats => {
            let stats = store.lock().unwrap_or_else(|e| e.into_inner()).stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}
