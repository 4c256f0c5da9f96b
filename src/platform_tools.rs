//! Discord-facing tools: directory queries, message history, and sends.
//! Channel references arrive as loose text (`@handle`, `#name`, bare guild
//! names) and go through the entity resolver before any API call.

use std::sync::Arc;

use crate::registry::{params_object, ToolDescriptor};
use crate::resolver::{resolve_channel, resolve_dm_channel, resolve_guild};
use crate::tool_args::{bool_arg, list_arg, str_arg, usize_arg};
use crate::{ChatPlatform, DirectoryCache, DirectoryEntry, MessageEntry, MessageFilters, ToolValue};

const DEFAULT_MESSAGE_LIMIT: usize = 20;
const MENTION_SCAN_LIMIT: usize = 100;

/// `@handle` targets a DM channel, anything else a guild channel.
fn resolve_channel_reference(
    name: &str,
    platform: &dyn ChatPlatform,
    cache: &DirectoryCache,
) -> Option<String> {
    if name.trim_start().starts_with('@') {
        resolve_dm_channel(name, platform, cache).map(|m| m.id)
    } else {
        resolve_channel(name, platform, cache).map(|m| m.id)
    }
}

fn render_messages(messages: &[MessageEntry]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let lines: Vec<String> = messages
        .iter()
        .map(|m| format!("{}: {}", m.author, m.content))
        .collect();
    Some(lines.join("\n"))
}

pub(crate) fn tools(
    platform: Arc<dyn ChatPlatform>,
    cache: Arc<DirectoryCache>,
) -> Vec<ToolDescriptor> {
    let mut out = Vec::new();

    {
        let platform = platform.clone();
        let cache = cache.clone();
        out.push(ToolDescriptor {
            name: "get_discord_guilds".to_string(),
            description: "Get an array of guild discord names that the user is in".to_string(),
            parameters: params_object(serde_json::json!({}), &[]),
            handler: Arc::new(move |_args, _input, _calls| {
                let guilds = cache.guilds(platform.as_ref());
                if guilds.is_empty() {
                    return None;
                }
                let names = ToolValue::List(
                    guilds
                        .into_iter()
                        .map(|g| ToolValue::Text(g.name))
                        .collect(),
                );
                Some(names.render())
            }),
        });
    }

    {
        let platform = platform.clone();
        let cache = cache.clone();
        out.push(ToolDescriptor {
            name: "get_discord_guild_channels".to_string(),
            description: "Get the channels of a specific discord guild".to_string(),
            parameters: params_object(
                serde_json::json!({
                    "guild_name": {
                        "type": "string",
                        "description": "The name of the guild",
                    },
                }),
                &["guild_name"],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let guild_name = str_arg(args, "guild_name")?;
                let found = resolve_guild(guild_name, platform.as_ref(), cache.as_ref())?;
                let guild = DirectoryEntry {
                    id: found.id,
                    name: found.display_name,
                };
                let channels = cache.guild_channels(platform.as_ref(), &guild);
                if channels.is_empty() {
                    return None;
                }
                let names = ToolValue::List(
                    channels
                        .into_iter()
                        .map(|c| ToolValue::Text(c.name))
                        .collect(),
                );
                Some(names.render())
            }),
        });
    }

    {
        let platform = platform.clone();
        let cache = cache.clone();
        out.push(ToolDescriptor {
            name: "get_discord_direct_messages".to_string(),
            description: "Get an array of discord direct message channel names".to_string(),
            parameters: params_object(serde_json::json!({}), &[]),
            handler: Arc::new(move |_args, _input, _calls| {
                let channels = cache.dm_channels(platform.as_ref());
                if channels.is_empty() {
                    return None;
                }
                let names = ToolValue::List(
                    channels
                        .into_iter()
                        .map(|c| ToolValue::Text(c.name))
                        .collect(),
                );
                Some(names.render())
            }),
        });
    }

    {
        let platform = platform.clone();
        out.push(ToolDescriptor {
            name: "get_discord_unread_messages".to_string(),
            description: "Get discord unread mentions, ignoring @everyone and @here".to_string(),
            parameters: params_object(serde_json::json!({}), &[]),
            handler: Arc::new(move |_args, _input, _calls| {
                let mentions = match platform.fetch_mentions(MENTION_SCAN_LIMIT) {
                    Ok(mentions) => mentions,
                    Err(e) => {
                        eprintln!("[function: get_discord_unread_messages] {e}");
                        return None;
                    }
                };
                let lines: Vec<String> = mentions
                    .into_iter()
                    .filter(|m| !m.mention_everyone)
                    .map(|m| format!("{}: {}", m.author_name, m.content))
                    .collect();
                if lines.is_empty() {
                    None
                } else {
                    Some(lines.join("\n"))
                }
            }),
        });
    }

    {
        let platform = platform.clone();
        let cache = cache.clone();
        out.push(ToolDescriptor {
            name: "get_discord_messages".to_string(),
            description: "Get discord messages from a specific channel".to_string(),
            parameters: params_object(
                serde_json::json!({
                    "channel_name": {
                        "type": "string",
                        "description": "The name of the channel (starts with @ for DMs, # for guild channels)",
                    },
                    "limit": {
                        "type": "number",
                        "description": "The maximum number of messages to retrieve",
                    },
                    "mentioned": {
                        "type": "boolean",
                        "description": "Whether to filter for messages that mention the user",
                    },
                    "before": {
                        "type": "string",
                        "description": "Get messages before this message ID",
                    },
                    "after": {
                        "type": "string",
                        "description": "Get messages after this message ID",
                    },
                    "has": {
                        "type": "string",
                        "enum": ["link", "embed", "file", "image", "video", "audio"],
                        "description": "Filter messages that have a specific type of content",
                    },
                    "mentions": {
                        "type": "string",
                        "description": "Array of usernames to filter mentions (comma separated)",
                    },
                }),
                &["channel_name", "limit"],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let channel_name = str_arg(args, "channel_name")?;
                let channel_id =
                    resolve_channel_reference(channel_name, platform.as_ref(), cache.as_ref())?;
                let filters = MessageFilters {
                    limit: usize_arg(args, "limit").unwrap_or(DEFAULT_MESSAGE_LIMIT),
                    mentioned: bool_arg(args, "mentioned").unwrap_or(false),
                    before: str_arg(args, "before").map(|s| s.to_string()),
                    after: str_arg(args, "after").map(|s| s.to_string()),
                    has: str_arg(args, "has").map(|s| s.to_string()),
                    mentions: list_arg(args, "mentions"),
                };
                match platform.fetch_messages(&channel_id, &filters) {
                    Ok(messages) => render_messages(&messages),
                    Err(e) => {
                        eprintln!("[function: get_discord_messages] {e}");
                        None
                    }
                }
            }),
        });
    }

    {
        let platform = platform.clone();
        let cache = cache.clone();
        out.push(ToolDescriptor {
            name: "send_discord_message".to_string(),
            description: "Send a message to a specific channel".to_string(),
            parameters: params_object(
                serde_json::json!({
                    "channel_name": {
                        "type": "string",
                        "description": "The name of the channel (starts with @ for DMs, # for guild channels)",
                    },
                    "content": {
                        "type": "string",
                        "description": "The content of the message to send",
                    },
                }),
                &["channel_name", "content"],
            ),
            handler: Arc::new(move |args, _input, _calls| {
                let channel_name = str_arg(args, "channel_name")?;
                let content = str_arg(args, "content")?;
                let Some(channel_id) =
                    resolve_channel_reference(channel_name, platform.as_ref(), cache.as_ref())
                else {
                    return Some("Failed to send message".to_string());
                };
                match platform.send_message(&channel_id, content) {
                    Ok(_) => Some("Sent message successfully".to_string()),
                    Err(e) => {
                        eprintln!("[function: send_discord_message] {e}");
                        Some("Failed to send message".to_string())
                    }
                }
            }),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::StubPlatform;
    use crate::tool_args::ToolArguments;

    fn descriptor_named(
        tools: &[ToolDescriptor],
        name: &str,
    ) -> Option<usize> {
        tools.iter().position(|t| t.name == name)
    }

    fn dm_platform() -> Arc<StubPlatform> {
        Arc::new(StubPlatform {
            dm_channels: vec![DirectoryEntry {
                id: "d1".into(),
                name: "alice".into(),
            }],
            ..Default::default()
        })
    }

    #[test]
    fn send_reports_success_for_known_recipient() {
        let platform = dm_platform();
        let cache = Arc::new(DirectoryCache::new());
        let tools = tools(platform, cache);
        let idx = descriptor_named(&tools, "send_discord_message").unwrap();
        let mut args = ToolArguments::new();
        args.insert("channel_name".into(), "@alice".into());
        args.insert("content".into(), "hi".into());
        let out = (tools[idx].handler)(&args, "", &[]).unwrap();
        assert_eq!(out, "Sent message successfully");
    }

    #[test]
    fn send_reports_failure_when_recipient_is_unresolvable() {
        let platform = dm_platform();
        let cache = Arc::new(DirectoryCache::new());
        let tools = tools(platform, cache);
        let idx = descriptor_named(&tools, "send_discord_message").unwrap();
        let mut args = ToolArguments::new();
        args.insert("channel_name".into(), "@zzzzz_unknown_handle".into());
        args.insert("content".into(), "hi".into());
        let out = (tools[idx].handler)(&args, "", &[]).unwrap();
        assert_eq!(out, "Failed to send message");
    }

    #[test]
    fn guild_listing_renders_names() {
        let platform = Arc::new(StubPlatform {
            guilds: vec![
                DirectoryEntry {
                    id: "1".into(),
                    name: "home".into(),
                },
                DirectoryEntry {
                    id: "2".into(),
                    name: "work".into(),
                },
            ],
            ..Default::default()
        });
        let cache = Arc::new(DirectoryCache::new());
        let tools = tools(platform, cache);
        let idx = descriptor_named(&tools, "get_discord_guilds").unwrap();
        let out = (tools[idx].handler)(&ToolArguments::new(), "", &[]).unwrap();
        assert_eq!(out, "home, work");
    }
}
