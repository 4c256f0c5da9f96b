//! Discord bridge: polls for mentions of the bot, runs each through the
//! request pipeline on its own thread, and replies in the originating
//! channel. Both sides of every exchange are appended to conversation
//! memory and to a plain-text `references` log with a reversible encoding.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;

use crate::orchestrator::{process_request, Assistant, FALLBACK_REPLY};
use crate::{
    env_optional, env_required, env_u64, truncate_chars, AssistantConfig, ChatPlatform,
    DirectoryCache, MemberEntry, MentionEvent, RequestContext,
};

const DEFAULT_POLL_SECS: u64 = 5;
const DEFAULT_MENTION_LIMIT: usize = 50;
const DEFAULT_MAX_INPUT_CHARS: usize = 400;
const LENGTH_REFUSAL: &str =
    "Sorry, I can't process that much text at once. Please keep it under 400 characters.";

/// Replace raw `<@id>` / `<@!id>` mention markup with `@username` so the
/// model sees readable handles.
pub(crate) fn normalize_mentions(content: &str, members: &[MemberEntry]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let after = after.strip_prefix('!').unwrap_or(after);
        let id_len = after.chars().take_while(|c| c.is_ascii_digit()).count();
        let closes = after[id_len..].starts_with('>');
        if id_len == 0 || !closes {
            out.push_str("<@");
            rest = &rest[start + 2..];
            continue;
        }
        let id = &after[..id_len];
        let username = members
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.username.as_str())
            .unwrap_or("Unknown User");
        out.push('@');
        out.push_str(username);
        rest = &after[id_len + 1..];
    }
    out.push_str(rest);
    out
}

pub(crate) fn references_path(workspace: &Path) -> PathBuf {
    workspace.join("references")
}

/// Seed conversation memory from the references log: one `key:value` line
/// per turn, the value URL-encoded at write time.
pub(crate) fn load_references(
    memory: &Mutex<crate::MemoryStore>,
    path: &Path,
) -> usize {
    let Ok(raw) = fs::read_to_string(path) else {
        return 0;
    };
    let mut loaded = 0usize;
    let mut store = memory.lock().unwrap_or_else(|e| e.into_inner());
    for line in raw.lines() {
        let Some((key, encoded)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = urlencoding::decode(encoded) else {
            continue;
        };
        let mut value = value.into_owned();
        value.push('\n');
        if let Err(e) = store.set(key, &value, true) {
            eprintln!("[bridge] failed to replay reference for '{key}': {e}");
            continue;
        }
        loaded += 1;
    }
    loaded
}

pub(crate) fn append_reference(path: &Path, author: &str, content: &str) {
    let line = format!("{author}:{}\n", urlencoding::encode(content));
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = result {
        eprintln!("[bridge] failed to append reference: {e}");
    }
}

fn format_timestamp() -> String {
    Utc::now().format("%d/%m/%Y %I:%M:%S %p UTC").to_string()
}

fn context_for(
    event: &MentionEvent,
    platform: &dyn ChatPlatform,
    cache: &DirectoryCache,
) -> RequestContext {
    let (guild_name, channel_name) = match &event.guild_id {
        Some(guild_id) => {
            let guild = cache
                .guilds(platform)
                .into_iter()
                .find(|g| &g.id == guild_id);
            let channel = guild.as_ref().and_then(|g| {
                cache
                    .guild_channels(platform, g)
                    .into_iter()
                    .find(|c| c.id == event.channel_id)
            });
            (
                guild.map(|g| g.name).unwrap_or_else(|| "DM".to_string()),
                channel.map(|c| c.name).unwrap_or_else(|| "DM".to_string()),
            )
        }
        None => ("DM".to_string(), "DM".to_string()),
    };
    RequestContext {
        sender: event.author_name.clone(),
        sender_id: event.author_id.clone(),
        channel: channel_name,
        channel_id: event.channel_id.clone(),
        guild: guild_name,
        member_count: None,
        message_created_at: event
            .created_at
            .clone()
            .unwrap_or_else(|| "N/A".to_string()),
        current_time: format_timestamp(),
    }
}

struct TurnLog {
    references: PathBuf,
    /// Content hashes already appended this process lifetime; mention polls
    /// overlap, so the same turn can surface twice.
    seen: Mutex<HashSet<String>>,
}

impl TurnLog {
    fn record(&self, memory: &Mutex<crate::MemoryStore>, author: &str, content: &str) {
        let hash = blake3::hash(format!("{author}:{content}").as_bytes())
            .to_hex()
            .to_string();
        {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            if !seen.insert(hash) {
                return;
            }
        }
        let mut line = content.to_string();
        line.push('\n');
        {
            let mut store = memory.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = store.set(author, &line, true) {
                eprintln!("[bridge] failed to store turn for '{author}': {e}");
            }
        }
        append_reference(&self.references, author, content);
    }
}

/// Run the polling loop. Only startup problems return an error; everything
/// after that degrades and continues.
pub(crate) fn run_bridge(
    assistant: Arc<Assistant>,
    platform: Arc<dyn ChatPlatform>,
    cache: Arc<DirectoryCache>,
    workspace: &Path,
    config: &AssistantConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let bot_user_id = env_required("DISCORD_USER_ID")?;
    let bot_name = env_optional("DISCORD_BOT_NAME").unwrap_or_else(|| "adjutant".to_string());
    let poll_secs = env_u64(
        "ADJUTANT_POLL_SECS",
        config.poll_interval_secs.unwrap_or(DEFAULT_POLL_SECS),
    )?;
    let mention_limit = config.mention_limit.unwrap_or(DEFAULT_MENTION_LIMIT);
    let max_input_chars = config.max_input_chars.unwrap_or(DEFAULT_MAX_INPUT_CHARS);

    fs::create_dir_all(workspace)?;
    let references = references_path(workspace);
    let replayed = load_references(&assistant.memory, &references);
    if replayed > 0 {
        eprintln!("[bridge] replayed {replayed} reference lines into memory");
    }

    let turn_log = Arc::new(TurnLog {
        references,
        seen: Mutex::new(HashSet::new()),
    });

    // The first poll only seeds the processed set, so a restart does not
    // replay the mention backlog.
    let mut processed: HashSet<String> = HashSet::new();
    match platform.fetch_mentions(mention_limit) {
        Ok(mentions) => {
            for m in mentions {
                processed.insert(m.message_id);
            }
        }
        Err(e) => eprintln!("[bridge] initial mention scan failed: {e}"),
    }
    eprintln!("[bridge] polling every {poll_secs}s as user {bot_user_id}");

    loop {
        thread::sleep(Duration::from_secs(poll_secs));
        let mentions = match platform.fetch_mentions(mention_limit) {
            Ok(mentions) => mentions,
            Err(e) => {
                eprintln!("[bridge] mention poll failed: {e}");
                continue;
            }
        };
        for event in mentions {
            if !processed.insert(event.message_id.clone()) {
                continue;
            }
            if event.author_is_bot || event.author_id == bot_user_id || event.mention_everyone {
                continue;
            }

            let assistant = assistant.clone();
            let platform = platform.clone();
            let cache = cache.clone();
            let turn_log = turn_log.clone();
            let bot_name = bot_name.clone();
            thread::spawn(move || {
                handle_mention(
                    &assistant,
                    platform.as_ref(),
                    &cache,
                    &turn_log,
                    &bot_name,
                    max_input_chars,
                    event,
                );
            });
        }
    }
}

fn handle_mention(
    assistant: &Assistant,
    platform: &dyn ChatPlatform,
    cache: &DirectoryCache,
    turn_log: &TurnLog,
    bot_name: &str,
    max_input_chars: usize,
    event: MentionEvent,
) {
    let members = match &event.guild_id {
        Some(guild_id) => cache.guild_members(platform, guild_id),
        None => Vec::new(),
    };
    let content = normalize_mentions(event.content.trim(), &members);
    if content.is_empty() {
        return;
    }
    if content.chars().count() > max_input_chars {
        if let Err(e) = platform.send_message(&event.channel_id, LENGTH_REFUSAL) {
            eprintln!("[bridge] refusal send failed: {e}");
        }
        return;
    }

    let context = context_for(&event, platform, cache);
    let answer = process_request(assistant, &content, Some(&context));
    let reply = answer.as_deref().unwrap_or(FALLBACK_REPLY);
    eprintln!(
        "[bridge] replying to {}: {}",
        event.author_name,
        truncate_chars(reply, 80)
    );

    turn_log.record(&assistant.memory, &event.author_name, &content);
    if answer.is_some() {
        turn_log.record(&assistant.memory, bot_name, reply);
    }

    if let Err(e) = platform.send_message(&event.channel_id, reply) {
        eprintln!("[bridge] reply send failed: {e}");
    }
}
