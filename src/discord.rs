//! Discord REST client implementing the `ChatPlatform` contract.
//!
//! REST-only: directory listing, message history, mention polling and sends.
//! The gateway websocket is out of scope; the bridge polls instead.

use std::time::Duration;

use crate::{
    env_optional, env_required, ChatPlatform, DirectoryEntry, MemberEntry, MentionEvent,
    MessageEntry, MessageFilters,
};

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const NO_TIMEOUT_MS: u64 = u64::MAX;
const MEMBER_PAGE_LIMIT: usize = 1000;

pub(crate) struct DiscordApi {
    agent: ureq::Agent,
    token: String,
    base_url: String,
    bot_user_id: Option<String>,
}

impl DiscordApi {
    pub(crate) fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let token = env_required("DISCORD_TOKEN")?;
        let base_url = env_optional("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into());
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(NO_TIMEOUT_MS))
            .timeout_read(Duration::from_millis(NO_TIMEOUT_MS))
            .timeout_write(Duration::from_millis(NO_TIMEOUT_MS))
            .build();
        Ok(DiscordApi {
            agent,
            token,
            base_url,
            bot_user_id: env_optional("DISCORD_USER_ID"),
        })
    }

    fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, String> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &self.token)
            .set("Content-Type", "application/json");
        for (name, value) in params {
            request = request.query(name, value);
        }
        let response = request.call().map_err(|e| format!("GET {path}: {e}"));
        response?
            .into_json::<serde_json::Value>()
            .map_err(|e| format!("decode {path}: {e}"))
    }

    fn post_json(&self, path: &str, payload: serde_json::Value) -> Result<serde_json::Value, String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.token)
            .set("Content-Type", "application/json")
            .send_json(payload)
            .map_err(|e| format!("POST {path}: {e}"))?;
        response
            .into_json::<serde_json::Value>()
            .map_err(|e| format!("decode {path}: {e}"))
    }
}

fn str_field(value: &serde_json::Value, name: &str) -> Option<String> {
    value.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn entry_from(value: &serde_json::Value) -> Option<DirectoryEntry> {
    Some(DirectoryEntry {
        id: str_field(value, "id")?,
        name: str_field(value, "name")?,
    })
}

impl ChatPlatform for DiscordApi {
    fn list_guilds(&self) -> Result<Vec<DirectoryEntry>, String> {
        let data = self.get_json("/users/@me/guilds", &[])?;
        let items = data.as_array().ok_or("guilds: expected array")?;
        Ok(items.iter().filter_map(entry_from).collect())
    }

    fn list_channels(&self, guild_id: &str) -> Result<Vec<DirectoryEntry>, String> {
        let data = self.get_json(&format!("/guilds/{guild_id}/channels"), &[])?;
        let items = data.as_array().ok_or("channels: expected array")?;
        Ok(items.iter().filter_map(entry_from).collect())
    }

    fn list_members(&self, guild_id: &str) -> Result<Vec<MemberEntry>, String> {
        let data = self.get_json(
            &format!("/guilds/{guild_id}/members"),
            &[("limit", MEMBER_PAGE_LIMIT.to_string())],
        )?;
        let items = data.as_array().ok_or("members: expected array")?;
        let mut out = Vec::new();
        for item in items {
            let Some(user) = item.get("user") else {
                continue;
            };
            let Some(id) = str_field(user, "id") else {
                continue;
            };
            let Some(username) = str_field(user, "username") else {
                continue;
            };
            out.push(MemberEntry {
                id,
                username,
                display_name: str_field(item, "nick"),
                global_name: str_field(user, "global_name"),
            });
        }
        Ok(out)
    }

    fn list_dm_channels(&self) -> Result<Vec<DirectoryEntry>, String> {
        let data = self.get_json("/users/@me/channels", &[])?;
        let items = data.as_array().ok_or("dm channels: expected array")?;
        let mut out = Vec::new();
        for item in items {
            // Type 1 is a one-on-one DM.
            if item.get("type").and_then(|v| v.as_i64()) != Some(1) {
                continue;
            }
            let Some(id) = str_field(item, "id") else {
                continue;
            };
            let recipient = item
                .get("recipients")
                .and_then(|v| v.as_array())
                .and_then(|r| r.first())
                .and_then(|u| u.get("username"))
                .and_then(|v| v.as_str());
            let Some(name) = recipient else {
                continue;
            };
            out.push(DirectoryEntry {
                id,
                name: name.to_lowercase(),
            });
        }
        Ok(out)
    }

    fn fetch_messages(
        &self,
        channel_id: &str,
        filters: &MessageFilters,
    ) -> Result<Vec<MessageEntry>, String> {
        let mut params: Vec<(&str, String)> = vec![("limit", filters.limit.max(1).to_string())];
        if let Some(before) = &filters.before {
            params.push(("before", before.clone()));
        }
        if let Some(after) = &filters.after {
            params.push(("after", after.clone()));
        }
        if let Some(has) = &filters.has {
            params.push(("has", has.clone()));
        }
        if !filters.mentions.is_empty() {
            params.push(("mentions", filters.mentions.join(",")));
        }
        let data = self.get_json(&format!("/channels/{channel_id}/messages"), &params)?;
        let items = data.as_array().ok_or("messages: expected array")?;
        let mut out = Vec::new();
        for item in items {
            if filters.mentioned {
                let mentions_bot = self.bot_user_id.as_deref().is_some_and(|bot_id| {
                    item.get("mentions")
                        .and_then(|v| v.as_array())
                        .is_some_and(|mentions| {
                            mentions
                                .iter()
                                .any(|m| m.get("id").and_then(|v| v.as_str()) == Some(bot_id))
                        })
                });
                if !mentions_bot {
                    continue;
                }
            }
            let Some(id) = str_field(item, "id") else {
                continue;
            };
            let author = item
                .get("author")
                .and_then(|a| a.get("username"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            out.push(MessageEntry {
                id,
                author,
                content: str_field(item, "content").unwrap_or_default(),
                created_at: str_field(item, "timestamp"),
            });
        }
        Ok(out)
    }

    fn fetch_mentions(&self, limit: usize) -> Result<Vec<MentionEvent>, String> {
        let data = self.get_json(
            "/users/@me/mentions",
            &[("limit", limit.max(1).to_string())],
        )?;
        let items = data.as_array().ok_or("mentions: expected array")?;
        let mut out = Vec::new();
        for item in items {
            let Some(message_id) = str_field(item, "id") else {
                continue;
            };
            let Some(channel_id) = str_field(item, "channel_id") else {
                continue;
            };
            let author = item.get("author");
            out.push(MentionEvent {
                message_id,
                channel_id,
                guild_id: str_field(item, "guild_id"),
                author_id: author.and_then(|a| str_field(a, "id")).unwrap_or_default(),
                author_name: author
                    .and_then(|a| str_field(a, "username"))
                    .unwrap_or_else(|| "unknown".to_string()),
                author_is_bot: author
                    .and_then(|a| a.get("bot"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                content: str_field(item, "content").unwrap_or_default(),
                created_at: str_field(item, "timestamp"),
                mention_everyone: item
                    .get("mention_everyone")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            });
        }
        Ok(out)
    }

    fn send_message(&self, channel_id: &str, content: &str) -> Result<String, String> {
        let payload = serde_json::json!({ "content": content });
        let data = self.post_json(&format!("/channels/{channel_id}/messages"), payload)?;
        str_field(&data, "id").ok_or_else(|| "send: response missing message id".to_string())
    }
}
