use std::collections::HashMap;
use std::sync::Mutex;

use crate::{DirectoryEntry, MemberEntry, MentionEvent, MessageEntry, MessageFilters};

/// Collaborator contract for the chat platform: directory access plus the
/// message transport. Implementations may fail; callers treat a failure as
/// an empty result.
pub(crate) trait ChatPlatform: Send + Sync {
    fn list_guilds(&self) -> Result<Vec<DirectoryEntry>, String>;
    fn list_channels(&self, guild_id: &str) -> Result<Vec<DirectoryEntry>, String>;
    fn list_members(&self, guild_id: &str) -> Result<Vec<MemberEntry>, String>;
    /// Direct-message channels as (channel id, recipient username) pairs.
    fn list_dm_channels(&self) -> Result<Vec<DirectoryEntry>, String>;
    fn fetch_messages(
        &self,
        channel_id: &str,
        filters: &MessageFilters,
    ) -> Result<Vec<MessageEntry>, String>;
    fn fetch_mentions(&self, limit: usize) -> Result<Vec<MentionEvent>, String>;
    /// Returns the sent message id.
    fn send_message(&self, channel_id: &str, content: &str) -> Result<String, String>;
}

/// Read-through cache over the platform's entity graph.
///
/// Contract: an entry, once populated, is never invalidated within the
/// process lifetime; staleness is the accepted cost of fewer upstream
/// calls, and a restart is the only refresh. Two concurrent misses on the
/// same key both hit the upstream and the second write wins; there is no
/// single-flight deduplication.
#[derive(Default)]
pub(crate) struct DirectoryCache {
    entries: Mutex<HashMap<String, Vec<DirectoryEntry>>>,
    members: Mutex<HashMap<String, Vec<MemberEntry>>>,
}

impl DirectoryCache {
    pub(crate) fn new() -> Self {
        DirectoryCache::default()
    }

    fn entries_or_fetch<F>(&self, key: &str, fetch: F) -> Vec<DirectoryEntry>
    where
        F: FnOnce() -> Result<Vec<DirectoryEntry>, String>,
    {
        {
            let cached = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cached.get(key) {
                return hit.clone();
            }
        }
        // Fetch outside the lock; a concurrent miss may duplicate this call.
        eprintln!("[cache: {key}] populating");
        let fetched = fetch().unwrap_or_else(|e| {
            eprintln!("[cache: {key}] fetch failed: {e}");
            Vec::new()
        });
        let mut cached = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        cached.insert(key.to_string(), fetched.clone());
        fetched
    }

    pub(crate) fn guilds(&self, platform: &dyn ChatPlatform) -> Vec<DirectoryEntry> {
        self.entries_or_fetch("guilds", || platform.list_guilds())
    }

    pub(crate) fn guild_channels(
        &self,
        platform: &dyn ChatPlatform,
        guild: &DirectoryEntry,
    ) -> Vec<DirectoryEntry> {
        let key = format!("guild_channels_{}", guild.name);
        self.entries_or_fetch(&key, || platform.list_channels(&guild.id))
    }

    pub(crate) fn dm_channels(&self, platform: &dyn ChatPlatform) -> Vec<DirectoryEntry> {
        self.entries_or_fetch("dm_channels", || platform.list_dm_channels())
    }

    pub(crate) fn guild_members(
        &self,
        platform: &dyn ChatPlatform,
        guild_id: &str,
    ) -> Vec<MemberEntry> {
        let key = format!("guild_members_{guild_id}");
        {
            let cached = self.members.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cached.get(&key) {
                return hit.clone();
            }
        }
        eprintln!("[cache: {key}] populating");
        let fetched = platform.list_members(guild_id).unwrap_or_else(|e| {
            eprintln!("[cache: {key}] fetch failed: {e}");
            Vec::new()
        });
        let mut cached = self.members.lock().unwrap_or_else(|e| e.into_inner());
        cached.insert(key, fetched.clone());
        fetched
    }

    /// Every member across every cached guild, for mention normalization.
    pub(crate) fn all_members(&self, platform: &dyn ChatPlatform) -> Vec<MemberEntry> {
        let mut out = Vec::new();
        for guild in self.guilds(platform) {
            out.extend(self.guild_members(platform, &guild.id));
        }
        out
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubPlatform;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn cache_populates_once_per_key() {
        let platform = StubPlatform {
            guilds: vec![DirectoryEntry {
                id: "1".into(),
                name: "home".into(),
            }],
            ..Default::default()
        };
        let cache = DirectoryCache::new();
        assert_eq!(cache.guilds(&platform).len(), 1);
        assert_eq!(cache.guilds(&platform).len(), 1);
        assert_eq!(platform.guild_fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_fetch_is_cached_as_empty() {
        struct FailingPlatform;
        impl ChatPlatform for FailingPlatform {
            fn list_guilds(&self) -> Result<Vec<DirectoryEntry>, String> {
                Err("upstream down".to_string())
            }
            fn list_channels(&self, _: &str) -> Result<Vec<DirectoryEntry>, String> {
                Err("upstream down".to_string())
            }
            fn list_members(&self, _: &str) -> Result<Vec<MemberEntry>, String> {
                Err("upstream down".to_string())
            }
            fn list_dm_channels(&self) -> Result<Vec<DirectoryEntry>, String> {
                Err("upstream down".to_string())
            }
            fn fetch_messages(
                &self,
                _: &str,
                _: &MessageFilters,
            ) -> Result<Vec<MessageEntry>, String> {
                Err("upstream down".to_string())
            }
            fn fetch_mentions(&self, _: usize) -> Result<Vec<MentionEvent>, String> {
                Err("upstream down".to_string())
            }
            fn send_message(&self, _: &str, _: &str) -> Result<String, String> {
                Err("upstream down".to_string())
            }
        }
        let cache = DirectoryCache::new();
        assert!(cache.guilds(&FailingPlatform).is_empty());
        assert!(cache.guilds(&FailingPlatform).is_empty());
    }

    #[test]
    fn separate_caches_fetch_independently() {
        let platform = StubPlatform {
            guilds: vec![DirectoryEntry {
                id: "1".into(),
                name: "home".into(),
            }],
            ..Default::default()
        };
        DirectoryCache::new().guilds(&platform);
        DirectoryCache::new().guilds(&platform);
        assert_eq!(platform.guild_fetches.load(Ordering::SeqCst), 2);
    }
}
