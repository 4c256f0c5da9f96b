//! Disk-mirrored key/value text store with similarity-ranked retrieval.
//!
//! Every mutating call writes the backing file before touching the in-memory
//! map, so a crash between the two leaves the disk ahead of memory, never
//! behind. This is best effort, not transactional: there is no file locking
//! and concurrent writers to the same key are not coordinated beyond whatever
//! atomicity a single write offers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::similarity::{bigram_similarity, top_terms};
use crate::split_sentences;

const SECTION_SENTENCES: usize = 3;
const SECTION_MIN_SIMILARITY: f64 = 0.5;
const SECTION_LIMIT: usize = 5;
const TOP_TERM_COUNT: usize = 10;
const MEMORY_FILE_EXT: &str = "mem";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MemoryDocument {
    pub(crate) content: String,
    pub(crate) created_at_ms: i64,
    #[serde(default)]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) ttl_ms: Option<i64>,
}

impl MemoryDocument {
    fn expired(&self, now_ms: i64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms > self.created_at_ms + ttl,
            None => false,
        }
    }
}

/// Metadata header written as the first line of each backing file.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentHeader {
    created_at_ms: i64,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    ttl_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SetOptions {
    pub(crate) kind: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) ttl_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecallOptions {
    pub(crate) min_similarity: f64,
    pub(crate) limit: usize,
    pub(crate) kind: Option<String>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        RecallOptions {
            min_similarity: 0.3,
            limit: 5,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ForgetCriteria {
    pub(crate) key: Option<String>,
    pub(crate) kind: Option<String>,
    pub(crate) before_ms: Option<i64>,
    pub(crate) tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RecallHit {
    pub(crate) key: String,
    pub(crate) content: String,
    pub(crate) similarity: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct MemoryStats {
    pub(crate) documents: usize,
    pub(crate) total_len: usize,
    pub(crate) kinds: BTreeMap<String, usize>,
}

pub(crate) struct MemoryStore {
    dir: PathBuf,
    docs: HashMap<String, MemoryDocument>,
    /// Sum of stored content lengths, maintained incrementally on every
    /// mutation rather than recomputed.
    total_len: usize,
}

impl MemoryStore {
    pub(crate) fn open(dir: &Path) -> Result<Self, String> {
        let mut store = MemoryStore {
            dir: dir.to_path_buf(),
            docs: HashMap::new(),
            total_len: 0,
        };
        let loaded = store.load()?;
        if loaded > 0 {
            eprintln!("[memory] loaded {loaded} documents from {}", dir.display());
        }
        Ok(store)
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{MEMORY_FILE_EXT}", urlencoding::encode(key)))
    }

    fn persist(&self, key: &str, doc: &MemoryDocument) -> Result<(), String> {
        let header = DocumentHeader {
            created_at_ms: doc.created_at_ms,
            kind: doc.kind.clone(),
            tags: doc.tags.clone(),
            ttl_ms: doc.ttl_ms,
        };
        let header_line =
            serde_json::to_string(&header).map_err(|e| format!("encode header for '{key}': {e}"))?;
        let body = urlencoding::encode(&doc.content);
        let payload = format!("{header_line}\n{body}\n");
        fs::write(self.file_path(key), payload)
            .map_err(|e| format!("write memory file for '{key}': {e}"))
    }

    /// Replace or append the value under `key`. The backing file is written
    /// before the in-memory map is updated; write failures surface to the
    /// caller and leave the map untouched.
    pub(crate) fn set(&mut self, key: &str, value: &str, append: bool) -> Result<(), String> {
        let now_ms = Utc::now().timestamp_millis();
        let doc = match (append, self.docs.get(key)) {
            (true, Some(existing)) => {
                let mut doc = existing.clone();
                doc.content.push_str(value);
                doc
            }
            _ => MemoryDocument {
                content: value.to_string(),
                created_at_ms: now_ms,
                kind: None,
                tags: Vec::new(),
                ttl_ms: None,
            },
        };
        self.commit(key, doc)
    }

    pub(crate) fn set_with_options(
        &mut self,
        key: &str,
        value: &str,
        opts: SetOptions,
    ) -> Result<(), String> {
        let doc = MemoryDocument {
            content: value.to_string(),
            created_at_ms: Utc::now().timestamp_millis(),
            kind: opts.kind,
            tags: opts.tags,
            ttl_ms: opts.ttl_ms,
        };
        self.commit(key, doc)
    }

    fn commit(&mut self, key: &str, doc: MemoryDocument) -> Result<(), String> {
        self.persist(key, &doc)?;
        let previous_len = self.docs.get(key).map(|d| d.content.len()).unwrap_or(0);
        self.total_len = self.total_len - previous_len + doc.content.len();
        self.docs.insert(key.to_string(), doc);
        Ok(())
    }

    pub(crate) fn document(&self, key: &str) -> Option<&MemoryDocument> {
        self.docs.get(key)
    }

    fn live_docs(&self, now_ms: i64) -> impl Iterator<Item = (&String, &MemoryDocument)> {
        self.docs.iter().filter(move |(_, doc)| !doc.expired(now_ms))
    }

    /// Similarity-ranked contextual retrieval. Rebuilds its term-frequency
    /// view over all live documents on every call; nothing is indexed across
    /// calls. Returns the top sections joined by newlines, or None when no
    /// section clears the similarity floor.
    pub(crate) fn get(&self, query: &str) -> Option<String> {
        let now_ms = Utc::now().timestamp_millis();
        let query_lower = query.trim().to_lowercase();
        let query_terms = top_terms(query, TOP_TERM_COUNT).join(" ");
        if query_terms.is_empty() && query_lower.is_empty() {
            return None;
        }

        let mut scored: Vec<(f64, String)> = Vec::new();
        for (key, doc) in self.live_docs(now_ms) {
            let text = format!("{key}: {}", doc.content);
            let sentences = split_sentences(&text);
            for group in sentences.chunks(SECTION_SENTENCES) {
                let section = group.join(" ");
                let section_terms = top_terms(&section, TOP_TERM_COUNT).join(" ");
                let mut similarity = bigram_similarity(&query_terms, &section_terms);
                // Verbatim phrase hits outrank term overlap.
                if !query_lower.is_empty() && section.to_lowercase().contains(&query_lower) {
                    similarity = (similarity + 0.5).min(1.0);
                }
                if similarity >= SECTION_MIN_SIMILARITY {
                    scored.push((similarity, section));
                }
            }
        }

        if scored.is_empty() {
            return None;
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let sections: Vec<String> = scored
            .into_iter()
            .take(SECTION_LIMIT)
            .map(|(_, section)| section)
            .collect();
        Some(sections.join("\n"))
    }

    /// Whole-document recall scored directly against the query text.
    pub(crate) fn recall(&self, query: &str, opts: &RecallOptions) -> Vec<RecallHit> {
        let now_ms = Utc::now().timestamp_millis();
        let mut hits: Vec<RecallHit> = Vec::new();
        for (key, doc) in self.live_docs(now_ms) {
            if let Some(kind) = &opts.kind {
                if doc.kind.as_deref() != Some(kind.as_str()) {
                    continue;
                }
            }
            let similarity = bigram_similarity(query, &doc.content);
            if similarity >= opts.min_similarity {
                hits.push(RecallHit {
                    key: key.clone(),
                    content: doc.content.clone(),
                    similarity,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(opts.limit);
        hits
    }

    /// Remove documents matching any of the criteria. Returns how many were
    /// removed.
    pub(crate) fn forget(&mut self, criteria: &ForgetCriteria) -> Result<usize, String> {
        let keys: Vec<String> = self
            .docs
            .iter()
            .filter(|(key, doc)| {
                if criteria.key.as_deref() == Some(key.as_str()) {
                    return true;
                }
                if let Some(kind) = &criteria.kind {
                    if doc.kind.as_deref() == Some(kind.as_str()) {
                        return true;
                    }
                }
                if let Some(before) = criteria.before_ms {
                    if doc.created_at_ms < before {
                        return true;
                    }
                }
                criteria.tags.iter().any(|tag| doc.tags.contains(tag))
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            match fs::remove_file(self.file_path(key)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(format!("remove memory file for '{key}': {e}")),
            }
            if let Some(doc) = self.docs.remove(key) {
                self.total_len -= doc.content.len();
            }
        }
        Ok(keys.len())
    }

    /// Startup-only: read every backing file into the in-memory map,
    /// decoding the encoding applied at write time.
    pub(crate) fn load(&mut self) -> Result<usize, String> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| format!("create memory dir {}: {e}", self.dir.display()))?;
        self.docs.clear();
        self.total_len = 0;

        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MEMORY_FILE_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = match urlencoding::decode(stem) {
                Ok(key) => key.into_owned(),
                Err(_) => {
                    eprintln!("[memory] skipping undecodable file name: {}", path.display());
                    continue;
                }
            };
            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("[memory] skipping unreadable file {}: {e}", path.display());
                    continue;
                }
            };
            let mut lines = raw.lines();
            let Some(header_line) = lines.next() else {
                continue;
            };
            let header: DocumentHeader = match serde_json::from_str(header_line) {
                Ok(header) => header,
                Err(e) => {
                    eprintln!("[memory] skipping corrupt header in {}: {e}", path.display());
                    continue;
                }
            };
            let body = lines.next().unwrap_or_default();
            let content = match urlencoding::decode(body) {
                Ok(content) => content.into_owned(),
                Err(_) => {
                    eprintln!("[memory] skipping undecodable body in {}", path.display());
                    continue;
                }
            };
            self.total_len += content.len();
            self.docs.insert(
                key,
                MemoryDocument {
                    content,
                    created_at_ms: header.created_at_ms,
                    kind: header.kind,
                    tags: header.tags,
                    ttl_ms: header.ttl_ms,
                },
            );
        }
        Ok(self.docs.len())
    }

    pub(crate) fn stats(&self) -> MemoryStats {
        let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
        for doc in self.docs.values() {
            let kind = doc.kind.clone().unwrap_or_else(|| "untyped".to_string());
            *kinds.entry(kind).or_insert(0) += 1;
        }
        MemoryStats {
            documents: self.docs.len(),
            total_len: self.total_len,
            kinds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scratch_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn set_then_get_returns_stored_value() {
        let (_dir, mut store) = scratch_store();
        store
            .set("lissa", "Lissa is a sound engineer from Porto.", false)
            .unwrap();
        let found = store.get("Who is lissa the sound engineer?").unwrap();
        assert!(found.contains("sound engineer"));
    }

    #[test]
    fn get_matches_verbatim_values() {
        let (_dir, mut store) = scratch_store();
        store.set("k", "v", false).unwrap();
        let found = store.get("v").unwrap();
        assert!(found.contains('v'));
    }

    #[test]
    fn append_concatenates() {
        let (_dir, mut store) = scratch_store();
        store.set("k", "v", false).unwrap();
        store.set("k", "w", true).unwrap();
        assert_eq!(store.document("k").unwrap().content, "vw");
    }

    #[test]
    fn replace_resets_content() {
        let (_dir, mut store) = scratch_store();
        store.set("k", "first", false).unwrap();
        store.set("k", "second", false).unwrap();
        assert_eq!(store.document("k").unwrap().content, "second");
    }

    #[test]
    fn total_len_tracks_mutations() {
        let (_dir, mut store) = scratch_store();
        store.set("a", "12345", false).unwrap();
        store.set("b", "123", false).unwrap();
        store.set("a", "67", true).unwrap();
        assert_eq!(store.stats().total_len, 10);
        store
            .forget(&ForgetCriteria {
                key: Some("b".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.stats().total_len, 7);
    }

    #[test]
    fn expired_documents_are_invisible_to_get() {
        let (_dir, mut store) = scratch_store();
        store
            .set("stale", "The launch code meeting is at noon today.", false)
            .unwrap();
        let doc = store.docs.get_mut("stale").unwrap();
        doc.created_at_ms = Utc::now().timestamp_millis() - 10_000;
        doc.ttl_ms = Some(5_000);
        assert!(store.get("launch code meeting noon").is_none());
    }

    #[test]
    fn unexpired_ttl_documents_are_visible() {
        let (_dir, mut store) = scratch_store();
        store
            .set_with_options(
                "fresh",
                "The launch code meeting is at noon today.",
                SetOptions {
                    ttl_ms: Some(60_000),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.get("launch code meeting noon").is_some());
    }

    #[test]
    fn get_returns_none_for_unrelated_query() {
        let (_dir, mut store) = scratch_store();
        store.set("k", "Completely unrelated text about gardening.", false).unwrap();
        assert!(store.get("quantum chromodynamics flux").is_none());
    }

    #[test]
    fn forget_by_kind_and_tag() {
        let (_dir, mut store) = scratch_store();
        store
            .set_with_options(
                "a",
                "one",
                SetOptions {
                    kind: Some("conversation".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .set_with_options(
                "b",
                "two",
                SetOptions {
                    tags: vec!["discord".to_string()],
                    ..Default::default()
                },
            )
            .unwrap();
        store.set("c", "three", false).unwrap();

        let removed = store
            .forget(&ForgetCriteria {
                kind: Some("conversation".to_string()),
                tags: vec!["discord".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.document("a").is_none());
        assert!(store.document("b").is_none());
        assert!(store.document("c").is_some());
    }

    #[test]
    fn forget_by_created_before() {
        let (_dir, mut store) = scratch_store();
        store.set("old", "ancient", false).unwrap();
        store.docs.get_mut("old").unwrap().created_at_ms = 1_000;
        store.set("new", "recent", false).unwrap();
        let removed = store
            .forget(&ForgetCriteria {
                before_ms: Some(2_000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.document("new").is_some());
    }

    #[test]
    fn disk_mirror_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = MemoryStore::open(dir.path()).unwrap();
            store
                .set_with_options(
                    "user:42",
                    "prefers dark mode & tabs",
                    SetOptions {
                        kind: Some("preference".to_string()),
                        tags: vec!["settings".to_string()],
                        ttl_ms: None,
                    },
                )
                .unwrap();
        }
        let store = MemoryStore::open(dir.path()).unwrap();
        let doc = store.document("user:42").unwrap();
        assert_eq!(doc.content, "prefers dark mode & tabs");
        assert_eq!(doc.kind.as_deref(), Some("preference"));
        assert_eq!(doc.tags, vec!["settings".to_string()]);
        assert_eq!(store.stats().total_len, doc.content.len());
    }

    #[test]
    fn recall_filters_by_kind_and_threshold() {
        let (_dir, mut store) = scratch_store();
        store
            .set_with_options(
                "m1",
                "the deploy failed on friday evening",
                SetOptions {
                    kind: Some("conversation".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .set_with_options(
                "m2",
                "the deploy failed on friday evening",
                SetOptions {
                    kind: Some("preference".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let hits = store.recall(
            "deploy failed friday",
            &RecallOptions {
                kind: Some("conversation".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "m1");
    }
}
