//! Exact-then-fuzzy resolution of loose references (`@handle`, `#channel`,
//! bare guild names) against the cached platform directory.
//!
//! This is a heuristic, not an index: acceptance is a fixed confidence
//! threshold, and when no structural match exists the best Jaro-Winkler
//! score wins. Equal scores break deterministically toward the lowest id.

use crate::similarity::jaro_winkler;
use crate::{ChatPlatform, DirectoryCache, MemberEntry, ResolvedEntityMatch};

pub(crate) const SIMILARITY_TOLERANCE: f64 = 0.7;

/// Acceptance compares the score rounded to one decimal place against the
/// tolerance, so 0.65 resolves and 0.64 does not.
fn accepts(score: f64) -> bool {
    (score * 10.0).round() / 10.0 >= SIMILARITY_TOLERANCE
}

pub(crate) fn normalize_handle(handle: &str) -> String {
    handle
        .trim()
        .trim_start_matches(['@', '#'])
        .to_lowercase()
}

struct NameCandidate {
    id: String,
    display: String,
    variants: Vec<String>,
}

/// Structural tolerance ladder: exact, prefix, suffix, substring.
/// Returns the first level at which any variant matches.
fn structural_level(handle: &str, variants: &[String]) -> Option<u8> {
    let tolerances: [fn(&str, &str) -> bool; 4] = [
        |v, h| v == h,
        |v, h| v.starts_with(h),
        |v, h| v.ends_with(h),
        |v, h| v.contains(h),
    ];
    for (level, test) in tolerances.iter().enumerate() {
        if variants.iter().any(|v| test(v, handle)) {
            return Some(level as u8);
        }
    }
    None
}

fn best_match(handle: &str, mut candidates: Vec<NameCandidate>) -> Option<ResolvedEntityMatch> {
    let handle = normalize_handle(handle);
    if handle.is_empty() || candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| a.id.cmp(&b.id));

    // Structural pass: the first candidate matching at the tightest
    // tolerance level wins outright, no scoring needed.
    let mut structural: Option<(u8, &NameCandidate)> = None;
    for candidate in &candidates {
        if let Some(level) = structural_level(&handle, &candidate.variants) {
            let better = match structural {
                Some((best_level, _)) => level < best_level,
                None => true,
            };
            if better {
                structural = Some((level, candidate));
                if level == 0 {
                    break;
                }
            }
        }
    }
    if let Some((_, candidate)) = structural {
        let score = candidate
            .variants
            .iter()
            .map(|v| jaro_winkler(&handle, v))
            .fold(0.0f64, f64::max);
        return Some(ResolvedEntityMatch {
            id: candidate.id.clone(),
            display_name: candidate.display.clone(),
            score,
        });
    }

    // Fuzzy pass: per-candidate max over variants, global maximum wins.
    let mut best: Option<(f64, &NameCandidate)> = None;
    for candidate in &candidates {
        let score = candidate
            .variants
            .iter()
            .map(|v| jaro_winkler(&handle, v))
            .fold(0.0f64, f64::max);
        let better = match best {
            Some((best_score, _)) => score > best_score,
            None => true,
        };
        if better {
            best = Some((score, candidate));
        }
    }
    let (score, candidate) = best?;
    if !accepts(score) {
        return None;
    }
    Some(ResolvedEntityMatch {
        id: candidate.id.clone(),
        display_name: candidate.display.clone(),
        score,
    })
}

/// Resolve a `@handle` against guild members, checking every known name
/// variant (username, server nickname, global name).
pub(crate) fn resolve_member(
    handle: &str,
    members: &[MemberEntry],
) -> Option<ResolvedEntityMatch> {
    let candidates = members
        .iter()
        .map(|member| NameCandidate {
            id: member.id.clone(),
            display: member.username.clone(),
            variants: member
                .name_variants()
                .into_iter()
                .map(|v| v.to_lowercase())
                .collect(),
        })
        .collect();
    best_match(handle, candidates)
}

/// Resolve a `@handle` to a direct-message channel id.
pub(crate) fn resolve_dm_channel(
    handle: &str,
    platform: &dyn ChatPlatform,
    cache: &DirectoryCache,
) -> Option<ResolvedEntityMatch> {
    let candidates = cache
        .dm_channels(platform)
        .into_iter()
        .map(|entry| NameCandidate {
            display: entry.name.to_lowercase(),
            variants: vec![entry.name.to_lowercase()],
            id: entry.id,
        })
        .collect();
    best_match(handle, candidates)
}

/// Resolve a `#name` to a channel id by scoring every channel of every
/// guild the caller can see; the single best score across all guilds wins.
pub(crate) fn resolve_channel(
    name: &str,
    platform: &dyn ChatPlatform,
    cache: &DirectoryCache,
) -> Option<ResolvedEntityMatch> {
    let handle = normalize_handle(name);
    if handle.is_empty() {
        return None;
    }
    let mut best: Option<ResolvedEntityMatch> = None;
    for guild in cache.guilds(platform) {
        let mut channels = cache.guild_channels(platform, &guild);
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        for channel in channels {
            let score = jaro_winkler(&handle, &channel.name.to_lowercase());
            let better = match &best {
                Some(current) => score > current.score,
                None => true,
            };
            if better {
                best = Some(ResolvedEntityMatch {
                    id: channel.id,
                    display_name: channel.name,
                    score,
                });
            }
        }
    }
    best.filter(|m| accepts(m.score))
}

/// Resolve a bare guild name.
pub(crate) fn resolve_guild(
    name: &str,
    platform: &dyn ChatPlatform,
    cache: &DirectoryCache,
) -> Option<ResolvedEntityMatch> {
    let candidates = cache
        .guilds(platform)
        .into_iter()
        .map(|entry| NameCandidate {
            display: entry.name.clone(),
            variants: vec![entry.name.to_lowercase()],
            id: entry.id,
        })
        .collect();
    best_match(name, candidates)
}
