//! Social lookups: GitHub profile data and a cross-platform username probe.
//! Upstream failures fold into "nothing" or negative text; they never reach
//! the orchestration loop as errors.

use std::sync::Arc;
use std::time::Duration;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::registry::{params_object, ToolDescriptor};
use crate::tool_args::str_arg;
use crate::{dedup_keep_order, env_optional, ToolValue};

const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const USERNAME_PROBE_API: &str = "https://api.instantusername.com";
const PROBE_TIMEOUT_SECS: u64 = 10;

/// Platform slugs understood by the username probe service.
const SOCIAL_SLUGS: &[&str] = &[
    "instagram",
    "tiktok",
    "x-(twitter)",
    "facebook",
    "youtube",
    "snapchat",
    "medium",
    "reddit",
    "hackernews",
    "soundcloud",
    "spotify",
    "github",
    "gitlab",
    "twitch",
    "dribbble",
    "quora",
    "telegram",
    "slack",
    "wordpress",
    "roblox",
    "strava",
    "wikipedia",
    "artstation",
    "bandcamp",
    "behance",
    "bitbucket",
    "buymeacoffee",
    "codepen",
    "dev-community",
    "deviantart",
    "docker-hub",
    "duolingo",
    "etsy",
    "fiverr",
    "flickr",
    "freelancer",
    "giphy",
    "gravatar",
    "hackerrank",
    "imgur",
    "kaggle",
    "keybase",
    "leetcode",
    "letterboxd",
    "lichess",
    "linktree",
    "mixcloud",
    "monkeytype",
    "myanimelist",
    "npm",
    "pastebin",
    "patreon",
    "pypi",
    "researchgate",
    "rubygems",
    "scratch",
    "slideshare",
    "sourceforge",
    "steamgroup",
    "trello",
    "unsplash",
    "vimeo",
    "vsco",
    "wattpad",
    "chess.com",
    "last.fm",
    "linkedin",
];

fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .timeout_read(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .build()
}

fn github_profile(username: &str) -> Option<String> {
    let base = env_optional("GITHUB_API_BASE").unwrap_or_else(|| DEFAULT_GITHUB_API.to_string());
    let url = format!("{base}/users/{username}");
    let response = http_agent()
        .get(&url)
        .set("User-Agent", "adjutant")
        .set("Accept", "application/vnd.github+json")
        .call();
    let data: serde_json::Value = match response {
        Ok(resp) => match resp.into_json() {
            Ok(data) => data,
            Err(e) => {
                eprintln!("[function: get_github_profile] decode failed: {e}");
                return None;
            }
        },
        Err(e) => {
            eprintln!("[function: get_github_profile] {e}");
            return None;
        }
    };

    let text = |field: &str| {
        data.get(field)
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    };
    let number = |field: &str| data.get(field).and_then(|v| v.as_f64()).unwrap_or(0.0);

    let record = ToolValue::Record(vec![
        ("social".to_string(), ToolValue::Text("github".to_string())),
        ("username".to_string(), ToolValue::Text(text("login"))),
        ("name".to_string(), ToolValue::Text(text("name"))),
        ("location".to_string(), ToolValue::Text(text("location"))),
        ("bio".to_string(), ToolValue::Text(text("bio"))),
        ("company".to_string(), ToolValue::Text(text("company"))),
        ("blog".to_string(), ToolValue::Text(text("blog"))),
        ("followers".to_string(), ToolValue::Number(number("followers"))),
        ("following".to_string(), ToolValue::Number(number("following"))),
        ("repos".to_string(), ToolValue::Number(number("public_repos"))),
        ("gists".to_string(), ToolValue::Number(number("public_gists"))),
        ("created_at".to_string(), ToolValue::Text(text("created_at"))),
    ]);
    Some(record.render())
}

fn probe_usernames(query: &str) -> Option<String> {
    let base = env_optional("USERNAME_PROBE_API")
        .unwrap_or_else(|| USERNAME_PROBE_API.to_string());
    let Ok(base_url) = url::Url::parse(&base) else {
        eprintln!("[function: search_username] bad probe base url: {base}");
        return None;
    };
    let agent = http_agent();

    let taken: Vec<String> = SOCIAL_SLUGS
        .par_iter()
        .filter_map(|slug| {
            let mut probe = base_url.clone();
            probe.set_path(&format!("/c/{slug}/{query}"));
            let data: serde_json::Value = agent.get(probe.as_str()).call().ok()?.into_json().ok()?;
            let available = data.get("available").and_then(|v| v.as_bool()).unwrap_or(true);
            if available {
                return None;
            }
            data.get("url")
                .and_then(|v| v.as_str())
                .filter(|u| !u.is_empty())
                .map(|u| u.to_string())
        })
        .collect();

    let taken = dedup_keep_order(taken);
    if taken.is_empty() {
        return Some(format!(
            "The username {query} was not found on any of the scanned social media platforms."
        ));
    }
    Some(format!(
        "The username {query} is an account on the following social media platforms: {}",
        taken.join(", ")
    ))
}

pub(crate) fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "get_github_profile".to_string(),
            description: "Get a github profile data".to_string(),
            parameters: params_object(
                serde_json::json!({
                    "username": {
                        "type": "string",
                        "description": "The github username",
                    },
                }),
                &["username"],
            ),
            handler: Arc::new(|args, _input, _calls| {
                let username = str_arg(args, "username")?;
                github_profile(username)
            }),
        },
        ToolDescriptor {
            name: "search_username".to_string(),
            description:
                "Search for a username accross all social media platforms on the internet, heavy task."
                    .to_string(),
            parameters: params_object(
                serde_json::json!({
                    "query": {
                        "type": "string",
                        "description": "The query to search for",
                    },
                }),
                &["query"],
            ),
            handler: Arc::new(|args, _input, _calls| {
                let query = str_arg(args, "query")?;
                probe_usernames(query)
            }),
        },
    ]
}
