use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const MAX_ROBOTS_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsVerdict {
    Allowed,
    Disallowed,
}

struct CacheEntry {
    groups: HashMap<String, Group>,
    expires_at: Instant,
}

#[derive(Default)]
struct Group {
    allow: Vec<String>,
    disallow: Vec<String>,
}

/// Per-origin robots.txt cache (§4.5). Any fetch or parse failure soft-fails
/// to "allow" rather than blocking the crawl — robots.txt unavailability is
/// the host's problem, not a reason to stall.
pub struct RobotsCache {
    entries: DashMap<String, CacheEntry>,
    user_agent: String,
}

impl RobotsCache {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            entries: DashMap::new(),
            user_agent: user_agent.into(),
        }
    }

    pub async fn is_allowed(&self, client: &Client, url: &Url) -> RobotsVerdict {
        let origin = origin_key(url);

        if let Some(entry) = self.entries.get(&origin) {
            if entry.expires_at > Instant::now() {
                return evaluate(&entry.groups, url.path(), &self.user_agent);
            }
        }

        let groups = match fetch_and_parse(client, url).await {
            Ok(groups) => groups,
            Err(e) => {
                debug!(%origin, error = %e, "robots.txt unavailable, allowing");
                HashMap::new()
            }
        };

        let verdict = evaluate(&groups, url.path(), &self.user_agent);
        self.entries.insert(
            origin,
            CacheEntry {
                groups,
                expires_at: Instant::now() + CACHE_TTL,
            },
        );
        verdict
    }
}

fn origin_key(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(p) => format!("{scheme}://{host}:{p}"),
        None => format!("{scheme}://{host}"),
    }
}

async fn fetch_and_parse(client: &Client, url: &Url) -> Result<HashMap<String, Group>, String> {
    let robots_url = url
        .join("/robots.txt")
        .map_err(|e| format!("cannot build robots.txt URL: {e}"))?;

    let response = client
        .get(robots_url)
        .send()
        .await
        .map_err(|e| format!("fetch failed: {e}"))?;

    if !response.status().is_success() {
        warn!(status = %response.status(), "robots.txt fetch non-2xx, allowing all");
        return Ok(HashMap::new());
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("body read failed: {e}"))?;
    let truncated = if bytes.len() > MAX_ROBOTS_BYTES {
        &bytes[..MAX_ROBOTS_BYTES]
    } else {
        &bytes[..]
    };
    let text = String::from_utf8_lossy(truncated);

    Ok(parse(&text))
}

fn parse(content: &str) -> HashMap<String, Group> {
    let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);
    let mut groups: HashMap<String, Group> = HashMap::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut in_group = false;

    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                if in_group {
                    current_agents.clear();
                    in_group = false;
                }
                current_agents.push(value.to_ascii_lowercase());
            }
            "allow" => {
                in_group = true;
                for agent in &current_agents {
                    groups.entry(agent.clone()).or_default().allow.push(value.to_string());
                }
            }
            "disallow" => {
                in_group = true;
                for agent in &current_agents {
                    groups
                        .entry(agent.clone())
                        .or_default()
                        .disallow
                        .push(value.to_string());
                }
            }
            _ => {}
        }
    }

    groups
}

fn evaluate(groups: &HashMap<String, Group>, path: &str, user_agent: &str) -> RobotsVerdict {
    let Some(group) = find_group(groups, user_agent) else {
        return RobotsVerdict::Allowed;
    };
    if is_disallowed(group, path) {
        RobotsVerdict::Disallowed
    } else {
        RobotsVerdict::Allowed
    }
}

fn find_group<'a>(groups: &'a HashMap<String, Group>, user_agent: &str) -> Option<&'a Group> {
    let ua_lower = user_agent.to_ascii_lowercase();
    let mut best: Option<(&str, &Group)> = None;
    let mut best_len = 0usize;

    for (group_ua, group) in groups {
        if group_ua == "*" {
            continue;
        }
        if ua_lower.contains(group_ua.as_str()) && group_ua.len() > best_len {
            best = Some((group_ua, group));
            best_len = group_ua.len();
        }
    }

    if let Some((_, group)) = best {
        return Some(group);
    }
    groups.get("*")
}

fn is_disallowed(group: &Group, path: &str) -> bool {
    let mut disallow_match: Option<usize> = None;
    for rule in &group.disallow {
        if rule.is_empty() {
            continue;
        }
        if path_matches(path, rule) {
            let len = effective_length(rule);
            if disallow_match.map_or(true, |best| len > best) {
                disallow_match = Some(len);
            }
        }
    }
    let Some(disallow_len) = disallow_match else {
        return false;
    };

    for rule in &group.allow {
        if rule.is_empty() {
            continue;
        }
        if path_matches(path, rule) && effective_length(rule) >= disallow_len {
            return false;
        }
    }
    true
}

fn effective_length(pattern: &str) -> usize {
    pattern.chars().filter(|&c| c != '*' && c != '$').count()
}

fn path_matches(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;

    if !parts[0].is_empty() {
        if !path.starts_with(parts[0]) {
            return false;
        }
        pos = parts[0].len();
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    if parts.len() > 1 {
        let last = parts[parts.len() - 1];
        if !last.is_empty() {
            if anchored {
                if !path.ends_with(last) || path.len() - last.len() < pos {
                    return false;
                }
            } else if !path[pos..].contains(last) {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_disallow_allows_all() {
        let groups = parse("User-agent: *\nDisallow:");
        assert_eq!(
            evaluate(&groups, "/anything", "linkrot/0.1"),
            RobotsVerdict::Allowed
        );
    }

    #[test]
    fn disallow_blocks_matching_prefix() {
        let groups = parse("User-agent: *\nDisallow: /private/");
        assert_eq!(
            evaluate(&groups, "/private/page", "linkrot/0.1"),
            RobotsVerdict::Disallowed
        );
        assert_eq!(
            evaluate(&groups, "/public/page", "linkrot/0.1"),
            RobotsVerdict::Allowed
        );
    }

    #[test]
    fn allow_wins_ties() {
        let groups = parse("User-agent: *\nDisallow: /path\nAllow: /path");
        assert_eq!(
            evaluate(&groups, "/path", "linkrot/0.1"),
            RobotsVerdict::Allowed
        );
    }

    #[test]
    fn longer_allow_overrides_shorter_disallow() {
        let groups = parse("User-agent: *\nDisallow: /\nAllow: /public/");
        assert_eq!(
            evaluate(&groups, "/public/page", "linkrot/0.1"),
            RobotsVerdict::Allowed
        );
        assert_eq!(
            evaluate(&groups, "/secret", "linkrot/0.1"),
            RobotsVerdict::Disallowed
        );
    }

    #[test]
    fn named_group_beats_wildcard() {
        let groups =
            parse("User-agent: linkrot\nAllow: /\n\nUser-agent: *\nDisallow: /");
        assert_eq!(
            evaluate(&groups, "/page", "linkrot/0.1"),
            RobotsVerdict::Allowed
        );
        assert_eq!(
            evaluate(&groups, "/page", "othercrawler/1.0"),
            RobotsVerdict::Disallowed
        );
    }

    #[test]
    fn wildcard_and_anchor_patterns() {
        assert!(path_matches("/foo.php", "/*.php$"));
        assert!(!path_matches("/foo.php/bar", "/*.php$"));
        assert!(path_matches("/images/photo.jpg", "/images/*"));
    }
}
