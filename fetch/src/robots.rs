//! robots.txt parsing and per-worker policy caching.
//!
//! Parsing follows RFC 9309: user-agent groups with case-insensitive
//! substring matching (most specific group wins, `*` only as fallback),
//! Allow/Disallow rules with prefix, `*` wildcard and `$` end-anchor
//! matching, longest rule wins with Allow winning ties.
//!
//! Each worker owns one cache. A cache miss fetches
//! `{scheme}://{authority}/robots.txt`; if that fetch fails for any reason a
//! permit-all policy is installed for the origin so it is not re-queried.

use std::collections::HashMap;

use url::Url;

/// Token matched against user-agent groups.
const AGENT_TOKEN: &str = "trawl";

/// Per-worker cache mapping origin to its parsed policy.
pub struct RobotsCache {
    client: reqwest::Client,
    policies: HashMap<String, RobotsPolicy>,
}

impl RobotsCache {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            policies: HashMap::new(),
        }
    }

    /// May `url` be fetched, per its origin's robots policy?
    pub async fn allowed(&mut self, url: &Url) -> bool {
        let origin = compute_origin(url);
        if !self.policies.contains_key(&origin) {
            let policy = self.fetch_policy(&origin).await;
            self.policies.insert(origin.clone(), policy);
        }
        self.policies[&origin].allowed(url.path(), AGENT_TOKEN)
    }

    /// Fetch and parse an origin's robots.txt. Any failure (transport error,
    /// non-2xx status) yields a permit-all policy, which stays installed.
    async fn fetch_policy(&self, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{origin}/robots.txt");
        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url = %robots_url, error = %err, "robots.txt unreachable");
                return RobotsPolicy::permit_all();
            }
        };
        if !response.status().is_success() {
            tracing::debug!(
                url = %robots_url,
                status = response.status().as_u16(),
                "no robots.txt"
            );
            return RobotsPolicy::permit_all();
        }
        match response.text().await {
            Ok(text) => RobotsPolicy::parse(&text),
            Err(err) => {
                tracing::debug!(url = %robots_url, error = %err, "robots.txt read failed");
                RobotsPolicy::permit_all()
            }
        }
    }
}

/// Origin key: scheme://host, with the port only when non-standard.
fn compute_origin(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("");
    let default_port = if scheme == "https" { 443 } else { 80 };
    match url.port_or_known_default() {
        Some(port) if port != default_port => format!("{scheme}://{host}:{port}"),
        _ => format!("{scheme}://{host}"),
    }
}

/// Parsed robots.txt rules for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// User-agent groups (lowercase UA → rules).
    groups: HashMap<String, RuleGroup>,
}

#[derive(Debug, Clone, Default)]
struct RuleGroup {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsPolicy {
    /// The policy installed when robots.txt cannot be fetched: no groups, so
    /// every path is allowed.
    #[must_use]
    pub fn permit_all() -> Self {
        Self::default()
    }

    /// Permissive line-level parsing; unknown directives (Sitemap,
    /// Crawl-delay, ...) are ignored.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);

        let mut policy = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut in_group = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_group {
                        current_agents.clear();
                        in_group = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "allow" => {
                    in_group = true;
                    for agent in &current_agents {
                        policy
                            .groups
                            .entry(agent.clone())
                            .or_default()
                            .allow
                            .push(value.to_string());
                    }
                }
                "disallow" => {
                    in_group = true;
                    for agent in &current_agents {
                        policy
                            .groups
                            .entry(agent.clone())
                            .or_default()
                            .disallow
                            .push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        policy
    }

    /// Check a path for a user-agent token.
    #[must_use]
    pub fn allowed(&self, path: &str, user_agent: &str) -> bool {
        match self.find_group(user_agent) {
            Some(group) => !group.is_disallowed(path),
            None => true,
        }
    }

    /// Most specific matching group; `*` only when no named group matches.
    fn find_group(&self, user_agent: &str) -> Option<&RuleGroup> {
        let ua_lower = user_agent.to_lowercase();

        let mut best: Option<&RuleGroup> = None;
        let mut best_len = 0;
        for (group_ua, group) in &self.groups {
            if group_ua == "*" {
                continue;
            }
            if ua_lower.contains(group_ua.as_str()) && group_ua.len() > best_len {
                best = Some(group);
                best_len = group_ua.len();
            }
        }

        best.or_else(|| self.groups.get("*"))
    }
}

impl RuleGroup {
    /// Longest matching rule wins; Allow wins ties. An empty Disallow allows
    /// all, an empty Allow matches nothing.
    fn is_disallowed(&self, path: &str) -> bool {
        let mut disallow_len: Option<usize> = None;
        for rule in &self.disallow {
            if rule.is_empty() || !path_matches(path, rule) {
                continue;
            }
            let len = effective_length(rule);
            if disallow_len.is_none_or(|best| len > best) {
                disallow_len = Some(len);
            }
        }

        let Some(disallow_len) = disallow_len else {
            return false;
        };

        !self.allow.iter().any(|rule| {
            !rule.is_empty() && path_matches(path, rule) && effective_length(rule) >= disallow_len
        })
    }
}

/// Rule length for precedence comparison; wildcards and anchors don't count.
fn effective_length(pattern: &str) -> usize {
    pattern.chars().filter(|&c| c != '*' && c != '$').count()
}

/// Match a path against a rule pattern (prefix, `*` wildcard, `$` anchor).
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

    wildcard_match(path, pattern, anchored)
}

fn wildcard_match(path: &str, pattern: &str, anchored: bool) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    let mut pos = 0;
    if !parts[0].is_empty() {
        if !path.starts_with(parts[0]) {
            return false;
        }
        pos = parts[0].len();
    }

    for part in &parts[1..parts.len().saturating_sub(1)] {
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
        if last.is_empty() {
            return true;
        }
        if anchored {
            path.ends_with(last) && path.len() - last.len() >= pos
        } else {
            path[pos..].contains(last)
        }
    } else {
        !anchored || path.len() == pattern.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permit_all_allows_everything() {
        let policy = RobotsPolicy::permit_all();
        assert!(policy.allowed("/private/x", AGENT_TOKEN));
    }

    #[test]
    fn disallow_prefix() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /private/");
        assert!(!policy.allowed("/private/x", AGENT_TOKEN));
        assert!(policy.allowed("/public/x", AGENT_TOKEN));
    }

    #[test]
    fn empty_disallow_allows_all() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow:");
        assert!(policy.allowed("/any/path", AGENT_TOKEN));
    }

    #[test]
    fn longer_allow_overrides_disallow() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /\nAllow: /public/");
        assert!(policy.allowed("/public/page", AGENT_TOKEN));
        assert!(!policy.allowed("/secret", AGENT_TOKEN));
    }

    #[test]
    fn allow_wins_ties() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /path\nAllow: /path");
        assert!(policy.allowed("/path", AGENT_TOKEN));
    }

    #[test]
    fn named_group_beats_wildcard() {
        let policy =
            RobotsPolicy::parse("User-agent: trawl\nAllow: /\n\nUser-agent: *\nDisallow: /");
        assert!(policy.allowed("/page", AGENT_TOKEN));
        assert!(!policy.allowed("/page", "otherbot"));
    }

    #[test]
    fn wildcard_and_anchor_patterns() {
        assert!(path_matches("/admin/secret/page", "/admin/*/page"));
        assert!(path_matches("/images/photo.jpg", "/images/*"));
        assert!(path_matches("/path/file.php", "*.php"));
        assert!(path_matches("/path", "/path$"));
        assert!(!path_matches("/path/more", "/path$"));
        assert!(path_matches("/foo.php", "/*.php$"));
        assert!(!path_matches("/foo.php/bar", "/*.php$"));
    }

    #[test]
    fn inline_comments_are_stripped() {
        let policy =
            RobotsPolicy::parse("User-agent: * # everyone\nDisallow: /private/ # keep out");
        assert!(!policy.allowed("/private/page", AGENT_TOKEN));
    }

    #[test]
    fn origin_key_omits_default_port() {
        let url = Url::parse("https://example.com:443/a").unwrap();
        assert_eq!(compute_origin(&url), "https://example.com");
        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(compute_origin(&url), "http://example.com:8080");
    }
}
