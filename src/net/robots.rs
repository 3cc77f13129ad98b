use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parsed robots.txt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotsRules {
    pub groups: Vec<RobotGroup>,
}

/// One `User-agent` group and the rules that follow it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotGroup {
    pub user_agents: Vec<String>,
    pub rules: Vec<PathRule>,
    pub crawl_delay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    pub allow: bool,
    pub pattern: String,
}

impl RobotsRules {
    /// Parse robots.txt content.
    ///
    /// Consecutive `User-agent` lines share one group. Unknown directives and
    /// rules that appear before any `User-agent` line are ignored.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<RobotGroup> = Vec::new();
        let mut current: Option<RobotGroup> = None;
        let mut collecting_agents = false;

        for raw_line in content.lines() {
            let line = match raw_line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => raw_line.trim(),
            };

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
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(RobotGroup::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.user_agents.push(value.to_lowercase());
                    }
                    collecting_agents = true;
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    let Some(group) = current.as_mut() else { continue };
                    // An empty Disallow grants everything, which is the default anyway
                    if value.is_empty() {
                        continue;
                    }
                    group.rules.push(PathRule {
                        allow: directive == "allow",
                        pattern: value.to_string(),
                    });
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let Some(group) = current.as_mut() {
                        group.crawl_delay = value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0);
                    }
                }
                _ => {
                    collecting_agents = false;
                }
            }
        }

        if let Some(group) = current {
            groups.push(group);
        }

        Self { groups }
    }

    /// Group applying to `agent_token`: the longest matching named agent, else `*`
    pub fn select_group(&self, agent_token: &str) -> Option<&RobotGroup> {
        let token = agent_token.to_lowercase();

        let named = self
            .groups
            .iter()
            .filter_map(|group| {
                group
                    .user_agents
                    .iter()
                    .filter(|ua| ua.as_str() != "*" && token.contains(ua.as_str()))
                    .map(|ua| ua.len())
                    .max()
                    .map(|len| (len, group))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, group)| group);

        named.or_else(|| {
            self.groups
                .iter()
                .find(|group| group.user_agents.iter().any(|ua| ua == "*"))
        })
    }

    /// Check if `path` may be fetched by `agent_token`.
    ///
    /// The longest matching pattern decides; on a tie `Allow` wins.
    pub fn is_allowed(&self, path: &str, agent_token: &str) -> bool {
        let Some(group) = self.select_group(agent_token) else {
            return true;
        };

        let mut best: Option<(usize, bool)> = None;
        for rule in &group.rules {
            if !matches_path(path, &rule.pattern) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow)) if best_len > len || (best_len == len && best_allow) => {
                    Some((best_len, best_allow))
                }
                _ => Some((len, rule.allow)),
            };
        }

        let allowed = best.map(|(_, allow)| allow).unwrap_or(true);
        debug!("robots: {} for {} -> {}", path, agent_token, allowed);
        allowed
    }

    /// Crawl delay for `agent_token`, rounded up to whole seconds
    pub fn crawl_delay_seconds(&self, agent_token: &str) -> Option<u64> {
        self.select_group(agent_token)
            .and_then(|group| group.crawl_delay)
            .map(|delay| delay.ceil() as u64)
    }

    pub fn allowed_paths(&self, agent_token: &str) -> Vec<String> {
        self.paths(agent_token, true)
    }

    pub fn disallowed_paths(&self, agent_token: &str) -> Vec<String> {
        self.paths(agent_token, false)
    }

    fn paths(&self, agent_token: &str, allow: bool) -> Vec<String> {
        self.select_group(agent_token)
            .map(|group| {
                group
                    .rules
                    .iter()
                    .filter(|rule| rule.allow == allow)
                    .map(|rule| rule.pattern.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Check if path matches robots.txt pattern (`*` wildcard, `$` end anchor)
fn matches_path(path: &str, pattern: &str) -> bool {
    if !pattern.contains('*') && !pattern.ends_with('$') {
        return path.starts_with(pattern);
    }

    let (body, anchored) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };

    let mut regex_pattern = String::from("^");
    for (i, part) in body.split('*').enumerate() {
        if i > 0 {
            regex_pattern.push_str(".*");
        }
        regex_pattern.push_str(&regex::escape(part));
    }
    if anchored {
        regex_pattern.push('$');
    }

    match regex::Regex::new(&regex_pattern) {
        Ok(regex) => regex.is_match(path),
        Err(_) => path.starts_with(&body.replace('*', "")),
    }
}
