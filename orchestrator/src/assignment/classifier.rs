//! Host-group classification for scheduling priority
//!
//! Servers are sorted into exactly one priority group: first exact
//! host-group tag match wins, then the first name-pattern match, and
//! anything left lands in the lowest-priority catch-all bucket.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::registry::ServerRecord;

/// How servers inside a group are ordered before assignment. Ordering
/// must be deterministic so repeated runs produce the same plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrdering {
    /// Timezone first, then name; keeps co-located critical hosts together.
    Location,
    /// Plain name ordering.
    Name,
}

/// One row of the group-priority table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRule {
    pub name: String,
    /// Lower numbers are assigned earlier and get first pick of slots.
    pub priority: u8,
    /// Exact host-group tags that map into this group.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fallback substring patterns checked against the server name.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Preferred sub-window inside the evening slot grid, if any.
    pub preferred_start: Option<NaiveTime>,
    pub preferred_end: Option<NaiveTime>,
    pub ordering: GroupOrdering,
}

impl GroupRule {
    pub fn preferred_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.preferred_start, self.preferred_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// Name of the implicit catch-all group.
pub const UNCLASSIFIED: &str = "unclassified";

/// Validated, priority-ordered classification rule set.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<GroupRule>,
}

impl Classifier {
    /// Build a classifier, rejecting malformed tables up front: empty
    /// group names, duplicate names and duplicate priorities are all
    /// fatal configuration errors.
    pub fn new(mut rules: Vec<GroupRule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::InvalidGroupTable {
                reason: "group table is empty".to_string(),
            });
        }

        for rule in &rules {
            if rule.name.trim().is_empty() {
                return Err(ConfigError::InvalidGroupTable {
                    reason: "group with empty name".to_string(),
                });
            }
        }

        rules.sort_by_key(|rule| rule.priority);
        for pair in rules.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(ConfigError::InvalidGroupTable {
                    reason: format!(
                        "groups '{}' and '{}' share priority {}",
                        pair[0].name, pair[1].name, pair[0].priority
                    ),
                });
            }
            if pair[0].name == pair[1].name {
                return Err(ConfigError::InvalidGroupTable {
                    reason: format!("duplicate group name '{}'", pair[0].name),
                });
            }
        }

        Ok(Self { rules })
    }

    /// Stock rule table: critical and database hosts get the late
    /// window first, application hosts the middle, development hosts
    /// the early window.
    pub fn standard() -> Self {
        let time = |h: u32, m: u32| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        Self::new(vec![
            GroupRule {
                name: "critical".to_string(),
                priority: 1,
                tags: vec!["critical".to_string(), "production-db".to_string()],
                patterns: vec!["sql".to_string()],
                preferred_start: Some(time(21, 0)),
                preferred_end: Some(time(23, 30)),
                ordering: GroupOrdering::Location,
            },
            GroupRule {
                name: "database".to_string(),
                priority: 2,
                tags: vec!["database".to_string()],
                patterns: vec!["db".to_string()],
                preferred_start: Some(time(21, 0)),
                preferred_end: Some(time(23, 30)),
                ordering: GroupOrdering::Name,
            },
            GroupRule {
                name: "application".to_string(),
                priority: 3,
                tags: vec!["application".to_string(), "app".to_string()],
                patterns: vec!["app".to_string(), "web".to_string()],
                preferred_start: Some(time(20, 30)),
                preferred_end: Some(time(22, 30)),
                ordering: GroupOrdering::Name,
            },
            GroupRule {
                name: "development".to_string(),
                priority: 4,
                tags: vec!["development".to_string(), "dev".to_string()],
                patterns: vec!["dev".to_string(), "test".to_string()],
                preferred_start: Some(time(20, 0)),
                preferred_end: Some(time(21, 0)),
                ordering: GroupOrdering::Name,
            },
        ])
        .expect("stock group table is valid")
    }

    pub fn rules(&self) -> &[GroupRule] {
        &self.rules
    }

    /// Classify one server: first exact tag match, else first pattern
    /// match, else the catch-all bucket.
    pub fn classify(&self, server: &ServerRecord) -> &str {
        let tag = server.host_group.to_lowercase();
        for rule in &self.rules {
            if rule.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                return &rule.name;
            }
        }

        let name = server.name.to_lowercase();
        for rule in &self.rules {
            if rule.patterns.iter().any(|p| name.contains(p.as_str())) {
                return &rule.name;
            }
        }

        UNCLASSIFIED
    }

    pub fn rule(&self, group: &str) -> Option<&GroupRule> {
        self.rules.iter().find(|rule| rule.name == group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, group: &str) -> ServerRecord {
        ServerRecord::new(name, "UTC", group, "ops")
    }

    #[test]
    fn exact_tag_match_wins_over_pattern() {
        let classifier = Classifier::standard();
        // Name pattern says "dev" but the tag says database
        assert_eq!(classifier.classify(&server("devbox-db", "database")), "database");
    }

    #[test]
    fn pattern_fallback_applies_without_tag() {
        let classifier = Classifier::standard();
        assert_eq!(classifier.classify(&server("db01", "unknown-tag")), "database");
        assert_eq!(classifier.classify(&server("web42", "unknown-tag")), "application");
    }

    #[test]
    fn unmatched_servers_fall_into_catch_all() {
        let classifier = Classifier::standard();
        assert_eq!(classifier.classify(&server("mystery", "nothing")), UNCLASSIFIED);
    }

    #[test]
    fn duplicate_priorities_are_rejected() {
        let mut rules = Classifier::standard().rules().to_vec();
        rules[1].priority = rules[0].priority;
        let err = Classifier::new(rules).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGroupTable { .. }));
    }
}
