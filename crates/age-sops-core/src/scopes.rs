//! Reconciles scope membership against a desired state. All functions here
//! are pure mutations over [`Config`]; persistence stays with the caller.

use crate::config::{Config, CreationRule, KeyEntry};
use crate::error::{Error, Result};

/// Membership changes produced by [`set_scopes_for_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ScopeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Makes the key a member of exactly `desired` across every rule and
/// reports which scopes changed. An empty diff is a valid outcome.
pub fn set_scopes_for_key(config: &mut Config, public_key: &str, desired: &[String]) -> ScopeDiff {
    let mut diff = ScopeDiff::default();
    for rule in &mut config.creation_rules {
        let has_access = rule.contains(public_key);
        let should_have_access = desired.iter().any(|id| id == &rule.id);
        if should_have_access && !has_access {
            rule.members_mut().push(public_key.to_string());
            diff.added.push(rule.id.clone());
        } else if !should_have_access && has_access {
            rule.members_mut().retain(|key| key != public_key);
            diff.removed.push(rule.id.clone());
        }
    }
    diff
}

/// Appends the key to each named scope that exists, skipping scopes it is
/// already in. Returns the ids that matched no rule so the caller can warn
/// about typos instead of losing them silently.
pub fn add_key_to_scopes(config: &mut Config, public_key: &str, scope_ids: &[String]) -> Vec<String> {
    let mut unknown = Vec::new();
    for id in scope_ids {
        match config.rule_mut(id) {
            Some(rule) => {
                if !rule.contains(public_key) {
                    rule.members_mut().push(public_key.to_string());
                }
            }
            None => unknown.push(id.clone()),
        }
    }
    unknown
}

/// Deletes the key from every rule's membership and from the registry.
/// Returns false when the key was present nowhere.
pub fn remove_key_everywhere(config: &mut Config, public_key: &str) -> bool {
    let mut found = config.key_registry.remove(public_key).is_some();
    for rule in &mut config.creation_rules {
        let before = rule.members().len();
        rule.members_mut().retain(|key| key != public_key);
        found |= rule.members().len() != before;
    }
    found
}

/// Appends a new empty rule, or fails without mutating anything when the
/// id is already taken.
pub fn create_scope(config: &mut Config, id: &str, path_regex: Option<String>) -> Result<()> {
    if config.rule(id).is_some() {
        return Err(Error::DuplicateScope(id.to_string()));
    }
    config.creation_rules.push(CreationRule::new(id, path_regex));
    Ok(())
}

pub fn find_key_by_owner<'a>(config: &'a Config, owner: &str) -> Option<(&'a str, &'a KeyEntry)> {
    config
        .key_registry
        .iter()
        .find(|(_, entry)| entry.owner == owner)
        .map(|(key, entry)| (key.as_str(), entry))
}

/// Scope ids whose membership contains the key, in rule order.
pub fn scopes_for_key<'a>(config: &'a Config, public_key: &str) -> Vec<&'a str> {
    config
        .creation_rules
        .iter()
        .filter(|rule| rule.contains(public_key))
        .map(|rule| rule.id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SCOPE;

    const PK: &str = "age1testkey";

    fn config_with_scopes(ids: &[&str]) -> Config {
        let mut config = Config::default();
        for id in ids {
            create_scope(&mut config, id, None).unwrap();
        }
        config
    }

    fn register(config: &mut Config, public_key: &str, owner: &str) {
        config.key_registry.insert(
            public_key.to_string(),
            KeyEntry {
                owner: owner.to_string(),
                email: format!("{owner}@example.com"),
                added_at: "2024-05-01".to_string(),
                purpose: None,
            },
        );
    }

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn add_then_set_leaves_exact_membership() {
        let mut config = config_with_scopes(&["a", "b"]);
        let unknown = add_key_to_scopes(&mut config, PK, &owned(&["a", "b"]));
        assert!(unknown.is_empty());

        let diff = set_scopes_for_key(&mut config, PK, &owned(&["b"]));
        assert_eq!(diff.removed, vec!["a".to_string()]);
        assert!(diff.added.is_empty());
        assert_eq!(scopes_for_key(&config, PK), vec!["b"]);
    }

    #[test]
    fn reconciling_to_current_state_is_an_empty_diff() {
        let mut config = config_with_scopes(&["a"]);
        add_key_to_scopes(&mut config, PK, &owned(&["a"]));
        let diff = set_scopes_for_key(&mut config, PK, &owned(&["a"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn adding_twice_does_not_duplicate_membership() {
        let mut config = config_with_scopes(&["a"]);
        add_key_to_scopes(&mut config, PK, &owned(&["a"]));
        add_key_to_scopes(&mut config, PK, &owned(&["a"]));
        assert_eq!(config.rule("a").unwrap().members().len(), 1);
    }

    #[test]
    fn unknown_scope_ids_are_reported_not_dropped() {
        let mut config = config_with_scopes(&["a"]);
        let unknown = add_key_to_scopes(&mut config, PK, &owned(&["a", "typo"]));
        assert_eq!(unknown, vec!["typo".to_string()]);
        assert_eq!(scopes_for_key(&config, PK), vec!["a"]);
    }

    #[test]
    fn remove_key_everywhere_strips_registry_and_every_scope() {
        let mut config = config_with_scopes(&["a", "b"]);
        register(&mut config, PK, "alice");
        add_key_to_scopes(&mut config, PK, &owned(&["a", "b", DEFAULT_SCOPE]));

        assert!(remove_key_everywhere(&mut config, PK));
        assert!(config.key_registry.is_empty());
        assert!(scopes_for_key(&config, PK).is_empty());

        // second call reports not-found and changes nothing
        let before = config.clone();
        assert!(!remove_key_everywhere(&mut config, PK));
        assert_eq!(config, before);
    }

    #[test]
    fn duplicate_scope_fails_without_mutating_state() {
        let mut config = config_with_scopes(&["a"]);
        let before = config.clone();
        let err = create_scope(&mut config, "a", Some("ignored/.*".to_string())).unwrap_err();
        assert!(matches!(err, Error::DuplicateScope(id) if id == "a"));
        assert_eq!(config, before);
    }

    #[test]
    fn find_key_by_owner_matches_registry_entries() {
        let mut config = Config::default();
        register(&mut config, PK, "alice");
        let (key, entry) = find_key_by_owner(&config, "alice").unwrap();
        assert_eq!(key, PK);
        assert_eq!(entry.email, "alice@example.com");
        assert!(find_key_by_owner(&config, "bob").is_none());
    }
}
