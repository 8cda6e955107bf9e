use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scope id that always exists and sorts last in the saved document.
pub const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub owner: String,
    pub email: String,
    pub added_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// One recipient group inside a creation rule. Only the `age` group is
/// populated; the list-of-groups shape is what sops expects on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroup {
    #[serde(default)]
    pub age: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_regex: Option<String>,
    pub key_groups: Vec<KeyGroup>,
}

impl CreationRule {
    pub fn new(id: impl Into<String>, path_regex: Option<String>) -> Self {
        Self {
            id: id.into(),
            path_regex,
            key_groups: vec![KeyGroup::default()],
        }
    }

    /// Member public keys, in insertion order.
    pub fn members(&self) -> &[String] {
        self.key_groups
            .first()
            .map(|group| group.age.as_slice())
            .unwrap_or(&[])
    }

    pub fn members_mut(&mut self) -> &mut Vec<String> {
        if self.key_groups.is_empty() {
            self.key_groups.push(KeyGroup::default());
        }
        &mut self.key_groups[0].age
    }

    pub fn contains(&self, public_key: &str) -> bool {
        self.members().iter().any(|key| key == public_key)
    }
}

/// The `.sops.yaml` document: key registry plus ordered creation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub key_registry: BTreeMap<String, KeyEntry>,
    #[serde(default = "default_rules")]
    pub creation_rules: Vec<CreationRule>,
}

fn default_rules() -> Vec<CreationRule> {
    vec![CreationRule::new(DEFAULT_SCOPE, None)]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_registry: BTreeMap::new(),
            creation_rules: default_rules(),
        }
    }
}

impl Config {
    /// Reads the document at `path`. A missing file yields the default
    /// document; a present-but-malformed file is an error so a hand-edited
    /// config is never silently replaced.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_yaml(&contents).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the document in one call; see [`Config::to_yaml`] for the
    /// layout contract.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_yaml()?)?;
        Ok(())
    }

    pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Serializes the registry block and the rules block independently and
    /// joins them with one blank line, registry first. Rules are ordered
    /// with `default` last and everything else lexicographic by id.
    pub fn to_yaml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct RegistryBlock<'a> {
            key_registry: &'a BTreeMap<String, KeyEntry>,
        }

        #[derive(Serialize)]
        struct RulesBlock<'a> {
            creation_rules: &'a [CreationRule],
        }

        let mut rules = self.creation_rules.clone();
        rules.sort_by(|a, b| match (a.id == DEFAULT_SCOPE, b.id == DEFAULT_SCOPE) {
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            _ => a.id.cmp(&b.id),
        });

        let registry = serde_yaml::to_string(&RegistryBlock {
            key_registry: &self.key_registry,
        })?;
        let rules = serde_yaml::to_string(&RulesBlock {
            creation_rules: &rules,
        })?;

        Ok(format!("{}\n\n{}", registry.trim_end(), rules.trim_end()))
    }

    pub fn rule(&self, id: &str) -> Option<&CreationRule> {
        self.creation_rules.iter().find(|rule| rule.id == id)
    }

    pub fn rule_mut(&mut self, id: &str) -> Option<&mut CreationRule> {
        self.creation_rules.iter_mut().find(|rule| rule.id == id)
    }
}
