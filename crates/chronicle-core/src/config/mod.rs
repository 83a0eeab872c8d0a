//! Audit configuration: loading, validation, and rule resolution.
//!
//! Configuration is a single YAML document with three sections: the index
//! backend (`elasticsearch`), global capture settings (`global`), and the
//! per-entity rules (`entities`). `${VAR}` placeholders are substituted
//! from the process environment before parsing.

pub mod entity;
pub mod store;

use crate::error::ConfigError;
use crate::fieldset::FieldSet;
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub use entity::{EntityRule, PrimaryKeySpec};
pub use store::StoreConfig;

/// Complete audit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChronicleConfig {
    /// Index backend connection and batching settings.
    #[serde(rename = "elasticsearch", default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub entities: Vec<EntityRule>,
}

/// Global capture settings shared by every entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Fields dropped from every entity's snapshots.
    #[serde(default)]
    pub excluded_fields: Vec<String>,

    /// Fields masked in every entity's snapshots.
    #[serde(default)]
    pub sensitive_fields: Vec<String>,

    #[serde(default)]
    pub include_before_data: bool,

    #[serde(default)]
    pub include_after_data: bool,

    #[serde(default = "default_true")]
    pub include_ip_address: bool,

    #[serde(default = "default_true")]
    pub include_user_agent: bool,

    /// Upper bound on the serialized metadata block, in bytes.
    #[serde(default = "default_max_metadata_size")]
    pub max_metadata_size: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            excluded_fields: Vec::new(),
            sensitive_fields: Vec::new(),
            include_before_data: false,
            include_after_data: false,
            include_ip_address: true,
            include_user_agent: true,
            max_metadata_size: default_max_metadata_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_metadata_size() -> usize {
    10 * 1024
}

/// An entity rule with the global settings folded in: field sets are the
/// union of both levels and a `true` at either level enables an image.
#[derive(Debug, Clone)]
pub struct EffectiveRule {
    pub domain: String,
    pub entity: String,
    pub primary_key: PrimaryKeySpec,
    pub excluded: FieldSet,
    pub sensitive: FieldSet,
    pub include_before_data: bool,
    pub include_after_data: bool,
    pub transformers: HashMap<String, String>,
    pub metadata: HashMap<String, String>,
}

impl ChronicleConfig {
    /// Load from a YAML file, substituting `${VAR}` placeholders first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&expand_env(&content))
    }

    /// Parse from YAML content and validate.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Fatal at load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.enabled {
            if self.store.addresses.is_empty() {
                return Err(ConfigError::Invalid(
                    "store addresses must be specified".to_string(),
                ));
            }
            if self.store.api_key.is_empty()
                && (self.store.username.is_empty() || self.store.password.is_empty())
            {
                return Err(ConfigError::Invalid(
                    "store authentication required: username/password or api_key".to_string(),
                ));
            }
        }

        for rule in &self.entities {
            if rule.domain.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "domain must be specified for entity {:?}",
                    rule.entity
                )));
            }
            if rule.entity.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "entity name must be specified for domain {:?}",
                    rule.domain
                )));
            }

            let pk = &rule.primary_key;
            let has_single = pk.single_key.as_deref().is_some_and(|k| !k.is_empty());
            let has_composite = !pk.composite_keys.is_empty();
            if !has_single && !has_composite {
                return Err(ConfigError::Invalid(format!(
                    "primary key configuration required for entity {}.{}",
                    rule.domain, rule.entity
                )));
            }
            if has_single && has_composite {
                return Err(ConfigError::Invalid(format!(
                    "only single_key or composite_keys can be specified, not both, for entity {}.{}",
                    rule.domain, rule.entity
                )));
            }
        }

        Ok(())
    }

    /// Look up the rule for a domain, ignoring enablement.
    pub fn rule_for(&self, domain: &str) -> Option<&EntityRule> {
        self.entities.iter().find(|r| r.domain == domain)
    }

    /// Resolve the rule that applies to one call.
    ///
    /// Returns `None` when auditing is globally disabled, the domain has no
    /// rule, the rule is disabled, or the operation inferred from the
    /// method name is not in the rule's operation set.
    pub fn resolve(&self, domain: &str, method_name: &str) -> Option<&EntityRule> {
        if !self.global.enabled {
            return None;
        }
        let rule = self.rule_for(domain)?;
        if !rule.enabled {
            return None;
        }
        let operation = Operation::infer(method_name);
        rule.allows(operation).then_some(rule)
    }

    /// Index partition name for one (domain, timestamp) pair.
    pub fn index_name_for(&self, domain: &str, timestamp: chrono::DateTime<chrono::Utc>) -> String {
        self.store.index_name(domain, timestamp)
    }

    /// Fold global settings into an entity rule.
    pub fn effective_rule(&self, rule: &EntityRule) -> EffectiveRule {
        let excluded = FieldSet::from_names(&self.global.excluded_fields)
            .union(&FieldSet::from_names(&rule.excluded_fields));
        let sensitive = FieldSet::from_names(&self.global.sensitive_fields)
            .union(&FieldSet::from_names(&rule.sensitive_fields));

        EffectiveRule {
            domain: rule.domain.clone(),
            entity: rule.entity.clone(),
            primary_key: rule.primary_key.clone(),
            excluded,
            sensitive,
            include_before_data: rule.include_before_data || self.global.include_before_data,
            include_after_data: rule.include_after_data || self.global.include_after_data,
            transformers: rule.transformers.clone(),
            metadata: rule.metadata.clone(),
        }
    }
}

/// Substitute `${VAR}` placeholders with environment values.
///
/// Unset variables expand to the empty string; malformed placeholders are
/// left untouched.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find('}') {
            Some(end) if is_env_name(&tail[..end]) => {
                let name = &tail[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        tracing::warn!(variable = name, "environment variable is not set");
                    }
                }
                rest = &tail[end + 1..];
            }
            Some(end) => {
                out.push_str(&rest[start..start + 2 + end + 1]);
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_env_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
