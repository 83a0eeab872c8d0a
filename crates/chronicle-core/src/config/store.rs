//! Search-index backend configuration and index-name templating.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and batching settings for the index backend.
///
/// Duration-valued keys (`retry_delay`, `flush_interval`, `request_timeout`)
/// are given in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Whether audit persistence is enabled at all.
    #[serde(default)]
    pub enabled: bool,

    /// Cluster node addresses, e.g. `["https://localhost:9200"]`.
    #[serde(default)]
    pub addresses: Vec<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Alternative to username/password.
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Path to a CA certificate bundle.
    #[serde(default)]
    pub ca_cert: Option<String>,

    /// Prefix used by the index-name pattern.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Index-name template; `{prefix}`, `{domain}`, `{yyyy}`, `{MM}` and
    /// `{dd}` are substituted per event.
    #[serde(default = "default_index_pattern")]
    pub index_pattern: String,

    /// Number of bulk-indexer workers.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Batch size that triggers a flush.
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,

    /// Transport retry attempts inside the store adapter.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between transport retries, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Periodic flush interval, in milliseconds.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u64,

    /// Per-request (and per-flush) timeout, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addresses: Vec::new(),
            username: String::new(),
            password: String::new(),
            api_key: String::new(),
            insecure_skip_verify: false,
            ca_cert: None,
            index_prefix: default_index_prefix(),
            index_pattern: default_index_pattern(),
            num_workers: default_num_workers(),
            bulk_size: default_bulk_size(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            flush_interval: default_flush_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    /// Expand the index-name template for one (domain, timestamp) pair.
    ///
    /// Substitution runs to a fixed point, so a pattern that expands to
    /// further placeholders is resolved fully; the result is lowercase.
    pub fn index_name(&self, domain: &str, timestamp: DateTime<Utc>) -> String {
        let mut name = self.index_pattern.clone();
        loop {
            let next = name
                .replace("{prefix}", &self.index_prefix)
                .replace("{domain}", domain)
                .replace("{yyyy}", &format!("{:04}", timestamp.year()))
                .replace("{MM}", &format!("{:02}", timestamp.month()))
                .replace("{dd}", &format!("{:02}", timestamp.day()));
            if next == name {
                break;
            }
            name = next;
        }
        name.to_ascii_lowercase()
    }

    /// Wildcard pattern covering every partition, optionally narrowed to a
    /// single domain. Used by the read side.
    pub fn search_pattern(&self, domain: Option<&str>) -> String {
        match domain {
            Some(d) if !d.is_empty() => format!("{}-{}-*", self.index_prefix, d.to_ascii_lowercase()),
            _ => format!("{}-*", self.index_prefix),
        }
    }
}

fn default_index_prefix() -> String {
    "audit-log".to_string()
}

fn default_index_pattern() -> String {
    "{prefix}-{domain}-{yyyy}.{MM}".to_string()
}

fn default_num_workers() -> usize {
    4
}

fn default_bulk_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}

fn default_flush_interval() -> u64 {
    2_000
}

fn default_request_timeout() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn index_name_expands_default_pattern() {
        let config = StoreConfig::default();
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(config.index_name("appointment", ts), "audit-log-appointment-2026.03");
    }

    #[test]
    fn index_name_expands_daily_pattern() {
        let config = StoreConfig {
            index_pattern: "{prefix}-{domain}-{yyyy}.{MM}.{dd}".to_string(),
            ..StoreConfig::default()
        };
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(config.index_name("patient", ts), "audit-log-patient-2026.01.02");
    }

    #[test]
    fn index_name_is_idempotent() {
        let config = StoreConfig::default();
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let once = config.index_name("appointment", ts);
        let again = StoreConfig {
            index_pattern: once.clone(),
            ..StoreConfig::default()
        }
        .index_name("appointment", ts);
        assert_eq!(once, again);
        assert!(!once.contains('{'));
    }

    #[test]
    fn index_name_lowercases() {
        let config = StoreConfig {
            index_prefix: "Audit-Log".to_string(),
            ..StoreConfig::default()
        };
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(config.index_name("Appointment", ts), "audit-log-appointment-2026.03");
    }

    #[test]
    fn search_patterns() {
        let config = StoreConfig::default();
        assert_eq!(config.search_pattern(None), "audit-log-*");
        assert_eq!(config.search_pattern(Some("patient")), "audit-log-patient-*");
        assert_eq!(config.search_pattern(Some("")), "audit-log-*");
    }
}
