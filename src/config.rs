use std::collections::{HashMap, HashSet};
use std::time::Duration;

use thiserror::Error;

use crate::gemini::DEMO_KEY;

pub const DEFAULT_API_BASE: &str = "https://wisdom-gate.juheapi.com";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub api_key: String,
    pub api_base: String,
    pub admin_emails: Vec<String>,
    pub model_costs: HashMap<String, f64>,
    pub remote_call_timeout: Duration,
    pub audit_queue_capacity: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("WISDOM_API_KEY")
            .or_else(|| get("GEMINI_API_KEY"))
            .unwrap_or_else(|| DEMO_KEY.to_string());

        let admin_emails = get("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let model_costs = match get("MODEL_COSTS") {
            Some(raw) => parse_model_costs(&raw)?,
            None => HashMap::new(),
        };

        let timeout_secs: u64 = parse_or("REMOTE_CALL_TIMEOUT_SECS", get("REMOTE_CALL_TIMEOUT_SECS"), 120)?;
        if timeout_secs == 0 {
            return Err(invalid("REMOTE_CALL_TIMEOUT_SECS", "0", "must be greater than zero"));
        }
        let audit_queue_capacity: usize = parse_or("AUDIT_QUEUE_CAPACITY", get("AUDIT_QUEUE_CAPACITY"), 256)?;
        if audit_queue_capacity == 0 {
            return Err(invalid("AUDIT_QUEUE_CAPACITY", "0", "must be greater than zero"));
        }

        Ok(Self {
            port: parse_or("PORT", get("PORT"), 8080)?,
            api_key,
            api_base: get("WISDOM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            admin_emails,
            model_costs,
            remote_call_timeout: Duration::from_secs(timeout_secs),
            audit_queue_capacity,
        })
    }

    /// First characters of the key, enough to tell keys apart in logs.
    pub fn masked_api_key(&self) -> String {
        let visible: String = self.api_key.chars().take(6).collect();
        format!("{visible}***")
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid { key, value: value.to_string(), reason: reason.to_string() }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e: T::Err| invalid(key, &v, e)),
        None => Ok(default),
    }
}

fn parse_model_costs(raw: &str) -> Result<HashMap<String, f64>, ConfigError> {
    let mut costs = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (model, cost) = entry
            .split_once('=')
            .ok_or_else(|| invalid("MODEL_COSTS", entry, "expected model=eur"))?;
        let cost: f64 = cost.trim().parse().map_err(|e| invalid("MODEL_COSTS", entry, e))?;
        if cost < 0.0 {
            return Err(invalid("MODEL_COSTS", entry, "cost cannot be negative"));
        }
        costs.insert(model.trim().to_string(), cost);
    }
    Ok(costs)
}

/// Who may see admin-only data. Loaded once from settings and shared.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admins: HashSet<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { admins: admin_emails.into_iter().map(|e| e.as_ref().trim().to_lowercase()).collect() }
    }

    pub fn is_admin(&self, email: Option<&str>) -> bool {
        email.map(|e| self.admins.contains(&e.trim().to_lowercase())).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.api_key, DEMO_KEY);
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.remote_call_timeout, Duration::from_secs(120));
        assert_eq!(settings.audit_queue_capacity, 256);
        assert!(settings.admin_emails.is_empty());
    }

    #[test]
    fn reads_keys_costs_and_admins() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "gm-key-123456"),
            ("ADMIN_EMAILS", " Ops@Example.com, ,dev@example.com"),
            ("MODEL_COSTS", "gemini-2.5-flash=0.002, imagen=0.04"),
            ("PORT", "3000"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key, "gm-key-123456");
        assert_eq!(settings.masked_api_key(), "gm-key***");
        assert_eq!(settings.admin_emails, vec!["ops@example.com", "dev@example.com"]);
        assert_eq!(settings.model_costs.get("imagen"), Some(&0.04));
        assert_eq!(settings.port, 3000);
    }

    #[test]
    fn malformed_values_name_the_key() {
        let err = Settings::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        let err = Settings::from_lookup(lookup(&[("MODEL_COSTS", "imagen")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MODEL_COSTS", .. }));
        let err = Settings::from_lookup(lookup(&[("AUDIT_QUEUE_CAPACITY", "0")])).unwrap_err();
        assert!(err.to_string().contains("AUDIT_QUEUE_CAPACITY"));
    }

    #[test]
    fn admin_check_ignores_case() {
        let policy = AccessPolicy::new(["ops@example.com"]);
        assert!(policy.is_admin(Some("OPS@example.com")));
        assert!(!policy.is_admin(Some("guest@example.com")));
        assert!(!policy.is_admin(None));
    }
}
